use winit::window::{Window, WindowId};

use crate::device::{Gpu, GpuFrame, SurfaceErrorAction};
use crate::time::FrameTime;
use crate::window::RuntimeCtx;

use super::app::AppControl;

/// Per-window handles.
pub struct WindowCtx<'a> {
    pub id: WindowId,
    pub window: &'a Window,
}

impl WindowCtx<'_> {
    pub fn scale_factor(&self) -> f64 {
        self.window.scale_factor()
    }
}

/// Per-frame context passed to [`App::on_frame`](super::App::on_frame).
///
/// `'a` is the callback's duration, `'w` the window borrow carried by
/// `Gpu<'w>`.
pub struct FrameCtx<'a, 'w> {
    pub window: WindowCtx<'a>,
    pub gpu: &'a mut Gpu<'w>,
    pub time: FrameTime,
    pub runtime: &'a mut RuntimeCtx,
}

impl FrameCtx<'_, '_> {
    /// Acquires a frame, lets `draw` record into it, then submits and
    /// presents it.
    ///
    /// Nothing is acquired while the surface has zero size. Surface errors
    /// are handled here; only a fatal one turns into [`AppControl::Exit`].
    pub fn render<F>(&mut self, draw: F) -> AppControl
    where
        F: FnOnce(&Gpu<'_>, &mut GpuFrame, FrameTime) -> AppControl,
    {
        if self.gpu.size().is_empty() {
            return AppControl::Continue;
        }

        let mut frame = match self.gpu.begin_frame() {
            Ok(f) => f,
            Err(err) => {
                return match self.gpu.handle_surface_error(err) {
                    SurfaceErrorAction::Fatal => AppControl::Exit,
                    _ => AppControl::Continue,
                };
            }
        };

        let control = draw(&*self.gpu, &mut frame, self.time);

        self.window.window.pre_present_notify();
        self.gpu.submit(frame);
        control
    }
}
