use winit::event::WindowEvent;
use winit::window::WindowId;

use crate::coords::SurfaceSize;
use crate::device::Gpu;

use super::ctx::FrameCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application driven by [`Runtime`](crate::window::Runtime).
pub trait App {
    /// Called for every window event, before the runtime handles it.
    fn on_window_event(&mut self, window_id: WindowId, event: &WindowEvent) -> AppControl {
        let _ = (window_id, event);
        AppControl::Continue
    }

    /// Called after the window's surface has been resized. `size` may be zero
    /// while the window is minimized.
    fn on_resize(&mut self, window_id: WindowId, gpu: &Gpu<'_>, size: SurfaceSize) {
        let _ = (window_id, gpu, size);
    }

    /// Called once per redraw per window.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl;
}
