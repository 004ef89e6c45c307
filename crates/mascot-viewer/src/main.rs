mod mascot;

use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowId;

use mascot_engine::coords::SurfaceSize;
use mascot_engine::core::{App, AppControl, FrameCtx};
use mascot_engine::device::{Gpu, GpuInit};
use mascot_engine::logging::{init_logging, LoggingConfig};
use mascot_engine::render::{
    RenderDelegate, RenderError, Renderer, RendererConfig, WgpuBackend, WgpuBackendConfig,
};

/// Logs the average frame rate every few seconds.
#[derive(Default)]
struct FrameStats {
    frames: Cell<u32>,
    elapsed: Cell<f64>,
}

impl FrameStats {
    const REPORT_EVERY: f64 = 5.0;
}

impl RenderDelegate<WgpuBackend> for FrameStats {
    fn render_update(&self, renderer: &Renderer<WgpuBackend>, duration: f64) {
        self.frames.set(self.frames.get() + 1);
        self.elapsed.set(self.elapsed.get() + duration);

        if self.elapsed.get() >= Self::REPORT_EVERY {
            let fps = self.frames.get() as f64 / self.elapsed.get();
            log::info!(
                "{fps:.1} fps over {} drawables (frame {})",
                renderer.drawables().len(),
                renderer.frame_index()
            );
            self.frames.set(0);
            self.elapsed.set(0.0);
        }
    }
}

struct ViewerApp {
    renderer: Option<Renderer<WgpuBackend>>,
    stats: Rc<FrameStats>,
}

impl ViewerApp {
    fn new() -> Self {
        Self {
            renderer: None,
            stats: Rc::new(FrameStats::default()),
        }
    }

    fn start_renderer(&self, gpu: &Gpu<'_>) -> Result<Renderer<WgpuBackend>> {
        let model = mascot::build()?;
        // The window is composited premultiplied; the default clear would
        // read as an additive white wash.
        let config = RendererConfig {
            clear_color: [0.0; 4],
            scale: 0.9,
            ..RendererConfig::default()
        };

        let backend = gpu.create_backend(WgpuBackendConfig::default());
        let mut renderer = Renderer::with_config(Box::new(model), backend, config)?;
        renderer.set_delegate(&self.stats);
        renderer.start_with_view(gpu)?;

        log::info!(
            "renderer started on {} at {:?}",
            gpu.adapter_info().name,
            gpu.size()
        );
        Ok(renderer)
    }
}

impl App for ViewerApp {
    fn on_window_event(&mut self, _window_id: WindowId, event: &WindowEvent) -> AppControl {
        match event {
            WindowEvent::KeyboardInput { event, .. }
                if event.state.is_pressed()
                    && event.logical_key == Key::Named(NamedKey::Escape) =>
            {
                AppControl::Exit
            }
            _ => AppControl::Continue,
        }
    }

    fn on_resize(&mut self, _window_id: WindowId, gpu: &Gpu<'_>, size: SurfaceSize) {
        let Some(renderer) = self.renderer.as_mut() else { return };
        if let Err(e) = renderer.drawable_size_will_change(gpu, size) {
            // Rebuilt from scratch on the next frame.
            log::error!("resize to {size:?} failed: {e}");
            self.renderer = None;
        }
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        if self.renderer.is_none() {
            if ctx.gpu.size().is_empty() {
                return AppControl::Continue;
            }
            match self.start_renderer(ctx.gpu) {
                Ok(r) => self.renderer = Some(r),
                Err(e) => {
                    log::error!("failed to start renderer: {e:#}");
                    return AppControl::Exit;
                }
            }
        }
        let Some(renderer) = self.renderer.as_mut() else {
            return AppControl::Continue;
        };

        ctx.render(|gpu, frame, time| {
            let result: Result<(), RenderError> = renderer.update(time.dt).and_then(|()| {
                renderer.begin_render_with_time(
                    time.dt,
                    gpu.full_viewport(),
                    &mut frame.encoder,
                    &frame.target,
                )
            });
            match result {
                Ok(()) => AppControl::Continue,
                Err(e) => {
                    log::error!("frame {} failed: {e}", time.frame_index);
                    AppControl::Exit
                }
            }
        })
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = mascot_engine::window::RuntimeConfig {
        title: "mascot".to_string(),
        initial_size: LogicalSize::new(360.0, 480.0),
        transparent: true,
        decorations: false,
        always_on_top: true,
    };
    let gpu_init = GpuInit {
        present_mode: wgpu::PresentMode::AutoVsync,
        ..GpuInit::default()
    };

    mascot_engine::window::Runtime::run(config, gpu_init, ViewerApp::new())
}
