use anyhow::{Context, Result};
use wgpu::SurfaceError;
use winit::window::Window;

use crate::coords::{SurfaceSize, Viewport};
use crate::render::{PassTarget, RenderView, WgpuBackend, WgpuBackendConfig};

use super::{surface, GpuFrame, GpuInit, SurfaceErrorAction};

/// Owns the wgpu objects for one window surface.
///
/// Acts as the [`RenderView`] a renderer is started with: its drawable size
/// tracks the window's physical size, including zero while minimized.
pub struct Gpu<'w> {
    /// Kept alive for the surface.
    _instance: wgpu::Instance,

    /// Surface bound to the window. The window must outlive `Gpu`.
    surface: wgpu::Surface<'w>,

    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,

    /// Active surface configuration. Its size lags `size` while `size` is zero.
    config: wgpu::SurfaceConfiguration,

    /// Current drawable size in physical pixels.
    size: SurfaceSize,
}

impl<'w> Gpu<'w> {
    /// Creates a GPU context bound to a window.
    pub async fn new(window: &'w Window, init: GpuInit) -> Result<Self> {
        let size = SurfaceSize::from(window.inner_size());
        anyhow::ensure!(!size.is_empty(), "window has zero size");

        let GpuInit {
            prefer_srgb,
            present_mode,
            alpha_mode,
            required_features,
            required_limits,
            desired_maximum_frame_latency,
        } = init;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("mascot-engine device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface::choose_surface_format(&surface_caps, prefer_srgb)
            .context("no supported surface formats")?;
        let alpha_mode = surface::choose_alpha_mode(&surface_caps, alpha_mode);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency,
        };
        surface.configure(&device, &config);

        log::info!(
            "gpu ready: {} ({:?}), surface {:?} {:?}",
            adapter.get_info().name,
            adapter.get_info().backend,
            format,
            alpha_mode
        );

        Ok(Self {
            _instance: instance,
            surface,
            adapter,
            device,
            queue,
            config,
            size,
        })
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Current drawable size (physical pixels).
    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    /// Viewport covering the whole surface.
    pub fn full_viewport(&self) -> Viewport {
        Viewport::full(self.size)
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Creates a renderer backend drawing into this surface.
    pub fn create_backend(&self, config: WgpuBackendConfig) -> WgpuBackend {
        WgpuBackend::for_gpu(self, config)
    }

    /// Reconfigures the surface after a resize.
    ///
    /// A zero size only updates the reported size; the surface is configured
    /// again once the size becomes non-zero.
    pub fn resize(&mut self, new_size: SurfaceSize) {
        self.size = new_size;
        if surface::apply_size(&mut self.config, new_size) {
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Acquires the next surface texture and creates an encoder.
    pub fn begin_frame(&self) -> std::result::Result<GpuFrame, SurfaceError> {
        let surface_texture = self.surface.get_current_texture()?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let size = SurfaceSize::new(
            surface_texture.texture.width(),
            surface_texture.texture.height(),
        );

        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mascot frame encoder"),
            });

        Ok(GpuFrame {
            surface_texture,
            target: PassTarget { view, size },
            encoder,
        })
    }

    /// Submits the frame's commands and presents it.
    pub fn submit(&self, frame: GpuFrame) {
        let GpuFrame {
            surface_texture,
            target,
            encoder,
        } = frame;
        self.queue.submit(std::iter::once(encoder.finish()));
        drop(target);
        surface_texture.present();
    }

    /// Converts a `SurfaceError` into a higher-level action, reconfiguring
    /// the surface where that recovers it.
    pub fn handle_surface_error(&mut self, err: SurfaceError) -> SurfaceErrorAction {
        let action = surface::error_action(&err);
        log::warn!("surface error: {err:?} -> {action:?}");
        if action == SurfaceErrorAction::Reconfigured && !self.size.is_empty() {
            self.surface.configure(&self.device, &self.config);
        }
        action
    }
}

impl RenderView for Gpu<'_> {
    fn drawable_size(&self) -> SurfaceSize {
        self.size
    }
}
