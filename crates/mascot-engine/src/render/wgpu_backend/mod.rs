//! [`RenderBackend`] on top of `wgpu`.
//!
//! Every drawable gets its own position, UV, index and opacity buffers. Each
//! frame binds one shared uniform (the model-view-projection matrix) at group
//! 0 and a per-drawable group 1 (opacity, texture, sampler and, for masked
//! drawables, the mask target).

mod pipeline;

use std::collections::HashMap;

use slotmap::SlotMap;
use wgpu::util::DeviceExt;

use crate::coords::{SurfaceSize, Viewport};
use crate::device::Gpu;
use crate::model::TextureImage;

use super::{
    BackendError, BackendResult, BufferHandle, BufferUsage, DrawCall, FrameCommands, GpuBuffer,
    PipelineKind, RenderBackend, TextureHandle,
};
use pipeline::{create_pipeline, FrameUniform, Layouts, TargetFormats};

/// Backend settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WgpuBackendConfig {
    /// Filter used when sampling model textures.
    pub filter: wgpu::FilterMode,
    /// Format of per-drawable mask targets.
    pub mask_format: wgpu::TextureFormat,
}

impl Default for WgpuBackendConfig {
    fn default() -> Self {
        Self {
            filter: wgpu::FilterMode::Linear,
            mask_format: wgpu::TextureFormat::Rgba8Unorm,
        }
    }
}

/// Where the main pass of a frame renders to.
#[derive(Debug, Clone)]
pub struct PassTarget {
    pub view: wgpu::TextureView,
    pub size: SurfaceSize,
}

struct BufferSlot {
    buffer: wgpu::Buffer,
    size: u64,
}

struct TextureSlot {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: SurfaceSize,
}

/// Per-drawable bind group identity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct BindKey {
    opacity: BufferHandle,
    texture: TextureHandle,
    mask: Option<TextureHandle>,
}

impl BindKey {
    fn of(call: &DrawCall, mask: Option<TextureHandle>) -> Self {
        Self {
            opacity: call.buffers.opacity.handle,
            texture: call.texture,
            mask,
        }
    }

    fn uses_buffer(&self, buffer: BufferHandle) -> bool {
        self.opacity == buffer
    }

    fn uses_texture(&self, texture: TextureHandle) -> bool {
        self.texture == texture || self.mask == Some(texture)
    }
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: WgpuBackendConfig,
    formats: TargetFormats,

    shader: wgpu::ShaderModule,
    layouts: Layouts,
    sampler: wgpu::Sampler,
    frame_ubo: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,

    buffers: SlotMap<BufferHandle, BufferSlot>,
    textures: SlotMap<TextureHandle, TextureSlot>,
    pipelines: HashMap<PipelineKind, wgpu::RenderPipeline>,
    bind_groups: HashMap<BindKey, wgpu::BindGroup>,
}

impl WgpuBackend {
    /// Creates a backend drawing into targets of `target_format`.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        target_format: wgpu::TextureFormat,
        config: WgpuBackendConfig,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mascot drawable shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/drawable.wgsl").into()),
        });

        let layouts = Layouts::new(&device);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("mascot texture sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: config.filter,
            min_filter: config.filter,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let frame_ubo = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("mascot frame ubo"),
            size: FrameUniform::SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mascot frame bind group"),
            layout: &layouts.frame,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_ubo.as_entire_binding(),
            }],
        });

        Self {
            device,
            queue,
            config,
            formats: TargetFormats {
                color: target_format,
                mask: config.mask_format,
            },
            shader,
            layouts,
            sampler,
            frame_ubo,
            frame_bind_group,
            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            pipelines: HashMap::new(),
            bind_groups: HashMap::new(),
        }
    }

    /// Backend for the surface owned by `gpu`.
    pub fn for_gpu(gpu: &Gpu<'_>, config: WgpuBackendConfig) -> Self {
        Self::new(
            gpu.device().clone(),
            gpu.queue().clone(),
            gpu.surface_format(),
            config,
        )
    }

    pub fn config(&self) -> &WgpuBackendConfig {
        &self.config
    }

    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.formats.color
    }

    fn buffer(&self, handle: BufferHandle) -> BackendResult<&wgpu::Buffer> {
        self.buffers
            .get(handle)
            .map(|slot| &slot.buffer)
            .ok_or(BackendError::InvalidBuffer(handle))
    }

    fn texture(&self, texture: TextureHandle) -> BackendResult<&TextureSlot> {
        self.textures
            .get(texture)
            .ok_or(BackendError::InvalidTexture(texture))
    }

    fn pipeline(&self, kind: PipelineKind) -> BackendResult<&wgpu::RenderPipeline> {
        self.pipelines
            .get(&kind)
            .ok_or(BackendError::MissingPipeline(kind))
    }

    fn check_texture_size(&self, what: &str, width: u32, height: u32) -> BackendResult<()> {
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(BackendError::Allocation {
                what: what.to_string(),
                reason: format!("{width}x{height} outside 1..={max}"),
            });
        }
        Ok(())
    }

    fn push_texture(&mut self, texture: wgpu::Texture, size: SurfaceSize) -> TextureHandle {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.textures.insert(TextureSlot {
            texture,
            view,
            size,
        })
    }

    fn ensure_bind_group(&mut self, key: BindKey) -> BackendResult<()> {
        if self.bind_groups.contains_key(&key) {
            return Ok(());
        }

        let opacity = self.buffer(key.opacity)?;
        let color = &self.texture(key.texture)?.view;

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: opacity.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(color),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        let layout = match key.mask {
            Some(mask) => {
                entries.push(wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&self.texture(mask)?.view),
                });
                &self.layouts.masked
            }
            None => &self.layouts.drawable,
        };

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mascot drawable bind group"),
            layout,
            entries: &entries,
        });
        self.bind_groups.insert(key, bind_group);
        Ok(())
    }

    fn draw(
        &self,
        rpass: &mut wgpu::RenderPass<'_>,
        call: &DrawCall,
        pipeline: PipelineKind,
        key: BindKey,
    ) -> BackendResult<()> {
        let bind_group = self
            .bind_groups
            .get(&key)
            .ok_or(BackendError::InvalidBuffer(key.opacity))?;
        let Some(indices) = call.buffers.indices else {
            return Ok(());
        };

        rpass.set_pipeline(self.pipeline(pipeline)?);
        rpass.set_bind_group(1, bind_group, &[]);
        rpass.set_vertex_buffer(0, self.buffer(call.buffers.positions.handle)?.slice(..));
        rpass.set_vertex_buffer(1, self.buffer(call.buffers.uvs.handle)?.slice(..));
        rpass.set_index_buffer(self.buffer(indices.handle)?.slice(..), wgpu::IndexFormat::Uint16);
        rpass.draw_indexed(0..call.index_count, 0, 0..1);
        Ok(())
    }

    fn begin_pass<'e>(
        encoder: &'e mut wgpu::CommandEncoder,
        label: &str,
        view: &wgpu::TextureView,
        clear: wgpu::Color,
    ) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        })
    }
}

fn set_viewport(rpass: &mut wgpu::RenderPass<'_>, viewport: Viewport, target: SurfaceSize) -> bool {
    match viewport.clamped_to(target) {
        Some(v) => {
            rpass.set_viewport(v.x, v.y, v.width, v.height, v.min_depth, v.max_depth);
            true
        }
        None => false,
    }
}

impl RenderBackend for WgpuBackend {
    type CommandBuffer = wgpu::CommandEncoder;
    type PassDescriptor = PassTarget;

    fn create_buffer(
        &mut self,
        label: &str,
        usage: BufferUsage,
        contents: &[u8],
    ) -> BackendResult<GpuBuffer> {
        let size = contents.len() as u64;
        let max = self.device.limits().max_buffer_size;
        if size == 0 || size > max {
            return Err(BackendError::Allocation {
                what: label.to_string(),
                reason: format!("{size} bytes outside 1..={max}"),
            });
        }

        let usage = match usage {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
            BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        };
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage,
        });

        let handle = self.buffers.insert(BufferSlot { buffer, size });
        Ok(GpuBuffer { handle, size })
    }

    fn write_buffer(&mut self, buffer: GpuBuffer, data: &[u8]) -> BackendResult<()> {
        let slot = self
            .buffers
            .get(buffer.handle)
            .ok_or(BackendError::InvalidBuffer(buffer.handle))?;

        let len = data.len() as u64;
        if len > slot.size {
            return Err(BackendError::WriteOutOfBounds {
                handle: buffer.handle,
                len,
                size: slot.size,
            });
        }
        self.queue.write_buffer(&slot.buffer, 0, data);
        Ok(())
    }

    fn release_buffer(&mut self, buffer: GpuBuffer) {
        if let Some(slot) = self.buffers.remove(buffer.handle) {
            slot.buffer.destroy();
        }
        self.bind_groups.retain(|k, _| !k.uses_buffer(buffer.handle));
    }

    fn create_texture(&mut self, label: &str, image: &TextureImage) -> BackendResult<TextureHandle> {
        self.check_texture_size(label, image.width(), image.height())?;

        let extent = wgpu::Extent3d {
            width: image.width(),
            height: image.height(),
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.pixels(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(image.bytes_per_row()),
                rows_per_image: Some(image.height()),
            },
            extent,
        );

        Ok(self.push_texture(texture, SurfaceSize::new(image.width(), image.height())))
    }

    fn create_mask_target(&mut self, label: &str, size: SurfaceSize) -> BackendResult<TextureHandle> {
        self.check_texture_size(label, size.width, size.height)?;

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.formats.mask,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        Ok(self.push_texture(texture, size))
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if let Some(slot) = self.textures.remove(texture) {
            slot.texture.destroy();
        }
        self.bind_groups.retain(|k, _| !k.uses_texture(texture));
    }

    fn prepare_pipeline(&mut self, kind: PipelineKind) -> BackendResult<()> {
        if !self.pipelines.contains_key(&kind) {
            let pipeline =
                create_pipeline(&self.device, &self.shader, &self.layouts, self.formats, kind);
            self.pipelines.insert(kind, pipeline);
        }
        Ok(())
    }

    fn encode(
        &mut self,
        frame: &FrameCommands,
        encoder: &mut wgpu::CommandEncoder,
        pass: &PassTarget,
    ) -> BackendResult<()> {
        // Mutating work first; encoding below only borrows.
        for mask_pass in &frame.mask_passes {
            for call in &mask_pass.draws {
                self.ensure_bind_group(BindKey::of(call, None))?;
            }
        }
        for call in &frame.draws {
            self.ensure_bind_group(BindKey::of(call, call.mask))?;
        }

        let uniform = FrameUniform {
            mvp: frame.transform.to_cols_array_2d(),
        };
        self.queue
            .write_buffer(&self.frame_ubo, 0, bytemuck::bytes_of(&uniform));

        for mask_pass in &frame.mask_passes {
            let target = self.texture(mask_pass.texture)?;
            let mut rpass = Self::begin_pass(
                encoder,
                "mascot mask pass",
                &target.view,
                wgpu::Color::TRANSPARENT,
            );
            if !set_viewport(&mut rpass, frame.viewport, target.size) {
                continue;
            }
            rpass.set_bind_group(0, &self.frame_bind_group, &[]);
            for call in &mask_pass.draws {
                self.draw(&mut rpass, call, call.mask_pipeline(), BindKey::of(call, None))?;
            }
        }

        let [r, g, b, a] = frame.clear_color;
        let mut rpass = Self::begin_pass(
            encoder,
            "mascot main pass",
            &pass.view,
            wgpu::Color { r, g, b, a },
        );
        if !set_viewport(&mut rpass, frame.viewport, pass.size) {
            log::trace!("viewport {:?} outside target; clear only", frame.viewport);
            return Ok(());
        }
        rpass.set_bind_group(0, &self.frame_bind_group, &[]);
        for call in &frame.draws {
            self.draw(&mut rpass, call, call.pipeline(), BindKey::of(call, call.mask))?;
        }
        Ok(())
    }
}
