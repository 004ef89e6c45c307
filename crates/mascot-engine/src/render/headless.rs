//! GPU-less backend.
//!
//! Keeps buffer contents in memory and turns each encoded frame into a flat
//! list of [`TraceEvent`]s, so frame structure can be checked without an
//! adapter.

use std::collections::HashSet;

use glam::{Mat4, Vec2};
use slotmap::SlotMap;

use crate::coords::{SurfaceSize, Viewport};
use crate::model::{BlendMode, TextureImage};

use super::{
    BackendError, BackendResult, BufferHandle, BufferUsage, DrawCall, FrameCommands, GpuBuffer,
    PipelineKind, RenderBackend, TextureHandle,
};

/// One step of an encoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    /// Mask target of drawable `target` is cleared and bound.
    BeginMaskPass { target: usize },
    /// Drawable `drawable` drawn into the mask target of `target`.
    DrawMask {
        target: usize,
        drawable: usize,
        index_count: u32,
    },
    /// Main pass begins.
    BeginMainPass {
        transform: Mat4,
        viewport: Viewport,
        clear_color: [f64; 4],
    },
    /// Drawable drawn in the main pass. `positions` is a snapshot of its
    /// position buffer at encode time.
    Draw {
        drawable: usize,
        index_count: u32,
        blend_mode: BlendMode,
        mask: Option<TextureHandle>,
        positions: Vec<Vec2>,
    },
}

#[derive(Debug)]
struct HeadlessBuffer {
    label: String,
    usage: BufferUsage,
    data: Vec<u8>,
}

#[derive(Debug)]
struct HeadlessTexture {
    label: String,
    size: SurfaceSize,
    mask_target: bool,
}

/// In-memory [`RenderBackend`]. Command buffers are `Vec<TraceEvent>`.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    buffers: SlotMap<BufferHandle, HeadlessBuffer>,
    textures: SlotMap<TextureHandle, HeadlessTexture>,
    pipelines: HashSet<PipelineKind>,

    /// Allocations left before `create_*` starts failing.
    allocation_limit: Option<usize>,
    frames_encoded: u64,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose buffer and texture creation fails after `limit`
    /// successful allocations.
    pub fn with_allocation_limit(limit: usize) -> Self {
        Self {
            allocation_limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_mask_targets(&self) -> usize {
        self.textures.values().filter(|t| t.mask_target).count()
    }

    /// Slots the texture arena holds without growing. Released slots are
    /// reused, so this tracks the peak number of live textures.
    pub fn texture_capacity(&self) -> usize {
        self.textures.capacity()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffers.capacity()
    }

    pub fn texture_size(&self, texture: TextureHandle) -> Option<SurfaceSize> {
        self.textures.get(texture).map(|t| t.size)
    }

    /// Size of a live mask target.
    pub fn mask_target_size(&self, texture: TextureHandle) -> Option<SurfaceSize> {
        self.textures
            .get(texture)
            .filter(|t| t.mask_target)
            .map(|t| t.size)
    }

    pub fn buffer_data(&self, buffer: GpuBuffer) -> Option<&[u8]> {
        self.buffers.get(buffer.handle).map(|b| b.data.as_slice())
    }

    pub fn buffer_label(&self, buffer: GpuBuffer) -> Option<&str> {
        self.buffers.get(buffer.handle).map(|b| b.label.as_str())
    }

    /// Contents of a vertex buffer read back as positions.
    pub fn positions(&self, buffer: GpuBuffer) -> Option<Vec<Vec2>> {
        let data = self.buffer_data(buffer)?;
        Some(bytemuck::pod_collect_to_vec(data))
    }

    pub fn has_pipeline(&self, kind: PipelineKind) -> bool {
        self.pipelines.contains(&kind)
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    fn take_allocation(&mut self, what: &str) -> BackendResult<()> {
        match &mut self.allocation_limit {
            Some(0) => Err(BackendError::Allocation {
                what: what.to_string(),
                reason: "allocation limit reached".to_string(),
            }),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn buffer(&self, buffer: GpuBuffer) -> BackendResult<&HeadlessBuffer> {
        self.buffers
            .get(buffer.handle)
            .ok_or(BackendError::InvalidBuffer(buffer.handle))
    }

    fn check_texture(&self, texture: TextureHandle) -> BackendResult<()> {
        if self.textures.contains_key(texture) {
            Ok(())
        } else {
            Err(BackendError::InvalidTexture(texture))
        }
    }

    fn check_pipeline(&self, kind: PipelineKind) -> BackendResult<()> {
        if self.pipelines.contains(&kind) {
            Ok(())
        } else {
            Err(BackendError::MissingPipeline(kind))
        }
    }

    fn check_call(&self, call: &DrawCall) -> BackendResult<()> {
        for b in call.buffers.iter() {
            self.buffer(b)?;
        }
        self.check_texture(call.texture)?;
        if let Some(mask) = call.mask {
            self.check_texture(mask)?;
        }
        if let Some(ib) = call.buffers.indices {
            let usage = self.buffer(ib)?.usage;
            debug_assert_eq!(usage, BufferUsage::Index);
        }
        Ok(())
    }
}

impl RenderBackend for HeadlessBackend {
    type CommandBuffer = Vec<TraceEvent>;
    type PassDescriptor = ();

    fn create_buffer(
        &mut self,
        label: &str,
        usage: BufferUsage,
        contents: &[u8],
    ) -> BackendResult<GpuBuffer> {
        self.take_allocation(label)?;
        let handle = self.buffers.insert(HeadlessBuffer {
            label: label.to_string(),
            usage,
            data: contents.to_vec(),
        });
        Ok(GpuBuffer {
            handle,
            size: contents.len() as u64,
        })
    }

    fn write_buffer(&mut self, buffer: GpuBuffer, data: &[u8]) -> BackendResult<()> {
        let slot = self
            .buffers
            .get_mut(buffer.handle)
            .ok_or(BackendError::InvalidBuffer(buffer.handle))?;

        if data.len() > slot.data.len() {
            return Err(BackendError::WriteOutOfBounds {
                handle: buffer.handle,
                len: data.len() as u64,
                size: slot.data.len() as u64,
            });
        }
        slot.data[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn release_buffer(&mut self, buffer: GpuBuffer) {
        self.buffers.remove(buffer.handle);
    }

    fn create_texture(&mut self, label: &str, image: &TextureImage) -> BackendResult<TextureHandle> {
        self.take_allocation(label)?;
        Ok(self.textures.insert(HeadlessTexture {
            label: label.to_string(),
            size: SurfaceSize::new(image.width(), image.height()),
            mask_target: false,
        }))
    }

    fn create_mask_target(&mut self, label: &str, size: SurfaceSize) -> BackendResult<TextureHandle> {
        if size.is_empty() {
            return Err(BackendError::Allocation {
                what: label.to_string(),
                reason: "zero-sized mask target".to_string(),
            });
        }
        self.take_allocation(label)?;
        Ok(self.textures.insert(HeadlessTexture {
            label: label.to_string(),
            size,
            mask_target: true,
        }))
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if let Some(t) = self.textures.remove(texture) {
            log::trace!("released texture {}", t.label);
        }
    }

    fn prepare_pipeline(&mut self, kind: PipelineKind) -> BackendResult<()> {
        self.pipelines.insert(kind);
        Ok(())
    }

    fn encode(
        &mut self,
        frame: &FrameCommands,
        command_buffer: &mut Vec<TraceEvent>,
        _pass: &(),
    ) -> BackendResult<()> {
        for pass in &frame.mask_passes {
            self.check_texture(pass.texture)?;
            command_buffer.push(TraceEvent::BeginMaskPass {
                target: pass.target,
            });
            for call in &pass.draws {
                self.check_call(call)?;
                self.check_pipeline(call.mask_pipeline())?;
                command_buffer.push(TraceEvent::DrawMask {
                    target: pass.target,
                    drawable: call.drawable,
                    index_count: call.index_count,
                });
            }
        }

        command_buffer.push(TraceEvent::BeginMainPass {
            transform: frame.transform,
            viewport: frame.viewport,
            clear_color: frame.clear_color,
        });
        for call in &frame.draws {
            self.check_call(call)?;
            self.check_pipeline(call.pipeline())?;
            let positions = self
                .positions(call.buffers.positions)
                .ok_or(BackendError::InvalidBuffer(call.buffers.positions.handle))?;
            command_buffer.push(TraceEvent::Draw {
                drawable: call.drawable,
                index_count: call.index_count,
                blend_mode: call.blend_mode,
                mask: call.mask,
                positions,
            });
        }

        self.frames_encoded += 1;
        Ok(())
    }
}
