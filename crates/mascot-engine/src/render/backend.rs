//! GPU backend seam.
//!
//! The renderer never touches API objects directly: it allocates through a
//! [`RenderBackend`], keeps the returned handles on its drawables and hands a
//! finished [`FrameCommands`] list back to the backend for encoding.

use thiserror::Error;

use crate::coords::SurfaceSize;
use crate::model::{BlendMode, TextureImage};

use super::FrameCommands;

slotmap::new_key_type! {
    /// Handle to a backend-owned buffer.
    pub struct BufferHandle;

    /// Handle to a backend-owned texture (atlas page or mask target).
    pub struct TextureHandle;
}

/// A buffer handle together with the byte length it was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuBuffer {
    pub handle: BufferHandle,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Vertex attribute data, rewritten when the model deforms.
    Vertex,
    /// `u16` triangle indices, written once.
    Index,
    /// Small per-drawable uniform block.
    Uniform,
}

/// Pipeline variants the renderer asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PipelineKind {
    /// Main-pass pipeline. `masked` pipelines sample a mask target.
    Draw {
        blend_mode: BlendMode,
        culling: bool,
        masked: bool,
    },
    /// Writes mask coverage into a mask target.
    Mask { culling: bool },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("failed to allocate {what}: {reason}")]
    Allocation { what: String, reason: String },

    #[error("unknown buffer {0:?}")]
    InvalidBuffer(BufferHandle),

    #[error("unknown texture {0:?}")]
    InvalidTexture(TextureHandle),

    #[error("write of {len} bytes overflows {handle:?} ({size} bytes)")]
    WriteOutOfBounds {
        handle: BufferHandle,
        len: u64,
        size: u64,
    },

    #[error("pipeline {0:?} was not prepared")]
    MissingPipeline(PipelineKind),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Resource arena plus command encoder for one render surface.
///
/// `CommandBuffer` and `PassDescriptor` are whatever the backend records into
/// and renders onto for a frame; both are supplied by the caller.
pub trait RenderBackend {
    type CommandBuffer;
    type PassDescriptor;

    fn create_buffer(
        &mut self,
        label: &str,
        usage: BufferUsage,
        contents: &[u8],
    ) -> BackendResult<GpuBuffer>;

    /// Overwrites the start of `buffer` with `data`.
    fn write_buffer(&mut self, buffer: GpuBuffer, data: &[u8]) -> BackendResult<()>;

    fn release_buffer(&mut self, buffer: GpuBuffer);

    fn create_texture(&mut self, label: &str, image: &TextureImage) -> BackendResult<TextureHandle>;

    /// Render target that mask coverage is composited into.
    fn create_mask_target(&mut self, label: &str, size: SurfaceSize) -> BackendResult<TextureHandle>;

    fn release_texture(&mut self, texture: TextureHandle);

    /// Builds (or confirms) the pipeline for `kind`. Idempotent.
    fn prepare_pipeline(&mut self, kind: PipelineKind) -> BackendResult<()>;

    /// Encodes every pass of `frame` into `command_buffer`, rendering the main
    /// pass onto `pass`.
    fn encode(
        &mut self,
        frame: &FrameCommands,
        command_buffer: &mut Self::CommandBuffer,
        pass: &Self::PassDescriptor,
    ) -> BackendResult<()>;
}
