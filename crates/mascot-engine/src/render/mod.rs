//! Rendering subsystem.
//!
//! [`Renderer`] owns a model, mirrors its drawables, and each frame records a
//! [`FrameCommands`] list (mask pre-passes, then the main pass) that a
//! [`RenderBackend`] encodes. Two backends are provided:
//! - [`WgpuBackend`] for real surfaces
//! - [`HeadlessBackend`], which records a [`TraceEvent`] list instead of GPU
//!   work

mod backend;
mod commands;
mod config;
mod delegate;
mod error;
pub mod headless;
mod renderer;
mod view;
pub mod wgpu_backend;

pub use backend::{
    BackendError, BackendResult, BufferHandle, BufferUsage, GpuBuffer, PipelineKind,
    RenderBackend, TextureHandle,
};
pub use commands::{DrawCall, FrameCommands, MaskPass};
pub use config::RendererConfig;
pub use delegate::RenderDelegate;
pub use error::RenderError;
pub use headless::{HeadlessBackend, TraceEvent};
pub use renderer::Renderer;
pub use view::RenderView;
pub use wgpu_backend::{PassTarget, WgpuBackend, WgpuBackendConfig};
