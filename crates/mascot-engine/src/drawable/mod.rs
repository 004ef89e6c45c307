//! Per-mesh render state.
//!
//! A [`Drawable`] mirrors one drawable of the model: immutable identity
//! (index, counts, texture), masking dependencies, blend/culling flags and the
//! dynamic opacity/visibility copied from the model every update. GPU buffers
//! belong to the renderer's backend; the drawable only keeps their handles.

mod drawable;
mod error;

pub use drawable::{Drawable, DrawableBuffers, OpacityUniform, INDEX_STRIDE, VERTEX_STRIDE};
pub use error::{BufferKind, DrawableError};
