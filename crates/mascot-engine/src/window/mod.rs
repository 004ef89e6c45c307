//! Window + runtime loop.
//!
//! Owns the `winit` event loop and windows, and binds each window to a
//! [`Gpu`](crate::device::Gpu).

mod runtime;

pub use runtime::{Runtime, RuntimeConfig, RuntimeCtx};
