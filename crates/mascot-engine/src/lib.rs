//! Mascot engine crate.
//!
//! Renders 2D deformable mesh models (drawables with textures, masks and
//! blend modes) onto a window surface, plus the platform runtime around it.
//!
//! Layers, bottom-up:
//! - [`model`]: the model contract and an in-memory mesh model
//! - [`drawable`]: per-part render state referencing GPU handles
//! - [`render`]: the [`Renderer`](render::Renderer) and its backends
//! - [`device`], [`window`], [`core`], [`time`], [`logging`]: wgpu context,
//!   winit loop, app contract, frame clock, logger setup

pub mod coords;
pub mod core;
pub mod device;
pub mod drawable;
pub mod logging;
pub mod model;
pub mod render;
pub mod time;
pub mod window;
