//! Coordinate and geometry types shared by the renderer and the device layer.
//!
//! Model space is normalized device coordinates: the model is authored in
//! `[-1, 1]` with +Y up. The model transform and the aspect projection are
//! applied in the vertex shader.

mod size;
mod transform;
mod viewport;

pub use size::SurfaceSize;
pub use transform::{aspect_projection, ModelTransform};
pub use viewport::Viewport;
