//! Model contract consumed by the renderer.
//!
//! A model is a set of drawables (mesh parts) plus the texture atlas pages
//! they sample. Static attributes are exposed through [`DrawableDesc`];
//! everything that moves (vertices, opacity, visibility, render order) is
//! read back after each [`Model::update`].
//!
//! [`MeshModel`] is a self-contained implementation driven by simple
//! procedural [`Motion`]s.

mod error;
mod mesh;
mod motion;
mod texture;

use glam::Vec2;

pub use error::ModelError;
pub use mesh::{MeshGeometry, MeshModel, MeshModelBuilder, MeshPart};
pub use motion::{Motion, Pose};
pub use texture::TextureImage;

/// Compositing function used when a drawable is blended onto the target.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlendMode {
    /// Premultiplied source-over.
    #[default]
    Normal,
    /// Source color added to the destination.
    Additive,
    /// Destination color multiplied by the source.
    Multiplicative,
}

impl BlendMode {
    pub const ALL: [BlendMode; 3] = [BlendMode::Normal, BlendMode::Additive, BlendMode::Multiplicative];
}

bitflags::bitflags! {
    /// Which dynamic attributes of a drawable changed during the last update.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DynamicFlags: u8 {
        const VISIBILITY_CHANGED       = 1 << 0;
        const OPACITY_CHANGED          = 1 << 1;
        const RENDER_ORDER_CHANGED     = 1 << 2;
        const VERTEX_POSITIONS_CHANGED = 1 << 3;
    }
}

/// Static attributes of one drawable.
///
/// `mask_count` is carried separately from `masks` the way model files store
/// them (a count array plus a flattened index array); the renderer checks the
/// two agree before building a drawable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawableDesc {
    pub id: String,
    pub vertex_count: usize,
    pub index_count: usize,
    pub texture_index: usize,
    pub mask_count: usize,
    pub masks: Vec<usize>,
    pub blend_mode: BlendMode,
    pub culling: bool,
}

/// A character model as seen by the renderer.
///
/// Indices passed to the per-drawable accessors are always in
/// `0..drawable_count()`; implementations may panic otherwise.
pub trait Model {
    fn drawable_count(&self) -> usize;

    fn drawable_desc(&self, index: usize) -> &DrawableDesc;

    /// Texture atlas pages, addressed by `DrawableDesc::texture_index`.
    fn textures(&self) -> &[TextureImage];

    /// Advances animation by `elapsed` seconds and refreshes dynamic state.
    fn update(&mut self, elapsed: f64);

    /// Deformed vertex positions in model space (NDC).
    fn vertex_positions(&self, index: usize) -> &[Vec2];

    fn vertex_uvs(&self, index: usize) -> &[Vec2];

    fn vertex_indices(&self, index: usize) -> &[u16];

    fn opacity(&self, index: usize) -> f32;

    fn is_visible(&self, index: usize) -> bool;

    /// Drawables are painted in ascending render order.
    fn render_order(&self, index: usize) -> i32;

    fn dynamic_flags(&self, index: usize) -> DynamicFlags;
}
