use crate::coords::SurfaceSize;

/// Surface a renderer draws onto.
pub trait RenderView {
    /// Current drawable size in physical pixels.
    fn drawable_size(&self) -> SurfaceSize;
}

impl RenderView for SurfaceSize {
    fn drawable_size(&self) -> SurfaceSize {
        *self
    }
}
