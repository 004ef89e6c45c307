use glam::{Mat4, Vec2, Vec3};

use super::SurfaceSize;

/// Placement of the model in NDC.
///
/// `origin` and `scale` are the two convenience inputs; `matrix` is what the
/// shader consumes. Writing either input rebuilds the matrix as
/// `T(origin) * S(scale)` and drops any matrix set by hand.
///
/// A hand-set matrix is kept until the next `set_origin`/`set_scale`. Those
/// inputs are not decomposed back out of it, so after `set_matrix` the values
/// reported by `origin()`/`scale()` are the last ones written, not the ones
/// the matrix encodes.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ModelTransform {
    origin: Vec2,
    scale: f32,
    matrix: Mat4,
    overridden: bool,
}

impl ModelTransform {
    pub fn new(origin: Vec2, scale: f32) -> Self {
        Self {
            origin,
            scale,
            matrix: compose(origin, scale),
            overridden: false,
        }
    }

    #[inline]
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    #[inline]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    #[inline]
    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    /// `true` while a matrix written through `set_matrix` is in effect.
    #[inline]
    pub fn is_overridden(&self) -> bool {
        self.overridden
    }

    pub fn set_origin(&mut self, origin: Vec2) {
        self.origin = origin;
        self.recompute();
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
        self.recompute();
    }

    pub fn set_matrix(&mut self, matrix: Mat4) {
        self.matrix = matrix;
        self.overridden = true;
    }

    fn recompute(&mut self) {
        self.matrix = compose(self.origin, self.scale);
        self.overridden = false;
    }
}

impl Default for ModelTransform {
    fn default() -> Self {
        Self::new(Vec2::ZERO, 1.0)
    }
}

fn compose(origin: Vec2, scale: f32) -> Mat4 {
    Mat4::from_translation(origin.extend(0.0)) * Mat4::from_scale(Vec3::new(scale, scale, 1.0))
}

/// Scale that keeps model space square on a non-square surface.
///
/// The longer axis is shrunk by the aspect ratio. An empty surface yields
/// identity.
pub fn aspect_projection(size: SurfaceSize) -> Mat4 {
    match size.aspect() {
        Some(aspect) if aspect > 1.0 => Mat4::from_scale(Vec3::new(1.0 / aspect, 1.0, 1.0)),
        Some(aspect) if aspect < 1.0 => Mat4::from_scale(Vec3::new(1.0, aspect, 1.0)),
        _ => Mat4::IDENTITY,
    }
}
