use super::SurfaceSize;

/// Viewport rectangle in physical pixels, plus the depth range.
///
/// Mirrors the viewport a render pass is encoded with: the rectangle of the
/// target that NDC `[-1, 1]` maps onto.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Viewport covering the whole surface.
    #[inline]
    pub fn full(size: SurfaceSize) -> Self {
        Self::new(0.0, 0.0, size.width as f32, size.height as f32)
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.width > 0.0
            && self.height > 0.0
            && self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && (0.0..=1.0).contains(&self.min_depth)
            && (0.0..=1.0).contains(&self.max_depth)
            && self.min_depth <= self.max_depth
    }

    /// Clamps the rectangle to `size` so it can be set on a pass targeting it.
    ///
    /// Returns `None` when nothing of the viewport lies inside the target.
    pub fn clamped_to(self, size: SurfaceSize) -> Option<Self> {
        let tw = size.width as f32;
        let th = size.height as f32;

        let x0 = self.x.max(0.0);
        let y0 = self.y.max(0.0);
        let x1 = (self.x + self.width).min(tw);
        let y1 = (self.y + self.height).min(th);

        let v = Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
            ..self
        };
        v.is_valid().then_some(v)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_viewport_matches_surface() {
        let v = Viewport::full(SurfaceSize::new(800, 600));
        assert_eq!(v, Viewport::new(0.0, 0.0, 800.0, 600.0));
        assert!(v.is_valid());
    }

    #[test]
    fn zero_area_is_invalid() {
        assert!(!Viewport::new(0.0, 0.0, 0.0, 10.0).is_valid());
        assert!(!Viewport::default().is_valid());
    }

    #[test]
    fn clamp_trims_overhang() {
        let v = Viewport::new(-10.0, 20.0, 100.0, 100.0)
            .clamped_to(SurfaceSize::new(50, 60))
            .unwrap();
        assert_eq!((v.x, v.y, v.width, v.height), (0.0, 20.0, 50.0, 40.0));
    }

    #[test]
    fn clamp_outside_target_returns_none() {
        let v = Viewport::new(200.0, 0.0, 10.0, 10.0);
        assert!(v.clamped_to(SurfaceSize::new(100, 100)).is_none());
    }
}
