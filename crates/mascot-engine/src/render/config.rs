use glam::Vec2;

/// Renderer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Main-pass clear color, straight RGBA.
    ///
    /// Defaults to transparent white so a host view's background shows
    /// through around the model.
    pub clear_color: [f64; 4],

    /// Initial model origin in NDC.
    pub origin: Vec2,

    /// Initial model scale.
    pub scale: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            clear_color: [1.0, 1.0, 1.0, 0.0],
            origin: Vec2::ZERO,
            scale: 1.0,
        }
    }
}
