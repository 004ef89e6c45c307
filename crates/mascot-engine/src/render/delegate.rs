use super::{RenderBackend, Renderer};

/// Observer told about every completed frame.
///
/// The renderer holds its delegate weakly; once the delegate is dropped the
/// notification is skipped. Called synchronously on the render thread right
/// after the frame is encoded.
pub trait RenderDelegate<B: RenderBackend> {
    fn render_update(&self, renderer: &Renderer<B>, duration: f64);
}
