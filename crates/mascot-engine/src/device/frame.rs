use crate::render::PassTarget;

/// One acquired surface texture, ready to record into.
///
/// Short-lived: holding the surface texture blocks acquisition of the next
/// one. Hand it back through [`Gpu::submit`](super::Gpu::submit).
pub struct GpuFrame {
    pub surface_texture: wgpu::SurfaceTexture,
    /// View of `surface_texture` and its size; what the main pass draws onto.
    pub target: PassTarget,
    pub encoder: wgpu::CommandEncoder,
}
