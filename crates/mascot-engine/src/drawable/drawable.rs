use bytemuck::{Pod, Zeroable};

use crate::model::{BlendMode, DrawableDesc};
use crate::render::{GpuBuffer, TextureHandle};

use super::{BufferKind, DrawableError};

/// Bytes per vertex in the position and UV buffers (`vec2<f32>`).
pub const VERTEX_STRIDE: u64 = 8;

/// Bytes per index (`u16`).
pub const INDEX_STRIDE: u64 = 2;

/// Contents of a drawable's opacity buffer.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, PartialEq)]
pub struct OpacityUniform {
    pub opacity: f32,
    pub _pad: [f32; 3], // 16-byte alignment
}

impl OpacityUniform {
    pub const SIZE: u64 = std::mem::size_of::<OpacityUniform>() as u64;

    #[inline]
    pub fn new(opacity: f32) -> Self {
        Self {
            opacity,
            _pad: [0.0; 3],
        }
    }
}

/// Handles of the GPU buffers backing one drawable.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DrawableBuffers {
    pub positions: GpuBuffer,
    pub uvs: GpuBuffer,
    pub indices: Option<GpuBuffer>,
    pub opacity: GpuBuffer,
}

impl DrawableBuffers {
    /// All handles, in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = GpuBuffer> + '_ {
        [Some(self.positions), Some(self.uvs), self.indices, Some(self.opacity)]
            .into_iter()
            .flatten()
    }
}

/// Render state of one mesh part.
#[derive(Debug, Clone, PartialEq)]
pub struct Drawable {
    index: usize,
    vertex_count: usize,
    index_count: u32,
    texture_index: usize,

    mask_count: usize,
    masks: Vec<usize>,

    /// Back-face culling.
    pub culling: bool,
    pub blend_mode: BlendMode,

    buffers: Option<DrawableBuffers>,
    mask_texture: Option<TextureHandle>,

    opacity: f32,
    pub visible: bool,
    pub render_order: i32,
}

impl Drawable {
    /// Creates an unmasked, visible, opaque drawable with no buffers.
    pub fn new(index: usize, vertex_count: usize, index_count: u32, texture_index: usize) -> Self {
        Self {
            index,
            vertex_count,
            index_count,
            texture_index,
            mask_count: 0,
            masks: Vec::new(),
            culling: false,
            blend_mode: BlendMode::Normal,
            buffers: None,
            mask_texture: None,
            opacity: 1.0,
            visible: true,
            render_order: index as i32,
        }
    }

    /// Builds drawable `index` of a model with `drawable_count` drawables and
    /// `texture_count` textures, checking mask and texture references.
    pub fn from_desc(
        index: usize,
        desc: &DrawableDesc,
        drawable_count: usize,
        texture_count: usize,
    ) -> Result<Self, DrawableError> {
        if desc.vertex_count > 0 && desc.texture_index >= texture_count {
            return Err(DrawableError::TextureOutOfRange {
                drawable: index,
                texture_index: desc.texture_index,
                texture_count,
            });
        }

        // Draw calls take a u32 index count.
        let index_count =
            u32::try_from(desc.index_count).map_err(|_| DrawableError::IndexCountOverflow {
                drawable: index,
                index_count: desc.index_count,
            })?;

        let mut d = Self::new(index, desc.vertex_count, index_count, desc.texture_index);
        d.culling = desc.culling;
        d.blend_mode = desc.blend_mode;
        d.set_masks(desc.mask_count, desc.masks.clone(), drawable_count)?;
        Ok(d)
    }

    /// Replaces the mask list. `masks` must hold exactly `mask_count` indices
    /// of other drawables in `0..drawable_count`.
    pub fn set_masks(
        &mut self,
        mask_count: usize,
        masks: Vec<usize>,
        drawable_count: usize,
    ) -> Result<(), DrawableError> {
        if masks.len() != mask_count {
            return Err(DrawableError::MaskCountMismatch {
                drawable: self.index,
                mask_count,
                masks: masks.len(),
            });
        }
        for &mask in &masks {
            if mask == self.index {
                return Err(DrawableError::SelfMask { drawable: self.index });
            }
            if mask >= drawable_count {
                return Err(DrawableError::MaskOutOfRange {
                    drawable: self.index,
                    mask,
                    drawable_count,
                });
            }
        }
        self.mask_count = mask_count;
        self.masks = masks;
        Ok(())
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    #[inline]
    pub fn texture_index(&self) -> usize {
        self.texture_index
    }

    #[inline]
    pub fn mask_count(&self) -> usize {
        self.mask_count
    }

    #[inline]
    pub fn masks(&self) -> &[usize] {
        &self.masks
    }

    #[inline]
    pub fn is_masked(&self) -> bool {
        self.mask_count > 0
    }

    #[inline]
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = if opacity.is_nan() { 0.0 } else { opacity.clamp(0.0, 1.0) };
    }

    /// `false` for empty meshes; these never take buffers or draw calls.
    #[inline]
    pub fn has_geometry(&self) -> bool {
        self.vertex_count > 0 && self.index_count > 0
    }

    /// Whether this drawable issues a draw call this frame.
    #[inline]
    pub fn should_draw(&self) -> bool {
        self.visible && self.has_geometry() && self.buffers.is_some()
    }

    #[inline]
    pub fn buffers(&self) -> Option<&DrawableBuffers> {
        self.buffers.as_ref()
    }

    /// Attaches renderer-allocated buffers after checking their sizes against
    /// the vertex and index counts.
    pub fn attach_buffers(&mut self, buffers: DrawableBuffers) -> Result<(), DrawableError> {
        if self.vertex_count == 0 {
            return Err(DrawableError::EmptyMesh { drawable: self.index });
        }

        let vertex_bytes = self.vertex_count as u64 * VERTEX_STRIDE;
        self.check_size(BufferKind::Positions, vertex_bytes, buffers.positions)?;
        self.check_size(BufferKind::Uvs, vertex_bytes, buffers.uvs)?;
        self.check_size(BufferKind::Opacity, OpacityUniform::SIZE, buffers.opacity)?;

        match (self.index_count, buffers.indices) {
            (0, Some(_)) => {
                return Err(DrawableError::UnexpectedIndexBuffer { drawable: self.index });
            }
            (0, None) => {}
            (n, None) => {
                return Err(DrawableError::MissingIndexBuffer {
                    drawable: self.index,
                    index_count: n as usize,
                });
            }
            (n, Some(ib)) => self.check_size(BufferKind::Indices, n as u64 * INDEX_STRIDE, ib)?,
        }

        self.buffers = Some(buffers);
        Ok(())
    }

    /// Hands the buffer handles back for release.
    pub fn detach_buffers(&mut self) -> Option<DrawableBuffers> {
        self.buffers.take()
    }

    #[inline]
    pub fn mask_texture(&self) -> Option<TextureHandle> {
        self.mask_texture
    }

    /// Stores the mask target; returns the previous one so it can be released.
    pub fn replace_mask_texture(&mut self, texture: Option<TextureHandle>) -> Option<TextureHandle> {
        std::mem::replace(&mut self.mask_texture, texture)
    }

    fn check_size(
        &self,
        kind: BufferKind,
        expected: u64,
        buffer: GpuBuffer,
    ) -> Result<(), DrawableError> {
        if buffer.size != expected {
            return Err(DrawableError::BufferSize {
                drawable: self.index,
                kind,
                expected,
                actual: buffer.size,
            });
        }
        Ok(())
    }
}
