use glam::Mat4;

use crate::coords::Viewport;
use crate::drawable::{Drawable, DrawableBuffers};
use crate::model::BlendMode;

use super::{PipelineKind, TextureHandle};

/// One draw of one drawable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    pub drawable: usize,
    pub buffers: DrawableBuffers,
    pub index_count: u32,
    pub texture: TextureHandle,
    pub blend_mode: BlendMode,
    pub culling: bool,
    /// Mask target sampled by this draw; `None` in mask passes and for
    /// unmasked drawables.
    pub mask: Option<TextureHandle>,
}

impl DrawCall {
    /// Pipeline this call uses in the main pass.
    #[inline]
    pub fn pipeline(&self) -> PipelineKind {
        PipelineKind::Draw {
            blend_mode: self.blend_mode,
            culling: self.culling,
            masked: self.mask.is_some(),
        }
    }

    /// Pipeline this call uses when drawn into a mask target.
    #[inline]
    pub fn mask_pipeline(&self) -> PipelineKind {
        PipelineKind::Mask {
            culling: self.culling,
        }
    }
}

/// Coverage pre-pass for one masked drawable.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskPass {
    /// The drawable being masked.
    pub target: usize,
    /// Its mask target, cleared then filled by `draws`.
    pub texture: TextureHandle,
    pub draws: Vec<DrawCall>,
}

/// Everything encoded for one frame: mask pre-passes, then the main pass.
///
/// Rebuilt every frame; `clear` keeps the allocations.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameCommands {
    /// `projection * transform`.
    pub transform: Mat4,
    pub viewport: Viewport,
    pub clear_color: [f64; 4],
    pub mask_passes: Vec<MaskPass>,
    pub draws: Vec<DrawCall>,
}

impl Default for FrameCommands {
    fn default() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            viewport: Viewport::default(),
            clear_color: [0.0; 4],
            mask_passes: Vec::new(),
            draws: Vec::new(),
        }
    }
}

impl FrameCommands {
    pub fn clear(&mut self) {
        self.mask_passes.clear();
        self.draws.clear();
    }

    /// Draw calls across all passes.
    pub fn draw_call_count(&self) -> usize {
        self.draws.len() + self.mask_passes.iter().map(|p| p.draws.len()).sum::<usize>()
    }

    /// Main-pass draw of drawable `index`, if any.
    pub fn draw_of(&self, index: usize) -> Option<&DrawCall> {
        self.draws.iter().find(|d| d.drawable == index)
    }

    /// Records the passes for `drawables`.
    ///
    /// Mask passes follow drawable-list order, one per visible masked
    /// drawable; each draws that drawable's masks in the order it lists them.
    /// The main pass follows `draw_order`. Hidden and empty drawables produce
    /// no draw, neither as a mask source nor in the main pass.
    pub(crate) fn record(
        &mut self,
        drawables: &[Drawable],
        draw_order: &[usize],
        textures: &[TextureHandle],
    ) {
        for d in drawables.iter().filter(|d| d.is_masked() && d.should_draw()) {
            let Some(texture) = d.mask_texture() else {
                log::trace!("drawable {} has no mask target; skipped", d.index());
                continue;
            };
            let draws = d
                .masks()
                .iter()
                .filter_map(|&m| drawables.get(m))
                .filter_map(|m| draw_call(m, textures, None))
                .collect();
            self.mask_passes.push(MaskPass {
                target: d.index(),
                texture,
                draws,
            });
        }

        for &i in draw_order {
            let Some(d) = drawables.get(i) else { continue };
            let mask = match (d.is_masked(), d.mask_texture()) {
                (false, _) => None,
                (true, Some(t)) => Some(t),
                (true, None) => continue,
            };
            if let Some(call) = draw_call(d, textures, mask) {
                self.draws.push(call);
            }
        }
    }
}

fn draw_call(d: &Drawable, textures: &[TextureHandle], mask: Option<TextureHandle>) -> Option<DrawCall> {
    if !d.should_draw() {
        return None;
    }
    Some(DrawCall {
        drawable: d.index(),
        buffers: *d.buffers()?,
        index_count: d.index_count(),
        texture: *textures.get(d.texture_index())?,
        blend_mode: d.blend_mode,
        culling: d.culling,
        mask,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawable::{OpacityUniform, INDEX_STRIDE, VERTEX_STRIDE};
    use crate::render::{BufferHandle, GpuBuffer};
    use slotmap::KeyData;

    fn buffer(n: u64) -> BufferHandle {
        KeyData::from_ffi(n).into()
    }

    fn texture(n: u64) -> TextureHandle {
        KeyData::from_ffi(n).into()
    }

    fn attached(index: usize, masks: Vec<usize>, count: usize) -> Drawable {
        let mut d = Drawable::new(index, 4, 6, 0);
        d.set_masks(masks.len(), masks, count).unwrap();
        let b = |n: u64, size| GpuBuffer {
            handle: buffer(index as u64 * 4 + n),
            size,
        };
        d.attach_buffers(DrawableBuffers {
            positions: b(0, 4 * VERTEX_STRIDE),
            uvs: b(1, 4 * VERTEX_STRIDE),
            indices: Some(b(2, 6 * INDEX_STRIDE)),
            opacity: b(3, OpacityUniform::SIZE),
        })
        .unwrap();
        if d.is_masked() {
            d.replace_mask_texture(Some(texture(100 + index as u64)));
        }
        d
    }

    #[test]
    fn mask_sources_are_drawn_before_main_pass() {
        let drawables = vec![attached(0, vec![], 2), attached(1, vec![0], 2)];
        let mut frame = FrameCommands::default();
        frame.record(&drawables, &[0, 1], &[texture(0)]);

        assert_eq!(frame.mask_passes.len(), 1);
        assert_eq!(frame.mask_passes[0].target, 1);
        assert_eq!(frame.mask_passes[0].draws[0].drawable, 0);
        assert_eq!(frame.mask_passes[0].draws[0].mask, None);

        let order: Vec<_> = frame.draws.iter().map(|d| d.drawable).collect();
        assert_eq!(order, vec![0, 1]);
        assert_eq!(frame.draws[1].mask, Some(texture(101)));
        assert_eq!(frame.draw_call_count(), 3);
    }

    #[test]
    fn hidden_drawables_are_skipped_everywhere() {
        let mut drawables = vec![attached(0, vec![], 2), attached(1, vec![0], 2)];
        drawables[0].visible = false;

        let mut frame = FrameCommands::default();
        frame.record(&drawables, &[0, 1], &[texture(0)]);

        assert!(frame.draw_of(0).is_none());
        assert!(frame.mask_passes[0].draws.is_empty());
        assert!(frame.draw_of(1).is_some());
    }

    #[test]
    fn main_pass_follows_draw_order() {
        let drawables = vec![attached(0, vec![], 3), attached(1, vec![], 3), attached(2, vec![], 3)];
        let mut frame = FrameCommands::default();
        frame.record(&drawables, &[2, 0, 1], &[texture(0)]);

        let order: Vec<_> = frame.draws.iter().map(|d| d.drawable).collect();
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn clear_keeps_nothing_from_previous_frame() {
        let drawables = vec![attached(0, vec![], 1)];
        let mut frame = FrameCommands::default();
        frame.record(&drawables, &[0], &[texture(0)]);
        frame.clear();
        assert_eq!(frame.draw_call_count(), 0);
    }
}
