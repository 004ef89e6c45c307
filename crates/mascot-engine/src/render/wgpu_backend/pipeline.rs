//! Bind group layouts and render pipelines for drawable meshes.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};

use crate::drawable::{OpacityUniform, VERTEX_STRIDE};
use crate::model::BlendMode;
use crate::render::PipelineKind;

/// Group 0 uniform, shared by every draw of a frame.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(super) struct FrameUniform {
    pub mvp: [[f32; 4]; 4],
}

impl FrameUniform {
    pub(super) const SIZE: u64 = std::mem::size_of::<FrameUniform>() as u64;
}

// ── blend ─────────────────────────────────────────────────────────────────

fn component(
    src_factor: wgpu::BlendFactor,
    dst_factor: wgpu::BlendFactor,
) -> wgpu::BlendComponent {
    wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation: wgpu::BlendOperation::Add,
    }
}

/// Blend state for a drawable's blend mode. Sources are premultiplied.
pub(super) fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    use wgpu::BlendFactor as F;
    match mode {
        BlendMode::Normal => wgpu::BlendState {
            color: component(F::One, F::OneMinusSrcAlpha),
            alpha: component(F::One, F::OneMinusSrcAlpha),
        },
        BlendMode::Additive => wgpu::BlendState {
            color: component(F::One, F::One),
            alpha: component(F::Zero, F::One),
        },
        BlendMode::Multiplicative => wgpu::BlendState {
            color: component(F::Dst, F::OneMinusSrcAlpha),
            alpha: component(F::Zero, F::One),
        },
    }
}

/// Mask sources accumulate coverage.
pub(super) fn mask_blend() -> wgpu::BlendState {
    use wgpu::BlendFactor as F;
    wgpu::BlendState {
        color: component(F::One, F::One),
        alpha: component(F::One, F::One),
    }
}

// ── layouts ───────────────────────────────────────────────────────────────

const ATTRS_POSITION: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
const ATTRS_UV: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x2];

/// Positions and UVs live in separate buffers; positions are rewritten per
/// frame, UVs never.
fn vertex_layouts() -> [wgpu::VertexBufferLayout<'static>; 2] {
    [
        wgpu::VertexBufferLayout {
            array_stride: VERTEX_STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRS_POSITION,
        },
        wgpu::VertexBufferLayout {
            array_stride: VERTEX_STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRS_UV,
        },
    ]
}

fn uniform_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    size: u64,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(size),
        },
        count: None,
    }
}

fn texture_entry(binding: u32, filterable: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

pub(super) struct Layouts {
    pub frame: wgpu::BindGroupLayout,
    pub drawable: wgpu::BindGroupLayout,
    pub masked: wgpu::BindGroupLayout,
    drawable_pipeline: wgpu::PipelineLayout,
    masked_pipeline: wgpu::PipelineLayout,
}

impl Layouts {
    pub(super) fn new(device: &wgpu::Device) -> Self {
        let frame = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mascot frame bgl"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX, FrameUniform::SIZE)],
        });

        let drawable_entries = [
            uniform_entry(0, wgpu::ShaderStages::FRAGMENT, OpacityUniform::SIZE),
            texture_entry(1, true),
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ];
        let drawable = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mascot drawable bgl"),
            entries: &drawable_entries,
        });

        let [e0, e1, e2] = drawable_entries;
        let masked = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mascot masked drawable bgl"),
            // The mask is read with textureLoad, so any float format works.
            entries: &[e0, e1, e2, texture_entry(3, false)],
        });

        let drawable_pipeline = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mascot drawable pipeline layout"),
            bind_group_layouts: &[&frame, &drawable],
            immediate_size: 0,
        });
        let masked_pipeline = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mascot masked pipeline layout"),
            bind_group_layouts: &[&frame, &masked],
            immediate_size: 0,
        });

        Self {
            frame,
            drawable,
            masked,
            drawable_pipeline,
            masked_pipeline,
        }
    }
}

// ── pipelines ─────────────────────────────────────────────────────────────

/// Formats pipelines render into.
#[derive(Debug, Copy, Clone)]
pub(super) struct TargetFormats {
    pub color: wgpu::TextureFormat,
    pub mask: wgpu::TextureFormat,
}

pub(super) fn create_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layouts: &Layouts,
    formats: TargetFormats,
    kind: PipelineKind,
) -> wgpu::RenderPipeline {
    let (label, layout, entry_point, format, blend, culling) = match kind {
        PipelineKind::Draw {
            blend_mode,
            culling,
            masked: false,
        } => (
            "mascot drawable pipeline",
            &layouts.drawable_pipeline,
            "fs_main",
            formats.color,
            blend_state(blend_mode),
            culling,
        ),
        PipelineKind::Draw {
            blend_mode,
            culling,
            masked: true,
        } => (
            "mascot masked drawable pipeline",
            &layouts.masked_pipeline,
            "fs_masked",
            formats.color,
            blend_state(blend_mode),
            culling,
        ),
        PipelineKind::Mask { culling } => (
            "mascot mask pipeline",
            &layouts.drawable_pipeline,
            "fs_mask",
            formats.mask,
            mask_blend(),
            culling,
        ),
    };

    log::debug!("creating {label} for {kind:?}");

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),

        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &vertex_layouts(),
        },

        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),

        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: culling.then_some(wgpu::Face::Back),
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },

        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_blend_is_premultiplied_over() {
        let b = blend_state(BlendMode::Normal);
        assert_eq!(b.color.src_factor, wgpu::BlendFactor::One);
        assert_eq!(b.color.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);
    }

    #[test]
    fn additive_and_multiplicative_keep_destination_alpha() {
        for mode in [BlendMode::Additive, BlendMode::Multiplicative] {
            let b = blend_state(mode);
            assert_eq!(b.alpha.src_factor, wgpu::BlendFactor::Zero);
            assert_eq!(b.alpha.dst_factor, wgpu::BlendFactor::One);
        }
    }

    #[test]
    fn frame_uniform_is_a_single_matrix() {
        assert_eq!(FrameUniform::SIZE, 64);
    }
}
