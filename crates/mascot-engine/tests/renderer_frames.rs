//! Frame-level behavior of `Renderer`, driven through the headless backend.

use std::cell::Cell;
use std::rc::Rc;

use glam::{Mat4, Vec2};

use mascot_engine::coords::{SurfaceSize, Viewport};
use mascot_engine::drawable::DrawableError;
use mascot_engine::model::{
    BlendMode, DrawableDesc, DynamicFlags, MeshGeometry, MeshModel, MeshPart, Model, Motion,
    TextureImage,
};
use mascot_engine::render::{
    BackendError, HeadlessBackend, PipelineKind, RenderDelegate, RenderError, Renderer,
    RendererConfig, TraceEvent,
};

const SIZE: SurfaceSize = SurfaceSize {
    width: 800,
    height: 600,
};

fn quad(id: &str) -> MeshPart {
    MeshPart::new(
        id,
        MeshGeometry::quad(Vec2::splat(-0.5), Vec2::splat(0.5), Vec2::ZERO, Vec2::ONE),
    )
}

fn model(parts: impl IntoIterator<Item = MeshPart>) -> MeshModel {
    parts
        .into_iter()
        .fold(
            MeshModel::builder().texture(TextureImage::solid([255, 255, 255, 255])),
            |b, p| b.part(p),
        )
        .build()
        .unwrap()
}

fn started(model: MeshModel) -> Renderer<HeadlessBackend> {
    let mut r = Renderer::new(model, HeadlessBackend::new()).unwrap();
    r.start_with_view(&SIZE).unwrap();
    r
}

fn render(r: &mut Renderer<HeadlessBackend>, time: f64) -> Vec<TraceEvent> {
    let mut trace = Vec::new();
    r.begin_render_with_time(time, Viewport::full(SIZE), &mut trace, &())
        .unwrap();
    trace
}

fn drawn(trace: &[TraceEvent]) -> Vec<usize> {
    trace
        .iter()
        .filter_map(|e| match e {
            TraceEvent::Draw { drawable, .. } => Some(*drawable),
            _ => None,
        })
        .collect()
}

#[derive(Default)]
struct Recorder {
    calls: Cell<u32>,
    last_duration: Cell<f64>,
    last_frame_draws: Cell<usize>,
}

impl RenderDelegate<HeadlessBackend> for Recorder {
    fn render_update(&self, renderer: &Renderer<HeadlessBackend>, duration: f64) {
        self.calls.set(self.calls.get() + 1);
        self.last_duration.set(duration);
        self.last_frame_draws.set(renderer.last_frame().draws.len());
    }
}

// ── frame structure ───────────────────────────────────────────────────────

#[test]
fn single_quad_is_one_draw_without_mask_pass() {
    let mut r = started(model([quad("body")]));
    let trace = render(&mut r, 1.0 / 60.0);

    assert_eq!(trace.len(), 2);
    assert!(matches!(trace[0], TraceEvent::BeginMainPass { .. }));
    match &trace[1] {
        TraceEvent::Draw {
            drawable,
            index_count,
            mask,
            blend_mode,
            ..
        } => {
            assert_eq!(*drawable, 0);
            assert_eq!(*index_count, 6);
            assert_eq!(*mask, None);
            assert_eq!(*blend_mode, BlendMode::Normal);
        }
        other => panic!("expected a draw, got {other:?}"),
    }
}

#[test]
fn mask_is_rendered_before_the_masked_drawable() {
    // "eye" is clipped to the coverage of "socket".
    let mut r = started(model([quad("socket"), quad("eye").masked_by("socket")]));
    let trace = render(&mut r, 0.0);

    assert_eq!(
        &trace[..2],
        &[
            TraceEvent::BeginMaskPass { target: 1 },
            TraceEvent::DrawMask {
                target: 1,
                drawable: 0,
                index_count: 6
            },
        ]
    );
    let main = trace
        .iter()
        .position(|e| matches!(e, TraceEvent::BeginMainPass { .. }))
        .unwrap();
    assert_eq!(main, 2);
    assert_eq!(drawn(&trace), vec![0, 1]);

    let masked = r.drawables()[1].mask_texture();
    assert!(masked.is_some());
    assert!(matches!(
        trace.last(),
        Some(TraceEvent::Draw { drawable: 1, mask, .. }) if *mask == masked
    ));
}

#[test]
fn every_mask_source_is_drawn_in_list_order() {
    let mut r = started(model([
        quad("a"),
        quad("b"),
        quad("c").masked_by("b").masked_by("a"),
    ]));
    let trace = render(&mut r, 0.0);

    let sources: Vec<_> = trace
        .iter()
        .filter_map(|e| match e {
            TraceEvent::DrawMask { drawable, .. } => Some(*drawable),
            _ => None,
        })
        .collect();
    assert_eq!(sources, vec![1, 0]);
}

#[test]
fn invisible_drawable_issues_no_draw() {
    let mut r = started(model([quad("shown"), quad("gone").hidden()]));
    let trace = render(&mut r, 0.0);
    assert_eq!(drawn(&trace), vec![0]);
}

#[test]
fn hidden_mask_source_leaves_an_empty_mask_pass() {
    let mut r = started(model([quad("mask").hidden(), quad("clipped").masked_by("mask")]));
    let trace = render(&mut r, 0.0);

    assert_eq!(trace[0], TraceEvent::BeginMaskPass { target: 1 });
    assert!(matches!(trace[1], TraceEvent::BeginMainPass { .. }));
    assert_eq!(drawn(&trace), vec![1]);
}

#[test]
fn zero_drawables_only_clear() {
    let mut r = started(MeshModel::builder().build().unwrap());
    let trace = render(&mut r, 0.0);

    assert_eq!(trace.len(), 1);
    match &trace[0] {
        TraceEvent::BeginMainPass { clear_color, .. } => {
            assert_eq!(*clear_color, RendererConfig::default().clear_color);
        }
        other => panic!("expected a main pass, got {other:?}"),
    }
}

#[test]
fn draws_follow_render_order() {
    let mut r = started(model([
        quad("back").render_order(5),
        quad("front").render_order(-1),
        quad("middle").render_order(5),
    ]));
    assert_eq!(drawn(&render(&mut r, 0.0)), vec![1, 0, 2]);
}

#[test]
fn render_order_set_on_the_model_is_respected() {
    let mut m = model([quad("a"), quad("b")]);
    m.set_render_order(0, 10);
    let mut r = Renderer::new(m, HeadlessBackend::new()).unwrap();
    r.start_with_view(&SIZE).unwrap();
    assert_eq!(drawn(&render(&mut r, 0.0)), vec![1, 0]);
}

#[test]
fn blend_modes_select_their_pipelines() {
    let mut r = started(model([
        quad("n"),
        quad("add").blend(BlendMode::Additive),
        quad("mul").blend(BlendMode::Multiplicative).culling(true),
    ]));
    for (blend_mode, culling) in [
        (BlendMode::Normal, false),
        (BlendMode::Additive, false),
        (BlendMode::Multiplicative, true),
    ] {
        assert!(r.backend().has_pipeline(PipelineKind::Draw {
            blend_mode,
            culling,
            masked: false
        }));
    }

    let modes: Vec<_> = render(&mut r, 0.0)
        .into_iter()
        .filter_map(|e| match e {
            TraceEvent::Draw { blend_mode, .. } => Some(blend_mode),
            _ => None,
        })
        .collect();
    assert_eq!(modes, BlendMode::ALL.to_vec());
}

// ── transform ─────────────────────────────────────────────────────────────

#[test]
fn zero_scale_is_degenerate_but_renders() {
    let mut r = started(model([quad("body")]));
    r.set_scale(0.0);
    let trace = render(&mut r, 0.0);

    match &trace[0] {
        TraceEvent::BeginMainPass { transform, .. } => {
            assert_eq!(transform.determinant(), 0.0);
        }
        other => panic!("expected a main pass, got {other:?}"),
    }
    assert_eq!(drawn(&trace), vec![0]);
}

#[test]
fn frame_transform_is_projection_times_model_transform() {
    let mut r = started(model([quad("body")]));
    r.set_origin(Vec2::new(0.25, -0.5));
    r.set_scale(2.0);
    render(&mut r, 0.0);

    let expected = Mat4::from_scale(glam::Vec3::new(0.75, 1.0, 1.0))
        * Mat4::from_translation(glam::Vec3::new(0.25, -0.5, 0.0))
        * Mat4::from_scale(glam::Vec3::new(2.0, 2.0, 1.0));
    assert!(r.last_frame().transform.abs_diff_eq(expected, 1e-6));
}

#[test]
fn explicit_transform_holds_until_origin_or_scale_is_set() {
    let mut r = started(model([quad("body")]));
    let custom = Mat4::from_rotation_z(0.3);

    r.set_transform(custom);
    assert_eq!(r.transform(), custom);
    assert_eq!(r.scale(), 1.0);

    r.set_scale(0.5);
    assert_eq!(
        r.transform(),
        Mat4::from_scale(glam::Vec3::new(0.5, 0.5, 1.0))
    );
}

// ── update ────────────────────────────────────────────────────────────────

#[test]
fn update_is_visible_in_the_same_frame() {
    let part = quad("body").motion(Motion::Sway {
        amplitude: Vec2::new(0.1, 0.0),
        period: 1.0,
        phase: 0.0,
    });
    let mut r = started(model([part]));

    r.update(0.25).unwrap();
    let expected = r.model().vertex_positions(0).to_vec();
    assert_ne!(expected[0], Vec2::splat(-0.5), "the sway moved the mesh");

    let trace = render(&mut r, 0.25);
    match trace.last() {
        Some(TraceEvent::Draw { positions, .. }) => assert_eq!(positions, &expected),
        other => panic!("expected a draw, got {other:?}"),
    }
}

#[test]
fn frame_without_update_reuses_previous_buffers() {
    let mut r = started(model([quad("body")]));
    let first = render(&mut r, 0.0);
    let second = render(&mut r, 0.0);
    assert_eq!(first, second);
    assert_eq!(r.frame_index(), 2);
}

#[test]
fn opacity_is_uploaded_on_update() {
    let mut m = model([quad("body")]);
    m.set_opacity(0, 0.25);
    let mut r = Renderer::new(m, HeadlessBackend::new()).unwrap();
    r.start_with_view(&SIZE).unwrap();
    r.update(0.0).unwrap();

    let buffers = *r.drawables()[0].buffers().unwrap();
    let data = r.backend().buffer_data(buffers.opacity).unwrap();
    let opacity = f32::from_ne_bytes([data[0], data[1], data[2], data[3]]);
    assert_eq!(opacity, 0.25);
}

#[test]
fn update_before_start_only_advances_the_model() {
    let mut r = Renderer::new(model([quad("body")]), HeadlessBackend::new()).unwrap();
    r.update(0.5).unwrap();
    assert_eq!(r.backend().live_buffers(), 0);
    assert!(!r.is_running());
}

// ── delegate ──────────────────────────────────────────────────────────────

#[test]
fn delegate_is_notified_once_per_frame_with_the_time() {
    let mut r = started(model([quad("body")]));
    let recorder = Rc::new(Recorder::default());
    r.set_delegate(&recorder);

    render(&mut r, 0.016);
    render(&mut r, 0.033);

    assert_eq!(recorder.calls.get(), 2);
    assert_eq!(recorder.last_duration.get(), 0.033);
    assert_eq!(recorder.last_frame_draws.get(), 1);
}

#[test]
fn dropped_delegate_is_skipped() {
    let mut r = started(model([quad("body")]));
    let recorder = Rc::new(Recorder::default());
    r.set_delegate(&recorder);
    drop(recorder);

    let trace = render(&mut r, 0.0);
    assert_eq!(drawn(&trace), vec![0]);
}

#[test]
fn renderer_does_not_keep_the_delegate_alive() {
    let mut r = started(model([quad("body")]));
    let recorder = Rc::new(Recorder::default());
    r.set_delegate(&recorder);
    assert_eq!(Rc::strong_count(&recorder), 1);
    assert_eq!(Rc::weak_count(&recorder), 1);
}

// ── lifecycle ─────────────────────────────────────────────────────────────

#[test]
fn render_before_start_is_an_error() {
    let mut r = Renderer::new(model([quad("body")]), HeadlessBackend::new()).unwrap();
    let mut trace = Vec::new();
    assert_eq!(
        r.begin_render_with_time(0.0, Viewport::full(SIZE), &mut trace, &()),
        Err(RenderError::NotStarted)
    );
    assert!(trace.is_empty());
}

#[test]
fn second_start_is_rejected() {
    let mut r = started(model([quad("body")]));
    let buffers = r.backend().live_buffers();
    assert_eq!(r.start_with_view(&SIZE), Err(RenderError::AlreadyStarted));
    assert_eq!(r.backend().live_buffers(), buffers);
}

#[test]
fn start_allocates_buffers_textures_and_mask_targets() {
    let r = started(model([quad("socket"), quad("eye").masked_by("socket")]));
    let backend = r.backend();

    // positions, uvs, indices, opacity per drawable
    assert_eq!(backend.live_buffers(), 8);
    // one atlas page plus one mask target
    assert_eq!(backend.live_textures(), 2);
    assert_eq!(backend.live_mask_targets(), 1);

    let mask = r.drawables()[1].mask_texture().unwrap();
    assert_eq!(backend.mask_target_size(mask), Some(SIZE));
    assert!(backend.has_pipeline(PipelineKind::Mask { culling: false }));
}

#[test]
fn empty_mesh_gets_no_buffers_and_no_draw() {
    let empty = MeshPart::new("empty", MeshGeometry::default());
    let mut r = started(model([empty, quad("body")]));

    assert!(r.drawables()[0].buffers().is_none());
    assert_eq!(r.backend().live_buffers(), 4);
    assert_eq!(drawn(&render(&mut r, 0.0)), vec![1]);
}

#[test]
fn allocation_failure_releases_everything() {
    // Texture plus three buffers succeed; the fourth buffer fails.
    let backend = HeadlessBackend::with_allocation_limit(4);
    let mut r = Renderer::new(model([quad("a"), quad("b")]), backend).unwrap();

    let err = r.start_with_view(&SIZE).unwrap_err();
    assert!(matches!(
        err,
        RenderError::Backend(BackendError::Allocation { .. })
    ));
    assert_eq!(r.backend().live_buffers(), 0);
    assert_eq!(r.backend().live_textures(), 0);
    assert!(r.drawables().iter().all(|d| d.buffers().is_none()));
    assert!(!r.is_running());

    let mut trace = Vec::new();
    assert_eq!(
        r.begin_render_with_time(0.0, Viewport::full(SIZE), &mut trace, &()),
        Err(RenderError::NotStarted)
    );
}

#[test]
fn resize_recreates_mask_targets_only() {
    let mut r = started(model([quad("socket"), quad("eye").masked_by("socket")]));
    let buffers_before = *r.drawables()[1].buffers().unwrap();

    let bigger = SurfaceSize::new(1024, 768);
    r.drawable_size_will_change(&bigger, bigger).unwrap();

    assert_eq!(*r.drawables()[1].buffers().unwrap(), buffers_before);
    let mask = r.drawables()[1].mask_texture().unwrap();
    assert_eq!(r.backend().mask_target_size(mask), Some(bigger));
    assert_eq!(r.backend().live_mask_targets(), 1);
    assert_eq!(r.surface_size(), bigger);
}

#[test]
fn repeated_resizes_keep_the_texture_arena_bounded() {
    let mut r = started(model([quad("socket"), quad("eye").masked_by("socket")]));
    let first_mask = r.drawables()[1].mask_texture().unwrap();
    let capacity = r.backend().texture_capacity();

    for i in 0..10_000 {
        let size = SurfaceSize::new(800 + i % 2, 600);
        r.drawable_size_will_change(&size, size).unwrap();
    }

    assert_eq!(r.backend().live_mask_targets(), 1);
    assert_eq!(r.backend().live_textures(), 2);
    assert_eq!(r.backend().texture_capacity(), capacity);

    let mask = r.drawables()[1].mask_texture().unwrap();
    assert_ne!(mask, first_mask);
    assert_eq!(r.backend().mask_target_size(first_mask), None);
    assert_eq!(
        r.backend().mask_target_size(mask),
        Some(SurfaceSize::new(801, 600))
    );
    assert_eq!(drawn(&render(&mut r, 0.0)), vec![0, 1]);
}

#[test]
fn zero_size_suspends_and_a_later_size_resumes() {
    let mut r = started(model([quad("socket"), quad("eye").masked_by("socket")]));
    let recorder = Rc::new(Recorder::default());
    r.set_delegate(&recorder);

    let zero = SurfaceSize::new(0, 0);
    r.drawable_size_will_change(&zero, zero).unwrap();
    assert_eq!(r.backend().live_buffers(), 0);
    assert_eq!(r.backend().live_textures(), 0);
    assert!(!r.is_running());

    let mut trace = Vec::new();
    r.begin_render_with_time(0.0, Viewport::full(zero), &mut trace, &())
        .unwrap();
    assert!(trace.is_empty());
    assert_eq!(recorder.calls.get(), 0);

    r.drawable_size_will_change(&SIZE, SIZE).unwrap();
    assert!(r.is_running());
    assert_eq!(r.backend().live_buffers(), 8);
    assert_eq!(drawn(&render(&mut r, 0.0)), vec![0, 1]);
    assert_eq!(recorder.calls.get(), 1);
}

#[test]
fn start_on_an_empty_view_waits_for_a_size() {
    let mut r = Renderer::new(model([quad("body")]), HeadlessBackend::new()).unwrap();
    r.start_with_view(&SurfaceSize::new(0, 0)).unwrap();
    assert!(!r.is_running());
    assert_eq!(r.backend().live_buffers(), 0);

    r.drawable_size_will_change(&SIZE, SIZE).unwrap();
    assert!(r.is_running());
    assert_eq!(drawn(&render(&mut r, 0.0)), vec![0]);
}

#[test]
fn stop_releases_everything_and_allows_a_restart() {
    let mut r = started(model([quad("socket"), quad("eye").masked_by("socket")]));
    r.stop();
    assert_eq!(r.backend().live_buffers(), 0);
    assert_eq!(r.backend().live_textures(), 0);

    r.start_with_view(&SIZE).unwrap();
    assert_eq!(drawn(&render(&mut r, 0.0)), vec![0, 1]);
}

#[test]
fn replace_model_rebuilds_drawables() {
    let mut r = started(model([quad("a")]));
    r.replace_model(Box::new(model([quad("x"), quad("y"), quad("z")])))
        .unwrap();

    assert_eq!(r.drawables().len(), 3);
    assert_eq!(r.backend().live_buffers(), 12);
    assert_eq!(r.backend().live_textures(), 1);
    assert_eq!(drawn(&render(&mut r, 0.0)), vec![0, 1, 2]);
}

// ── invariants ────────────────────────────────────────────────────────────

/// Hand-written model whose single drawable carries `desc` as given.
struct RawModel {
    desc: DrawableDesc,
    textures: Vec<TextureImage>,
    positions: Vec<Vec2>,
}

impl RawModel {
    fn new(desc: DrawableDesc) -> Self {
        Self {
            positions: vec![Vec2::ZERO; desc.vertex_count],
            desc,
            textures: vec![TextureImage::solid([0, 0, 0, 255])],
        }
    }
}

impl Model for RawModel {
    fn drawable_count(&self) -> usize {
        1
    }
    fn drawable_desc(&self, _: usize) -> &DrawableDesc {
        &self.desc
    }
    fn textures(&self) -> &[TextureImage] {
        &self.textures
    }
    fn update(&mut self, _: f64) {}
    fn vertex_positions(&self, _: usize) -> &[Vec2] {
        &self.positions
    }
    fn vertex_uvs(&self, _: usize) -> &[Vec2] {
        &self.positions
    }
    fn vertex_indices(&self, _: usize) -> &[u16] {
        &[]
    }
    fn opacity(&self, _: usize) -> f32 {
        1.0
    }
    fn is_visible(&self, _: usize) -> bool {
        true
    }
    fn render_order(&self, _: usize) -> i32 {
        0
    }
    fn dynamic_flags(&self, _: usize) -> DynamicFlags {
        DynamicFlags::empty()
    }
}

#[test]
fn mask_count_without_masks_is_rejected() {
    let desc = DrawableDesc {
        id: "broken".into(),
        vertex_count: 3,
        mask_count: 1,
        ..Default::default()
    };
    let err = Renderer::new(RawModel::new(desc), HeadlessBackend::new()).err();
    assert_eq!(
        err,
        Some(RenderError::Drawable(DrawableError::MaskCountMismatch {
            drawable: 0,
            mask_count: 1,
            masks: 0
        }))
    );
}

#[test]
fn self_mask_is_rejected() {
    let desc = DrawableDesc {
        id: "ouroboros".into(),
        vertex_count: 3,
        mask_count: 1,
        masks: vec![0],
        ..Default::default()
    };
    assert!(matches!(
        Renderer::new(RawModel::new(desc), HeadlessBackend::new()),
        Err(RenderError::Drawable(DrawableError::SelfMask { drawable: 0 }))
    ));
}

#[test]
fn vertex_count_must_match_the_position_data() {
    let desc = DrawableDesc {
        id: "short".into(),
        vertex_count: 3,
        ..Default::default()
    };
    let mut raw = RawModel::new(desc);
    raw.positions.pop();

    let mut r = Renderer::new(raw, HeadlessBackend::new()).unwrap();
    assert!(matches!(
        r.start_with_view(&SIZE),
        Err(RenderError::Drawable(DrawableError::BufferSize { .. }))
    ));
    assert_eq!(r.backend().live_buffers(), 0);
}
