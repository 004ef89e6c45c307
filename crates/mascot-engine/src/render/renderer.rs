use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use glam::{Mat4, Vec2};

use crate::coords::{aspect_projection, ModelTransform, SurfaceSize, Viewport};
use crate::drawable::{
    BufferKind, Drawable, DrawableBuffers, DrawableError, OpacityUniform, VERTEX_STRIDE,
};
use crate::model::{DynamicFlags, Model};

use super::{
    BufferUsage, FrameCommands, PipelineKind, RenderBackend, RenderDelegate, RenderError,
    RenderView, RendererConfig, TextureHandle,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Session {
    /// Not started, or stopped.
    Idle,
    /// Started; GPU resources are live.
    Running,
    /// Started, but the surface has zero size; resources are released.
    Suspended,
}

/// Draws one model onto one surface.
///
/// Frame protocol, on the render thread:
/// 1. [`update`](Self::update) advances the model and uploads what changed
/// 2. [`begin_render_with_time`](Self::begin_render_with_time) encodes the
///    frame and notifies the delegate
///
/// Skipping `update` for a frame re-renders the previous frame's buffers.
pub struct Renderer<B: RenderBackend> {
    backend: B,
    model: Box<dyn Model>,
    config: RendererConfig,

    drawables: Vec<Drawable>,
    draw_order: Vec<usize>,
    textures: Vec<TextureHandle>,

    transform: ModelTransform,
    projection: Mat4,
    size: SurfaceSize,
    session: Session,

    delegate: Option<Weak<dyn RenderDelegate<B>>>,

    frame: FrameCommands,
    frame_index: u64,
    updated_since_render: bool,
}

impl<B: RenderBackend> Renderer<B> {
    /// Creates a renderer with default settings.
    ///
    /// Drawables are built (and validated) from the model right away; GPU
    /// resources wait for [`start_with_view`](Self::start_with_view).
    pub fn new(model: impl Model + 'static, backend: B) -> Result<Self, RenderError> {
        Self::with_config(Box::new(model), backend, RendererConfig::default())
    }

    pub fn with_config(
        model: Box<dyn Model>,
        backend: B,
        config: RendererConfig,
    ) -> Result<Self, RenderError> {
        let drawables = build_drawables(model.as_ref())?;
        let transform = ModelTransform::new(config.origin, config.scale);

        let mut renderer = Self {
            backend,
            model,
            config,
            drawables,
            draw_order: Vec::new(),
            textures: Vec::new(),
            transform,
            projection: Mat4::IDENTITY,
            size: SurfaceSize::default(),
            session: Session::Idle,
            delegate: None,
            frame: FrameCommands::default(),
            frame_index: 0,
            updated_since_render: false,
        };
        renderer.copy_dynamic_state();
        renderer.rebuild_draw_order();
        Ok(renderer)
    }

    // ── accessors ──────────────────────────────────────────────────────────

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    /// Mutable access to the model. Changes reach the GPU on the next
    /// [`update`](Self::update).
    pub fn model_mut(&mut self) -> &mut dyn Model {
        self.model.as_mut()
    }

    pub fn drawables(&self) -> &[Drawable] {
        &self.drawables
    }

    /// Drawable indices in paint order.
    pub fn draw_order(&self) -> &[usize] {
        &self.draw_order
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Commands encoded by the most recent frame.
    pub fn last_frame(&self) -> &FrameCommands {
        &self.frame
    }

    /// Frames encoded so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// `true` once started with a non-empty surface.
    pub fn is_running(&self) -> bool {
        self.session == Session::Running
    }

    pub fn surface_size(&self) -> SurfaceSize {
        self.size
    }

    // ── transform ──────────────────────────────────────────────────────────

    pub fn origin(&self) -> Vec2 {
        self.transform.origin()
    }

    /// Sets the origin (NDC) and resets the transform to `T(origin) * S(scale)`.
    pub fn set_origin(&mut self, origin: Vec2) {
        self.transform.set_origin(origin);
    }

    pub fn scale(&self) -> f32 {
        self.transform.scale()
    }

    /// Sets the scale and resets the transform to `T(origin) * S(scale)`.
    pub fn set_scale(&mut self, scale: f32) {
        self.transform.set_scale(scale);
    }

    pub fn transform(&self) -> Mat4 {
        self.transform.matrix()
    }

    /// Replaces the transform. It stays in effect until the next
    /// `set_origin`/`set_scale`; `origin()` and `scale()` keep reporting the
    /// values last written to them.
    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform.set_matrix(transform);
    }

    // ── delegate ───────────────────────────────────────────────────────────

    /// Registers `delegate` without taking ownership of it.
    pub fn set_delegate<D>(&mut self, delegate: &Rc<D>)
    where
        D: RenderDelegate<B> + 'static,
    {
        let weak: Weak<D> = Rc::downgrade(delegate);
        self.delegate = Some(weak);
    }

    pub fn clear_delegate(&mut self) {
        self.delegate = None;
    }

    // ── lifecycle ──────────────────────────────────────────────────────────

    /// One-time setup against `view`: uploads textures, allocates every
    /// drawable's buffers and mask target, and prepares the pipelines the
    /// model needs.
    ///
    /// On failure everything allocated so far is released and the renderer
    /// stays unstarted. A zero-size view starts the session suspended.
    pub fn start_with_view(&mut self, view: &impl RenderView) -> Result<(), RenderError> {
        if self.session != Session::Idle {
            return Err(RenderError::AlreadyStarted);
        }

        self.size = view.drawable_size();
        self.projection = aspect_projection(self.size);

        if self.size.is_empty() {
            log::info!("renderer started on an empty surface; waiting for a size");
            self.session = Session::Suspended;
            return Ok(());
        }

        self.allocate()?;
        self.session = Session::Running;
        log::info!(
            "renderer started: {} drawables, {} textures, {}x{}",
            self.drawables.len(),
            self.textures.len(),
            self.size.width,
            self.size.height
        );
        Ok(())
    }

    /// Reacts to a surface resize.
    ///
    /// Recomputes the aspect projection and re-creates mask targets at the
    /// new size; geometry buffers are kept. A zero size tears the session
    /// down, the next non-zero size brings it back.
    pub fn drawable_size_will_change(
        &mut self,
        _view: &impl RenderView,
        size: SurfaceSize,
    ) -> Result<(), RenderError> {
        if size == self.size && self.session != Session::Suspended {
            return Ok(());
        }

        log::debug!(
            "drawable size {}x{} -> {}x{}",
            self.size.width,
            self.size.height,
            size.width,
            size.height
        );
        self.size = size;
        self.projection = aspect_projection(size);

        match self.session {
            Session::Idle => Ok(()),
            Session::Running if size.is_empty() => {
                self.release_resources();
                self.session = Session::Suspended;
                log::info!("surface collapsed; renderer suspended");
                Ok(())
            }
            Session::Running => {
                self.release_mask_targets();
                if let Err(e) = self.allocate_mask_targets() {
                    self.release_resources();
                    self.session = Session::Suspended;
                    return Err(e);
                }
                Ok(())
            }
            Session::Suspended if size.is_empty() => Ok(()),
            Session::Suspended => {
                self.allocate()?;
                self.session = Session::Running;
                log::info!("renderer resumed at {}x{}", size.width, size.height);
                Ok(())
            }
        }
    }

    /// Releases every GPU resource and returns to the unstarted state.
    pub fn stop(&mut self) {
        if self.session == Session::Idle {
            return;
        }
        self.release_resources();
        self.session = Session::Idle;
        log::info!("renderer stopped");
    }

    /// Swaps in a new model, rebuilding drawables and, if running, their
    /// GPU resources.
    ///
    /// The new model is validated first; on a validation error nothing
    /// changes.
    pub fn replace_model(&mut self, model: Box<dyn Model>) -> Result<(), RenderError> {
        let drawables = build_drawables(model.as_ref())?;

        self.release_resources();
        self.model = model;
        self.drawables = drawables;
        self.copy_dynamic_state();
        self.rebuild_draw_order();

        if self.session == Session::Running {
            if let Err(e) = self.allocate() {
                self.session = Session::Idle;
                return Err(e);
            }
        }
        log::info!("model replaced: {} drawables", self.drawables.len());
        Ok(())
    }

    // ── per frame ──────────────────────────────────────────────────────────

    /// Advances the model by `elapsed` seconds and uploads changed vertex
    /// positions and opacities.
    pub fn update(&mut self, elapsed: f64) -> Result<(), RenderError> {
        self.model.update(elapsed);
        self.sync_from_model()?;
        self.updated_since_render = true;
        Ok(())
    }

    /// Encodes the frame into `command_buffer`, drawing onto `pass` within
    /// `viewport`, then notifies the delegate with `time` as the frame's
    /// duration.
    ///
    /// While suspended nothing is encoded and the delegate is not notified.
    pub fn begin_render_with_time(
        &mut self,
        time: f64,
        viewport: Viewport,
        command_buffer: &mut B::CommandBuffer,
        pass: &B::PassDescriptor,
    ) -> Result<(), RenderError> {
        match self.session {
            Session::Idle => return Err(RenderError::NotStarted),
            Session::Suspended => {
                log::trace!("surface suspended; frame dropped");
                return Ok(());
            }
            Session::Running => {}
        }

        if !self.updated_since_render {
            log::trace!("no update since last frame; reusing buffers");
        }

        self.frame.clear();
        self.frame.transform = self.projection * self.transform.matrix();
        self.frame.viewport = viewport;
        self.frame.clear_color = self.config.clear_color;
        self.frame
            .record(&self.drawables, &self.draw_order, &self.textures);

        self.backend.encode(&self.frame, command_buffer, pass)?;

        self.updated_since_render = false;
        self.frame_index = self.frame_index.wrapping_add(1);
        log::trace!(
            "frame {}: {} mask passes, {} draws",
            self.frame_index,
            self.frame.mask_passes.len(),
            self.frame.draws.len()
        );

        if let Some(delegate) = self.delegate.as_ref().and_then(Weak::upgrade) {
            delegate.render_update(self, time);
        }
        Ok(())
    }

    // ── resources ──────────────────────────────────────────────────────────

    fn allocate(&mut self) -> Result<(), RenderError> {
        let result = self
            .allocate_textures()
            .and_then(|()| self.allocate_buffers())
            .and_then(|()| self.prepare_pipelines())
            .and_then(|()| self.allocate_mask_targets());

        if let Err(e) = result {
            log::error!("GPU resource setup failed: {e}");
            self.release_resources();
            return Err(e);
        }
        Ok(())
    }

    fn allocate_textures(&mut self) -> Result<(), RenderError> {
        for (i, image) in self.model.textures().iter().enumerate() {
            let handle = self
                .backend
                .create_texture(&format!("model texture {i}"), image)?;
            self.textures.push(handle);
        }
        Ok(())
    }

    fn allocate_buffers(&mut self) -> Result<(), RenderError> {
        for d in self.drawables.iter_mut().filter(|d| d.vertex_count() > 0) {
            let i = d.index();
            let id = &self.model.drawable_desc(i).id;

            // Collected as they are created so a failure part-way releases them.
            let mut created = Vec::with_capacity(4);
            let result = (|| {
                let positions = self.backend.create_buffer(
                    &format!("{id} positions"),
                    BufferUsage::Vertex,
                    bytemuck::cast_slice(self.model.vertex_positions(i)),
                )?;
                created.push(positions);
                let uvs = self.backend.create_buffer(
                    &format!("{id} uvs"),
                    BufferUsage::Vertex,
                    bytemuck::cast_slice(self.model.vertex_uvs(i)),
                )?;
                created.push(uvs);
                let indices = if d.index_count() > 0 {
                    let ib = self.backend.create_buffer(
                        &format!("{id} indices"),
                        BufferUsage::Index,
                        bytemuck::cast_slice(self.model.vertex_indices(i)),
                    )?;
                    created.push(ib);
                    Some(ib)
                } else {
                    None
                };
                let opacity = self.backend.create_buffer(
                    &format!("{id} opacity"),
                    BufferUsage::Uniform,
                    bytemuck::bytes_of(&OpacityUniform::new(d.opacity())),
                )?;
                created.push(opacity);

                d.attach_buffers(DrawableBuffers {
                    positions,
                    uvs,
                    indices,
                    opacity,
                })?;
                Ok::<(), RenderError>(())
            })();

            if let Err(e) = result {
                for buffer in created {
                    self.backend.release_buffer(buffer);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn prepare_pipelines(&mut self) -> Result<(), RenderError> {
        let mut kinds = BTreeSet::new();
        for d in self.drawables.iter().filter(|d| d.has_geometry()) {
            kinds.insert(PipelineKind::Draw {
                blend_mode: d.blend_mode,
                culling: d.culling,
                masked: d.is_masked(),
            });
            for &m in d.masks() {
                kinds.insert(PipelineKind::Mask {
                    culling: self.drawables[m].culling,
                });
            }
        }
        for kind in kinds {
            self.backend.prepare_pipeline(kind)?;
        }
        Ok(())
    }

    fn allocate_mask_targets(&mut self) -> Result<(), RenderError> {
        if self.size.is_empty() {
            return Ok(());
        }
        for d in self.drawables.iter_mut().filter(|d| d.is_masked() && d.has_geometry()) {
            let id = &self.model.drawable_desc(d.index()).id;
            let target = self
                .backend
                .create_mask_target(&format!("{id} mask"), self.size)?;
            if let Some(old) = d.replace_mask_texture(Some(target)) {
                self.backend.release_texture(old);
            }
        }
        Ok(())
    }

    fn release_mask_targets(&mut self) {
        for d in &mut self.drawables {
            if let Some(t) = d.replace_mask_texture(None) {
                self.backend.release_texture(t);
            }
        }
    }

    fn release_resources(&mut self) {
        self.release_mask_targets();
        for d in &mut self.drawables {
            if let Some(buffers) = d.detach_buffers() {
                for buffer in buffers.iter() {
                    self.backend.release_buffer(buffer);
                }
            }
        }
        for t in self.textures.drain(..) {
            self.backend.release_texture(t);
        }
        self.frame.clear();
    }

    // ── model sync ─────────────────────────────────────────────────────────

    fn copy_dynamic_state(&mut self) {
        for d in &mut self.drawables {
            let i = d.index();
            d.visible = self.model.is_visible(i);
            d.set_opacity(self.model.opacity(i));
            d.render_order = self.model.render_order(i);
        }
    }

    /// Copies dynamic state into drawables and uploads the buffers the
    /// model flagged as changed.
    fn sync_from_model(&mut self) -> Result<(), RenderError> {
        let mut order_changed = false;

        for d in &mut self.drawables {
            let i = d.index();
            let flags = self.model.dynamic_flags(i);

            d.visible = self.model.is_visible(i);
            d.set_opacity(self.model.opacity(i));
            let order = self.model.render_order(i);
            if order != d.render_order {
                d.render_order = order;
                order_changed = true;
            }

            let Some(buffers) = d.buffers().copied() else { continue };

            if flags.contains(DynamicFlags::VERTEX_POSITIONS_CHANGED) {
                let positions = self.model.vertex_positions(i);
                if positions.len() != d.vertex_count() {
                    return Err(DrawableError::BufferSize {
                        drawable: i,
                        kind: BufferKind::Positions,
                        expected: buffers.positions.size,
                        actual: positions.len() as u64 * VERTEX_STRIDE,
                    }
                    .into());
                }
                self.backend
                    .write_buffer(buffers.positions, bytemuck::cast_slice(positions))?;
            }

            if flags.contains(DynamicFlags::OPACITY_CHANGED) {
                self.backend.write_buffer(
                    buffers.opacity,
                    bytemuck::bytes_of(&OpacityUniform::new(d.opacity())),
                )?;
            }
        }

        if order_changed {
            self.rebuild_draw_order();
        }
        Ok(())
    }

    fn rebuild_draw_order(&mut self) {
        self.draw_order.clear();
        self.draw_order.extend(0..self.drawables.len());
        let drawables = &self.drawables;
        self.draw_order
            .sort_by_key(|&i| (drawables[i].render_order, i));
    }
}

fn build_drawables(model: &dyn Model) -> Result<Vec<Drawable>, DrawableError> {
    let count = model.drawable_count();
    let texture_count = model.textures().len();
    (0..count)
        .map(|i| Drawable::from_desc(i, model.drawable_desc(i), count, texture_count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MeshGeometry, MeshModel, MeshPart, TextureImage};
    use crate::render::HeadlessBackend;

    fn part(id: &str) -> MeshPart {
        MeshPart::new(
            id,
            MeshGeometry::quad(Vec2::splat(-1.0), Vec2::splat(1.0), Vec2::ZERO, Vec2::ONE),
        )
    }

    fn renderer(parts: Vec<MeshPart>) -> Renderer<HeadlessBackend> {
        let model = parts
            .into_iter()
            .fold(MeshModel::builder().texture(TextureImage::solid([0, 0, 0, 255])), |b, p| {
                b.part(p)
            })
            .build()
            .unwrap();
        Renderer::new(model, HeadlessBackend::new()).unwrap()
    }

    #[test]
    fn config_sets_initial_transform() {
        let model = MeshModel::builder().build().unwrap();
        let config = RendererConfig {
            origin: Vec2::new(0.5, 0.0),
            scale: 2.0,
            ..RendererConfig::default()
        };
        let r = Renderer::with_config(Box::new(model), HeadlessBackend::new(), config).unwrap();
        assert_eq!(r.origin(), Vec2::new(0.5, 0.0));
        assert_eq!(r.scale(), 2.0);
        assert_eq!(
            r.transform(),
            Mat4::from_translation(glam::Vec3::new(0.5, 0.0, 0.0))
                * Mat4::from_scale(glam::Vec3::new(2.0, 2.0, 1.0))
        );
    }

    #[test]
    fn set_transform_leaves_origin_and_scale_stale() {
        let mut r = renderer(vec![]);
        r.set_origin(Vec2::new(0.1, 0.2));
        r.set_transform(Mat4::IDENTITY);
        assert_eq!(r.origin(), Vec2::new(0.1, 0.2));
        assert_eq!(r.transform(), Mat4::IDENTITY);

        r.set_origin(Vec2::ZERO);
        assert_eq!(r.transform(), Mat4::IDENTITY);
        r.set_scale(3.0);
        assert_ne!(r.transform(), Mat4::IDENTITY);
    }

    #[test]
    fn draw_order_breaks_ties_by_index() {
        let r = renderer(vec![
            part("a").render_order(1),
            part("b").render_order(0),
            part("c").render_order(1),
            part("d").render_order(0),
        ]);
        assert_eq!(r.draw_order(), &[1, 3, 0, 2]);
    }

    #[test]
    fn stop_before_start_is_a_no_op() {
        let mut r = renderer(vec![part("a")]);
        r.stop();
        assert!(!r.is_running());
        assert_eq!(r.backend().live_buffers(), 0);
    }

    #[test]
    fn invalid_replacement_keeps_the_current_model() {
        let mut r = renderer(vec![part("a")]);
        r.start_with_view(&SurfaceSize::new(64, 64)).unwrap();

        // Part samples texture 0, but the model has none.
        let bad = MeshModel::builder().part(part("x")).build().unwrap();
        assert!(matches!(
            r.replace_model(Box::new(bad)),
            Err(RenderError::Drawable(DrawableError::TextureOutOfRange { .. }))
        ));
        assert!(r.is_running());
        assert_eq!(r.drawables().len(), 1);
        assert_eq!(r.backend().live_buffers(), 4);
    }
}
