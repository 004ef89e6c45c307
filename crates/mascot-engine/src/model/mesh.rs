use std::collections::HashMap;

use glam::Vec2;

use super::{
    BlendMode, DrawableDesc, DynamicFlags, Model, ModelError, Motion, Pose, TextureImage,
};

/// Triangle mesh of one part, in model space (NDC, +Y up).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshGeometry {
    pub positions: Vec<Vec2>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u16>,
}

impl MeshGeometry {
    /// Axis-aligned quad spanning `min..max`, sampling `uv_min..uv_max`.
    ///
    /// UV `y` grows downwards (row 0 is the top of the texture), so the
    /// bottom edge of the quad samples `uv_max.y`.
    pub fn quad(min: Vec2, max: Vec2, uv_min: Vec2, uv_max: Vec2) -> Self {
        Self {
            positions: vec![
                Vec2::new(min.x, min.y),
                Vec2::new(max.x, min.y),
                Vec2::new(max.x, max.y),
                Vec2::new(min.x, max.y),
            ],
            uvs: vec![
                Vec2::new(uv_min.x, uv_max.y),
                Vec2::new(uv_max.x, uv_max.y),
                Vec2::new(uv_max.x, uv_min.y),
                Vec2::new(uv_min.x, uv_min.y),
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    /// Triangle fan approximating an ellipse. `segments` is raised to 3.
    ///
    /// The UV rectangle is mapped onto the ellipse's bounding box.
    pub fn ellipse(center: Vec2, radii: Vec2, segments: u16, uv_min: Vec2, uv_max: Vec2) -> Self {
        let segments = segments.max(3);
        let uv_of = |p: Vec2| {
            let t = (p - (center - radii)) / (radii * 2.0);
            Vec2::new(
                uv_min.x + (uv_max.x - uv_min.x) * t.x,
                uv_max.y - (uv_max.y - uv_min.y) * t.y,
            )
        };

        let mut positions = Vec::with_capacity(segments as usize + 1);
        positions.push(center);
        for i in 0..segments {
            let a = i as f32 / segments as f32 * std::f32::consts::TAU;
            positions.push(center + Vec2::new(a.cos(), a.sin()) * radii);
        }
        let uvs = positions.iter().map(|&p| uv_of(p)).collect();

        let mut indices = Vec::with_capacity(segments as usize * 3);
        for i in 0..segments {
            indices.extend_from_slice(&[0, 1 + i, 1 + (i + 1) % segments]);
        }

        Self {
            positions,
            uvs,
            indices,
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }
}

/// Authoring description of one part, consumed by [`MeshModelBuilder`].
#[derive(Debug, Clone)]
pub struct MeshPart {
    id: String,
    geometry: MeshGeometry,
    texture_index: usize,
    masks: Vec<String>,
    blend_mode: BlendMode,
    culling: bool,
    opacity: f32,
    visible: bool,
    render_order: Option<i32>,
    pivot: Option<Vec2>,
    motions: Vec<Motion>,
}

impl MeshPart {
    pub fn new(id: impl Into<String>, geometry: MeshGeometry) -> Self {
        Self {
            id: id.into(),
            geometry,
            texture_index: 0,
            masks: Vec::new(),
            blend_mode: BlendMode::Normal,
            culling: false,
            opacity: 1.0,
            visible: true,
            render_order: None,
            pivot: None,
            motions: Vec::new(),
        }
    }

    pub fn texture(mut self, index: usize) -> Self {
        self.texture_index = index;
        self
    }

    /// Clips this part to the coverage of part `id`.
    pub fn masked_by(mut self, id: impl Into<String>) -> Self {
        self.masks.push(id.into());
        self
    }

    pub fn blend(mut self, mode: BlendMode) -> Self {
        self.blend_mode = mode;
        self
    }

    pub fn culling(mut self, enabled: bool) -> Self {
        self.culling = enabled;
        self
    }

    pub fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Defaults to the part's position in the builder.
    pub fn render_order(mut self, order: i32) -> Self {
        self.render_order = Some(order);
        self
    }

    /// Point motions scale about. Defaults to the centroid of the mesh.
    pub fn pivot(mut self, pivot: Vec2) -> Self {
        self.pivot = Some(pivot);
        self
    }

    pub fn motion(mut self, motion: Motion) -> Self {
        self.motions.push(motion);
        self
    }
}

/// Collects textures and parts, then validates them into a [`MeshModel`].
#[derive(Debug, Default)]
pub struct MeshModelBuilder {
    textures: Vec<TextureImage>,
    parts: Vec<MeshPart>,
}

impl MeshModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texture(mut self, image: TextureImage) -> Self {
        self.textures.push(image);
        self
    }

    pub fn part(mut self, part: MeshPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn build(self) -> Result<MeshModel, ModelError> {
        let ids: HashMap<&str, usize> = self
            .parts
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.as_str(), i))
            .collect();

        let mut states = Vec::with_capacity(self.parts.len());
        for (i, part) in self.parts.iter().enumerate() {
            validate_geometry(&part.id, &part.geometry)?;

            let masks = part
                .masks
                .iter()
                .map(|m| {
                    ids.get(m.as_str()).copied().ok_or_else(|| ModelError::UnknownMask {
                        part: part.id.clone(),
                        mask: m.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let g = &part.geometry;
            states.push(PartState {
                desc: DrawableDesc {
                    id: part.id.clone(),
                    vertex_count: g.vertex_count(),
                    index_count: g.index_count(),
                    texture_index: part.texture_index,
                    mask_count: masks.len(),
                    masks,
                    blend_mode: part.blend_mode,
                    culling: part.culling,
                },
                rest: g.positions.clone(),
                positions: g.positions.clone(),
                uvs: g.uvs.clone(),
                indices: g.indices.clone(),
                pivot: part.pivot.unwrap_or_else(|| centroid(&g.positions)),
                motions: part.motions.clone(),
                base_opacity: part.opacity,
                opacity: part.opacity,
                base_visible: part.visible,
                visible: part.visible,
                render_order: part.render_order.unwrap_or(i as i32),
                pending: DynamicFlags::empty(),
                flags: DynamicFlags::empty(),
            });
        }

        let mut model = MeshModel {
            textures: self.textures,
            parts: states,
            time: 0.0,
        };
        for part in &mut model.parts {
            part.pose_at(0.0);
            part.flags = DynamicFlags::all();
        }
        Ok(model)
    }
}

/// In-memory [`Model`] whose parts are animated by [`Motion`]s.
///
/// Every part starts with all dynamic flags raised so a first upload sees
/// the whole state as changed.
#[derive(Debug, Clone)]
pub struct MeshModel {
    textures: Vec<TextureImage>,
    parts: Vec<PartState>,
    time: f64,
}

impl MeshModel {
    pub fn builder() -> MeshModelBuilder {
        MeshModelBuilder::new()
    }

    /// Seconds of animation accumulated through `update`.
    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn part_index(&self, id: &str) -> Option<usize> {
        self.parts.iter().position(|p| p.desc.id == id)
    }

    /// Changes the paint order of a part; reported on the next update.
    pub fn set_render_order(&mut self, index: usize, order: i32) {
        let part = &mut self.parts[index];
        if part.render_order != order {
            part.render_order = order;
            part.pending |= DynamicFlags::RENDER_ORDER_CHANGED;
        }
    }

    /// Shows or hides a part independently of its motions.
    pub fn set_visible(&mut self, index: usize, visible: bool) {
        self.parts[index].base_visible = visible;
    }

    pub fn set_opacity(&mut self, index: usize, opacity: f32) {
        self.parts[index].base_opacity = opacity.clamp(0.0, 1.0);
    }
}

impl Model for MeshModel {
    fn drawable_count(&self) -> usize {
        self.parts.len()
    }

    fn drawable_desc(&self, index: usize) -> &DrawableDesc {
        &self.parts[index].desc
    }

    fn textures(&self) -> &[TextureImage] {
        &self.textures
    }

    fn update(&mut self, elapsed: f64) {
        self.time += elapsed.max(0.0);
        let t = self.time;
        for part in &mut self.parts {
            part.pose_at(t);
        }
    }

    fn vertex_positions(&self, index: usize) -> &[Vec2] {
        &self.parts[index].positions
    }

    fn vertex_uvs(&self, index: usize) -> &[Vec2] {
        &self.parts[index].uvs
    }

    fn vertex_indices(&self, index: usize) -> &[u16] {
        &self.parts[index].indices
    }

    fn opacity(&self, index: usize) -> f32 {
        self.parts[index].opacity
    }

    fn is_visible(&self, index: usize) -> bool {
        self.parts[index].visible
    }

    fn render_order(&self, index: usize) -> i32 {
        self.parts[index].render_order
    }

    fn dynamic_flags(&self, index: usize) -> DynamicFlags {
        self.parts[index].flags
    }
}

#[derive(Debug, Clone)]
struct PartState {
    desc: DrawableDesc,
    rest: Vec<Vec2>,
    positions: Vec<Vec2>,
    uvs: Vec<Vec2>,
    indices: Vec<u16>,
    pivot: Vec2,
    motions: Vec<Motion>,
    base_opacity: f32,
    opacity: f32,
    base_visible: bool,
    visible: bool,
    render_order: i32,
    // Raised by setters between updates.
    pending: DynamicFlags,
    flags: DynamicFlags,
}

impl PartState {
    fn pose_at(&mut self, t: f64) {
        let mut flags = std::mem::take(&mut self.pending);

        let pose = self
            .motions
            .iter()
            .fold(Pose::IDENTITY, |acc, m| acc.then(m.sample(t)));

        let mut moved = false;
        for (out, &rest) in self.positions.iter_mut().zip(&self.rest) {
            let p = pose.apply(self.pivot, rest);
            if *out != p {
                *out = p;
                moved = true;
            }
        }
        if moved {
            flags |= DynamicFlags::VERTEX_POSITIONS_CHANGED;
        }

        let opacity = (self.base_opacity * pose.opacity).clamp(0.0, 1.0);
        if opacity != self.opacity {
            self.opacity = opacity;
            flags |= DynamicFlags::OPACITY_CHANGED;
        }

        let visible = self.base_visible && pose.visible;
        if visible != self.visible {
            self.visible = visible;
            flags |= DynamicFlags::VISIBILITY_CHANGED;
        }

        self.flags = flags;
    }
}

fn validate_geometry(part: &str, g: &MeshGeometry) -> Result<(), ModelError> {
    if g.positions.len() != g.uvs.len() {
        return Err(ModelError::UvCountMismatch {
            part: part.to_string(),
            positions: g.positions.len(),
            uvs: g.uvs.len(),
        });
    }
    if g.positions.len() > u16::MAX as usize + 1 {
        return Err(ModelError::TooManyVertices {
            part: part.to_string(),
            count: g.positions.len(),
        });
    }
    if g.indices.len() % 3 != 0 {
        return Err(ModelError::PartialTriangle {
            part: part.to_string(),
            count: g.indices.len(),
        });
    }
    if let Some(&bad) = g.indices.iter().find(|&&i| i as usize >= g.positions.len()) {
        return Err(ModelError::IndexOutOfRange {
            part: part.to_string(),
            index: bad,
            vertex_count: g.positions.len(),
        });
    }
    Ok(())
}

fn centroid(points: &[Vec2]) -> Vec2 {
    if points.is_empty() {
        return Vec2::ZERO;
    }
    points.iter().copied().sum::<Vec2>() / points.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_quad() -> MeshGeometry {
        MeshGeometry::quad(Vec2::splat(-0.5), Vec2::splat(0.5), Vec2::ZERO, Vec2::ONE)
    }

    #[test]
    fn quad_has_four_vertices_and_two_triangles() {
        let q = unit_quad();
        assert_eq!(q.vertex_count(), 4);
        assert_eq!(q.index_count(), 6);
        assert_eq!(q.uvs[0], Vec2::new(0.0, 1.0));
    }

    #[test]
    fn ellipse_fan_is_closed() {
        let e = MeshGeometry::ellipse(Vec2::ZERO, Vec2::ONE, 8, Vec2::ZERO, Vec2::ONE);
        assert_eq!(e.vertex_count(), 9);
        assert_eq!(e.index_count(), 24);
        assert_eq!(&e.indices[21..], &[0, 8, 1]);
        assert!(e.uvs[0].abs_diff_eq(Vec2::splat(0.5), 1e-6));
    }

    #[test]
    fn build_resolves_masks_by_id() {
        let model = MeshModel::builder()
            .texture(TextureImage::solid([255; 4]))
            .part(MeshPart::new("face", unit_quad()))
            .part(MeshPart::new("eye", unit_quad()).masked_by("face"))
            .build()
            .unwrap();

        let eye = model.drawable_desc(1);
        assert_eq!(eye.mask_count, 1);
        assert_eq!(eye.masks, vec![0]);
        assert_eq!(eye.index_count, 6);
        assert_eq!(model.render_order(1), 1);
    }

    #[test]
    fn build_rejects_unknown_mask() {
        let err = MeshModel::builder()
            .part(MeshPart::new("eye", unit_quad()).masked_by("nope"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::UnknownMask {
                part: "eye".into(),
                mask: "nope".into()
            }
        );
    }

    #[test]
    fn build_rejects_bad_indices() {
        let mut g = unit_quad();
        g.indices = vec![0, 1, 7];
        let err = MeshModel::builder()
            .part(MeshPart::new("p", g))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::IndexOutOfRange { index: 7, .. }));
    }

    #[test]
    fn first_state_reports_everything_changed() {
        let model = MeshModel::builder()
            .part(MeshPart::new("p", unit_quad()))
            .build()
            .unwrap();
        assert_eq!(model.dynamic_flags(0), DynamicFlags::all());
    }

    #[test]
    fn update_moves_vertices_and_raises_flag() {
        let mut model = MeshModel::builder()
            .part(MeshPart::new("p", unit_quad()).motion(Motion::Sway {
                amplitude: Vec2::new(0.1, 0.0),
                period: 4.0,
                phase: 0.0,
            }))
            .part(MeshPart::new("still", unit_quad()))
            .build()
            .unwrap();

        model.update(1.0);
        assert!(model
            .dynamic_flags(0)
            .contains(DynamicFlags::VERTEX_POSITIONS_CHANGED));
        assert!((model.vertex_positions(0)[0].x - (-0.4)).abs() < 1e-6);
        assert_eq!(model.dynamic_flags(1), DynamicFlags::empty());
        assert_eq!(model.time(), 1.0);
    }

    #[test]
    fn setters_are_reported_on_next_update() {
        let mut model = MeshModel::builder()
            .part(MeshPart::new("p", unit_quad()))
            .build()
            .unwrap();
        model.update(0.016);

        model.set_render_order(0, 10);
        model.set_visible(0, false);
        model.update(0.016);

        let flags = model.dynamic_flags(0);
        assert!(flags.contains(DynamicFlags::RENDER_ORDER_CHANGED));
        assert!(flags.contains(DynamicFlags::VISIBILITY_CHANGED));
        assert!(!model.is_visible(0));
        assert_eq!(model.render_order(0), 10);
    }
}
