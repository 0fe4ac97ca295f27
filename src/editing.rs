use std::collections::{BTreeMap, BTreeSet};

use glam::{Vec2, Vec3};
use smallvec::SmallVec;

use crate::actors::ActorRegistry;
use crate::error::{SceneError, SceneResult};
use crate::events::SceneEvent;
use crate::geometry::GeometryId;
use crate::picking::intersect_ray_plane;
use crate::renderer::{OverlayHandle, OverlayShape, Renderer};
use crate::scene::{GeometrySpec, SceneContainer};

const DEFAULT_TOLERANCE_FRACTION: f32 = 0.01;
const DEFAULT_CURVE_RESOLUTION: usize = 24;

/// One accepted pick in an in-progress face construction.
#[derive(Debug, Clone, Copy)]
struct PendingPick {
    id: GeometryId,
    vertex: u32,
}

/// The face currently armed for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceSelection {
    pub id: GeometryId,
    pub face: u32,
}

#[derive(Default)]
struct CurveDraft {
    control_points: Vec<Vec3>,
    markers: Vec<OverlayHandle>,
    preview: Option<OverlayHandle>,
}

/// Pick resolution and mesh-edit bookkeeping for the interactive modes.
///
/// All transient state lives here: the pending face-construction picks,
/// the armed face selection, the drawing target, the curve draft and
/// the rubber-band point selection. `cleanup` tears down everything a
/// mode left on screen, so switching modes can never leak a marker.
pub struct EditEngine {
    tolerance_fraction: f32,
    curve_resolution: usize,
    pending_face: SmallVec<[PendingPick; 3]>,
    pending_markers: SmallVec<[OverlayHandle; 3]>,
    face_selection: Option<FaceSelection>,
    face_overlay: Option<OverlayHandle>,
    drawing_target: Option<GeometryId>,
    curve: CurveDraft,
    point_selection: BTreeMap<GeometryId, BTreeSet<u32>>,
}

impl Default for EditEngine {
    fn default() -> Self {
        Self::configured(DEFAULT_TOLERANCE_FRACTION, DEFAULT_CURVE_RESOLUTION)
    }
}

impl EditEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configured(tolerance_fraction: f32, curve_resolution: usize) -> Self {
        Self {
            tolerance_fraction,
            curve_resolution: curve_resolution.max(1),
            pending_face: SmallVec::new(),
            pending_markers: SmallVec::new(),
            face_selection: None,
            face_overlay: None,
            drawing_target: None,
            curve: CurveDraft::default(),
            point_selection: BTreeMap::new(),
        }
    }

    /// Pick tolerance in pixels, derived from the live viewport so the
    /// hit radius tracks window resizes.
    pub fn tolerance_px(&self, renderer: &dyn Renderer) -> f32 {
        self.tolerance_fraction * renderer.viewport().min_dimension()
    }

    pub fn pending_face_len(&self) -> usize {
        self.pending_face.len()
    }

    pub fn face_selection(&self) -> Option<FaceSelection> {
        self.face_selection
    }

    pub fn drawing_target(&self) -> Option<GeometryId> {
        self.drawing_target
    }

    pub fn curve_point_count(&self) -> usize {
        self.curve.control_points.len()
    }

    pub fn selected_points(&self) -> &BTreeMap<GeometryId, BTreeSet<u32>> {
        &self.point_selection
    }

    pub fn selected_point_count(&self) -> usize {
        self.point_selection.values().map(|set| set.len()).sum()
    }

    // --- face construction -------------------------------------------

    /// Accepts one face-construction pick. The third accepted pick on the
    /// same entity closes the triangle and returns its face index; a pick
    /// on a different entity is rejected without touching the pending set.
    pub fn mesh_add_pick(
        &mut self,
        screen: Vec2,
        models: &mut SceneContainer,
        actors: &mut ActorRegistry,
        renderer: &mut dyn Renderer,
    ) -> SceneResult<Option<u32>> {
        let tolerance = self.tolerance_px(renderer);
        let Some(pick) = renderer.pick_point(screen, tolerance) else {
            return Ok(None);
        };
        let Some(id) = actors.resolve(pick.handle) else {
            return Ok(None);
        };
        // Picks landing on entities from the other container are misses,
        // not pending-set candidates.
        if !models.contains(id) {
            return Ok(None);
        }
        if let Some(first) = self.pending_face.first() {
            if first.id != id {
                return Err(SceneError::CrossEntity { active: first.id, got: id });
            }
        }

        self.pending_face.push(PendingPick { id, vertex: pick.vertex });
        let marker = renderer.add_overlay(OverlayShape::Marker { position: pick.world });
        self.pending_markers.push(marker);
        renderer.request_redraw();

        if self.pending_face.len() < 3 {
            return Ok(None);
        }

        let verts: SmallVec<[u32; 3]> = self.pending_face.iter().map(|p| p.vertex).collect();
        let face_index = match models.get_mut(id) {
            Some(geometry) => {
                geometry.add_face(verts[0], verts[1], verts[2])?;
                (geometry.face_count() - 1) as u32
            }
            None => {
                self.discard_pending_face(renderer);
                return Ok(None);
            }
        };

        self.discard_pending_face(renderer);
        if let Some(geometry) = models.get_mut(id) {
            actors.sync(geometry, renderer);
        }
        models.events.push(SceneEvent::DataChanged);
        renderer.request_redraw();
        Ok(Some(face_index))
    }

    fn discard_pending_face(&mut self, renderer: &mut dyn Renderer) {
        for marker in self.pending_markers.drain(..) {
            renderer.remove_overlay(marker);
        }
        self.pending_face.clear();
    }

    // --- face deletion -----------------------------------------------

    /// Arms the face under the cursor for deletion, replacing any face
    /// armed before. Returns the new selection, or `None` on a miss.
    pub fn mesh_delete_pick(
        &mut self,
        screen: Vec2,
        models: &SceneContainer,
        actors: &ActorRegistry,
        renderer: &mut dyn Renderer,
    ) -> Option<FaceSelection> {
        let hit = renderer.pick_cell(screen)?;
        let id = actors.resolve(hit.handle)?;
        let geometry = models.get(id)?;
        let face = *geometry.faces().get(hit.face as usize)?;
        let points = geometry.points();
        let corners = [
            points[face[0] as usize],
            points[face[1] as usize],
            points[face[2] as usize],
        ];

        if let Some(previous) = self.face_overlay.take() {
            renderer.remove_overlay(previous);
        }
        self.face_overlay = Some(renderer.add_overlay(OverlayShape::FaceHighlight { corners }));
        let selection = FaceSelection { id, face: hit.face };
        self.face_selection = Some(selection);
        renderer.request_redraw();
        Some(selection)
    }

    /// Deletes the armed face. Without an armed face this is a no-op, so
    /// a second delete press can never fail.
    pub fn delete_selected_face(
        &mut self,
        models: &mut SceneContainer,
        actors: &mut ActorRegistry,
        renderer: &mut dyn Renderer,
    ) -> SceneResult<bool> {
        let Some(selection) = self.face_selection.take() else {
            return Ok(false);
        };
        if let Some(overlay) = self.face_overlay.take() {
            renderer.remove_overlay(overlay);
        }
        let Some(geometry) = models.get_mut(selection.id) else {
            return Ok(false);
        };
        geometry.remove_face(selection.face as usize)?;
        actors.sync(geometry, renderer);
        models.events.push(SceneEvent::DataChanged);
        renderer.request_redraw();
        Ok(true)
    }

    // --- free drawing ------------------------------------------------

    /// Chooses the cluster that drawn points go into: the single selected
    /// cluster if there is one, a fresh empty cluster if none is
    /// selected. More than one selected cluster is ambiguous.
    pub fn begin_drawing(&mut self, clusters: &mut SceneContainer) -> Result<(), String> {
        let selected = clusters.selected();
        let target = match selected.len() {
            0 => {
                let id = clusters
                    .add(GeometrySpec::points(Vec::new()))
                    .map_err(|err| err.to_string())?;
                clusters.select(&[id]);
                id
            }
            1 => selected[0],
            _ => return Err("drawing needs at most one selected cluster".to_string()),
        };
        self.drawing_target = Some(target);
        Ok(())
    }

    pub fn clear_drawing_target(&mut self) {
        self.drawing_target = None;
    }

    /// Appends a point to the drawing target at the clicked position:
    /// snapped to the nearest visible vertex when one is in tolerance,
    /// otherwise dropped on the focal plane.
    pub fn draw_point(
        &mut self,
        screen: Vec2,
        clusters: &mut SceneContainer,
        actors: &mut ActorRegistry,
        renderer: &mut dyn Renderer,
    ) -> Option<Vec3> {
        let target = self.drawing_target?;
        let position = self.world_position(screen, renderer)?;
        let geometry = clusters.get_mut(target)?;
        geometry.add_point(position);
        actors.sync(geometry, renderer);
        clusters.events.push(SceneEvent::DataChanged);
        renderer.request_redraw();
        Some(position)
    }

    fn world_position(&self, screen: Vec2, renderer: &dyn Renderer) -> Option<Vec3> {
        let tolerance = self.tolerance_px(renderer);
        if let Some(pick) = renderer.pick_point(screen, tolerance) {
            return Some(pick.world);
        }
        let camera = renderer.camera();
        let (origin, dir) = camera.screen_ray(screen, renderer.viewport())?;
        let forward = (camera.focal_point - camera.position).normalize_or_zero();
        if forward == Vec3::ZERO {
            return None;
        }
        intersect_ray_plane(origin, dir, camera.focal_point, forward)
    }

    // --- curve drawing -----------------------------------------------

    /// Adds one curve control point, snapped like `draw_point`, and
    /// refreshes the sampled preview polyline.
    pub fn curve_pick(&mut self, screen: Vec2, renderer: &mut dyn Renderer) -> Option<Vec3> {
        let position = self.world_position(screen, renderer)?;
        self.curve.control_points.push(position);
        let marker = renderer.add_overlay(OverlayShape::Marker { position });
        self.curve.markers.push(marker);

        if self.curve.control_points.len() >= 2 {
            if let Some(previous) = self.curve.preview.take() {
                renderer.remove_overlay(previous);
            }
            let points = sample_catmull_rom(&self.curve.control_points, self.curve_resolution);
            self.curve.preview = Some(renderer.add_overlay(OverlayShape::Polyline { points }));
        }
        renderer.request_redraw();
        Some(position)
    }

    /// Commits the curve draft as a new cluster holding the sampled
    /// polyline; the control points go into the entity's metadata. With
    /// fewer than two control points the draft is discarded.
    pub fn finish_curve(
        &mut self,
        clusters: &mut SceneContainer,
        actors: &mut ActorRegistry,
        renderer: &mut dyn Renderer,
    ) -> SceneResult<Option<GeometryId>> {
        let control_points = std::mem::take(&mut self.curve.control_points);
        self.discard_curve_overlays(renderer);
        if control_points.len() < 2 {
            return Ok(None);
        }

        let samples = sample_catmull_rom(&control_points, self.curve_resolution);
        let id = clusters.add(GeometrySpec::points(samples))?;
        if let Some(geometry) = clusters.get_mut(id) {
            let flat: Vec<f32> = control_points.iter().flat_map(|p| p.to_array()).collect();
            geometry.meta.insert("curve_control_points".into(), serde_json::json!(flat));
            actors.sync(geometry, renderer);
        }
        renderer.request_redraw();
        Ok(Some(id))
    }

    fn discard_curve_overlays(&mut self, renderer: &mut dyn Renderer) {
        for marker in self.curve.markers.drain(..) {
            renderer.remove_overlay(marker);
        }
        if let Some(preview) = self.curve.preview.take() {
            renderer.remove_overlay(preview);
        }
    }

    // --- rubber-band point selection ---------------------------------

    /// Marks every cluster vertex whose projection falls inside the
    /// screen rectangle. Without `extend` the previous selection is
    /// cleared first. Returns the total number of selected points.
    pub fn select_rect(
        &mut self,
        min: Vec2,
        max: Vec2,
        extend: bool,
        clusters: &mut SceneContainer,
        actors: &mut ActorRegistry,
        renderer: &mut dyn Renderer,
    ) -> usize {
        if !extend {
            self.clear_point_selection(clusters, actors, renderer);
        }
        for (handle, vertex_ids) in renderer.pick_rect(min, max) {
            let Some(id) = actors.resolve(handle) else { continue };
            if !clusters.contains(id) {
                continue;
            }
            self.point_selection.entry(id).or_default().extend(vertex_ids);
        }

        for (id, vertex_ids) in &self.point_selection {
            if let Some(geometry) = clusters.get_mut(*id) {
                let ids: Vec<u32> = vertex_ids.iter().copied().collect();
                let color = geometry.appearance.highlight_color;
                geometry.recolor(&ids, color);
                actors.sync(geometry, renderer);
            }
        }
        renderer.request_redraw();
        self.selected_point_count()
    }

    /// Restores per-point colors and forgets the rubber-band selection.
    pub fn clear_point_selection(
        &mut self,
        clusters: &mut SceneContainer,
        actors: &mut ActorRegistry,
        renderer: &mut dyn Renderer,
    ) {
        if self.point_selection.is_empty() {
            return;
        }
        for id in std::mem::take(&mut self.point_selection).into_keys() {
            if let Some(geometry) = clusters.get_mut(id) {
                geometry.clear_color_overrides();
                actors.sync(geometry, renderer);
            }
        }
        renderer.request_redraw();
    }

    /// Moves the rubber-band selection into a fresh cluster. Source
    /// clusters keep their unselected points; a cluster whose points
    /// were all selected is removed outright.
    pub fn extract_selection(
        &mut self,
        clusters: &mut SceneContainer,
        actors: &mut ActorRegistry,
        renderer: &mut dyn Renderer,
    ) -> SceneResult<Option<GeometryId>> {
        if self.point_selection.is_empty() {
            return Ok(None);
        }

        let selection = std::mem::take(&mut self.point_selection);
        let mut extracted: Vec<Vec3> = Vec::new();
        let mut fully_consumed: Vec<GeometryId> = Vec::new();

        for (id, vertex_ids) in &selection {
            let Some(geometry) = clusters.get(*id) else { continue };
            let points = geometry.points();
            extracted.extend(
                vertex_ids
                    .iter()
                    .filter_map(|v| points.get(*v as usize).copied()),
            );

            let keep: Vec<bool> = (0..points.len())
                .map(|i| !vertex_ids.contains(&(i as u32)))
                .collect();
            if keep.iter().all(|k| !*k) {
                fully_consumed.push(*id);
            } else if let Some(geometry) = clusters.get_mut(*id) {
                geometry.clear_color_overrides();
                geometry.retain_points(&keep)?;
            }
        }

        if extracted.is_empty() {
            return Ok(None);
        }
        clusters.remove(&fully_consumed);
        let new_id = clusters.add(GeometrySpec::points(extracted))?;
        actors.sync_container(clusters, renderer);
        Ok(Some(new_id))
    }

    // --- cluster picking ---------------------------------------------

    /// Adds the cluster under the cursor to the container selection.
    pub fn pick_cluster(
        &mut self,
        screen: Vec2,
        clusters: &mut SceneContainer,
        actors: &mut ActorRegistry,
        renderer: &mut dyn Renderer,
    ) -> Option<GeometryId> {
        let tolerance = self.tolerance_px(renderer);
        let pick = renderer.pick_point(screen, tolerance)?;
        let id = actors.resolve(pick.handle)?;
        if !clusters.contains(id) {
            return None;
        }
        clusters.extend_selection(&[id]);
        if let Some(geometry) = clusters.get_mut(id) {
            actors.sync(geometry, renderer);
        }
        renderer.request_redraw();
        Some(id)
    }

    // --- mode exit ---------------------------------------------------

    /// Tears down every transient marker and overlay plus the state
    /// behind them. Idempotent; run whenever a cleanup-requiring mode
    /// exits.
    pub fn cleanup(&mut self, renderer: &mut dyn Renderer) {
        self.discard_pending_face(renderer);
        self.discard_curve_overlays(renderer);
        self.curve.control_points.clear();
        if let Some(overlay) = self.face_overlay.take() {
            renderer.remove_overlay(overlay);
        }
        self.face_selection = None;
        renderer.request_redraw();
    }
}

/// Uniform Catmull-Rom sampling through all control points, endpoints
/// included. Fewer than two control points are returned unchanged.
pub fn sample_catmull_rom(control: &[Vec3], resolution: usize) -> Vec<Vec3> {
    if control.len() < 2 {
        return control.to_vec();
    }
    let resolution = resolution.max(1);
    let mut samples = Vec::with_capacity((control.len() - 1) * resolution + 1);
    for i in 0..control.len() - 1 {
        let p0 = control[i.saturating_sub(1)];
        let p1 = control[i];
        let p2 = control[i + 1];
        let p3 = control[(i + 2).min(control.len() - 1)];
        for step in 0..resolution {
            let t = step as f32 / resolution as f32;
            samples.push(catmull_rom(p0, p1, p2, p3, t));
        }
    }
    if let Some(last) = control.last() {
        samples.push(*last);
    }
    samples
}

fn catmull_rom(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3, t: f32) -> Vec3 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (p2 - p0) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (3.0 * (p1 - p2) + p3 - p0) * t3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera3d::Viewport;
    use crate::geometry::GeometryKind;
    use crate::renderer::SoftwareRenderer;

    fn setup_mesh() -> (SceneContainer, ActorRegistry, SoftwareRenderer, GeometryId) {
        let mut models = SceneContainer::new(GeometryKind::Mesh);
        let mut actors = ActorRegistry::new();
        let mut renderer = SoftwareRenderer::new(Viewport::new(640, 480));
        let id = models
            .add(GeometrySpec::mesh(
                vec![
                    Vec3::new(-50.0, -50.0, 0.0),
                    Vec3::new(50.0, -50.0, 0.0),
                    Vec3::new(0.0, 50.0, 0.0),
                    Vec3::new(0.0, -120.0, 0.0),
                ],
                vec![[0, 1, 2]],
            ))
            .unwrap();
        actors.sync_container(&mut models, &mut renderer);
        (models, actors, renderer, id)
    }

    fn screen_of(renderer: &SoftwareRenderer, world: Vec3) -> Vec2 {
        renderer
            .camera()
            .project_point(world, renderer.viewport())
            .unwrap()
    }

    #[test]
    fn three_picks_close_a_face() {
        let (mut models, mut actors, mut renderer, id) = setup_mesh();
        let mut engine = EditEngine::new();

        for vertex in [0usize, 1, 3] {
            let world = models.get(id).unwrap().points()[vertex];
            let screen = screen_of(&renderer, world);
            let result = engine
                .mesh_add_pick(screen, &mut models, &mut actors, &mut renderer)
                .unwrap();
            if vertex == 3 {
                assert_eq!(result, Some(1));
            } else {
                assert_eq!(result, None);
            }
        }
        assert_eq!(models.get(id).unwrap().faces()[1], [0, 1, 3]);
        assert_eq!(engine.pending_face_len(), 0);
        assert_eq!(renderer.overlay_count(), 0);
    }

    #[test]
    fn missed_pick_leaves_pending_set_alone() {
        let (mut models, mut actors, mut renderer, id) = setup_mesh();
        let mut engine = EditEngine::new();

        let world = models.get(id).unwrap().points()[0];
        engine
            .mesh_add_pick(screen_of(&renderer, world), &mut models, &mut actors, &mut renderer)
            .unwrap();
        assert_eq!(engine.pending_face_len(), 1);

        let miss = engine
            .mesh_add_pick(Vec2::new(2.0, 2.0), &mut models, &mut actors, &mut renderer)
            .unwrap();
        assert_eq!(miss, None);
        assert_eq!(engine.pending_face_len(), 1);
    }

    #[test]
    fn cluster_picks_do_not_seed_the_pending_face() {
        let (mut models, mut actors, mut renderer, id) = setup_mesh();
        let mut clusters = SceneContainer::new(GeometryKind::PointSet);
        clusters
            .add(GeometrySpec::points(vec![Vec3::new(150.0, 0.0, 0.0)]))
            .unwrap();
        actors.sync_container(&mut clusters, &mut renderer);
        let mut engine = EditEngine::new();

        let on_cluster = screen_of(&renderer, Vec3::new(150.0, 0.0, 0.0));
        let result = engine
            .mesh_add_pick(on_cluster, &mut models, &mut actors, &mut renderer)
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(engine.pending_face_len(), 0);
        assert_eq!(renderer.overlay_count(), 0);

        // Mesh picks still go through afterwards.
        let world = models.get(id).unwrap().points()[0];
        engine
            .mesh_add_pick(screen_of(&renderer, world), &mut models, &mut actors, &mut renderer)
            .unwrap();
        assert_eq!(engine.pending_face_len(), 1);
    }

    #[test]
    fn cross_entity_pick_is_rejected() {
        let (mut models, mut actors, mut renderer, id) = setup_mesh();
        let other = models
            .add(GeometrySpec::mesh(
                vec![
                    Vec3::new(200.0, 0.0, 0.0),
                    Vec3::new(260.0, 0.0, 0.0),
                    Vec3::new(230.0, 60.0, 0.0),
                ],
                vec![[0, 1, 2]],
            ))
            .unwrap();
        actors.sync_container(&mut models, &mut renderer);
        let mut engine = EditEngine::new();

        let first = models.get(id).unwrap().points()[0];
        engine
            .mesh_add_pick(screen_of(&renderer, first), &mut models, &mut actors, &mut renderer)
            .unwrap();

        let foreign = models.get(other).unwrap().points()[0];
        let err = engine
            .mesh_add_pick(screen_of(&renderer, foreign), &mut models, &mut actors, &mut renderer)
            .unwrap_err();
        assert_eq!(err, SceneError::CrossEntity { active: id, got: other });
        assert_eq!(engine.pending_face_len(), 1);
    }

    #[test]
    fn delete_requires_an_armed_face() {
        let (mut models, mut actors, mut renderer, id) = setup_mesh();
        let mut engine = EditEngine::new();

        assert_eq!(
            engine.delete_selected_face(&mut models, &mut actors, &mut renderer),
            Ok(false)
        );

        let centroid = Vec3::new(0.0, -16.0, 0.0);
        let selection = engine
            .mesh_delete_pick(screen_of(&renderer, centroid), &models, &actors, &mut renderer)
            .unwrap();
        assert_eq!(selection, FaceSelection { id, face: 0 });
        assert_eq!(renderer.overlay_count(), 1);

        assert_eq!(
            engine.delete_selected_face(&mut models, &mut actors, &mut renderer),
            Ok(true)
        );
        assert_eq!(models.get(id).unwrap().face_count(), 0);
        assert_eq!(renderer.overlay_count(), 0);
        // armed selection was consumed, second press is a no-op
        assert_eq!(
            engine.delete_selected_face(&mut models, &mut actors, &mut renderer),
            Ok(false)
        );
    }

    #[test]
    fn begin_drawing_creates_cluster_when_none_selected() {
        let mut clusters = SceneContainer::new(GeometryKind::PointSet);
        let mut engine = EditEngine::new();
        engine.begin_drawing(&mut clusters).unwrap();
        let target = engine.drawing_target().unwrap();
        assert!(clusters.contains(target));
        assert_eq!(clusters.selected(), vec![target]);
    }

    #[test]
    fn begin_drawing_rejects_multi_selection() {
        let mut clusters = SceneContainer::new(GeometryKind::PointSet);
        let a = clusters.add(GeometrySpec::points(vec![Vec3::ZERO])).unwrap();
        let b = clusters.add(GeometrySpec::points(vec![Vec3::X])).unwrap();
        clusters.select(&[a, b]);
        let mut engine = EditEngine::new();
        assert!(engine.begin_drawing(&mut clusters).is_err());
        assert_eq!(engine.drawing_target(), None);
    }

    #[test]
    fn drawn_points_land_on_the_focal_plane() {
        let mut clusters = SceneContainer::new(GeometryKind::PointSet);
        let mut actors = ActorRegistry::new();
        let mut renderer = SoftwareRenderer::new(Viewport::new(640, 480));
        let mut engine = EditEngine::new();
        engine.begin_drawing(&mut clusters).unwrap();
        let target = engine.drawing_target().unwrap();
        actors.sync_container(&mut clusters, &mut renderer);

        let position = engine
            .draw_point(Vec2::new(320.0, 240.0), &mut clusters, &mut actors, &mut renderer)
            .unwrap();
        assert!(position.abs_diff_eq(Vec3::ZERO, 1e-3));
        assert_eq!(clusters.get(target).unwrap().point_count(), 1);
    }

    #[test]
    fn curve_samples_pass_through_endpoints() {
        let control = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(10.0, 5.0, 0.0),
            Vec3::new(20.0, 0.0, 0.0),
        ];
        let samples = sample_catmull_rom(&control, 8);
        assert_eq!(samples.len(), 2 * 8 + 1);
        assert!(samples[0].abs_diff_eq(control[0], 1e-5));
        assert!(samples.last().unwrap().abs_diff_eq(control[2], 1e-5));
        // the middle control point is hit exactly at a segment boundary
        assert!(samples[8].abs_diff_eq(control[1], 1e-5));
    }

    #[test]
    fn finish_curve_commits_a_cluster_and_clears_the_draft() {
        let mut clusters = SceneContainer::new(GeometryKind::PointSet);
        let mut actors = ActorRegistry::new();
        let mut renderer = SoftwareRenderer::new(Viewport::new(640, 480));
        let mut engine = EditEngine::new();

        engine.curve_pick(Vec2::new(200.0, 240.0), &mut renderer).unwrap();
        engine.curve_pick(Vec2::new(320.0, 200.0), &mut renderer).unwrap();
        engine.curve_pick(Vec2::new(440.0, 240.0), &mut renderer).unwrap();
        assert_eq!(engine.curve_point_count(), 3);
        assert!(renderer.overlay_count() > 0);

        let id = engine
            .finish_curve(&mut clusters, &mut actors, &mut renderer)
            .unwrap()
            .unwrap();
        let geometry = clusters.get(id).unwrap();
        assert!(geometry.point_count() > 3);
        assert!(geometry.meta.contains_key("curve_control_points"));
        assert_eq!(engine.curve_point_count(), 0);
        assert_eq!(renderer.overlay_count(), 0);
    }

    #[test]
    fn finish_curve_discards_short_drafts() {
        let mut clusters = SceneContainer::new(GeometryKind::PointSet);
        let mut actors = ActorRegistry::new();
        let mut renderer = SoftwareRenderer::new(Viewport::new(640, 480));
        let mut engine = EditEngine::new();

        engine.curve_pick(Vec2::new(320.0, 240.0), &mut renderer).unwrap();
        let result = engine
            .finish_curve(&mut clusters, &mut actors, &mut renderer)
            .unwrap();
        assert_eq!(result, None);
        assert!(clusters.is_empty());
        assert_eq!(renderer.overlay_count(), 0);
    }

    #[test]
    fn extract_selection_splits_and_consumes() {
        let mut clusters = SceneContainer::new(GeometryKind::PointSet);
        let mut actors = ActorRegistry::new();
        let mut renderer = SoftwareRenderer::new(Viewport::new(640, 480));
        let partial = clusters
            .add(GeometrySpec::points(vec![
                Vec3::new(-50.0, 0.0, 0.0),
                Vec3::new(50.0, 0.0, 0.0),
            ]))
            .unwrap();
        let consumed = clusters
            .add(GeometrySpec::points(vec![Vec3::new(-40.0, 20.0, 0.0)]))
            .unwrap();
        actors.sync_container(&mut clusters, &mut renderer);

        let mut engine = EditEngine::new();
        // rectangle over the left half of the viewport
        let total = engine.select_rect(
            Vec2::ZERO,
            Vec2::new(320.0, 480.0),
            false,
            &mut clusters,
            &mut actors,
            &mut renderer,
        );
        assert_eq!(total, 2);

        let new_id = engine
            .extract_selection(&mut clusters, &mut actors, &mut renderer)
            .unwrap()
            .unwrap();
        assert_eq!(clusters.get(new_id).unwrap().point_count(), 2);
        assert_eq!(clusters.get(partial).unwrap().point_count(), 1);
        assert!(!clusters.contains(consumed));
        assert_eq!(engine.selected_point_count(), 0);
    }

    #[test]
    fn cleanup_clears_face_and_curve_state() {
        let (mut models, mut actors, mut renderer, id) = setup_mesh();
        let mut engine = EditEngine::new();

        let world = models.get(id).unwrap().points()[0];
        engine
            .mesh_add_pick(screen_of(&renderer, world), &mut models, &mut actors, &mut renderer)
            .unwrap();
        engine.curve_pick(Vec2::new(100.0, 100.0), &mut renderer);
        assert!(renderer.overlay_count() > 0);

        engine.cleanup(&mut renderer);
        assert_eq!(engine.pending_face_len(), 0);
        assert_eq!(engine.curve_point_count(), 0);
        assert_eq!(engine.face_selection(), None);
        assert_eq!(renderer.overlay_count(), 0);
    }
}
