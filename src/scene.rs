use std::collections::{BTreeMap, BTreeSet, HashMap};

use glam::Vec3;

use crate::error::{SceneError, SceneResult};
use crate::events::{EventBus, SceneEvent};
use crate::geometry::{Appearance, Geometry, GeometryBounds, GeometryId, GeometryKind};

/// Hands out entity ids for one container. Monotonic within a session,
/// never reused, never shared as global state. Each container allocates
/// from its kind's namespace so the session's two containers never hand
/// out the same id.
#[derive(Debug)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn for_kind(kind: GeometryKind) -> Self {
        Self { next: kind.id_base() }
    }

    pub fn allocate(&mut self) -> GeometryId {
        let id = GeometryId(self.next);
        self.next += 1;
        id
    }
}

/// Everything needed to construct a new entity in one call.
#[derive(Debug, Default, Clone)]
pub struct GeometrySpec {
    pub points: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub faces: Vec<[u32; 3]>,
    pub appearance: Option<Appearance>,
    pub name: Option<String>,
}

impl GeometrySpec {
    pub fn points(points: Vec<Vec3>) -> Self {
        Self { points, ..Default::default() }
    }

    pub fn mesh(points: Vec<Vec3>, faces: Vec<[u32; 3]>) -> Self {
        Self { points, faces, ..Default::default() }
    }
}

/// Ordered collection of entities of one kind. Two instances exist per
/// session: one for point clusters, one for mesh models. Insertion order
/// is display/list order.
pub struct SceneContainer {
    kind: GeometryKind,
    order: Vec<GeometryId>,
    entries: HashMap<GeometryId, Geometry>,
    selected: BTreeSet<GeometryId>,
    allocator: IdAllocator,
    pub events: EventBus,
}

impl SceneContainer {
    pub fn new(kind: GeometryKind) -> Self {
        Self {
            kind,
            order: Vec::new(),
            entries: HashMap::new(),
            selected: BTreeSet::new(),
            allocator: IdAllocator::for_kind(kind),
            events: EventBus::default(),
        }
    }

    pub fn kind(&self) -> GeometryKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: GeometryId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn order(&self) -> &[GeometryId] {
        &self.order
    }

    pub fn get(&self, id: GeometryId) -> Option<&Geometry> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: GeometryId) -> Option<&mut Geometry> {
        self.entries.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Geometry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// Constructs and registers a new entity, returning its stable id.
    pub fn add(&mut self, spec: GeometrySpec) -> SceneResult<GeometryId> {
        let id = self.allocator.allocate();
        let kind = if spec.faces.is_empty() { self.kind } else { GeometryKind::Mesh };
        let mut geometry = Geometry::new(id, kind);

        // Validate through the entity mutators so a bad spec leaves the
        // container untouched (the id gap is fine, ids are opaque).
        for point in &spec.points {
            geometry.add_point(*point);
        }
        if let Some(normals) = spec.normals {
            geometry.set_normals(normals)?;
        }
        if !spec.faces.is_empty() {
            geometry.set_faces(spec.faces)?;
        }
        if let Some(appearance) = spec.appearance {
            geometry.set_appearance(appearance);
        }
        if let Some(name) = spec.name {
            geometry.meta.insert("name".into(), serde_json::Value::String(name));
        }

        self.order.push(id);
        self.entries.insert(id, geometry);
        self.events.push(SceneEvent::DataChanged);
        Ok(id)
    }

    pub(crate) fn insert_existing(&mut self, geometry: Geometry) {
        let id = geometry.id();
        self.allocator.next = self.allocator.next.max(id.0 + 1);
        self.order.push(id);
        self.entries.insert(id, geometry);
    }

    /// Removes the listed entities. Unknown ids are ignored; one
    /// `DataChanged` notification covers the whole batch. Returns the ids
    /// that were actually removed so the caller can release their render
    /// bindings.
    pub fn remove(&mut self, ids: &[GeometryId]) -> Vec<GeometryId> {
        let mut removed = Vec::new();
        for id in ids {
            if self.entries.remove(id).is_some() {
                removed.push(*id);
                self.selected.remove(id);
            }
        }
        if !removed.is_empty() {
            self.order.retain(|id| !removed.contains(id));
            self.events.push(SceneEvent::DataChanged);
        }
        removed
    }

    pub fn clear(&mut self) -> Vec<GeometryId> {
        let all: Vec<GeometryId> = self.order.clone();
        self.remove(&all)
    }

    /// Unions the named entities into one new entity: positions (and
    /// faces, remapped by concatenation offset) in input order, appearance
    /// from the first input. Atomic: validation happens before any entity
    /// is touched. Merging a single id is a no-op returning that id.
    pub fn merge(&mut self, ids: &[GeometryId]) -> SceneResult<GeometryId> {
        let known: Vec<GeometryId> = ids.iter().copied().filter(|id| self.contains(*id)).collect();
        if known.is_empty() {
            return Err(SceneError::EmptySelection);
        }
        if known.len() == 1 {
            return Ok(known[0]);
        }

        let mut points = Vec::new();
        let mut faces = Vec::new();
        let mut normals: Option<Vec<Vec3>> = Some(Vec::new());
        let mut appearance = None;
        for id in &known {
            let Some(geometry) = self.entries.get(id) else { continue };
            let offset = points.len() as u32;
            points.extend_from_slice(geometry.points());
            faces.extend(geometry.faces().iter().map(|f| [f[0] + offset, f[1] + offset, f[2] + offset]));
            match (normals.as_mut(), geometry.normals()) {
                (Some(acc), Some(n)) => acc.extend_from_slice(n),
                // One input without normals drops normals from the union.
                _ => normals = None,
            }
            if appearance.is_none() {
                appearance = Some(geometry.appearance.clone());
            }
        }

        let merged = self.add(GeometrySpec { points, normals, faces, appearance, name: None })?;
        self.remove(&known);
        Ok(merged)
    }

    /// Partitions one entity's points by a label assignment. `None`
    /// entries stay behind: when every point carries a label the original
    /// is removed, otherwise it shrinks to the unlabeled remainder. Each
    /// label becomes one new entity, in ascending label order.
    pub fn split(&mut self, id: GeometryId, labels: &[Option<u32>]) -> SceneResult<Vec<GeometryId>> {
        let geometry = self.entries.get(&id).ok_or(SceneError::EmptySelection)?;
        if labels.len() != geometry.point_count() {
            return Err(SceneError::Shape { len: labels.len() });
        }

        let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (index, label) in labels.iter().enumerate() {
            if let Some(label) = label {
                groups.entry(*label).or_default().push(index);
            }
        }
        if groups.is_empty() {
            return Ok(Vec::new());
        }

        let appearance = geometry.appearance.clone();
        let points = geometry.points().to_vec();
        let normals = geometry.normals().map(<[Vec3]>::to_vec);

        let mut created = Vec::with_capacity(groups.len());
        for indices in groups.values() {
            let part_points: Vec<Vec3> = indices.iter().map(|&i| points[i]).collect();
            let part_normals = normals
                .as_ref()
                .map(|n| indices.iter().map(|&i| n[i]).collect());
            created.push(self.add(GeometrySpec {
                points: part_points,
                normals: part_normals,
                faces: Vec::new(),
                appearance: Some(appearance.clone()),
                name: None,
            })?);
        }

        if labels.iter().all(Option::is_some) {
            self.remove(&[id]);
        } else {
            let keep: Vec<bool> = labels.iter().map(Option::is_none).collect();
            if let Some(geometry) = self.entries.get_mut(&id) {
                geometry.retain_points(&keep)?;
            }
            self.events.push(SceneEvent::DataChanged);
        }
        Ok(created)
    }

    pub fn selected(&self) -> Vec<GeometryId> {
        self.order.iter().copied().filter(|id| self.selected.contains(id)).collect()
    }

    pub fn is_selected(&self, id: GeometryId) -> bool {
        self.selected.contains(&id)
    }

    /// Replaces the selection, propagating highlight flags to entities.
    pub fn select(&mut self, ids: &[GeometryId]) {
        self.selected = ids.iter().copied().filter(|id| self.entries.contains_key(id)).collect();
        self.apply_highlight();
        let selected = self.selected();
        self.events.push(SceneEvent::SelectionChanged { selected });
    }

    pub fn extend_selection(&mut self, ids: &[GeometryId]) {
        let mut merged: Vec<GeometryId> = self.selected.iter().copied().collect();
        merged.extend_from_slice(ids);
        self.select(&merged);
    }

    /// Clears the selection and the highlight flag on every entity.
    /// Always succeeds.
    pub fn deselect(&mut self) {
        self.selected.clear();
        self.apply_highlight();
        self.events.push(SceneEvent::SelectionChanged { selected: Vec::new() });
    }

    fn apply_highlight(&mut self) {
        for (id, geometry) in &mut self.entries {
            geometry.set_highlight(self.selected.contains(id));
        }
    }

    /// Flips visibility flags; `None` applies to the current selection.
    pub fn toggle_visibility(&mut self, ids: Option<&[GeometryId]>) {
        let targets: Vec<GeometryId> = match ids {
            Some(ids) => ids.to_vec(),
            None => self.selected(),
        };
        let mut changed = false;
        for id in targets {
            if let Some(geometry) = self.entries.get_mut(&id) {
                geometry.toggle_visible();
                changed = true;
            }
        }
        if changed {
            self.events.push(SceneEvent::DataChanged);
            self.events.push(SceneEvent::RedrawRequested);
        }
    }

    pub fn cluster_sizes(&self) -> Vec<(GeometryId, usize)> {
        self.iter().map(|g| (g.id(), g.point_count())).collect()
    }

    /// Clear-and-select every entity whose point count falls strictly
    /// inside `(lower, upper)`; an open upper bound selects everything
    /// above `lower`. Driven by the histogram cutoff widget.
    pub fn select_size_range(&mut self, lower: usize, upper: Option<usize>) {
        let ids: Vec<GeometryId> = self
            .iter()
            .filter(|g| g.point_count() > lower && upper.map_or(true, |u| g.point_count() < u))
            .map(|g| g.id())
            .collect();
        self.events.push(SceneEvent::CutoffChanged { value: lower as f32 });
        self.select(&ids);
    }

    /// Bounds of all visible, non-empty entities, for camera fitting.
    /// Emptiness is tracked through the accumulator so a scene away from
    /// the origin is not anchored to it.
    pub fn visible_bounds(&self) -> GeometryBounds {
        let mut bounds: Option<GeometryBounds> = None;
        for geometry in self.iter().filter(|g| g.is_visible() && g.point_count() > 0) {
            let next = geometry.bounds();
            bounds = Some(match bounds {
                Some(acc) => acc.union(next),
                None => next,
            });
        }
        bounds.unwrap_or_else(|| GeometryBounds::from_points(&[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container_with(points: &[&[f32]]) -> (SceneContainer, Vec<GeometryId>) {
        let mut container = SceneContainer::new(GeometryKind::PointSet);
        let ids = points
            .iter()
            .map(|coords| {
                let points = coords
                    .chunks_exact(3)
                    .map(|c| Vec3::new(c[0], c[1], c[2]))
                    .collect();
                container.add(GeometrySpec::points(points)).unwrap()
            })
            .collect();
        (container, ids)
    }

    #[test]
    fn ids_start_at_zero_and_never_repeat() {
        let (mut container, ids) = container_with(&[&[0.0; 3], &[1.0; 3]]);
        assert_eq!(ids, vec![GeometryId(0), GeometryId(1)]);
        container.remove(&[ids[1]]);
        let next = container.add(GeometrySpec::default()).unwrap();
        assert_eq!(next, GeometryId(2));
    }

    #[test]
    fn merge_singleton_is_identity() {
        let (mut container, ids) = container_with(&[&[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]]);
        let merged = container.merge(&[ids[0]]).unwrap();
        assert_eq!(merged, ids[0]);
        assert_eq!(container.get(ids[0]).unwrap().point_count(), 2);
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn merge_concatenates_in_input_order() {
        let (mut container, ids) =
            container_with(&[&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0], &[2.0, 0.0, 0.0]]);
        let merged = container.merge(&[ids[0], ids[1]]).unwrap();
        let geometry = container.get(merged).unwrap();
        assert_eq!(geometry.point_count(), 3);
        assert_eq!(geometry.points()[2], Vec3::new(2.0, 0.0, 0.0));
        assert!(!container.contains(ids[0]));
        assert!(!container.contains(ids[1]));
    }

    #[test]
    fn merge_empty_selection_errors() {
        let (mut container, _) = container_with(&[&[0.0; 3]]);
        assert_eq!(container.merge(&[]), Err(SceneError::EmptySelection));
    }

    #[test]
    fn merge_remaps_face_indices() {
        let mut container = SceneContainer::new(GeometryKind::Mesh);
        let tri = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let a = container.add(GeometrySpec::mesh(tri.clone(), vec![[0, 1, 2]])).unwrap();
        let b = container.add(GeometrySpec::mesh(tri, vec![[0, 1, 2]])).unwrap();
        let merged = container.merge(&[a, b]).unwrap();
        let geometry = container.get(merged).unwrap();
        assert_eq!(geometry.faces(), &[[0, 1, 2], [3, 4, 5]]);
    }

    #[test]
    fn split_full_partition_removes_original() {
        let (mut container, ids) =
            container_with(&[&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0]]);
        let created = container
            .split(ids[0], &[Some(0), Some(1), Some(0)])
            .unwrap();
        assert_eq!(created.len(), 2);
        assert!(!container.contains(ids[0]));
        assert_eq!(container.get(created[0]).unwrap().point_count(), 2);
        assert_eq!(container.get(created[1]).unwrap().point_count(), 1);
    }

    #[test]
    fn split_partial_partition_shrinks_original() {
        let (mut container, ids) =
            container_with(&[&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0]]);
        let created = container.split(ids[0], &[Some(0), None, None]).unwrap();
        assert_eq!(created.len(), 1);
        assert!(container.contains(ids[0]));
        assert_eq!(container.get(ids[0]).unwrap().point_count(), 2);
        assert_eq!(container.get(ids[0]).unwrap().points()[0], Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn deselect_clears_highlights() {
        let (mut container, ids) = container_with(&[&[0.0; 3], &[1.0; 3]]);
        container.select(&ids);
        assert!(container.get(ids[0]).unwrap().is_highlighted());
        container.deselect();
        assert!(container.selected().is_empty());
        assert!(!container.get(ids[0]).unwrap().is_highlighted());
        assert!(!container.get(ids[1]).unwrap().is_highlighted());
    }

    #[test]
    fn remove_ignores_unknown_and_prunes_selection() {
        let (mut container, ids) = container_with(&[&[0.0; 3], &[1.0; 3]]);
        container.select(&[ids[0]]);
        let removed = container.remove(&[ids[0], GeometryId(999)]);
        assert_eq!(removed, vec![ids[0]]);
        assert!(container.selected().is_empty());
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn size_range_selection_is_clear_and_select() {
        let (mut container, ids) =
            container_with(&[&[0.0; 3], &[0.0; 6], &[0.0; 9]]);
        container.select(&[ids[0]]);
        container.select_size_range(1, Some(3));
        assert_eq!(container.selected(), vec![ids[1]]);
    }
}
