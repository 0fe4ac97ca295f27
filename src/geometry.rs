use std::collections::BTreeMap;

use bitflags::bitflags;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{SceneError, SceneResult};

/// Stable identity of a scene entity. Allocated by the container's
/// [`IdAllocator`](crate::scene::IdAllocator), never reused in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeometryId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
    PointSet,
    Mesh,
}

const ID_NAMESPACE_SHIFT: u32 = 32;

impl GeometryKind {
    /// Base of this kind's id namespace. The session holds one container
    /// per kind and one actor registry across both, so ids must be unique
    /// across containers, not just within one.
    pub(crate) const fn id_base(self) -> u64 {
        (self as u64) << ID_NAMESPACE_SHIFT
    }

    pub(crate) fn owns_id(self, id: GeometryId) -> bool {
        id.0 >> ID_NAMESPACE_SHIFT == self as u64
    }
}

bitflags! {
    /// Buffers that changed since the last render sync.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DirtyFlags: u8 {
        const POSITIONS  = 1 << 0;
        const NORMALS    = 1 << 1;
        const COLORS     = 1 << 2;
        const TOPOLOGY   = 1 << 3;
        const APPEARANCE = 1 << 4;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appearance {
    pub base_color: [f32; 3],
    pub highlight_color: [f32; 3],
    pub point_size: f32,
    pub opacity: f32,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            base_color: [0.7, 0.7, 0.7],
            highlight_color: [0.388, 0.4, 0.945],
            point_size: 8.0,
            opacity: 1.0,
        }
    }
}

/// Axis-aligned bounds of an entity, used for camera fitting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryBounds {
    pub min: Vec3,
    pub max: Vec3,
    pub center: Vec3,
    pub radius: f32,
}

impl GeometryBounds {
    pub fn from_points(points: &[Vec3]) -> Self {
        if points.is_empty() {
            return Self { min: Vec3::ZERO, max: Vec3::ZERO, center: Vec3::ZERO, radius: 0.0 };
        }
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for point in points {
            min = min.min(*point);
            max = max.max(*point);
        }
        let center = (min + max) * 0.5;
        let mut radius: f32 = 0.0;
        for point in points {
            radius = radius.max((*point - center).length());
        }
        Self { min, max, center, radius }
    }

    pub fn union(self, other: Self) -> Self {
        let min = self.min.min(other.min);
        let max = self.max.max(other.max);
        let center = (min + max) * 0.5;
        let radius = (max - center).length();
        Self { min, max, center, radius }
    }
}

/// A single point-cloud cluster or triangular-mesh model.
///
/// Owns its vertex buffer plus optional per-vertex attributes. Mutators
/// validate before touching any buffer; a returned error means the entity
/// is unchanged.
#[derive(Debug, Clone)]
pub struct Geometry {
    id: GeometryId,
    kind: GeometryKind,
    points: Vec<Vec3>,
    normals: Option<Vec<Vec3>>,
    color_overrides: Option<Vec<[f32; 3]>>,
    faces: Vec<[u32; 3]>,
    pub appearance: Appearance,
    highlighted: bool,
    visible: bool,
    pub meta: BTreeMap<String, serde_json::Value>,
    dirty: DirtyFlags,
}

impl Geometry {
    pub fn new(id: GeometryId, kind: GeometryKind) -> Self {
        Self {
            id,
            kind,
            points: Vec::new(),
            normals: None,
            color_overrides: None,
            faces: Vec::new(),
            appearance: Appearance::default(),
            highlighted: false,
            visible: true,
            meta: BTreeMap::new(),
            dirty: DirtyFlags::all(),
        }
    }

    pub fn id(&self) -> GeometryId {
        self.id
    }

    pub fn kind(&self) -> GeometryKind {
        self.kind
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    pub fn normals(&self) -> Option<&[Vec3]> {
        self.normals.as_deref()
    }

    pub fn color_overrides(&self) -> Option<&[[f32; 3]]> {
        self.color_overrides.as_deref()
    }

    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_highlighted(&self) -> bool {
        self.highlighted
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn name(&self) -> Option<&str> {
        self.meta.get("name").and_then(|value| value.as_str())
    }

    pub fn bounds(&self) -> GeometryBounds {
        GeometryBounds::from_points(&self.points)
    }

    /// Appends vertices from a flat `[x, y, z, x, y, z, ...]` slice.
    ///
    /// Existing normals are discarded: an appended vertex has none, and a
    /// partial normal buffer would break the matching-length invariant.
    pub fn add_points(&mut self, coords: &[f32]) -> SceneResult<()> {
        if coords.len() % 3 != 0 {
            return Err(SceneError::Shape { len: coords.len() });
        }
        self.points
            .extend(coords.chunks_exact(3).map(|c| Vec3::new(c[0], c[1], c[2])));
        if self.normals.take().is_some() {
            self.dirty |= DirtyFlags::NORMALS;
        }
        self.color_overrides = None;
        self.dirty |= DirtyFlags::POSITIONS | DirtyFlags::COLORS;
        Ok(())
    }

    pub fn add_point(&mut self, point: Vec3) {
        // Never fails: a Vec3 is 3D by construction.
        self.points.push(point);
        if self.normals.take().is_some() {
            self.dirty |= DirtyFlags::NORMALS;
        }
        self.color_overrides = None;
        self.dirty |= DirtyFlags::POSITIONS | DirtyFlags::COLORS;
    }

    /// Replaces the per-vertex normals. Length must match the positions.
    pub fn set_normals(&mut self, normals: Vec<Vec3>) -> SceneResult<()> {
        if normals.len() != self.points.len() {
            return Err(SceneError::Shape { len: normals.len() });
        }
        self.normals = Some(normals);
        self.dirty |= DirtyFlags::NORMALS;
        Ok(())
    }

    /// Replaces the face list after validating every index is in range.
    pub fn set_faces(&mut self, faces: Vec<[u32; 3]>) -> SceneResult<()> {
        let vertex_count = self.points.len();
        for face in &faces {
            for &index in face {
                if index as usize >= vertex_count {
                    return Err(SceneError::Topology { index, vertex_count });
                }
            }
        }
        self.faces = faces;
        self.dirty |= DirtyFlags::TOPOLOGY;
        Ok(())
    }

    /// Appends one triangular face in the given vertex order.
    ///
    /// Only index range is checked; degenerate or duplicate faces pass
    /// through and the winding is whatever order the caller accumulated.
    pub fn add_face(&mut self, v0: u32, v1: u32, v2: u32) -> SceneResult<()> {
        let vertex_count = self.points.len();
        for index in [v0, v1, v2] {
            if index as usize >= vertex_count {
                return Err(SceneError::Topology { index, vertex_count });
            }
        }
        self.faces.push([v0, v1, v2]);
        self.dirty |= DirtyFlags::TOPOLOGY;
        Ok(())
    }

    /// Removes one face, leaving now-unreferenced vertices in place
    /// (polygon-soup semantics).
    pub fn remove_face(&mut self, face_index: usize) -> SceneResult<()> {
        if face_index >= self.faces.len() {
            return Err(SceneError::FaceIndex { index: face_index, face_count: self.faces.len() });
        }
        self.faces.remove(face_index);
        self.dirty |= DirtyFlags::TOPOLOGY;
        Ok(())
    }

    /// Sets a per-vertex color override for the given vertex ids.
    /// Out-of-range ids are skipped, not rejected; a selection sweep may
    /// reference vertices that were trimmed away in the meantime.
    pub fn recolor(&mut self, point_ids: &[u32], color: [f32; 3]) {
        let base = self.appearance.base_color;
        let overrides = self
            .color_overrides
            .get_or_insert_with(|| vec![base; self.points.len()]);
        overrides.resize(self.points.len(), base);
        for &id in point_ids {
            if let Some(slot) = overrides.get_mut(id as usize) {
                *slot = color;
            }
        }
        self.dirty |= DirtyFlags::COLORS;
    }

    pub fn clear_color_overrides(&mut self) {
        if self.color_overrides.take().is_some() {
            self.dirty |= DirtyFlags::COLORS;
        }
    }

    pub fn set_highlight(&mut self, highlighted: bool) {
        if self.highlighted != highlighted {
            self.highlighted = highlighted;
            self.dirty |= DirtyFlags::APPEARANCE;
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        if self.visible != visible {
            self.visible = visible;
            self.dirty |= DirtyFlags::APPEARANCE;
        }
    }

    pub fn toggle_visible(&mut self) {
        self.visible = !self.visible;
        self.dirty |= DirtyFlags::APPEARANCE;
    }

    pub fn set_appearance(&mut self, appearance: Appearance) {
        self.appearance = appearance;
        self.dirty |= DirtyFlags::APPEARANCE;
    }

    /// Keeps only the vertices whose mask entry is true, along with their
    /// normals and color overrides. Faces are cleared: index remapping
    /// across an arbitrary mask is the caller's job, and every in-tree
    /// caller operates on point clusters.
    pub fn retain_points(&mut self, keep: &[bool]) -> SceneResult<()> {
        if keep.len() != self.points.len() {
            return Err(SceneError::Shape { len: keep.len() });
        }
        let mut index = 0;
        self.points.retain(|_| {
            let kept = keep[index];
            index += 1;
            kept
        });
        if let Some(normals) = self.normals.as_mut() {
            let mut index = 0;
            normals.retain(|_| {
                let kept = keep[index];
                index += 1;
                kept
            });
        }
        if let Some(colors) = self.color_overrides.as_mut() {
            let mut index = 0;
            colors.retain(|_| {
                let kept = keep[index];
                index += 1;
                kept
            });
        }
        if !self.faces.is_empty() {
            self.faces.clear();
            self.dirty |= DirtyFlags::TOPOLOGY;
        }
        self.dirty |= DirtyFlags::POSITIONS | DirtyFlags::NORMALS | DirtyFlags::COLORS;
        Ok(())
    }

    /// Flags and clears the pending dirty set for a render sync pass.
    pub fn take_dirty(&mut self) -> DirtyFlags {
        let dirty = self.dirty;
        self.dirty = DirtyFlags::empty();
        dirty
    }

    pub fn mark_all_dirty(&mut self) {
        self.dirty = DirtyFlags::all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(kind: GeometryKind) -> Geometry {
        Geometry::new(GeometryId(0), kind)
    }

    #[test]
    fn add_points_rejects_ragged_input() {
        let mut geometry = entity(GeometryKind::PointSet);
        let err = geometry.add_points(&[0.0, 1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(err, SceneError::Shape { len: 4 });
        assert_eq!(geometry.point_count(), 0);

        geometry.add_points(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(geometry.point_count(), 2);
        assert_eq!(geometry.points()[1], Vec3::new(3.0, 4.0, 5.0));
    }

    #[test]
    fn set_faces_validates_before_applying() {
        let mut geometry = entity(GeometryKind::Mesh);
        geometry.add_points(&[0.0; 9]).unwrap();
        geometry.set_faces(vec![[0, 1, 2]]).unwrap();

        let err = geometry.set_faces(vec![[0, 1, 3]]).unwrap_err();
        assert_eq!(err, SceneError::Topology { index: 3, vertex_count: 3 });
        // Prior face list untouched on failure.
        assert_eq!(geometry.faces(), &[[0, 1, 2]]);
    }

    #[test]
    fn add_face_appends_in_click_order() {
        let mut geometry = entity(GeometryKind::Mesh);
        geometry.add_points(&[0.0; 12]).unwrap();
        let before = geometry.face_count();
        geometry.add_face(2, 0, 3).unwrap();
        assert_eq!(geometry.face_count(), before + 1);
        assert_eq!(geometry.faces()[before], [2, 0, 3]);
        // Permissive: a degenerate face is accepted.
        geometry.add_face(1, 1, 1).unwrap();
    }

    #[test]
    fn remove_face_twice_fails_soft() {
        let mut geometry = entity(GeometryKind::Mesh);
        geometry.add_points(&[0.0; 12]).unwrap();
        geometry.set_faces(vec![[0, 1, 2], [1, 2, 3]]).unwrap();

        geometry.remove_face(1).unwrap();
        let err = geometry.remove_face(1).unwrap_err();
        assert_eq!(err, SceneError::FaceIndex { index: 1, face_count: 1 });
        assert_eq!(geometry.face_count(), 1);
    }

    #[test]
    fn recolor_skips_out_of_range_ids() {
        let mut geometry = entity(GeometryKind::PointSet);
        geometry.add_points(&[0.0; 9]).unwrap();
        geometry.recolor(&[1, 99], [1.0, 0.0, 0.0]);
        let overrides = geometry.color_overrides().unwrap();
        assert_eq!(overrides.len(), 3);
        assert_eq!(overrides[1], [1.0, 0.0, 0.0]);
        assert_eq!(overrides[0], geometry.appearance.base_color);
    }

    #[test]
    fn retain_points_drops_faces() {
        let mut geometry = entity(GeometryKind::Mesh);
        geometry.add_points(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]).unwrap();
        geometry.set_faces(vec![[0, 1, 2]]).unwrap();
        geometry.retain_points(&[true, false, true]).unwrap();
        assert_eq!(geometry.point_count(), 2);
        assert_eq!(geometry.face_count(), 0);
    }

    #[test]
    fn bounds_cover_all_points() {
        let bounds = GeometryBounds::from_points(&[
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(3.0, 2.0, -2.0),
        ]);
        assert_eq!(bounds.min, Vec3::new(-1.0, 0.0, -2.0));
        assert_eq!(bounds.max, Vec3::new(3.0, 2.0, 0.0));
        assert!(bounds.radius > 0.0);
    }

    #[test]
    fn union_away_from_the_origin_stays_there() {
        let a = GeometryBounds::from_points(&[Vec3::new(100.0, 10.0, 0.0)]);
        let b = GeometryBounds::from_points(&[Vec3::new(110.0, 10.0, 0.0)]);
        let union = a.union(b);
        assert_eq!(union.min, Vec3::new(100.0, 10.0, 0.0));
        assert_eq!(union.max, Vec3::new(110.0, 10.0, 0.0));
        assert_eq!(union.center, Vec3::new(105.0, 10.0, 0.0));
    }
}
