use anyhow::{bail, Context, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::geometry::{Appearance, Geometry, GeometryId, GeometryKind};
use crate::scene::SceneContainer;

pub const SESSION_VERSION: u32 = 1;

/// On-disk form of one entity. Coordinates are stored flat (x y z per
/// vertex) and metadata values as JSON strings so both the JSON and the
/// binary codec handle them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryData {
    pub id: u64,
    pub points: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normals: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faces: Vec<u32>,
    pub appearance: Appearance,
    pub visible: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl GeometryData {
    fn from_geometry(geometry: &Geometry) -> Self {
        Self {
            id: geometry.id().0,
            points: geometry.points().iter().flat_map(|p| p.to_array()).collect(),
            normals: geometry
                .normals()
                .map(|normals| normals.iter().flat_map(|n| n.to_array()).collect()),
            faces: geometry.faces().iter().flatten().copied().collect(),
            appearance: geometry.appearance.clone(),
            visible: geometry.is_visible(),
            meta: geometry
                .meta
                .iter()
                .map(|(key, value)| (key.clone(), value.to_string()))
                .collect(),
        }
    }

    fn into_geometry(self, container_kind: GeometryKind) -> Result<Geometry> {
        if self.faces.len() % 3 != 0 {
            bail!("entity {} has a non-triangular face list ({} indices)", self.id, self.faces.len());
        }
        let kind = if self.faces.is_empty() { container_kind } else { GeometryKind::Mesh };
        let mut geometry = Geometry::new(GeometryId(self.id), kind);
        geometry
            .add_points(&self.points)
            .with_context(|| format!("entity {}: bad position buffer", self.id))?;
        if let Some(normals) = self.normals {
            let normals: Vec<Vec3> = normals
                .chunks_exact(3)
                .map(|n| Vec3::new(n[0], n[1], n[2]))
                .collect();
            geometry
                .set_normals(normals)
                .with_context(|| format!("entity {}: bad normal buffer", self.id))?;
        }
        if !self.faces.is_empty() {
            let faces: Vec<[u32; 3]> =
                self.faces.chunks_exact(3).map(|f| [f[0], f[1], f[2]]).collect();
            geometry
                .set_faces(faces)
                .with_context(|| format!("entity {}: bad face list", self.id))?;
        }
        geometry.appearance = self.appearance;
        geometry.set_visible(self.visible);
        for (key, raw) in self.meta {
            let value = serde_json::from_str(&raw)
                .unwrap_or_else(|_| serde_json::Value::String(raw.clone()));
            geometry.meta.insert(key, value);
        }
        Ok(geometry)
    }
}

/// A complete snapshot of both containers: every cluster and model with
/// its attributes and appearance. Selection and transient edit state are
/// per-sitting and deliberately not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub version: u32,
    pub clusters: Vec<GeometryData>,
    pub models: Vec<GeometryData>,
}

impl Session {
    pub fn capture(clusters: &SceneContainer, models: &SceneContainer) -> Self {
        Self {
            version: SESSION_VERSION,
            clusters: clusters.iter().map(GeometryData::from_geometry).collect(),
            models: models.iter().map(GeometryData::from_geometry).collect(),
        }
    }

    /// Rebuilds both containers. Entity ids round-trip, so render
    /// bindings from a previous sitting never alias restored entities.
    pub fn restore(self) -> Result<(SceneContainer, SceneContainer)> {
        if self.version > SESSION_VERSION {
            bail!("session version {} is newer than supported version {}", self.version, SESSION_VERSION);
        }
        let mut clusters = SceneContainer::new(GeometryKind::PointSet);
        for data in self.clusters {
            let geometry = data.into_geometry(GeometryKind::PointSet)?;
            clusters.insert_existing(geometry);
        }
        let mut models = SceneContainer::new(GeometryKind::Mesh);
        for data in self.models {
            let geometry = data.into_geometry(GeometryKind::Mesh)?;
            models.insert_existing(geometry);
        }
        Ok((clusters, models))
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Reading session file {}", path.display()))?;
        let session = serde_json::from_slice::<Session>(&bytes)
            .with_context(|| format!("Parsing session file {}", path.display()))?;
        Ok(session)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating session directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json.as_bytes())
            .with_context(|| format!("Writing session file {}", path.display()))?;
        Ok(())
    }

    #[cfg(feature = "binary_session")]
    pub fn load_binary_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let compressed =
            fs::read(path).with_context(|| format!("Reading session file {}", path.display()))?;
        let payload = lz4_flex::decompress_size_prepended(&compressed)
            .with_context(|| format!("Decompressing session file {}", path.display()))?;
        let session = bincode::deserialize::<Session>(&payload)
            .with_context(|| format!("Decoding session file {}", path.display()))?;
        Ok(session)
    }

    #[cfg(feature = "binary_session")]
    pub fn save_binary_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating session directory {}", parent.display()))?;
        }
        let payload = bincode::serialize(self).context("Encoding session")?;
        let compressed = lz4_flex::compress_prepend_size(&payload);
        fs::write(path, compressed)
            .with_context(|| format!("Writing session file {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::GeometrySpec;

    fn populated_containers() -> (SceneContainer, SceneContainer) {
        let mut clusters = SceneContainer::new(GeometryKind::PointSet);
        let id = clusters
            .add(GeometrySpec::points(vec![Vec3::ZERO, Vec3::X, Vec3::Y]))
            .unwrap();
        clusters.get_mut(id).unwrap().meta.insert("name".into(), serde_json::json!("membrane"));
        clusters.get_mut(id).unwrap().set_visible(false);

        let mut models = SceneContainer::new(GeometryKind::Mesh);
        models
            .add(GeometrySpec::mesh(
                vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                vec![[0, 1, 2]],
            ))
            .unwrap();
        (clusters, models)
    }

    #[test]
    fn snapshot_round_trips_ids_and_attributes() {
        let (clusters, models) = populated_containers();
        let session = Session::capture(&clusters, &models);
        let (restored_clusters, restored_models) = session.restore().unwrap();

        assert_eq!(restored_clusters.len(), 1);
        assert_eq!(restored_models.len(), 1);
        let original = clusters.iter().next().unwrap();
        let restored = restored_clusters.get(original.id()).unwrap();
        assert_eq!(restored.points(), original.points());
        assert_eq!(restored.meta.get("name"), Some(&serde_json::json!("membrane")));
        assert!(!restored.is_visible());
        assert_eq!(restored_models.iter().next().unwrap().faces(), &[[0, 1, 2]]);
    }

    #[test]
    fn restored_container_allocates_fresh_ids() {
        let (clusters, models) = populated_containers();
        let session = Session::capture(&clusters, &models);
        let (mut restored, _) = session.restore().unwrap();
        let old_max = restored.order().iter().map(|id| id.0).max().unwrap();
        let new_id = restored.add(GeometrySpec::points(vec![Vec3::Z])).unwrap();
        assert!(new_id.0 > old_max);
    }

    #[test]
    fn corrupt_face_list_is_rejected() {
        let data = GeometryData {
            id: 0,
            points: vec![0.0, 0.0, 0.0],
            normals: None,
            faces: vec![0, 1, 7],
            appearance: Appearance::default(),
            visible: true,
            meta: BTreeMap::new(),
        };
        assert!(data.into_geometry(GeometryKind::Mesh).is_err());
    }

    #[test]
    fn json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let (clusters, models) = populated_containers();
        let session = Session::capture(&clusters, &models);
        session.save_to_path(&path).unwrap();

        let loaded = Session::load_from_path(&path).unwrap();
        assert_eq!(loaded.version, SESSION_VERSION);
        assert_eq!(loaded.clusters.len(), 1);
        assert_eq!(loaded.models.len(), 1);
    }

    #[test]
    fn newer_version_is_refused() {
        let session = Session { version: SESSION_VERSION + 1, clusters: vec![], models: vec![] };
        assert!(session.restore().is_err());
    }

    #[cfg(feature = "binary_session")]
    #[test]
    fn binary_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.csb");
        let (clusters, models) = populated_containers();
        Session::capture(&clusters, &models).save_binary_to_path(&path).unwrap();
        let loaded = Session::load_binary_from_path(&path).unwrap();
        assert_eq!(loaded.clusters.len(), 1);
    }
}
