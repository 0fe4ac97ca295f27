use thiserror::Error;

use crate::geometry::GeometryId;

/// Errors raised by scene and geometry mutators.
///
/// Every variant follows validate-then-apply: when a mutator returns an
/// error, no state was changed. Callers recover locally (status message,
/// operation aborted); none of these propagate as process failures.
#[derive(Debug, Error, PartialEq)]
pub enum SceneError {
    /// Flat coordinate input whose length is not a multiple of three.
    #[error("expected flat 3D coordinates, got {len} values")]
    Shape { len: usize },

    /// A face references a vertex index outside the position buffer.
    #[error("face index {index} out of range for {vertex_count} vertices")]
    Topology { index: u32, vertex_count: usize },

    /// Face removal addressed a slot past the end of the face list.
    #[error("face {index} out of range for {face_count} faces")]
    FaceIndex { index: usize, face_count: usize },

    /// An operation required at least one selected entity.
    #[error("operation requires at least one selected entity")]
    EmptySelection,

    /// A face-construction pick landed on a different entity than the
    /// one the in-progress face started on.
    #[error("pick hit entity {got:?} while building a face on {active:?}")]
    CrossEntity { active: GeometryId, got: GeometryId },
}

pub type SceneResult<T> = Result<T, SceneError>;
