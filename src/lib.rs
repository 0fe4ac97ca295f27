pub mod actors;
pub mod camera3d;
pub mod config;
pub mod editing;
pub mod error;
pub mod events;
pub mod geometry;
pub mod modes;
pub mod picking;
pub mod renderer;
pub mod scene;
pub mod session;
pub mod worker;

pub use error::{SceneError, SceneResult};
pub use geometry::{Geometry, GeometryId, GeometryKind};
pub use scene::{GeometrySpec, SceneContainer};

pub(crate) fn wrap_angle(mut radians: f32) -> f32 {
    let two_pi = 2.0 * std::f32::consts::PI;
    while radians > std::f32::consts::PI {
        radians -= two_pi;
    }
    while radians < -std::f32::consts::PI {
        radians += two_pi;
    }
    radians
}
