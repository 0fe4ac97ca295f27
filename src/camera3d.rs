use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

use crate::picking::matrix_is_finite;

const DEFAULT_UP: Vec3 = Vec3::Y;
const FALLBACK_DISTANCE: f32 = 1000.0;

/// Render-target dimensions in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        if self.height > 0 {
            self.width as f32 / self.height as f32
        } else {
            1.0
        }
    }

    pub fn min_dimension(&self) -> f32 {
        self.width.min(self.height) as f32
    }
}

/// Perspective camera owned by the renderer; the core reads and writes
/// position, focal point and view-up through this struct.
#[derive(Debug, Clone)]
pub struct Camera3D {
    pub position: Vec3,
    pub focal_point: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera3D {
    pub fn new(position: Vec3, focal_point: Vec3, fov_y_radians: f32, near: f32, far: f32) -> Self {
        Self { position, focal_point, up: DEFAULT_UP, fov_y_radians, near, far }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.focal_point, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov_y_radians, aspect.max(0.0001), self.near, self.far)
    }

    pub fn distance_to_focal_point(&self) -> f32 {
        self.position.distance(self.focal_point)
    }

    /// World-space ray from the camera through a screen position.
    pub fn screen_ray(&self, screen: Vec2, viewport: Viewport) -> Option<(Vec3, Vec3)> {
        if viewport.width == 0 || viewport.height == 0 {
            return None;
        }
        let ndc_x = (2.0 * screen.x / viewport.width as f32) - 1.0;
        let ndc_y = 1.0 - (2.0 * screen.y / viewport.height as f32);
        let clip = Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
        let view_proj = self.projection_matrix(viewport.aspect()) * self.view_matrix();
        // A camera sitting on its focal point yields a NaN view matrix.
        if !matrix_is_finite(&view_proj) {
            return None;
        }
        let world = view_proj.inverse() * clip;
        if world.w.abs() < f32::EPSILON {
            return None;
        }
        let toward = (world.truncate() / world.w) - self.position;
        Some((self.position, toward.normalize()))
    }

    /// Projects a world point to screen pixels; `None` when behind the
    /// camera plane or the viewport is empty.
    pub fn project_point(&self, point: Vec3, viewport: Viewport) -> Option<Vec2> {
        if viewport.width == 0 || viewport.height == 0 {
            return None;
        }
        let view_proj = self.projection_matrix(viewport.aspect()) * self.view_matrix();
        if !matrix_is_finite(&view_proj) {
            return None;
        }
        let clip = view_proj * point.extend(1.0);
        if clip.w <= f32::EPSILON {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        let x = (ndc.x + 1.0) * 0.5 * viewport.width as f32;
        let y = (1.0 - ndc.y) * 0.5 * viewport.height as f32;
        Some(Vec2::new(x, y))
    }

    /// Re-centers on `center` and backs the camera off far enough that a
    /// sphere of `radius` fits the vertical field of view.
    pub fn fit(&mut self, center: Vec3, radius: f32) {
        let direction = (self.position - self.focal_point).normalize_or_zero();
        let direction = if direction.length_squared() > 0.0 { direction } else { Vec3::Z };
        let distance = if radius > 0.0 {
            radius / (self.fov_y_radians * 0.5).tan().max(1e-4)
        } else {
            FALLBACK_DISTANCE
        };
        self.focal_point = center;
        self.position = center + direction * distance;
    }
}

/// Named axis-aligned base views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisView {
    X,
    Y,
    Z,
}

impl AxisView {
    /// Canonical (view-up, offset-direction) pair for each axis.
    pub fn basis(self) -> (Vec3, Vec3) {
        match self {
            AxisView::X => (Vec3::Y, Vec3::X),
            AxisView::Y => (Vec3::X, Vec3::Y),
            AxisView::Z => (Vec3::new(1.0, 0.0, 1.0).normalize(), Vec3::Z),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRequest {
    pub axis: AxisView,
    pub aligned: bool,
    pub elevation: f32,
    pub azimuth: f32,
    pub pitch: f32,
}

impl ViewRequest {
    pub fn axis(axis: AxisView) -> Self {
        Self { axis, aligned: true, elevation: 0.0, azimuth: 0.0, pitch: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewOutcome {
    /// The base axis changed: the focal point was reset to the origin and
    /// the caller should ask the renderer to re-fit the view.
    pub axis_changed: bool,
}

/// Computes camera placement for named axis views with elevation,
/// azimuth and pitch rotation. Distance to the focal point is derived
/// from the live camera immediately before every recomputation so manual
/// zoom between view changes is respected.
#[derive(Debug, Default)]
pub struct ViewController {
    last: Option<ViewRequest>,
}

impl ViewController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_request(&self) -> Option<ViewRequest> {
        self.last
    }

    pub fn set_view(&mut self, camera: &mut Camera3D, request: ViewRequest) -> ViewOutcome {
        let axis_changed = self.last.map(|last| last.axis) != Some(request.axis);
        if axis_changed {
            camera.focal_point = Vec3::ZERO;
        }

        let mut distance = camera.distance_to_focal_point();
        if !distance.is_normal() {
            distance = FALLBACK_DISTANCE;
        }

        // Elevation about world Z, then azimuth about world Y, then pitch
        // about world X, applied to both the up and offset vectors.
        let rotation = Quat::from_axis_angle(Vec3::X, crate::wrap_angle(request.pitch.to_radians()))
            * Quat::from_axis_angle(Vec3::Y, crate::wrap_angle(request.azimuth.to_radians()))
            * Quat::from_axis_angle(Vec3::Z, crate::wrap_angle(request.elevation.to_radians()));

        let (base_up, base_offset) = request.axis.basis();
        let up = (rotation * base_up).normalize();
        let mut offset = (rotation * base_offset).normalize();
        if !request.aligned {
            offset = -offset;
        }

        camera.position = camera.focal_point + offset * distance;
        camera.up = up;
        self.last = Some(request);
        ViewOutcome { axis_changed }
    }

    /// Replays the last view with the aligned flag flipped. `None` when
    /// no view has ever been set.
    pub fn swap_direction(&mut self, camera: &mut Camera3D) -> Option<ViewOutcome> {
        let mut request = self.last?;
        request.aligned = !request.aligned;
        Some(self.set_view(camera, request))
    }
}
