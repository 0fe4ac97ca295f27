use std::collections::HashMap;

use glam::{Vec2, Vec3};

use crate::camera3d::{Camera3D, Viewport};
use crate::geometry::{Geometry, GeometryBounds};
use crate::picking::{nearest_projected_vertex, ray_aabb_intersection, ray_triangle_intersection};

/// Opaque reference to a renderable registered with the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderHandle(pub u64);

/// Opaque reference to a transient overlay (marker, face highlight,
/// curve preview). Overlays are never pickable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlayHandle(pub u64);

/// Interleaved upload format for point/mesh vertex buffers.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

/// Snapshot of one entity's renderable state, built by the actor
/// registry whenever the entity's dirty flags demand a re-sync.
#[derive(Debug, Clone)]
pub struct GeometryBuffers {
    pub positions: Vec<Vec3>,
    pub packed: Vec<PointVertex>,
    pub indices: Vec<u32>,
    pub bounds: GeometryBounds,
    pub point_size: f32,
    pub opacity: f32,
    pub visible: bool,
}

impl GeometryBuffers {
    pub fn from_geometry(geometry: &Geometry) -> Self {
        let fallback = if geometry.is_highlighted() {
            geometry.appearance.highlight_color
        } else {
            geometry.appearance.base_color
        };
        let overrides = geometry.color_overrides();
        let packed = geometry
            .points()
            .iter()
            .enumerate()
            .map(|(i, point)| PointVertex {
                position: point.to_array(),
                color: overrides.and_then(|o| o.get(i).copied()).unwrap_or(fallback),
            })
            .collect();
        let indices = geometry.faces().iter().flatten().copied().collect();
        Self {
            positions: geometry.points().to_vec(),
            packed,
            indices,
            bounds: geometry.bounds(),
            point_size: geometry.appearance.point_size,
            opacity: geometry.appearance.opacity,
            visible: geometry.is_visible(),
        }
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.packed)
    }

    pub fn triangle(&self, face: u32) -> Option<(Vec3, Vec3, Vec3)> {
        let base = face as usize * 3;
        let i = self.indices.get(base..base + 3)?;
        Some((
            self.positions[i[0] as usize],
            self.positions[i[1] as usize],
            self.positions[i[2] as usize],
        ))
    }

    pub fn triangle_count(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }
}

/// A resolved point pick: the hit renderable and the vertex inside it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPick {
    pub handle: RenderHandle,
    pub vertex: u32,
    pub world: Vec3,
    pub pixel_distance: f32,
}

/// A resolved cell pick: the hit renderable and the face inside it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellPick {
    pub handle: RenderHandle,
    pub face: u32,
    pub distance: f32,
}

#[derive(Debug, Clone)]
pub enum OverlayShape {
    Marker { position: Vec3 },
    FaceHighlight { corners: [Vec3; 3] },
    Polyline { points: Vec<Vec3> },
}

/// Boundary to the external 3D backend. The core tells it what geometry
/// to display and asks it screen-space pick questions; rasterization
/// itself lives on the other side.
pub trait Renderer {
    fn register(&mut self, buffers: GeometryBuffers) -> RenderHandle;
    fn unregister(&mut self, handle: RenderHandle);
    fn update(&mut self, handle: RenderHandle, buffers: GeometryBuffers);

    fn add_overlay(&mut self, shape: OverlayShape) -> OverlayHandle;
    fn remove_overlay(&mut self, handle: OverlayHandle);

    /// Nearest visible vertex within `tolerance_px` of `screen`, or
    /// `None` when the click missed everything.
    fn pick_point(&self, screen: Vec2, tolerance_px: f32) -> Option<PointPick>;
    /// Nearest visible face along the pick ray through `screen`.
    fn pick_cell(&self, screen: Vec2) -> Option<CellPick>;
    /// Vertex ids per renderable whose projections fall inside the
    /// screen rectangle.
    fn pick_rect(&self, min: Vec2, max: Vec2) -> Vec<(RenderHandle, Vec<u32>)>;

    fn camera(&self) -> &Camera3D;
    fn camera_mut(&mut self) -> &mut Camera3D;
    fn viewport(&self) -> Viewport;

    /// Re-center and re-scale the view to fit the given bounds.
    fn fit_view(&mut self, bounds: GeometryBounds);
    fn request_redraw(&mut self);
}

/// CPU-only reference renderer: keeps uploaded buffers and answers pick
/// queries with the crate's projection/ray math. Used headless and by
/// every interaction test; a GPU backend replaces it in the shell.
pub struct SoftwareRenderer {
    entries: HashMap<RenderHandle, GeometryBuffers>,
    registration_order: Vec<RenderHandle>,
    overlays: HashMap<u64, OverlayShape>,
    camera: Camera3D,
    viewport: Viewport,
    next_handle: u64,
    next_overlay: u64,
    redraws: u64,
}

impl SoftwareRenderer {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            entries: HashMap::new(),
            registration_order: Vec::new(),
            overlays: HashMap::new(),
            camera: Camera3D::new(
                Vec3::new(0.0, 0.0, 1000.0),
                Vec3::ZERO,
                30.0_f32.to_radians(),
                0.1,
                100_000.0,
            ),
            viewport,
            next_handle: 0,
            next_overlay: 0,
            redraws: 0,
        }
    }

    pub fn redraw_count(&self) -> u64 {
        self.redraws
    }

    pub fn overlay_count(&self) -> usize {
        self.overlays.len()
    }

    pub fn buffers(&self, handle: RenderHandle) -> Option<&GeometryBuffers> {
        self.entries.get(&handle)
    }

    fn visible_entries(&self) -> impl Iterator<Item = (RenderHandle, &GeometryBuffers)> {
        self.registration_order
            .iter()
            .filter_map(|handle| self.entries.get(handle).map(|b| (*handle, b)))
            .filter(|(_, buffers)| buffers.visible)
    }
}

impl Renderer for SoftwareRenderer {
    fn register(&mut self, buffers: GeometryBuffers) -> RenderHandle {
        let handle = RenderHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.insert(handle, buffers);
        self.registration_order.push(handle);
        handle
    }

    fn unregister(&mut self, handle: RenderHandle) {
        self.entries.remove(&handle);
        self.registration_order.retain(|h| *h != handle);
    }

    fn update(&mut self, handle: RenderHandle, buffers: GeometryBuffers) {
        if let Some(entry) = self.entries.get_mut(&handle) {
            *entry = buffers;
        }
    }

    fn add_overlay(&mut self, shape: OverlayShape) -> OverlayHandle {
        let handle = OverlayHandle(self.next_overlay);
        self.next_overlay += 1;
        self.overlays.insert(handle.0, shape);
        handle
    }

    fn remove_overlay(&mut self, handle: OverlayHandle) {
        self.overlays.remove(&handle.0);
    }

    fn pick_point(&self, screen: Vec2, tolerance_px: f32) -> Option<PointPick> {
        let mut best: Option<PointPick> = None;
        for (handle, buffers) in self.visible_entries() {
            let projected = buffers
                .positions
                .iter()
                .enumerate()
                .map(|(i, p)| (i as u32, self.camera.project_point(*p, self.viewport)));
            if let Some(hit) = nearest_projected_vertex(screen, tolerance_px, projected) {
                let better = best
                    .as_ref()
                    .map_or(true, |b| hit.pixel_distance < b.pixel_distance);
                if better {
                    best = Some(PointPick {
                        handle,
                        vertex: hit.index,
                        world: buffers.positions[hit.index as usize],
                        pixel_distance: hit.pixel_distance,
                    });
                }
            }
        }
        best
    }

    fn pick_cell(&self, screen: Vec2) -> Option<CellPick> {
        let (origin, dir) = self.camera.screen_ray(screen, self.viewport)?;
        let mut best: Option<CellPick> = None;
        for (handle, buffers) in self.visible_entries() {
            if buffers.triangle_count() == 0 {
                continue;
            }
            // Cheap bounds test before walking the triangle list.
            if ray_aabb_intersection(origin, dir, buffers.bounds.min, buffers.bounds.max).is_none() {
                continue;
            }
            for face in 0..buffers.triangle_count() {
                let Some((a, b, c)) = buffers.triangle(face) else { continue };
                if let Some(t) = ray_triangle_intersection(origin, dir, a, b, c) {
                    let closer = best.as_ref().map_or(true, |hit| t < hit.distance);
                    if closer {
                        best = Some(CellPick { handle, face, distance: t });
                    }
                }
            }
        }
        best
    }

    fn pick_rect(&self, min: Vec2, max: Vec2) -> Vec<(RenderHandle, Vec<u32>)> {
        let mut picked = Vec::new();
        for (handle, buffers) in self.visible_entries() {
            let mut ids = Vec::new();
            for (index, point) in buffers.positions.iter().enumerate() {
                if let Some(screen) = self.camera.project_point(*point, self.viewport) {
                    if screen.x >= min.x && screen.x <= max.x && screen.y >= min.y && screen.y <= max.y
                    {
                        ids.push(index as u32);
                    }
                }
            }
            if !ids.is_empty() {
                picked.push((handle, ids));
            }
        }
        picked
    }

    fn camera(&self) -> &Camera3D {
        &self.camera
    }

    fn camera_mut(&mut self) -> &mut Camera3D {
        &mut self.camera
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn fit_view(&mut self, bounds: GeometryBounds) {
        self.camera.fit(bounds.center, bounds.radius);
        self.redraws += 1;
    }

    fn request_redraw(&mut self) {
        self.redraws += 1;
    }
}
