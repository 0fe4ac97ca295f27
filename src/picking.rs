use glam::{Mat4, Vec2, Vec3};

/// Ray/triangle intersection (Moller-Trumbore). Returns the distance
/// along the ray, front and back faces alike.
pub fn ray_triangle_intersection(
    origin: Vec3,
    dir: Vec3,
    a: Vec3,
    b: Vec3,
    c: Vec3,
) -> Option<f32> {
    let edge1 = b - a;
    let edge2 = c - a;
    let p = dir.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < 1e-8 {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = edge2.dot(q) * inv_det;
    if t < 0.0 {
        return None;
    }
    Some(t)
}

pub fn ray_aabb_intersection(origin: Vec3, dir: Vec3, min: Vec3, max: Vec3) -> Option<(f32, Vec3)> {
    let mut t_min: f32 = 0.0;
    let mut t_max: f32 = f32::INFINITY;
    let origin_arr = origin.to_array();
    let dir_arr = dir.to_array();
    let min_arr = min.to_array();
    let max_arr = max.to_array();
    for i in 0..3 {
        let o = origin_arr[i];
        let d = dir_arr[i];
        let min_axis = min_arr[i];
        let max_axis = max_arr[i];
        if d.abs() < 1e-6 {
            if o < min_axis || o > max_axis {
                return None;
            }
        } else {
            let inv_d = 1.0 / d;
            let mut t1 = (min_axis - o) * inv_d;
            let mut t2 = (max_axis - o) * inv_d;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }
    }
    if t_max < 0.0 {
        return None;
    }
    let t_hit = if t_min >= 0.0 { t_min } else { t_max };
    let hit = origin + dir * t_hit;
    Some((t_hit, hit))
}

pub fn matrix_is_finite(mat: &Mat4) -> bool {
    mat.to_cols_array().iter().all(|v| v.is_finite())
}

pub fn intersect_ray_plane(
    origin: Vec3,
    dir: Vec3,
    plane_origin: Vec3,
    plane_normal: Vec3,
) -> Option<Vec3> {
    let denom = plane_normal.dot(dir);
    if denom.abs() < 1e-8 {
        return None;
    }
    let t = plane_normal.dot(plane_origin - origin) / denom;
    if t < 0.0 {
        return None;
    }
    Some(origin + dir * t)
}

/// Best candidate of a screen-space nearest-vertex search.
#[derive(Debug, Clone, Copy)]
pub struct NearestVertex {
    pub index: u32,
    pub pixel_distance: f32,
}

/// Scans projected vertex positions for the one nearest to `cursor`
/// within `tolerance_px`. Ties break toward the smaller pixel distance,
/// then toward the lower vertex index; the scan order guarantees the
/// latter because a later vertex only wins with a strictly smaller
/// distance.
pub fn nearest_projected_vertex(
    cursor: Vec2,
    tolerance_px: f32,
    projected: impl Iterator<Item = (u32, Option<Vec2>)>,
) -> Option<NearestVertex> {
    let mut best: Option<NearestVertex> = None;
    for (index, screen) in projected {
        let Some(screen) = screen else { continue };
        let pixel_distance = screen.distance(cursor);
        if pixel_distance > tolerance_px {
            continue;
        }
        let better = match best {
            Some(current) => pixel_distance < current.pixel_distance,
            None => true,
        };
        if better {
            best = Some(NearestVertex { index, pixel_distance });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_hits_triangle_interior() {
        let t = ray_triangle_intersection(
            Vec3::new(0.25, 0.25, 5.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::ZERO,
            Vec3::X,
            Vec3::Y,
        );
        assert!((t.unwrap() - 5.0).abs() < 1e-5);
    }

    #[test]
    fn ray_misses_triangle_outside_edge() {
        let t = ray_triangle_intersection(
            Vec3::new(0.9, 0.9, 5.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::ZERO,
            Vec3::X,
            Vec3::Y,
        );
        assert!(t.is_none());
    }

    #[test]
    fn ray_behind_triangle_is_not_a_hit() {
        let t = ray_triangle_intersection(
            Vec3::new(0.25, 0.25, -5.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::ZERO,
            Vec3::X,
            Vec3::Y,
        );
        assert!(t.is_none());
    }

    #[test]
    fn aabb_intersection_from_outside() {
        let hit = ray_aabb_intersection(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::splat(-1.0),
            Vec3::splat(1.0),
        );
        let (t, point) = hit.unwrap();
        assert!((t - 4.0).abs() < 1e-5);
        assert!((point.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn nearest_vertex_ties_break_to_lowest_index() {
        let cursor = Vec2::new(10.0, 10.0);
        let candidates = vec![
            (0, Some(Vec2::new(12.0, 10.0))),
            (1, Some(Vec2::new(12.0, 10.0))),
            (2, None),
        ];
        let best = nearest_projected_vertex(cursor, 5.0, candidates.into_iter()).unwrap();
        assert_eq!(best.index, 0);
    }

    #[test]
    fn nearest_vertex_respects_tolerance() {
        let cursor = Vec2::ZERO;
        let candidates = vec![(0, Some(Vec2::new(50.0, 0.0)))];
        assert!(nearest_projected_vertex(cursor, 5.0, candidates.into_iter()).is_none());
    }

    #[test]
    fn ray_plane_hits_and_rejects_parallel() {
        let hit = intersect_ray_plane(
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::ZERO,
            Vec3::Z,
        )
        .unwrap();
        assert!(hit.length() < 1e-5);
        assert!(intersect_ray_plane(Vec3::new(0.0, 0.0, 10.0), Vec3::X, Vec3::ZERO, Vec3::Z)
            .is_none());
    }
}
