//! Geometry used by the pose gizmo: rays, planes and their intersections.

use bevy::prelude::*;

/// Threshold for considering vectors as parallel or zero-length.
const EPSILON: f32 = 1e-6;

/// Below this `|dot(normal, direction)|` a ray is treated as parallel to a plane.
pub const PARALLEL_EPSILON: f32 = 2.5e-8;

/// Threshold for choosing perpendicular helper vector.
const AXIS_PARALLEL_THRESHOLD: f32 = 0.9;

/// Gizmo world size per unit of camera depth when scaling to camera distance.
pub const SCALE_PER_DEPTH: f32 = 0.008;

/// Smallest camera depth used for scaling, keeps the gizmo from inverting.
const MIN_SCALE_DEPTH: f32 = 1e-3;

/// A line segment in world space from the near clip plane (`start`) towards
/// the far clip plane (`end`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Point on the near clip plane.
    pub start: Vec3,
    /// Point on the far clip plane.
    pub end: Vec3,
}

impl Ray {
    /// Creates a ray segment between two points.
    pub fn new(start: Vec3, end: Vec3) -> Self {
        Self { start, end }
    }

    /// Creates a segment starting at `origin` and reaching `length` units
    /// along `direction`.
    pub fn from_origin_direction(origin: Vec3, direction: Vec3, length: f32) -> Self {
        Self {
            start: origin,
            end: origin + direction.normalize_or_zero() * length,
        }
    }

    /// Unit direction from `start` to `end`, or zero for a degenerate segment.
    pub fn direction(&self) -> Vec3 {
        (self.end - self.start).normalize_or_zero()
    }

    /// Point at segment parameter `s` (0 is `start`, 1 is `end`).
    pub fn point_at(&self, s: f32) -> Vec3 {
        self.start + (self.end - self.start) * s
    }
}

/// An infinite plane through `position` with unit `normal`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// A point on the plane.
    pub position: Vec3,
    /// Unit normal of the plane.
    pub normal: Vec3,
}

impl Plane {
    /// Creates a plane, normalising `normal`.
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self {
            position,
            normal: normal.normalize_or_zero(),
        }
    }

    /// Signed distance of `point` from the plane along its normal.
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        (point - self.position).dot(self.normal)
    }
}

/// Outcome of intersecting a ray with a plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RayPlaneHit {
    /// The ray crosses the plane at this point.
    Hit(Vec3),
    /// The ray runs parallel to the plane without touching it.
    Parallel,
    /// The ray lies inside the plane.
    InPlane,
    /// The plane is only reached behind the ray start.
    Behind,
}

impl RayPlaneHit {
    /// The intersection point, if the ray actually crosses the plane.
    pub fn point(self) -> Option<Vec3> {
        match self {
            RayPlaneHit::Hit(point) => Some(point),
            _ => None,
        }
    }
}

/// Intersect a ray with a plane.
///
/// Uses `s = -dot(n, w) / dot(n, u)` with `u = end - start` and
/// `w = start - plane.position`. The segment is extended past `end` (hits
/// beyond the far clip plane are still valid) but never behind `start`.
pub fn ray_plane_intersection(ray: &Ray, plane: &Plane) -> RayPlaneHit {
    let u = ray.end - ray.start;
    let w = ray.start - plane.position;
    let direction = u.normalize_or_zero();

    if direction.length_squared() < EPSILON
        || plane.normal.dot(direction).abs() < PARALLEL_EPSILON
    {
        return if plane.normal.dot(w).abs() < EPSILON {
            RayPlaneHit::InPlane
        } else {
            RayPlaneHit::Parallel
        };
    }

    let s = -plane.normal.dot(w) / plane.normal.dot(u);
    if s < 0.0 {
        RayPlaneHit::Behind
    } else {
        RayPlaneHit::Hit(ray.point_at(s))
    }
}

/// Solve intersection between a ray and a sphere. Returns distance along the
/// ray direction if there is an intersection, otherwise `None`.
pub fn ray_sphere_intersection(ray: &Ray, center: Vec3, radius: f32) -> Option<f32> {
    let direction = ray.direction();
    let m = ray.start - center;
    let b = m.dot(direction);
    let c = m.length_squared() - radius * radius;

    // Exit if ray origin is outside sphere (c > 0) and ray is pointing away
    // from sphere (b > 0).
    if c > 0.0 && b > 0.0 {
        return None;
    }

    let discr = b * b - c;
    if discr < 0.0 {
        return None;
    }

    let t = -b - discr.sqrt();
    if t < 0.0 {
        Some(0.0)
    } else {
        Some(t)
    }
}

/// Closest distance along the ray to the segment `a..b`, if the ray passes
/// within `radius` of it. Returns the ray distance of the closest approach.
pub fn ray_capsule_intersection(ray: &Ray, a: Vec3, b: Vec3, radius: f32) -> Option<f32> {
    let d1 = ray.direction();
    let d2 = b - a;
    let r = ray.start - a;
    let len2 = d2.length_squared();
    if len2 < EPSILON {
        return ray_sphere_intersection(ray, a, radius);
    }

    let e = d1.dot(d2);
    let f = d2.dot(r);
    let c = d1.dot(r);
    let denom = len2 - e * e;

    // Parameter on the capsule segment closest to the ray line.
    let mut seg_t = if denom.abs() > EPSILON {
        ((e * -c + f) / denom).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mut ray_t = (d1.dot(a + d2 * seg_t - ray.start)).max(0.0);
    seg_t = ((ray.start + d1 * ray_t - a).dot(d2) / len2).clamp(0.0, 1.0);
    ray_t = (d1.dot(a + d2 * seg_t - ray.start)).max(0.0);

    let closest_ray = ray.start + d1 * ray_t;
    let closest_seg = a + d2 * seg_t;
    if closest_ray.distance_squared(closest_seg) <= radius * radius {
        Some(ray_t)
    } else {
        None
    }
}

/// Build an orthonormal basis (t1, t2) in the plane perpendicular to `axis`.
pub fn axis_basis(axis: Vec3) -> (Vec3, Vec3) {
    let axis = axis.normalize_or_zero();
    if axis.length_squared() < EPSILON {
        return (Vec3::X, Vec3::Y);
    }

    // Pick a helper vector that is not parallel to axis.
    let helper = if axis.abs().dot(Vec3::Y) < AXIS_PARALLEL_THRESHOLD {
        Vec3::Y
    } else {
        Vec3::X
    };

    let t1 = axis.cross(helper).normalize_or_zero();
    let t2 = axis.cross(t1).normalize_or_zero();
    (t1, t2)
}

/// Shortest-arc rotation taking direction `from` to direction `to`, both lying
/// in the plane perpendicular to `axis`. The result always turns about `axis`,
/// so half turns stay inside the rotation plane.
pub fn shortest_arc_about(axis: Vec3, from: Vec3, to: Vec3) -> Quat {
    let axis = axis.normalize_or_zero();
    let from = (from - axis * from.dot(axis)).normalize_or_zero();
    let to = (to - axis * to.dot(axis)).normalize_or_zero();
    if axis.length_squared() < EPSILON
        || from.length_squared() < EPSILON
        || to.length_squared() < EPSILON
    {
        return Quat::IDENTITY;
    }

    let angle = axis.dot(from.cross(to)).atan2(from.dot(to));
    Quat::from_axis_angle(axis, angle)
}

/// Gizmo scale that keeps its on-screen size constant: linear in the depth of
/// the delegate along the camera's view direction.
pub fn camera_distance_scale(
    delegate_position: Vec3,
    camera_position: Vec3,
    view_direction: Vec3,
    base_scale: f32,
) -> f32 {
    let depth = (delegate_position - camera_position).dot(view_direction.normalize_or_zero());
    depth.max(MIN_SCALE_DEPTH) * SCALE_PER_DEPTH * base_scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ray_crosses_plane_in_front() {
        let ray = Ray::new(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, 4.0, 0.0));
        let plane = Plane::new(Vec3::ZERO, Vec3::Y);
        let hit = ray_plane_intersection(&ray, &plane).point().unwrap();
        assert!(hit.abs_diff_eq(Vec3::ZERO, 1e-5));
    }

    #[test]
    fn hit_beyond_far_end_is_kept() {
        let ray = Ray::new(Vec3::new(1.0, 5.0, 0.0), Vec3::new(1.0, 4.0, 0.0));
        let plane = Plane::new(Vec3::new(0.0, -10.0, 0.0), Vec3::Y);
        let hit = ray_plane_intersection(&ray, &plane);
        assert_eq!(hit, RayPlaneHit::Hit(Vec3::new(1.0, -10.0, 0.0)));
    }

    #[test]
    fn plane_behind_start_is_rejected() {
        let ray = Ray::new(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, 6.0, 0.0));
        let plane = Plane::new(Vec3::ZERO, Vec3::Y);
        assert_eq!(ray_plane_intersection(&ray, &plane), RayPlaneHit::Behind);
    }

    #[test]
    fn parallel_and_in_plane_rays_do_not_hit() {
        let plane = Plane::new(Vec3::ZERO, Vec3::Y);
        let above = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::new(5.0, 1.0, 0.0));
        let inside = Ray::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 3.0));
        assert_eq!(ray_plane_intersection(&above, &plane), RayPlaneHit::Parallel);
        assert_eq!(ray_plane_intersection(&inside, &plane), RayPlaneHit::InPlane);
    }

    #[test]
    fn sphere_hit_distance() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        let t = ray_sphere_intersection(&ray, Vec3::ZERO, 1.0).unwrap();
        assert_relative_eq!(t, 9.0, epsilon = 1e-5);
        assert!(ray_sphere_intersection(&ray, Vec3::new(5.0, 0.0, 0.0), 1.0).is_none());
    }

    #[test]
    fn capsule_hit_along_shaft() {
        let ray = Ray::new(Vec3::new(0.5, 0.0, 10.0), Vec3::new(0.5, 0.0, 0.0));
        let t = ray_capsule_intersection(&ray, Vec3::ZERO, Vec3::X, 0.1).unwrap();
        assert_relative_eq!(t, 10.0, epsilon = 1e-4);
        assert!(ray_capsule_intersection(&ray, Vec3::Y, Vec3::new(1.0, 1.0, 0.0), 0.1).is_none());
    }

    #[test]
    fn half_turn_stays_about_axis() {
        let q = shortest_arc_about(Vec3::Z, Vec3::X, -Vec3::X);
        assert!((q * Vec3::Y).abs_diff_eq(-Vec3::Y, 1e-5));
        assert!((q * Vec3::Z).abs_diff_eq(Vec3::Z, 1e-5));
    }

    #[test]
    fn quarter_turn_sign() {
        let q = shortest_arc_about(Vec3::Z, Vec3::X, Vec3::Y);
        assert!((q * Vec3::X).abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn scale_grows_linearly_with_depth() {
        let near = camera_distance_scale(Vec3::new(0.0, 0.0, -10.0), Vec3::ZERO, -Vec3::Z, 1.0);
        let far = camera_distance_scale(Vec3::new(0.0, 0.0, -20.0), Vec3::ZERO, -Vec3::Z, 1.0);
        assert_relative_eq!(near, 0.08, epsilon = 1e-6);
        assert_relative_eq!(far, 2.0 * near, epsilon = 1e-6);
        let behind = camera_distance_scale(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, -Vec3::Z, 1.0);
        assert!(behind > 0.0);
    }
}
