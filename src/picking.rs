//! Ray casting against the gizmo's pickable handle volumes.
//!
//! Picking is kept separate from drawing: a handle is clickable because of its
//! [`PickVolume`], not because of the lines drawn for it.

use bevy::prelude::*;

use crate::math::{
    ray_capsule_intersection, ray_plane_intersection, ray_sphere_intersection, Plane, Ray,
};
use crate::types::{Handle, PickVolume};

/// The handle a ray picked and where.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickHit {
    /// Index of the handle in the list that was picked from.
    pub index: usize,
    /// World-space point where the ray hit the handle volume.
    pub point: Vec3,
    /// Distance along the ray direction from the ray start.
    pub distance: f32,
}

/// Distance along `ray` at which it enters `volume`, placed at `origin` and
/// scaled by `scale`.
pub fn intersect_volume(ray: &Ray, volume: &PickVolume, origin: Vec3, scale: f32) -> Option<f32> {
    let dir = ray.direction();
    match *volume {
        PickVolume::Sphere { center, radius } => {
            ray_sphere_intersection(ray, origin + center * scale, radius * scale)
        }
        PickVolume::Capsule { from, to, radius } => ray_capsule_intersection(
            ray,
            origin + from * scale,
            origin + to * scale,
            radius * scale,
        ),
        PickVolume::Quad {
            center,
            axis_a,
            axis_b,
            half_extent,
        } => {
            let center = origin + center * scale;
            let plane = Plane::new(center, axis_a.cross(axis_b));
            let point = ray_plane_intersection(ray, &plane).point()?;
            let local = point - center;
            let half = half_extent * scale;
            if local.dot(axis_a).abs() <= half && local.dot(axis_b).abs() <= half {
                Some((point - ray.start).dot(dir))
            } else {
                None
            }
        }
        PickVolume::Ring {
            normal,
            radius,
            thickness,
        } => {
            let plane = Plane::new(origin, normal);
            let point = ray_plane_intersection(ray, &plane).point()?;
            let distance_from_ring = ((point - origin).length() - radius * scale).abs();
            if distance_from_ring <= thickness * scale {
                Some((point - ray.start).dot(dir))
            } else {
                None
            }
        }
    }
}

/// Pick the enabled handle under `ray`.
///
/// Among all hit handles the highest priority wins; equal priorities are
/// resolved by the nearest hit.
pub fn pick(handles: &[Handle], ray: &Ray, origin: Vec3, scale: f32) -> Option<PickHit> {
    let dir = ray.direction();
    let mut best: Option<(i32, PickHit)> = None;

    for (index, handle) in handles.iter().enumerate() {
        if !handle.enabled {
            continue;
        }
        let Some(distance) = intersect_volume(ray, &handle.volume, origin, scale) else {
            continue;
        };

        let better = match &best {
            None => true,
            Some((priority, hit)) => {
                handle.priority > *priority
                    || (handle.priority == *priority && distance < hit.distance)
            }
        };
        if better {
            best = Some((
                handle.priority,
                PickHit {
                    index,
                    point: ray.start + dir * distance,
                    distance,
                },
            ));
        }
    }

    best.map(|(_, hit)| hit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AxisConstraint, HandleKind};

    fn sphere_handle(center: Vec3, priority: i32) -> Handle {
        Handle::new(
            HandleKind::ModeToggle,
            AxisConstraint::X,
            Color::WHITE,
            priority,
            PickVolume::Sphere {
                center,
                radius: 0.5,
            },
        )
    }

    fn down_z(x: f32, y: f32) -> Ray {
        Ray::new(Vec3::new(x, y, 10.0), Vec3::new(x, y, -10.0))
    }

    #[test]
    fn nearest_hit_wins_on_equal_priority() {
        let handles = vec![
            sphere_handle(Vec3::new(0.0, 0.0, -2.0), 1),
            sphere_handle(Vec3::new(0.0, 0.0, 2.0), 1),
        ];
        let hit = pick(&handles, &down_z(0.0, 0.0), Vec3::ZERO, 1.0).unwrap();
        assert_eq!(hit.index, 1);
        assert!(hit.point.abs_diff_eq(Vec3::new(0.0, 0.0, 2.5), 1e-4));
    }

    #[test]
    fn priority_beats_distance() {
        let handles = vec![
            sphere_handle(Vec3::new(0.0, 0.0, -2.0), 5),
            sphere_handle(Vec3::new(0.0, 0.0, 2.0), 1),
        ];
        let hit = pick(&handles, &down_z(0.0, 0.0), Vec3::ZERO, 1.0).unwrap();
        assert_eq!(hit.index, 0);
    }

    #[test]
    fn disabled_handles_are_skipped() {
        let mut handles = vec![sphere_handle(Vec3::ZERO, 1)];
        handles[0].enabled = false;
        assert!(pick(&handles, &down_z(0.0, 0.0), Vec3::ZERO, 1.0).is_none());
    }

    #[test]
    fn volumes_follow_origin_and_scale() {
        let handles = vec![sphere_handle(Vec3::new(1.0, 0.0, 0.0), 1)];
        let origin = Vec3::new(5.0, 0.0, 0.0);
        assert!(pick(&handles, &down_z(7.0, 0.0), origin, 2.0).is_some());
        assert!(pick(&handles, &down_z(5.5, 0.0), origin, 2.0).is_none());
    }

    #[test]
    fn ring_and_quad_volumes() {
        let ring = PickVolume::Ring {
            normal: Vec3::Z,
            radius: 1.0,
            thickness: 0.1,
        };
        assert!(intersect_volume(&down_z(1.0, 0.0), &ring, Vec3::ZERO, 1.0).is_some());
        assert!(intersect_volume(&down_z(0.5, 0.0), &ring, Vec3::ZERO, 1.0).is_none());

        let quad = PickVolume::Quad {
            center: Vec3::new(0.2, 0.2, 0.0),
            axis_a: Vec3::X,
            axis_b: Vec3::Y,
            half_extent: 0.1,
        };
        let t = intersect_volume(&down_z(0.25, 0.15), &quad, Vec3::ZERO, 1.0).unwrap();
        assert!((t - 10.0).abs() < 1e-4);
        assert!(intersect_volume(&down_z(0.0, 0.0), &quad, Vec3::ZERO, 1.0).is_none());
    }
}
