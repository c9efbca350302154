//! The pose gizmo: handle set, mode, hover state and drag sessions.
//!
//! [`PoseGizmo`] is plain data driven by rays, so it works the same inside a
//! Bevy app (see `interaction`) and in tests. Its position follows the
//! delegate transform and its axes stay world aligned.

use bevy::prelude::*;

use crate::math::{
    camera_distance_scale, ray_plane_intersection, shortest_arc_about, Plane, Ray, RayPlaneHit,
};
use crate::picking::pick;
use crate::types::{AxisConstraint, GizmoMode, Handle, HandleKind, PickVolume, PoseGizmoStyle};

/// Epsilon for zero-length vector checks.
const EPSILON: f32 = 1e-6;

/// State of one drag gesture, from handle press to mouse release.
#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    /// Mode the drag was started in.
    pub mode: GizmoMode,
    /// Constraint of the pressed handle.
    pub constraint: AxisConstraint,
    /// Index of the pressed handle.
    pub handle: usize,
    /// Plane the cursor ray is intersected with; fixed for the gesture except
    /// that translation advances its position with every step.
    pub plane: Plane,
    /// Last point where the cursor ray met the plane.
    pub last_intersection: Vec3,
    /// Translation applied to the delegate so far.
    pub translation_displacement: Vec3,
    /// Delegate orientation when the drag started.
    pub initial_orientation: Quat,
    /// Direction from the rotation centre to the pressed point.
    pub start_direction: Vec3,
}

/// Result of pressing the mouse button over the gizmo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// The gizmo is disabled or already dragging.
    Ignored,
    /// No handle under the cursor.
    Missed,
    /// A drag started on a handle with this constraint.
    Dragging(AxisConstraint),
    /// The centre handle switched the mode.
    ModeToggled(GizmoMode),
}

/// Translation/rotation gizmo for one delegate transform.
#[derive(Resource, Debug, Clone)]
pub struct PoseGizmo {
    handles: Vec<Handle>,
    mode: GizmoMode,
    enabled: bool,
    base_scale: f32,
    scale_to_camera_distance: bool,
    scale: f32,
    origin: Vec3,
    session: Option<DragSession>,
}

impl Default for PoseGizmo {
    fn default() -> Self {
        Self::new(&PoseGizmoStyle::default())
    }
}

impl PoseGizmo {
    /// Creates a disabled gizmo in translation mode with the default handle layout.
    pub fn new(style: &PoseGizmoStyle) -> Self {
        let mut gizmo = Self {
            handles: default_handles(style),
            mode: GizmoMode::Translation,
            enabled: false,
            base_scale: 1.0,
            scale_to_camera_distance: true,
            scale: 1.0,
            origin: Vec3::ZERO,
            session: None,
        };
        gizmo.refresh_handle_states();
        gizmo
    }

    /// Current mode.
    pub fn mode(&self) -> GizmoMode {
        self.mode
    }

    /// Whether the gizmo accepts input.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a drag is in progress.
    pub fn is_dragging(&self) -> bool {
        self.session.is_some()
    }

    /// The active drag, if any.
    pub fn session(&self) -> Option<&DragSession> {
        self.session.as_ref()
    }

    /// All handles, enabled or not.
    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }

    /// World position of the gizmo.
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Current world scale of the handle volumes.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Base scale multiplied into the camera-distance scale.
    pub fn base_scale(&self) -> f32 {
        self.base_scale
    }

    /// Sets the base scale. Takes effect on the next [`adjust_scale`](Self::adjust_scale).
    pub fn set_base_scale(&mut self, scale: f32) {
        self.base_scale = scale;
        if !self.scale_to_camera_distance {
            self.scale = scale;
        }
    }

    /// Whether the scale follows the camera distance.
    pub fn scale_to_camera_distance(&self) -> bool {
        self.scale_to_camera_distance
    }

    /// Enables or disables keeping a constant on-screen size.
    pub fn set_scale_to_camera_distance(&mut self, enabled: bool) {
        self.scale_to_camera_distance = enabled;
        if !enabled {
            self.scale = self.base_scale;
        }
    }

    /// Sets the picking priority of every handle.
    pub fn set_picking_priority(&mut self, priority: i32) {
        for handle in &mut self.handles {
            handle.priority = priority;
        }
    }

    /// Enables or disables the gizmo. Disabling ends any drag.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        if !enabled {
            self.session = None;
        }
        self.refresh_handle_states();
    }

    /// Switches between translation and rotation. The inactive handle set is
    /// disabled and no handle keeps a hover or drag highlight.
    ///
    /// Refused while a drag is in progress, so every drag ends with a
    /// release. Returns whether `mode` is now active.
    pub fn set_mode(&mut self, mode: GizmoMode) -> bool {
        if self.session.is_some() {
            return self.mode == mode;
        }
        if self.mode != mode {
            debug!("pose gizmo mode: {mode}");
        }
        self.mode = mode;
        self.refresh_handle_states();
        true
    }

    /// Moves the gizmo onto the delegate.
    pub fn follow(&mut self, delegate: &Transform) {
        self.origin = delegate.translation;
    }

    /// Recomputes the scale from the camera position and view direction.
    pub fn adjust_scale(&mut self, camera_position: Vec3, view_direction: Vec3) {
        self.scale = if self.scale_to_camera_distance {
            camera_distance_scale(self.origin, camera_position, view_direction, self.base_scale)
        } else {
            self.base_scale
        };
    }

    /// Updates hover highlighting for a cursor ray. Ignored while dragging.
    pub fn hover(&mut self, ray: &Ray) {
        if self.session.is_some() {
            return;
        }
        for handle in &mut self.handles {
            handle.hovered = false;
        }
        if !self.enabled {
            return;
        }
        if let Some(hit) = pick(&self.handles, ray, self.origin, self.scale) {
            self.handles[hit.index].hovered = true;
        }
    }

    /// Clears hover state, e.g. when the cursor leaves the window.
    pub fn clear_hover(&mut self) {
        for handle in &mut self.handles {
            handle.hovered = false;
        }
    }

    /// Handles a mouse press with the cursor ray `ray`.
    pub fn press(&mut self, ray: &Ray, delegate: &Transform) -> PressOutcome {
        if !self.enabled || self.session.is_some() {
            return PressOutcome::Ignored;
        }
        self.follow(delegate);

        let Some(hit) = pick(&self.handles, ray, self.origin, self.scale) else {
            return PressOutcome::Missed;
        };
        let handle = &self.handles[hit.index];
        let constraint = handle.constraint;

        if handle.kind == HandleKind::ModeToggle {
            let mode = self.mode.toggled();
            self.set_mode(mode);
            return PressOutcome::ModeToggled(mode);
        }

        let session = match self.mode {
            GizmoMode::Translation => {
                let plane = translation_plane(ray, hit.point, constraint);
                DragSession {
                    mode: GizmoMode::Translation,
                    constraint,
                    handle: hit.index,
                    plane,
                    last_intersection: hit.point,
                    translation_displacement: Vec3::ZERO,
                    initial_orientation: delegate.rotation,
                    start_direction: Vec3::ZERO,
                }
            }
            GizmoMode::Rotation => {
                let Some(axis) = constraint.axis() else {
                    return PressOutcome::Missed;
                };
                let plane = Plane::new(delegate.translation, axis);
                // The ring has thickness, so project the pick onto the plane
                // when the ray itself does not reach it.
                let on_plane = ray_plane_intersection(ray, &plane)
                    .point()
                    .unwrap_or_else(|| hit.point - plane.normal * plane.signed_distance(hit.point));
                let start_direction = (on_plane - plane.position).normalize_or_zero();
                if start_direction.length_squared() < EPSILON {
                    return PressOutcome::Missed;
                }
                DragSession {
                    mode: GizmoMode::Rotation,
                    constraint,
                    handle: hit.index,
                    plane,
                    last_intersection: on_plane,
                    translation_displacement: Vec3::ZERO,
                    initial_orientation: delegate.rotation,
                    start_direction,
                }
            }
        };

        debug!(
            "pose gizmo drag start: {} {} at {:?}",
            session.mode,
            constraint,
            session.plane.position
        );
        self.handles[hit.index].dragged = true;
        self.session = Some(session);
        PressOutcome::Dragging(constraint)
    }

    /// Continues the drag with a new cursor ray. Returns whether the delegate
    /// changed; rays that miss the drag plane leave it untouched.
    pub fn drag(&mut self, ray: &Ray, delegate: &mut Transform) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        let intersection = match ray_plane_intersection(ray, &session.plane) {
            RayPlaneHit::Hit(point) => point,
            RayPlaneHit::Parallel | RayPlaneHit::InPlane | RayPlaneHit::Behind => return false,
        };

        match session.mode {
            GizmoMode::Translation => {
                let position =
                    constrain_translation(session.plane.position, intersection, session.constraint);
                let delta = position - session.plane.position;
                delegate.translation += delta;
                session.translation_displacement += delta;
                session.plane.position = position;
            }
            GizmoMode::Rotation => {
                let direction = (intersection - session.plane.position).normalize_or_zero();
                if direction.length_squared() < EPSILON {
                    return false;
                }
                let arc =
                    shortest_arc_about(session.plane.normal, session.start_direction, direction);
                delegate.rotation = (arc * session.initial_orientation).normalize();
            }
        }
        session.last_intersection = intersection;
        self.origin = delegate.translation;
        true
    }

    /// Ends the drag and removes every highlight. Returns whether a drag was
    /// in progress.
    pub fn release(&mut self) -> bool {
        let was_dragging = self.session.take().is_some();
        for handle in &mut self.handles {
            handle.clear_highlight();
        }
        if was_dragging {
            debug!("pose gizmo drag end");
        }
        was_dragging
    }

    fn refresh_handle_states(&mut self) {
        let mode = self.mode;
        let enabled = self.enabled;
        for handle in &mut self.handles {
            handle.enabled = enabled && handle.kind.mode().is_none_or(|m| m == mode);
            handle.clear_highlight();
        }
    }
}

/// Plane a translation drag moves in.
///
/// Single-axis constraints keep the constrained axis inside the plane and turn
/// it towards the camera; two-axis constraints use the axis they leave out.
pub fn translation_plane(ray: &Ray, position: Vec3, constraint: AxisConstraint) -> Plane {
    let d = ray.start - ray.end;
    let normal = match constraint {
        AxisConstraint::X => Vec3::new(0.0, d.y, d.z),
        AxisConstraint::Y => Vec3::new(d.x, 0.0, d.z),
        AxisConstraint::Z => Vec3::new(d.x, d.y, 0.0),
        AxisConstraint::XY => Vec3::Z,
        AxisConstraint::XZ => Vec3::Y,
        AxisConstraint::YZ => Vec3::X,
    };
    let normal = if normal.length_squared() < EPSILON {
        fallback_normal(d, constraint)
    } else {
        normal
    };
    Plane::new(position, normal)
}

/// Used when the ray runs along the constrained axis: the unconstrained axis
/// most aligned with the ray.
fn fallback_normal(d: Vec3, constraint: AxisConstraint) -> Vec3 {
    let mut best = Vec3::ZERO;
    let mut best_component = -1.0;
    for (index, axis) in [Vec3::X, Vec3::Y, Vec3::Z].into_iter().enumerate() {
        if constraint.allows(index) {
            continue;
        }
        let component = d[index].abs();
        if component > best_component {
            best_component = component;
            best = axis;
        }
    }
    best
}

/// Applies the constraint to an intersection: single axes take only their own
/// coordinate from it, planes take all of it.
pub fn constrain_translation(
    position: Vec3,
    intersection: Vec3,
    constraint: AxisConstraint,
) -> Vec3 {
    let mut result = position;
    match constraint {
        AxisConstraint::X => result.x = intersection.x,
        AxisConstraint::Y => result.y = intersection.y,
        AxisConstraint::Z => result.z = intersection.z,
        AxisConstraint::XY | AxisConstraint::XZ | AxisConstraint::YZ => result = intersection,
    }
    result
}

/// Arrows along +X/+Y/+Z, squares in the XY/YZ/XZ planes, rings about each
/// axis and the centre sphere.
fn default_handles(style: &PoseGizmoStyle) -> Vec<Handle> {
    let colors = &style.colors;
    let priority = style.picking_priority;
    let mut handles = Vec::with_capacity(10);

    for constraint in [AxisConstraint::X, AxisConstraint::Y, AxisConstraint::Z] {
        let Some(axis) = constraint.axis() else {
            continue;
        };
        handles.push(Handle::new(
            HandleKind::ArrowTranslation,
            constraint,
            colors.for_constraint(constraint),
            priority,
            PickVolume::Capsule {
                from: axis * style.center_radius,
                to: axis * (style.arrow_length + style.arrow_head_length * 0.5),
                radius: style.arrow_pick_radius,
            },
        ));
    }

    for (constraint, axis_a, axis_b) in [
        (AxisConstraint::XY, Vec3::X, Vec3::Y),
        (AxisConstraint::YZ, Vec3::Y, Vec3::Z),
        (AxisConstraint::XZ, Vec3::X, Vec3::Z),
    ] {
        handles.push(Handle::new(
            HandleKind::PlaneTranslation,
            constraint,
            colors.for_constraint(constraint),
            priority,
            PickVolume::Quad {
                center: (axis_a + axis_b) * style.plane_offset,
                axis_a,
                axis_b,
                half_extent: style.plane_half_extent,
            },
        ));
    }

    for constraint in [AxisConstraint::X, AxisConstraint::Y, AxisConstraint::Z] {
        let Some(axis) = constraint.axis() else {
            continue;
        };
        handles.push(Handle::new(
            HandleKind::RotationRing,
            constraint,
            colors.for_constraint(constraint),
            priority,
            PickVolume::Ring {
                normal: axis,
                radius: style.ring_radius,
                thickness: style.ring_pick_thickness,
            },
        ));
    }

    handles.push(Handle::new(
        HandleKind::ModeToggle,
        AxisConstraint::X,
        colors.center,
        priority,
        PickVolume::Sphere {
            center: Vec3::ZERO,
            radius: style.center_radius,
        },
    ));

    for handle in &mut handles {
        handle.highlight_color = colors.highlight;
    }
    handles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraView;

    fn camera() -> CameraView {
        let transform = Transform::from_xyz(3.0, 4.0, 8.0).looking_at(Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(45f32.to_radians(), 4.0 / 3.0, 0.1, 100.0);
        CameraView::from_transform(&transform, projection, Vec2::new(800.0, 600.0))
    }

    fn gizmo() -> PoseGizmo {
        let mut gizmo = PoseGizmo::default();
        gizmo.set_scale_to_camera_distance(false);
        gizmo.set_enabled(true);
        gizmo
    }

    fn ray_at_world(camera: &CameraView, world: Vec3) -> Ray {
        camera.screen_ray(camera.project(world).truncate())
    }

    #[test]
    fn starts_in_translation_with_rotation_rings_disabled() {
        let gizmo = gizmo();
        for handle in gizmo.handles() {
            let expected = handle.kind != HandleKind::RotationRing;
            assert_eq!(handle.enabled, expected, "{:?}", handle.kind);
        }
    }

    #[test]
    fn disabled_gizmo_ignores_presses() {
        let camera = camera();
        let mut gizmo = PoseGizmo::default();
        let delegate = Transform::IDENTITY;
        let ray = ray_at_world(&camera, Vec3::new(0.35, 0.0, 0.0));
        assert_eq!(gizmo.press(&ray, &delegate), PressOutcome::Ignored);
    }

    #[test]
    fn pressing_empty_space_does_not_drag() {
        let camera = camera();
        let mut gizmo = gizmo();
        let delegate = Transform::IDENTITY;
        let ray = ray_at_world(&camera, Vec3::new(3.0, -2.0, 0.0));
        assert_eq!(gizmo.press(&ray, &delegate), PressOutcome::Missed);
        assert!(!gizmo.is_dragging());
    }

    #[test]
    fn single_axis_drag_moves_along_axis_only() {
        let camera = camera();
        let mut gizmo = gizmo();
        let mut delegate = Transform::IDENTITY;

        let press = ray_at_world(&camera, Vec3::new(0.35, 0.0, 0.0));
        assert_eq!(
            gizmo.press(&press, &delegate),
            PressOutcome::Dragging(AxisConstraint::X)
        );

        let start = camera.project(Vec3::new(0.35, 0.0, 0.0)).truncate();
        for offset in [Vec2::new(40.0, 5.0), Vec2::new(90.0, -30.0), Vec2::new(-60.0, 20.0)] {
            gizmo.drag(&camera.screen_ray(start + offset), &mut delegate);
            assert!(delegate.translation.y.abs() < 1e-4);
            assert!(delegate.translation.z.abs() < 1e-4);
        }
        assert!(delegate.translation.x.abs() > 1e-3);
    }

    #[test]
    fn plane_drag_keeps_unused_axis() {
        let camera = camera();
        let mut gizmo = gizmo();
        let mut delegate = Transform::from_xyz(0.0, 0.0, 0.0);

        let press = ray_at_world(&camera, Vec3::new(0.2, 0.2, 0.0));
        assert_eq!(
            gizmo.press(&press, &delegate),
            PressOutcome::Dragging(AxisConstraint::XY)
        );
        let start = camera.project(Vec3::new(0.2, 0.2, 0.0)).truncate();
        for offset in [Vec2::new(25.0, 10.0), Vec2::new(-50.0, 40.0)] {
            assert!(gizmo.drag(&camera.screen_ray(start + offset), &mut delegate));
            assert!(delegate.translation.z.abs() < 1e-4);
        }
        assert!(delegate.translation.truncate().length() > 1e-3);
    }

    #[test]
    fn translation_is_incremental_and_follows_cursor() {
        let camera = camera();
        let mut gizmo = gizmo();
        let mut delegate = Transform::IDENTITY;

        let grab = Vec3::new(0.2, 0.2, 0.0);
        gizmo.press(&ray_at_world(&camera, grab), &delegate);
        let target = Vec3::new(1.2, -0.3, 0.0);
        gizmo.drag(&ray_at_world(&camera, target), &mut delegate);
        gizmo.drag(&ray_at_world(&camera, target), &mut delegate);

        assert!(delegate.translation.abs_diff_eq(target - grab, 1e-3));
        let session = gizmo.session().unwrap();
        assert!(session.translation_displacement.abs_diff_eq(target - grab, 1e-3));
    }

    #[test]
    fn release_freezes_transform() {
        let camera = camera();
        let mut gizmo = gizmo();
        let mut delegate = Transform::IDENTITY;

        let start = camera.project(Vec3::new(0.35, 0.0, 0.0)).truncate();
        gizmo.press(&camera.screen_ray(start), &delegate);
        gizmo.drag(&camera.screen_ray(start + Vec2::new(30.0, 0.0)), &mut delegate);
        assert!(gizmo.release());

        let frozen = delegate;
        assert!(!gizmo.drag(&camera.screen_ray(start + Vec2::new(80.0, 0.0)), &mut delegate));
        assert_eq!(delegate, frozen);
        assert!(gizmo.handles().iter().all(|h| !h.is_highlighted()));
    }

    #[test]
    fn closed_rotation_loop_restores_orientation() {
        let camera = camera();
        let mut gizmo = gizmo();
        gizmo.set_mode(GizmoMode::Rotation);
        let initial = Quat::from_rotation_y(0.3);
        let mut delegate = Transform::from_rotation(initial);

        let on_ring = Vec3::new(0.6 * 0.7071, 0.6 * 0.7071, 0.0);
        let start = camera.project(on_ring).truncate();
        assert_eq!(
            gizmo.press(&camera.screen_ray(start), &delegate),
            PressOutcome::Dragging(AxisConstraint::Z)
        );

        for offset in [Vec2::new(30.0, 10.0), Vec2::new(60.0, 60.0), Vec2::new(-20.0, 40.0)] {
            assert!(gizmo.drag(&camera.screen_ray(start + offset), &mut delegate));
            // Rotation about Z leaves the rotated Z axis of the initial pose unchanged.
            let turned = delegate.rotation * initial.inverse();
            assert!((turned * Vec3::Z).abs_diff_eq(Vec3::Z, 1e-4));
        }
        assert!(delegate.rotation.angle_between(initial) > 1e-3);

        gizmo.drag(&camera.screen_ray(start), &mut delegate);
        assert!(delegate.rotation.angle_between(initial) < 1e-4);
    }

    #[test]
    fn parallel_ray_leaves_delegate_unchanged() {
        let camera = camera();
        let mut gizmo = gizmo();
        let mut delegate = Transform::IDENTITY;

        gizmo.press(&ray_at_world(&camera, Vec3::new(0.2, 0.2, 0.0)), &delegate);
        let before = delegate;
        let parallel = Ray::new(Vec3::new(0.0, 0.0, 1.0), Vec3::new(5.0, 2.0, 1.0));
        assert!(!gizmo.drag(&parallel, &mut delegate));
        assert_eq!(delegate, before);
        assert!(gizmo.is_dragging());
    }

    #[test]
    fn mode_switch_clears_highlights_and_swaps_handles() {
        let camera = camera();
        let mut gizmo = gizmo();
        gizmo.hover(&ray_at_world(&camera, Vec3::new(0.35, 0.0, 0.0)));
        assert!(gizmo.handles().iter().any(|h| h.hovered));

        gizmo.set_mode(GizmoMode::Rotation);
        assert!(gizmo.handles().iter().all(|h| !h.is_highlighted()));
        for handle in gizmo.handles() {
            let expected = matches!(handle.kind, HandleKind::RotationRing | HandleKind::ModeToggle);
            assert_eq!(handle.enabled, expected);
        }
    }

    #[test]
    fn mode_switch_waits_for_the_drag_to_end() {
        let camera = camera();
        let mut gizmo = gizmo();
        let mut delegate = Transform::IDENTITY;

        let start = camera.project(Vec3::new(0.35, 0.0, 0.0)).truncate();
        gizmo.press(&camera.screen_ray(start), &delegate);
        assert!(gizmo.drag(&camera.screen_ray(start + Vec2::new(40.0, 0.0)), &mut delegate));

        assert!(!gizmo.set_mode(GizmoMode::Rotation));
        assert_eq!(gizmo.mode(), GizmoMode::Translation);
        assert!(gizmo.is_dragging());

        assert_eq!(gizmo.session().map(|s| s.mode), Some(GizmoMode::Translation));
        assert!(gizmo.release());
        assert!(gizmo.set_mode(GizmoMode::Rotation));
        assert_eq!(gizmo.mode(), GizmoMode::Rotation);
    }

    #[test]
    fn centre_handle_toggles_mode() {
        let camera = camera();
        let mut gizmo = gizmo();
        let delegate = Transform::IDENTITY;
        let outcome = gizmo.press(&ray_at_world(&camera, Vec3::ZERO), &delegate);
        assert_eq!(outcome, PressOutcome::ModeToggled(GizmoMode::Rotation));
        assert_eq!(gizmo.mode(), GizmoMode::Rotation);
        assert!(!gizmo.is_dragging());
    }

    #[test]
    fn hover_is_frozen_while_dragging() {
        let camera = camera();
        let mut gizmo = gizmo();
        let delegate = Transform::IDENTITY;
        gizmo.press(&ray_at_world(&camera, Vec3::new(0.35, 0.0, 0.0)), &delegate);
        gizmo.hover(&ray_at_world(&camera, Vec3::new(0.0, 0.35, 0.0)));
        let y_arrow = gizmo
            .handles()
            .iter()
            .find(|h| h.kind == HandleKind::ArrowTranslation && h.constraint == AxisConstraint::Y)
            .unwrap();
        assert!(!y_arrow.hovered);
    }

    #[test]
    fn degenerate_single_axis_plane_falls_back() {
        let ray = Ray::new(Vec3::new(5.0, 0.0, 0.0), Vec3::new(-5.0, 0.0, 0.0));
        let plane = translation_plane(&ray, Vec3::ZERO, AxisConstraint::X);
        assert!(plane.normal.length() > 0.99);
        assert!(plane.normal.x.abs() < 1e-6);
    }

    #[test]
    fn camera_distance_scaling() {
        let camera = camera();
        let mut gizmo = PoseGizmo::default();
        gizmo.follow(&Transform::IDENTITY);
        gizmo.adjust_scale(camera.position(), camera.view_direction());
        let depth = Vec3::new(3.0, 4.0, 8.0).length();
        assert!((gizmo.scale() - depth * 0.008).abs() < 1e-4);

        gizmo.set_scale_to_camera_distance(false);
        gizmo.adjust_scale(camera.position(), camera.view_direction());
        assert_eq!(gizmo.scale(), 1.0);
    }
}
