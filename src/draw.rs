//! Gizmo rendering systems.
//!
//! Handles are drawn with Bevy's immediate-mode `Gizmos` from the same
//! gizmo-local layout the picking volumes use, so what is visible is what can
//! be clicked.

use std::f32::consts::TAU;

use bevy::prelude::*;

use crate::gizmo::PoseGizmo;
use crate::math::axis_basis;
use crate::types::{Handle, HandleKind, PickVolume, PoseGizmoCamera, PoseGizmoStyle};

/// Number of line segments used to draw translation cones.
const CONE_SEGMENTS: usize = 16;

fn draw_arrow(
    gizmos: &mut Gizmos,
    origin: Vec3,
    axis: Vec3,
    scale: f32,
    style: &PoseGizmoStyle,
    color: Color,
) {
    let shaft_start = origin + axis * style.center_radius * scale;
    let line_end = origin + axis * (style.arrow_length - style.arrow_head_length * 0.5) * scale;
    let cone_tip = origin + axis * (style.arrow_length + style.arrow_head_length * 0.5) * scale;
    gizmos.line(shaft_start, line_end, color);

    let (t1, t2) = axis_basis(axis);
    let radius = style.arrow_head_radius * scale;
    for i in 0..CONE_SEGMENTS {
        let a0 = TAU * i as f32 / CONE_SEGMENTS as f32;
        let a1 = TAU * (i as f32 + 1.0) / CONE_SEGMENTS as f32;
        let base0 = line_end + (t1 * a0.cos() + t2 * a0.sin()) * radius;
        let base1 = line_end + (t1 * a1.cos() + t2 * a1.sin()) * radius;
        gizmos.line(cone_tip, base0, color);
        gizmos.line(base0, base1, color);
    }
}

fn draw_square(
    gizmos: &mut Gizmos,
    center: Vec3,
    axis_a: Vec3,
    axis_b: Vec3,
    half: f32,
    color: Color,
) {
    let a = axis_a * half;
    let b = axis_b * half;
    let corners = [
        center - a - b,
        center + a - b,
        center + a + b,
        center - a + b,
    ];
    for i in 0..4 {
        gizmos.line(corners[i], corners[(i + 1) % 4], color);
    }
    // Hatch so the square reads as a filled patch at small sizes.
    gizmos.line(corners[0], corners[2], color);
    gizmos.line(corners[1], corners[3], color);
}

fn draw_ring(
    gizmos: &mut Gizmos,
    origin: Vec3,
    normal: Vec3,
    radius: f32,
    segments: usize,
    color: Color,
) {
    let (t1, t2) = axis_basis(normal);
    let steps = segments.max(3);
    let point = |i: usize| {
        let angle = TAU * i as f32 / steps as f32;
        origin + (t1 * angle.cos() + t2 * angle.sin()) * radius
    };
    for i in 0..steps {
        gizmos.line(point(i), point(i + 1), color);
    }
}

/// Draw a small camera-facing cross for the mode toggle.
fn draw_center(
    gizmos: &mut Gizmos,
    origin: Vec3,
    size: f32,
    color: Color,
    camera_transform: &GlobalTransform,
) {
    let right: Vec3 = camera_transform.right().into();
    let up: Vec3 = camera_transform.up().into();
    let d1 = (right + up).normalize_or_zero() * size;
    let d2 = (right - up).normalize_or_zero() * size;
    gizmos.line(origin - d1, origin + d1, color);
    gizmos.line(origin - d2, origin + d2, color);
    draw_ring(gizmos, origin, camera_transform.forward().into(), size, 12, color);
}

fn draw_handle(
    gizmos: &mut Gizmos,
    handle: &Handle,
    origin: Vec3,
    scale: f32,
    style: &PoseGizmoStyle,
    camera_transform: &GlobalTransform,
) {
    let color = handle.display_color();
    match (handle.kind, handle.volume) {
        (HandleKind::ArrowTranslation, _) => {
            if let Some(axis) = handle.constraint.axis() {
                draw_arrow(gizmos, origin, axis, scale, style, color);
            }
        }
        (
            HandleKind::PlaneTranslation,
            PickVolume::Quad {
                center,
                axis_a,
                axis_b,
                half_extent,
            },
        ) => draw_square(
            gizmos,
            origin + center * scale,
            axis_a,
            axis_b,
            half_extent * scale,
            color,
        ),
        (HandleKind::RotationRing, PickVolume::Ring { normal, radius, .. }) => draw_ring(
            gizmos,
            origin,
            normal,
            radius * scale,
            style.ring_segments,
            color,
        ),
        (HandleKind::ModeToggle, _) => draw_center(
            gizmos,
            origin,
            style.center_radius * scale,
            color,
            camera_transform,
        ),
        _ => {}
    }
}

/// Draw the enabled handles of the pose gizmo at the delegate.
pub fn draw_gizmo(
    gizmo: Res<PoseGizmo>,
    style: Res<PoseGizmoStyle>,
    cameras: Query<&GlobalTransform, With<PoseGizmoCamera>>,
    mut gizmos: Gizmos,
) {
    if !gizmo.is_enabled() {
        return;
    }
    let Some(camera_transform) = cameras.iter().next() else {
        return;
    };

    for handle in gizmo.handles().iter().filter(|h| h.enabled) {
        draw_handle(
            &mut gizmos,
            handle,
            gizmo.origin(),
            gizmo.scale(),
            &style,
            camera_transform,
        );
    }
}
