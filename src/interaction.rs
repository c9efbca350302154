//! Bevy systems feeding mouse input into the [`PoseGizmo`].
//!
//! Each system turns the cursor into a world ray through the
//! [`PoseGizmoCamera`] and hands it to the gizmo, which edits the `Transform`
//! of the [`PoseGizmoDelegate`].

use bevy::gizmos::config::{DefaultGizmoConfigGroup, GizmoConfigStore};
use bevy::input::mouse::MouseButton;
use bevy::input::ButtonInput;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use crate::gizmo::{PoseGizmo, PressOutcome};
use crate::math::Ray;
use crate::types::{GizmoMode, PoseGizmoCamera, PoseGizmoDelegate, PoseGizmoStyle};

/// Length of the cursor ray segment in world units. Plane hits past the end
/// are still accepted, so this only sets the segment parameterisation.
const CURSOR_RAY_LENGTH: f32 = 10_000.0;

/// Written when a drag ends, so the application can persist the new pose.
#[derive(Message, Debug, Clone)]
pub struct PoseEdited {
    /// The delegate entity that was moved.
    pub entity: Entity,
    /// Mode the edit was made in.
    pub mode: GizmoMode,
    /// Delegate transform after the edit.
    pub transform: Transform,
}

/// Configure Bevy's built-in gizmo renderer using our style resource.
pub fn configure_gizmos(mut config_store: ResMut<GizmoConfigStore>, style: Res<PoseGizmoStyle>) {
    let (config, _) = config_store.config_mut::<DefaultGizmoConfigGroup>();
    config.line.width = style.line_width;
    config.depth_bias = style.depth_bias;
}

fn cursor_ray(
    cameras: &Query<(&Camera, &GlobalTransform), With<PoseGizmoCamera>>,
    windows: &Query<&Window, With<PrimaryWindow>>,
) -> Option<Ray> {
    let (camera, camera_transform) = cameras.iter().next()?;
    let window = windows.iter().next()?;
    let cursor_pos = window.cursor_position()?;
    let ray = camera.viewport_to_world(camera_transform, cursor_pos).ok()?;
    Some(Ray::from_origin_direction(
        ray.origin,
        *ray.direction,
        CURSOR_RAY_LENGTH,
    ))
}

/// Enable the gizmo while a delegate exists, keep it on the delegate and
/// resize it for the camera distance.
pub fn sync_gizmo(
    mut gizmo: ResMut<PoseGizmo>,
    cameras: Query<&GlobalTransform, With<PoseGizmoCamera>>,
    delegates: Query<&Transform, With<PoseGizmoDelegate>>,
) {
    let Some(delegate) = delegates.iter().next() else {
        if gizmo.is_enabled() {
            gizmo.set_enabled(false);
        }
        return;
    };
    if !gizmo.is_enabled() {
        gizmo.set_enabled(true);
    }
    gizmo.follow(delegate);

    if let Some(camera_transform) = cameras.iter().next() {
        gizmo.adjust_scale(camera_transform.translation(), *camera_transform.forward());
    }
}

/// Highlight the handle under the cursor.
pub fn update_hover(
    mut gizmo: ResMut<PoseGizmo>,
    cameras: Query<(&Camera, &GlobalTransform), With<PoseGizmoCamera>>,
    windows: Query<&Window, With<PrimaryWindow>>,
) {
    if gizmo.is_dragging() {
        return;
    }
    match cursor_ray(&cameras, &windows) {
        Some(ray) => gizmo.hover(&ray),
        None => gizmo.clear_hover(),
    }
}

/// Start a drag, or switch modes, on left click.
pub fn begin_drag(
    buttons: Res<ButtonInput<MouseButton>>,
    mut gizmo: ResMut<PoseGizmo>,
    cameras: Query<(&Camera, &GlobalTransform), With<PoseGizmoCamera>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    delegates: Query<&Transform, With<PoseGizmoDelegate>>,
) {
    if !buttons.just_pressed(MouseButton::Left) {
        return;
    }
    let Some(ray) = cursor_ray(&cameras, &windows) else {
        return;
    };
    let Some(delegate) = delegates.iter().next() else {
        return;
    };

    if let PressOutcome::ModeToggled(mode) = gizmo.press(&ray, delegate) {
        info!("gizmo switched to {mode} mode");
    }
}

/// Update the delegate while the mouse is held down.
pub fn drag_delegate(
    buttons: Res<ButtonInput<MouseButton>>,
    mut gizmo: ResMut<PoseGizmo>,
    cameras: Query<(&Camera, &GlobalTransform), With<PoseGizmoCamera>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut delegates: Query<&mut Transform, With<PoseGizmoDelegate>>,
) {
    if !gizmo.is_dragging() || !buttons.pressed(MouseButton::Left) {
        return;
    }
    let Some(ray) = cursor_ray(&cameras, &windows) else {
        return;
    };
    let Some(mut delegate) = delegates.iter_mut().next() else {
        return;
    };

    gizmo.drag(&ray, &mut delegate);
}

/// End the drag when the mouse button is released.
pub fn end_drag(
    buttons: Res<ButtonInput<MouseButton>>,
    mut gizmo: ResMut<PoseGizmo>,
    delegates: Query<(Entity, &Transform), With<PoseGizmoDelegate>>,
    mut edited: MessageWriter<PoseEdited>,
) {
    if !buttons.just_released(MouseButton::Left) {
        return;
    }
    let mode = gizmo.session().map(|session| session.mode);
    if !gizmo.release() {
        return;
    }
    if let (Some(mode), Some((entity, transform))) = (mode, delegates.iter().next()) {
        edited.write(PoseEdited {
            entity,
            mode,
            transform: *transform,
        });
    }
}
