//! Pose annotation example.
//!
//! Edits a cube standing in for an object model with the pose gizmo. When the
//! default settings profile points at a dataset, the first annotated pose is
//! loaded over its image, seen through the image's camera, and every
//! finished drag is written back to the poses file.
//! Click the centre sphere or press Space to switch between translation and
//! rotation.

use bevy::prelude::*;
use bevy_pose_annotator::{
    image_camera_transform, CachingModelManager, GizmoMode, JsonLoadAndStoreStrategy,
    ManagerState, ModelEvent, PoseAnnotatorPlugin, PoseEdited, PoseGizmo, PoseGizmoCamera,
    PoseGizmoDelegate, SettingsStore, ShowImage, DEFAULT_PROFILE,
};

/// The dataset and the pose currently being edited.
#[derive(Resource)]
struct Annotation {
    manager: CachingModelManager<JsonLoadAndStoreStrategy>,
    pose_id: Option<String>,
}

#[derive(Component)]
struct Hud;

fn main() {
    App::new()
        .add_plugins(DefaultPlugins)
        .add_plugins(PoseAnnotatorPlugin)
        .add_systems(Startup, (load_annotation, setup).chain())
        .add_systems(Update, (keyboard_controls, persist_edits, update_hud))
        .run();
}

fn load_annotation(mut commands: Commands) {
    let settings = match SettingsStore::open_default() {
        Ok(store) => store.load_settings(DEFAULT_PROFILE),
        Err(err) => {
            warn!("could not open settings: {err}");
            return;
        }
    };
    if settings.images_path.as_os_str().is_empty() {
        info!("no dataset configured, editing a free cube");
        return;
    }

    let mut manager = CachingModelManager::new(JsonLoadAndStoreStrategy::new(settings.store_paths()));
    manager.subscribe(|event| {
        if let ModelEvent::Error(message) = event {
            error!("{message}");
        }
    });
    manager.reload();
    if manager.state() != ManagerState::Ready {
        return;
    }
    info!(
        "loaded {} images, {} object models, {} poses",
        manager.images().len(),
        manager.object_models().len(),
        manager.poses().len()
    );
    let pose_id = manager.poses().first().map(|pose| pose.id.clone());
    commands.insert_resource(Annotation { manager, pose_id });
}

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut show_image: MessageWriter<ShowImage>,
    annotation: Option<Res<Annotation>>,
) {
    let pose = annotation.as_ref().and_then(|annotation| {
        let id = annotation.pose_id.as_deref()?;
        annotation.manager.pose_by_id(id)
    });
    let delegate_transform = pose.map_or(Transform::from_xyz(0.0, 0.5, 0.0), |pose| pose.transform());
    let camera_transform = match pose {
        // Poses are relative to the camera that took the image.
        Some(pose) => {
            show_image.write(ShowImage(pose.image.clone()));
            image_camera_transform()
        }
        None => Transform::from_xyz(6.0, 6.0, 10.0).looking_at(Vec3::ZERO, Vec3::Y),
    };

    commands.spawn((Camera3d::default(), camera_transform, PoseGizmoCamera));

    commands.spawn((
        DirectionalLight::default(),
        Transform::from_xyz(10.0, 15.0, 10.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    let size = if pose.is_some() { 50.0 } else { 1.0 };
    commands.spawn((
        Mesh3d(meshes.add(Cuboid::from_length(size))),
        MeshMaterial3d(materials.add(Color::srgb(0.2, 0.7, 1.0))),
        delegate_transform,
        PoseGizmoDelegate,
    ));

    commands
        .spawn((
            Node {
                position_type: PositionType::Absolute,
                top: Val::Px(10.0),
                left: Val::Px(10.0),
                ..default()
            },
            BackgroundColor(Color::srgba(0.0, 0.0, 0.0, 0.7)),
        ))
        .with_children(|p| {
            p.spawn((
                Text::new(""),
                TextFont { font_size: 14.0, ..default() },
                TextColor(Color::WHITE),
                Hud,
            ));
        });
}

fn keyboard_controls(keys: Res<ButtonInput<KeyCode>>, mut gizmo: ResMut<PoseGizmo>) {
    if keys.just_pressed(KeyCode::Space) {
        let mode = gizmo.mode().toggled();
        if !gizmo.set_mode(mode) {
            info!("finish the drag before switching to {mode} mode");
        }
    }
}

fn persist_edits(mut edits: MessageReader<PoseEdited>, annotation: Option<ResMut<Annotation>>) {
    let Some(mut annotation) = annotation else {
        edits.clear();
        return;
    };
    for edit in edits.read() {
        let Some(id) = annotation.pose_id.clone() else {
            continue;
        };
        let Transform { translation, rotation, .. } = edit.transform;
        if !annotation.manager.update_pose(&id, translation, rotation) {
            warn!("pose {id} could not be saved");
        }
    }
}

fn update_hud(
    gizmo: Res<PoseGizmo>,
    annotation: Option<Res<Annotation>>,
    mut query: Query<&mut Text, With<Hud>>,
) {
    let Ok(mut text) = query.single_mut() else { return };

    let pose = annotation
        .as_ref()
        .and_then(|annotation| annotation.pose_id.clone())
        .unwrap_or_else(|| "none".to_owned());
    let hint = match gizmo.mode() {
        GizmoMode::Translation => "drag arrows or squares to move",
        GizmoMode::Rotation => "drag rings to rotate",
    };
    text.0 = format!(
        "Mode: {} | Pose: {pose}\n{hint}\n\n[Space] or centre sphere: switch mode",
        gizmo.mode(),
    );
}
