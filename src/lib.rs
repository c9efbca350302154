//! 6D pose annotation for Bevy 0.18.
//!
//! This crate provides the pieces of a pose annotation tool: a data layer
//! loading images with camera intrinsics, object models and their
//! annotated poses, a translation/rotation gizmo for editing a pose in the
//! viewport, a bridge launching external network training and inference
//! scripts, and offscreen previews of object models.
//!
//! # Quick Start
//!
//! ```ignore
//! use bevy::prelude::*;
//! use bevy_pose_annotator::{PoseAnnotatorPlugin, PoseGizmoCamera, PoseGizmoDelegate};
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(DefaultPlugins)
//!         .add_plugins(PoseAnnotatorPlugin)
//!         .add_systems(Startup, setup)
//!         .run();
//! }
//!
//! fn setup(mut commands: Commands) {
//!     commands.spawn((
//!         Camera3d::default(),
//!         Transform::from_xyz(0.0, 0.0, 10.0).looking_at(Vec3::ZERO, Vec3::Y),
//!         PoseGizmoCamera,
//!     ));
//!
//!     // The entity standing in for the pose being edited
//!     commands.spawn((Transform::default(), PoseGizmoDelegate));
//! }
//! ```
//!
//! # Data
//!
//! - [`JsonLoadAndStoreStrategy`]: images folder with `info.json`, object
//!   model tree and a poses JSON file
//! - [`CachingModelManager`]: cached entities, pose mutations and change
//!   listeners
//! - [`SettingsStore`]: settings profiles and the window state
//! - [`PoseRecoverer`]: initial poses from clicked 2D–3D correspondences
//!
//! # Gizmo
//!
//! [`PoseGizmo`] holds the handles and the drag session. The plugin feeds it
//! the cursor ray every frame and writes a [`PoseEdited`] message when a drag
//! ends.
//!
//! # Images and previews
//!
//! Writing a [`ShowImage`] message puts the image behind the scene and gives
//! the [`PoseGizmoCamera`] the image's intrinsics as an
//! [`IntrinsicsProjection`]. Object model previews are rendered either on
//! the CPU by [`PreviewRenderer`] or by Bevy into a texture with
//! [`spawn_gpu_preview`].

#![warn(missing_docs)]

use bevy::prelude::*;

mod backdrop;
mod camera;
mod draw;
mod error;
mod events;
mod gizmo;
mod gpu_preview;
mod interaction;
mod manager;
mod math;
mod model;
mod network;
mod picking;
mod preview;
mod recover;
mod settings;
mod store;
mod types;

pub use backdrop::{
    backdrop_placement, image_camera_transform, ImageBackdrop, IntrinsicsProjection, ShowImage,
};
pub use camera::CameraView;
pub use error::{NetworkError, PreviewError, RecoveryError, SettingsError, StoreError};
pub use events::{DataKinds, ListenerId, Listeners, ManagerState, ModelEvent};
pub use gizmo::{constrain_translation, translation_plane, DragSession, PoseGizmo, PressOutcome};
pub use gpu_preview::{
    flat_shaded_mesh, preview_target, spawn_gpu_preview, GpuPreview, PREVIEW_RENDER_LAYER,
};
pub use interaction::PoseEdited;
pub use manager::CachingModelManager;
pub use math::{
    axis_basis, camera_distance_scale, ray_capsule_intersection, ray_plane_intersection,
    ray_sphere_intersection, shortest_arc_about, Plane, Ray, RayPlaneHit, PARALLEL_EPSILON,
    SCALE_PER_DEPTH,
};
pub use model::{
    create_pose_id, create_pose_id_at, unique_pose_id, Image, ObjectModel, Pose,
    DEFAULT_FAR_PLANE, DEFAULT_NEAR_PLANE,
};
pub use network::{
    amend_network_config, NetworkController, NetworkOutcome, NetworkRequest, NetworkStatus,
    NetworkTask, IMAGE_LIST_FILE,
};
pub use picking::{intersect_volume, pick, PickHit};
pub use preview::{render_object_model, render_preview, PreviewMesh, PreviewRenderer, RenderContext};
pub use recover::{
    solve_camera_pose, PoseRecoverer, RecoveryEvent, RecoveryState, MIN_PNP_POINTS,
};
pub use settings::{
    color_from_segmentation_code, segmentation_code_from_color, Settings, SettingsStore,
    WindowState, DEFAULT_PROFILE,
};
pub use store::{
    natural_cmp, JsonLoadAndStoreStrategy, LoadAndStoreStrategy, StorePaths, CAMERA_INFO_FILE,
    IMAGE_FILE_EXTENSIONS, OBJECT_MODEL_FILE_EXTENSIONS,
};
pub use types::{
    AxisConstraint, GizmoMode, Handle, HandleColors, HandleKind, PickVolume, PoseGizmoCamera,
    PoseGizmoDelegate, PoseGizmoStyle,
};

use crate::backdrop::show_image;
use crate::draw::draw_gizmo;
use crate::interaction::{
    begin_drag, configure_gizmos, drag_delegate, end_drag, sync_gizmo, update_hover,
};
use crate::network::poll_network;
use crate::preview::poll_previews;

/// Plugin that enables the pose gizmo and the background workers.
///
/// Registers [`PoseGizmoStyle`] and [`PoseGizmo`], the [`PoseEdited`] and
/// [`ShowImage`] messages and the systems driving them. [`NetworkController`] and
/// [`PreviewRenderer`] are polled each frame when the application inserts
/// them as resources.
///
/// # Example
///
/// ```ignore
/// use bevy::prelude::*;
/// use bevy_pose_annotator::PoseAnnotatorPlugin;
///
/// App::new()
///     .add_plugins(DefaultPlugins)
///     .add_plugins(PoseAnnotatorPlugin)
///     .run();
/// ```
pub struct PoseAnnotatorPlugin;

impl Plugin for PoseAnnotatorPlugin {
    fn build(&self, app: &mut App) {
        let style = app
            .world_mut()
            .get_resource_or_init::<PoseGizmoStyle>()
            .clone();
        app.insert_resource(PoseGizmo::new(&style))
            .add_message::<PoseEdited>()
            .add_message::<ShowImage>()
            .add_systems(Startup, configure_gizmos)
            .add_systems(
                Update,
                (
                    sync_gizmo,
                    update_hover,
                    begin_drag,
                    drag_delegate,
                    end_drag,
                    draw_gizmo,
                )
                    .chain(),
            )
            .add_systems(Update, (show_image, poll_network, poll_previews));
    }
}
