//! Annotation data: images with camera intrinsics, object models and the
//! poses that place a model over an image.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bevy::prelude::*;
use chrono::{DateTime, Local};

use crate::camera::CameraView;

/// Near clip plane used when `info.json` does not specify one.
pub const DEFAULT_NEAR_PLANE: f32 = 50.0;
/// Far clip plane used when `info.json` does not specify one.
pub const DEFAULT_FAR_PLANE: f32 = 2000.0;

/// An image to annotate, with the intrinsics of the camera that took it.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Identifier, the image path relative to `base_path`.
    pub id: String,
    /// File name of the image inside `base_path`.
    pub image_path: String,
    /// Absolute path of the matching segmentation image, if any.
    pub segmentation_image_path: Option<PathBuf>,
    /// Folder holding the image.
    pub base_path: PathBuf,
    /// Camera matrix `K`.
    pub camera_matrix: Mat3,
    /// Near clip plane for rendering over the image.
    pub near_plane: f32,
    /// Far clip plane for rendering over the image.
    pub far_plane: f32,
}

impl Image {
    /// Creates an image with the default clip planes.
    pub fn new(
        image_path: impl Into<String>,
        segmentation_image_path: Option<PathBuf>,
        base_path: impl Into<PathBuf>,
        camera_matrix: Mat3,
    ) -> Self {
        let image_path = image_path.into();
        Self {
            id: image_path.clone(),
            image_path,
            segmentation_image_path,
            base_path: base_path.into(),
            camera_matrix,
            near_plane: DEFAULT_NEAR_PLANE,
            far_plane: DEFAULT_FAR_PLANE,
        }
    }

    /// Full path of the image file.
    pub fn absolute_image_path(&self) -> PathBuf {
        self.base_path.join(&self.image_path)
    }

    /// Camera looking at the scene the way the image was taken, for a
    /// viewport of the image's pixel size.
    pub fn camera_view(&self, viewport: Vec2) -> CameraView {
        CameraView::from_intrinsics(self.camera_matrix, viewport, self.near_plane, self.far_plane)
    }
}

/// A 3D model that can be placed over images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectModel {
    /// Identifier, equal to `path`.
    pub id: String,
    /// File name of the model, the form ground-truth files refer to it by.
    pub path: String,
    /// Folder holding the model.
    pub base_path: PathBuf,
}

impl ObjectModel {
    /// Creates an object model.
    pub fn new(path: impl Into<String>, base_path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: path.clone(),
            path,
            base_path: base_path.into(),
        }
    }

    /// Full path of the model file.
    pub fn absolute_path(&self) -> PathBuf {
        self.base_path.join(&self.path)
    }
}

/// Placement of an object model in the camera frame of an image.
#[derive(Debug, Clone)]
pub struct Pose {
    /// Unique identifier.
    pub id: String,
    /// Translation in camera coordinates.
    pub position: Vec3,
    /// Orientation in camera coordinates.
    pub rotation: Quat,
    /// Image the pose belongs to.
    pub image: Arc<Image>,
    /// Object model the pose places.
    pub object_model: Arc<ObjectModel>,
}

impl Pose {
    /// Creates a pose.
    pub fn new(
        id: impl Into<String>,
        position: Vec3,
        rotation: Quat,
        image: Arc<Image>,
        object_model: Arc<ObjectModel>,
    ) -> Self {
        Self {
            id: id.into(),
            position,
            rotation,
            image,
            object_model,
        }
    }

    /// Creates a pose from a rotation matrix.
    pub fn from_rotation_matrix(
        id: impl Into<String>,
        position: Vec3,
        rotation: Mat3,
        image: Arc<Image>,
        object_model: Arc<ObjectModel>,
    ) -> Self {
        Self::new(id, position, Quat::from_mat3(&rotation), image, object_model)
    }

    /// Rotation as a 3x3 matrix.
    pub fn rotation_matrix(&self) -> Mat3 {
        Mat3::from_quat(self.rotation)
    }

    /// The pose as a Bevy transform, e.g. for a [`PoseGizmoDelegate`](crate::PoseGizmoDelegate).
    pub fn transform(&self) -> Transform {
        Transform::from_translation(self.position).with_rotation(self.rotation)
    }
}

impl PartialEq for Pose {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Pose {}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Pose id from the image and model file stems and the current local time.
pub fn create_pose_id(image: &Image, object_model: &ObjectModel) -> String {
    create_pose_id_at(image, object_model, Local::now())
}

/// Pose id from the image and model file stems and `time`, formatted
/// `<image>_<model>_<d.M.yy_HH:mm:ss>`.
pub fn create_pose_id_at(image: &Image, object_model: &ObjectModel, time: DateTime<Local>) -> String {
    format!(
        "{}_{}_{}",
        file_stem(&image.image_path),
        file_stem(&object_model.path),
        time.format("%-d.%-m.%y_%H:%M:%S")
    )
}

/// `base`, or `base_<n>` with the smallest `n >= 1` for which `taken` is false.
pub fn unique_pose_id(base: String, taken: impl Fn(&str) -> bool) -> String {
    if !taken(&base) {
        return base;
    }
    let mut n = 1;
    loop {
        let candidate = format!("{base}_{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
