//! Shows an annotation image behind the scene, seen through its own camera.
//!
//! The [`PoseGizmoCamera`] is placed at the world origin in the image's
//! camera frame and given an [`IntrinsicsProjection`] built from `K` and the
//! image's clip planes, so poses line up with the picture. The picture
//! itself is an unlit quad just inside the far plane.

use std::f32::consts::PI;
use std::sync::Arc;

use bevy::asset::RenderAssetUsages;
use bevy::camera::{CameraProjection, SubCameraView};
use bevy::image::Image as Texture;
use bevy::math::Vec3A;
use bevy::prelude::*;

use crate::camera::pinhole_projection;
use crate::model::Image;
use crate::types::PoseGizmoCamera;

/// Share of the far plane distance at which the backdrop quad sits.
const BACKDROP_DEPTH: f32 = 0.99;

/// Request to show an image behind the scene.
#[derive(Message, Debug, Clone)]
pub struct ShowImage(pub Arc<Image>);

/// Marks the quad carrying the current backdrop image.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct ImageBackdrop;

/// Perspective projection of a calibrated pinhole camera, with reverse-Z
/// depth as Bevy's own projections use.
///
/// The image is fitted into the viewport without distortion; the viewport
/// side with spare room shows more of the scene than the image covers.
#[derive(Debug, Clone, PartialEq)]
pub struct IntrinsicsProjection {
    /// Camera matrix `K`.
    pub camera_matrix: Mat3,
    /// Image size in pixels.
    pub image_size: Vec2,
    /// Near clip plane distance.
    pub near: f32,
    /// Far clip plane distance.
    pub far: f32,
    viewport_aspect: f32,
}

impl IntrinsicsProjection {
    /// Projection for an image of `image_size` pixels taken with `k`.
    pub fn new(k: Mat3, image_size: Vec2, near: f32, far: f32) -> Self {
        Self {
            camera_matrix: k,
            image_size,
            near,
            far,
            viewport_aspect: image_size.x / image_size.y,
        }
    }

    /// Projection for `image` with the given pixel size.
    pub fn for_image(image: &Image, image_size: Vec2) -> Self {
        Self::new(image.camera_matrix, image_size, image.near_plane, image.far_plane)
    }

    /// Scale applied to normalised x and y to keep the image undistorted in
    /// the current viewport.
    fn fit(&self) -> Vec2 {
        let image_aspect = self.image_size.x / self.image_size.y;
        if !self.viewport_aspect.is_finite() || self.viewport_aspect <= 0.0 {
            return Vec2::ONE;
        }
        if self.viewport_aspect > image_aspect {
            Vec2::new(image_aspect / self.viewport_aspect, 1.0)
        } else {
            Vec2::new(1.0, self.viewport_aspect / image_aspect)
        }
    }

    fn depth_range(&self) -> f32 {
        self.far - self.near
    }
}

impl CameraProjection for IntrinsicsProjection {
    fn get_clip_from_view(&self) -> Mat4 {
        let range = self.depth_range();
        let depth = Vec2::new(self.near / range, self.near * self.far / range);
        let fit = self.fit();
        Mat4::from_scale(Vec3::new(fit.x, fit.y, 1.0))
            * pinhole_projection(self.camera_matrix, self.image_size, depth)
    }

    fn get_clip_from_view_for_sub(&self, sub_view: &SubCameraView) -> Mat4 {
        let full = sub_view.full_size.as_vec2();
        let min = sub_view.offset;
        let max = sub_view.offset + sub_view.size.as_vec2();
        // Sub view rectangle in normalised device coordinates.
        let (left, right) = (2.0 * min.x / full.x - 1.0, 2.0 * max.x / full.x - 1.0);
        let (top, bottom) = (1.0 - 2.0 * min.y / full.y, 1.0 - 2.0 * max.y / full.y);

        let crop = Mat4::from_cols(
            Vec4::new(2.0 / (right - left), 0.0, 0.0, 0.0),
            Vec4::new(0.0, 2.0 / (top - bottom), 0.0, 0.0),
            Vec4::Z,
            Vec4::new(
                -(right + left) / (right - left),
                -(top + bottom) / (top - bottom),
                0.0,
                1.0,
            ),
        );
        crop * self.get_clip_from_view()
    }

    fn update(&mut self, width: f32, height: f32) {
        self.viewport_aspect = width / height;
    }

    fn far(&self) -> f32 {
        self.far
    }

    fn get_frustum_corners(&self, z_near: f32, z_far: f32) -> [Vec3A; 8] {
        let view_from_clip = self.get_clip_from_view().inverse();
        let range = self.depth_range();
        // Reverse-Z depth of a view space z.
        let ndc_depth = |z: f32| (self.near / range * z + self.near * self.far / range) / -z;
        let corner = |x: f32, y: f32, z: f32| {
            Vec3A::from(view_from_clip.project_point3(Vec3::new(x, y, ndc_depth(z))))
        };
        [
            corner(1.0, -1.0, z_near),
            corner(1.0, 1.0, z_near),
            corner(-1.0, 1.0, z_near),
            corner(-1.0, -1.0, z_near),
            corner(1.0, -1.0, z_far),
            corner(1.0, 1.0, z_far),
            corner(-1.0, 1.0, z_far),
            corner(-1.0, -1.0, z_far),
        ]
    }
}

/// Transform of a camera at the origin of the image's camera frame.
pub fn image_camera_transform() -> Transform {
    Transform::from_rotation(Quat::from_rotation_x(PI))
}

/// Placement of a quad showing an image of `image_size` pixels at camera
/// depth `depth`: its transform and its size in world units.
pub fn backdrop_placement(k: Mat3, image_size: Vec2, depth: f32) -> (Transform, Vec2) {
    let centre = k.inverse() * Vec3::new(image_size.x / 2.0, image_size.y / 2.0, 1.0);
    let size = Vec2::new(image_size.x / k.x_axis.x, image_size.y / k.y_axis.y) * depth;
    let transform = Transform::from_translation(centre / centre.z * depth)
        .with_rotation(Quat::from_rotation_x(PI));
    (transform, size)
}

/// Applies [`ShowImage`] requests: loads the image, points every
/// [`PoseGizmoCamera`] through it and replaces the backdrop quad.
pub fn show_image(
    mut requests: MessageReader<ShowImage>,
    mut commands: Commands,
    cameras: Query<Entity, With<PoseGizmoCamera>>,
    backdrops: Query<Entity, With<ImageBackdrop>>,
    textures: Option<ResMut<Assets<Texture>>>,
    meshes: Option<ResMut<Assets<Mesh>>>,
    materials: Option<ResMut<Assets<StandardMaterial>>>,
) {
    let Some(ShowImage(image)) = requests.read().last() else {
        return;
    };
    let (Some(mut textures), Some(mut meshes), Some(mut materials)) = (textures, meshes, materials)
    else {
        warn!("cannot show {}: rendering assets are unavailable", image.image_path);
        return;
    };

    let path = image.absolute_image_path();
    let picture = match ::image::open(&path) {
        Ok(picture) => picture,
        Err(err) => {
            warn!("failed to load {}: {err}", path.display());
            return;
        }
    };
    let image_size = Vec2::new(picture.width() as f32, picture.height() as f32);
    debug!("showing {} at {image_size}", image.image_path);

    for camera in &cameras {
        commands.entity(camera).insert((
            Projection::custom(IntrinsicsProjection::for_image(image, image_size)),
            image_camera_transform(),
        ));
    }
    for backdrop in &backdrops {
        commands.entity(backdrop).despawn();
    }

    let texture = textures.add(Texture::from_dynamic(
        picture,
        true,
        RenderAssetUsages::RENDER_WORLD,
    ));
    let (transform, size) = backdrop_placement(
        image.camera_matrix,
        image_size,
        image.far_plane * BACKDROP_DEPTH,
    );
    commands.spawn((
        Mesh3d(meshes.add(Rectangle::from_size(size))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color_texture: Some(texture),
            unlit: true,
            cull_mode: None,
            ..default()
        })),
        transform,
        ImageBackdrop,
    ));
}
