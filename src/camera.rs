//! Screen/world conversion for a camera described by explicit matrices.
//!
//! Depth follows the wgpu convention used by `bevy::math`: normalised device
//! depth 0 is the near clip plane and 1 the far clip plane.

use bevy::prelude::*;

use crate::math::Ray;

/// Camera matrices and viewport size needed to turn screen points into rays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    /// World to view transform.
    pub view: Mat4,
    /// View to clip transform.
    pub projection: Mat4,
    /// Viewport size in logical pixels.
    pub viewport: Vec2,
}

impl CameraView {
    /// Creates a camera view from explicit matrices.
    pub fn new(view: Mat4, projection: Mat4, viewport: Vec2) -> Self {
        Self {
            view,
            projection,
            viewport,
        }
    }

    /// Creates a camera view from the camera's world transform.
    pub fn from_transform(camera_transform: &Transform, projection: Mat4, viewport: Vec2) -> Self {
        Self::new(
            camera_transform.compute_affine().inverse().into(),
            projection,
            viewport,
        )
    }

    /// A camera sitting at the world origin with the pinhole intrinsics `k`
    /// (row 0: `fx, s, cx`; row 1: `0, fy, cy`), looking down +Z with +Y
    /// pointing down the image, as annotation poses are expressed.
    pub fn from_intrinsics(k: Mat3, viewport: Vec2, near: f32, far: f32) -> Self {
        let r = far / (near - far);
        let projection = pinhole_projection(k, viewport, Vec2::new(r, r * near));
        Self::new(view_from_cv_camera(), projection, viewport)
    }

    /// Camera position in world space.
    pub fn position(&self) -> Vec3 {
        self.view.inverse().w_axis.truncate()
    }

    /// Unit direction the camera looks at, in world space.
    pub fn view_direction(&self) -> Vec3 {
        self.view
            .inverse()
            .transform_vector3(Vec3::NEG_Z)
            .normalize_or_zero()
    }

    /// Unproject a screen point (origin top-left, y down) at normalised depth
    /// `depth` into world space.
    pub fn unproject(&self, screen: Vec2, depth: f32) -> Vec3 {
        let ndc = Vec3::new(
            2.0 * screen.x / self.viewport.x - 1.0,
            1.0 - 2.0 * screen.y / self.viewport.y,
            depth,
        );
        (self.projection * self.view).inverse().project_point3(ndc)
    }

    /// Project a world point to screen coordinates; `z` holds the normalised depth.
    pub fn project(&self, world: Vec3) -> Vec3 {
        let ndc = (self.projection * self.view).project_point3(world);
        Vec3::new(
            (ndc.x + 1.0) * 0.5 * self.viewport.x,
            (1.0 - ndc.y) * 0.5 * self.viewport.y,
            ndc.z,
        )
    }

    /// Ray through a screen point from the near to the far clip plane.
    pub fn screen_ray(&self, screen: Vec2) -> Ray {
        Ray::new(self.unproject(screen, 0.0), self.unproject(screen, 1.0))
    }
}

/// Computer-vision camera frame (y down, z forward) to view space.
pub(crate) fn view_from_cv_camera() -> Mat4 {
    Mat4::from_scale(Vec3::new(1.0, -1.0, -1.0))
}

/// View to clip matrix of a pinhole camera with matrix `k` whose image fills
/// a viewport of `image_size` pixels. `depth` holds the `z` row entries for
/// view `z` and `w`, which pick the depth convention.
pub(crate) fn pinhole_projection(k: Mat3, image_size: Vec2, depth: Vec2) -> Mat4 {
    let fx = k.x_axis.x;
    let s = k.y_axis.x;
    let fy = k.y_axis.y;
    let cx = k.z_axis.x;
    let cy = k.z_axis.y;
    let (w, h) = (image_size.x, image_size.y);

    Mat4::from_cols(
        Vec4::new(2.0 * fx / w, 0.0, 0.0, 0.0),
        Vec4::new(-2.0 * s / w, 2.0 * fy / h, 0.0, 0.0),
        Vec4::new(1.0 - 2.0 * cx / w, 2.0 * cy / h - 1.0, depth.x, -1.0),
        Vec4::new(0.0, 0.0, depth.y, 0.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn perspective_camera() -> CameraView {
        let transform = Transform::from_xyz(3.0, 4.0, 8.0).looking_at(Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(45f32.to_radians(), 4.0 / 3.0, 0.1, 100.0);
        CameraView::from_transform(&transform, projection, Vec2::new(800.0, 600.0))
    }

    #[test]
    fn unproject_then_project_round_trips() {
        let camera = perspective_camera();
        for screen in [
            Vec2::new(0.0, 0.0),
            Vec2::new(400.0, 300.0),
            Vec2::new(799.0, 12.5),
            Vec2::new(123.0, 456.0),
        ] {
            for depth in [0.0, 1.0] {
                let world = camera.unproject(screen, depth);
                let back = camera.project(world);
                assert_relative_eq!(back.x, screen.x, epsilon = 0.05);
                assert_relative_eq!(back.y, screen.y, epsilon = 0.05);
            }
        }
    }

    #[test]
    fn centre_ray_follows_view_direction() {
        let camera = perspective_camera();
        let ray = camera.screen_ray(Vec2::new(400.0, 300.0));
        assert!(ray.direction().abs_diff_eq(camera.view_direction(), 1e-4));
        assert!(camera.position().abs_diff_eq(Vec3::new(3.0, 4.0, 8.0), 1e-4));
    }

    #[test]
    fn intrinsics_project_like_a_pinhole() {
        let k = Mat3::from_cols(
            Vec3::new(500.0, 0.0, 0.0),
            Vec3::new(0.0, 520.0, 0.0),
            Vec3::new(320.0, 240.0, 1.0),
        );
        let camera = CameraView::from_intrinsics(k, Vec2::new(640.0, 480.0), 50.0, 2000.0);
        let point = Vec3::new(100.0, -50.0, 1000.0);
        let screen = camera.project(point);
        assert_relative_eq!(screen.x, 500.0 * 0.1 + 320.0, epsilon = 1e-2);
        assert_relative_eq!(screen.y, 520.0 * -0.05 + 240.0, epsilon = 1e-2);

        let world = camera.unproject(screen.truncate(), screen.z);
        assert!(world.abs_diff_eq(point, 0.5));
        assert!(camera.view_direction().abs_diff_eq(Vec3::Z, 1e-5));
    }

    #[test]
    fn skewed_intrinsics_shift_along_x() {
        let k = Mat3::from_cols(
            Vec3::new(500.0, 0.0, 0.0),
            Vec3::new(4.0, 500.0, 0.0),
            Vec3::new(320.0, 240.0, 1.0),
        );
        let camera = CameraView::from_intrinsics(k, Vec2::new(640.0, 480.0), 50.0, 2000.0);
        let point = Vec3::new(100.0, 200.0, 1000.0);
        let expected = k * (point / point.z);

        let screen = camera.project(point);
        assert_relative_eq!(screen.x, expected.x, epsilon = 1e-2);
        assert_relative_eq!(screen.y, expected.y, epsilon = 1e-2);
        assert_relative_eq!(screen.x, 500.0 * 0.1 + 4.0 * 0.2 + 320.0, epsilon = 1e-2);
    }
}
