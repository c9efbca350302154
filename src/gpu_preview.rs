//! Object model previews rendered by Bevy into a texture.
//!
//! Uses the same framing as the CPU previews, on a render layer of its own
//! so the preview scene never shows up in the annotation view.

use bevy::asset::RenderAssetUsages;
use bevy::camera::visibility::RenderLayers;
use bevy::camera::RenderTarget;
use bevy::image::Image as Texture;
use bevy::mesh::PrimitiveTopology;
use bevy::prelude::*;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat, TextureUsages};

use crate::error::PreviewError;
use crate::preview::{frame_mesh, PreviewMesh, PREVIEW_FOV};

/// Render layer of the preview scenes.
pub const PREVIEW_RENDER_LAYER: usize = 27;

/// Grey of the preview material.
const PREVIEW_GREY: u8 = 200;

/// Root of a spawned preview scene. Despawning it removes the preview
/// camera, light and mesh.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct GpuPreview;

/// Flat-shaded Bevy mesh with one normal per face.
pub fn flat_shaded_mesh(mesh: &PreviewMesh) -> Mesh {
    let mut positions = Vec::with_capacity(mesh.triangles.len() * 3);
    let mut normals = Vec::with_capacity(mesh.triangles.len() * 3);
    for triangle in &mesh.triangles {
        let Some(corners) = triangle
            .iter()
            .map(|&i| mesh.positions.get(i as usize).copied())
            .collect::<Option<Vec<Vec3>>>()
        else {
            continue;
        };
        let normal = (corners[1] - corners[0])
            .cross(corners[2] - corners[0])
            .normalize_or_zero();
        for corner in corners {
            positions.push(corner.to_array());
            normals.push(normal.to_array());
        }
    }

    Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::RENDER_WORLD)
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
        .with_inserted_attribute(Mesh::ATTRIBUTE_NORMAL, normals)
}

/// Black texture a camera can render into.
pub fn preview_target(size: UVec2) -> Result<Texture, PreviewError> {
    if size.x == 0 || size.y == 0 {
        return Err(PreviewError::InvalidSize(size.x, size.y));
    }
    let mut texture = Texture::new_fill(
        Extent3d {
            width: size.x,
            height: size.y,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        &[0, 0, 0, 255],
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::default(),
    );
    texture.texture_descriptor.usage =
        TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST | TextureUsages::RENDER_ATTACHMENT;
    Ok(texture)
}

/// Spawns a scene rendering `mesh` into a new texture of `size` pixels, lit
/// by a light shining along the view. Returns the scene root and the
/// texture, which can be shown with an `ImageNode` or a material.
pub fn spawn_gpu_preview(
    commands: &mut Commands,
    textures: &mut Assets<Texture>,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
    mesh: &PreviewMesh,
    size: UVec2,
) -> Result<(Entity, Handle<Texture>), PreviewError> {
    let texture = textures.add(preview_target(size)?);
    let framing = frame_mesh(mesh, size.x as f32 / size.y as f32);
    let layer = RenderLayers::layer(PREVIEW_RENDER_LAYER);

    let grey = Color::srgb_u8(PREVIEW_GREY, PREVIEW_GREY, PREVIEW_GREY);
    let mesh = meshes.add(flat_shaded_mesh(mesh));
    let material = materials.add(StandardMaterial {
        base_color: grey,
        cull_mode: None,
        double_sided: true,
        ..default()
    });
    let target = texture.clone();

    let root = commands
        .spawn((Transform::default(), Visibility::default(), GpuPreview))
        .with_children(|scene| {
            scene.spawn((
                Camera3d::default(),
                Camera {
                    order: -1,
                    clear_color: ClearColorConfig::Custom(Color::BLACK),
                    ..default()
                },
                RenderTarget::Image(target.into()),
                Projection::Perspective(PerspectiveProjection {
                    fov: PREVIEW_FOV,
                    near: framing.near,
                    far: framing.far,
                    ..default()
                }),
                framing.transform,
                layer.clone(),
            ));
            scene.spawn((DirectionalLight::default(), framing.transform, layer.clone()));
            scene.spawn((Mesh3d(mesh), MeshMaterial3d(material), Transform::default(), layer));
        })
        .id();
    debug!("spawned gpu preview {root} at {size}");
    Ok((root, texture))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::mesh::VertexAttributeValues;

    fn tetrahedron() -> PreviewMesh {
        PreviewMesh {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z],
            triangles: vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3], [0, 1, 9]],
        }
    }

    #[test]
    fn faces_get_their_own_vertices_and_normals() {
        let mesh = flat_shaded_mesh(&tetrahedron());
        // The face with an out-of-range index is skipped.
        assert_eq!(mesh.count_vertices(), 12);

        let Some(VertexAttributeValues::Float32x3(normals)) = mesh.attribute(Mesh::ATTRIBUTE_NORMAL)
        else {
            panic!("normals missing");
        };
        assert_eq!(normals[0], [0.0, 0.0, -1.0]);
        assert_eq!(normals[0], normals[2]);
        let slanted = Vec3::from_array(normals[9]);
        assert!(slanted.abs_diff_eq(Vec3::ONE.normalize(), 1e-6));
    }

    #[test]
    fn target_can_be_rendered_into() {
        let texture = preview_target(UVec2::new(64, 48)).unwrap();
        assert_eq!(texture.width(), 64);
        assert_eq!(texture.height(), 48);
        assert!(texture
            .texture_descriptor
            .usage
            .contains(TextureUsages::RENDER_ATTACHMENT));
        assert!(matches!(
            preview_target(UVec2::new(0, 48)),
            Err(PreviewError::InvalidSize(0, 48))
        ));
    }

    #[test]
    fn preview_camera_sees_the_whole_mesh() {
        let mesh = tetrahedron();
        let framing = frame_mesh(&mesh, 1.0);
        let (center, radius) = mesh.bounding_sphere();
        let distance = framing.transform.translation.distance(center);
        assert!(framing.near < distance - radius);
        assert!(framing.far > distance + radius);
        assert!(framing.transform.forward().dot((center - framing.transform.translation).normalize()) > 0.999);
    }
}
