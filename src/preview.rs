//! Offscreen preview images of object models.
//!
//! Meshes are rasterised on the CPU into an explicit [`RenderContext`], so
//! previews can be produced on a worker without a window or GPU context.
//! [`PreviewRenderer`] queues requests and renders one at a time on Bevy's
//! async compute pool. Inside a running app the same framing is available
//! on the GPU through [`spawn_gpu_preview`](crate::spawn_gpu_preview).

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use bevy::prelude::*;
use bevy::tasks::futures_lite::future;
use bevy::tasks::{block_on, AsyncComputeTaskPool, Task, TaskPool};
use image::{Rgba, RgbaImage};

use crate::camera::CameraView;
use crate::error::PreviewError;
use crate::model::ObjectModel;

/// Ambient grey added to every lit pixel.
const AMBIENT: f32 = 150.0;
/// Diffuse grey scaled by the headlight incidence.
const DIFFUSE: f32 = 130.0;
/// Vertical field of view of the preview camera.
pub(crate) const PREVIEW_FOV: f32 = std::f32::consts::FRAC_PI_4;
/// Direction from the model towards the preview camera.
const VIEW_DIRECTION: Vec3 = Vec3::new(0.6, 0.5, 0.8);
/// Extra room around the bounding sphere.
const FRAME_MARGIN: f32 = 1.1;

/// Render target and depth buffer every draw call works on.
#[derive(Debug, Clone)]
pub struct RenderContext {
    clear_color: Rgba<u8>,
    color: RgbaImage,
    depth: Vec<f32>,
}

impl RenderContext {
    /// Creates a target of `width` x `height` pixels cleared to black.
    pub fn new(width: u32, height: u32) -> Result<Self, PreviewError> {
        if width == 0 || height == 0 {
            return Err(PreviewError::InvalidSize(width, height));
        }
        let clear_color = Rgba([0, 0, 0, 255]);
        Ok(Self {
            clear_color,
            color: RgbaImage::from_pixel(width, height, clear_color),
            depth: vec![f32::INFINITY; (width * height) as usize],
        })
    }

    /// Target width in pixels.
    pub fn width(&self) -> u32 {
        self.color.width()
    }

    /// Target height in pixels.
    pub fn height(&self) -> u32 {
        self.color.height()
    }

    /// Sets the colour used by [`clear`](Self::clear).
    pub fn set_clear_color(&mut self, color: [u8; 4]) {
        self.clear_color = Rgba(color);
    }

    /// Resets colour and depth.
    pub fn clear(&mut self) {
        let clear_color = self.clear_color;
        for pixel in self.color.pixels_mut() {
            *pixel = clear_color;
        }
        self.depth.fill(f32::INFINITY);
    }

    /// The colour buffer.
    pub fn color(&self) -> &RgbaImage {
        &self.color
    }

    /// Takes the colour buffer, leaving a cleared one in its place.
    pub fn take_color(&mut self) -> RgbaImage {
        let empty = RgbaImage::from_pixel(self.width(), self.height(), self.clear_color);
        std::mem::replace(&mut self.color, empty)
    }

    /// Depth-tested write of one pixel.
    fn plot(&mut self, x: u32, y: u32, depth: f32, color: Rgba<u8>) {
        let index = (y * self.width() + x) as usize;
        if depth < self.depth[index] {
            self.depth[index] = depth;
            self.color.put_pixel(x, y, color);
        }
    }

    /// Rasterises a screen-space triangle (`z` is depth) in a flat colour.
    pub fn fill_triangle(&mut self, a: Vec3, b: Vec3, c: Vec3, color: Rgba<u8>) {
        let area = edge(a, b, c);
        if area.abs() < f32::EPSILON {
            return;
        }
        let (w, h) = (self.width() as f32, self.height() as f32);
        let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as u32;
        let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as u32;
        let max_x = a.x.max(b.x).max(c.x).ceil().min(w - 1.0);
        let max_y = a.y.max(b.y).max(c.y).ceil().min(h - 1.0);
        if max_x < 0.0 || max_y < 0.0 {
            return;
        }

        for y in min_y..=max_y as u32 {
            for x in min_x..=max_x as u32 {
                let p = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, 0.0);
                let w0 = edge(b, c, p) / area;
                let w1 = edge(c, a, p) / area;
                let w2 = edge(a, b, p) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let depth = w0 * a.z + w1 * b.z + w2 * c.z;
                self.plot(x, y, depth, color);
            }
        }
    }
}

fn edge(a: Vec3, b: Vec3, p: Vec3) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Triangle mesh loaded from an object model file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreviewMesh {
    /// Vertex positions.
    pub positions: Vec<Vec3>,
    /// Vertex indices, three per triangle.
    pub triangles: Vec<[u32; 3]>,
}

impl PreviewMesh {
    /// Loads an OBJ or ASCII PLY file, chosen by extension.
    pub fn load(path: &Path) -> Result<Self, PreviewError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let read = || {
            fs::read_to_string(path).map_err(|source| PreviewError::Io {
                path: path.to_path_buf(),
                source,
            })
        };
        let mesh = match extension.as_str() {
            "obj" => parse_obj(&read()?, path)?,
            "ply" => parse_ply(&read()?, path)?,
            other => return Err(PreviewError::UnsupportedFormat(other.to_owned())),
        };
        if mesh.triangles.is_empty() {
            return Err(PreviewError::EmptyMesh(path.to_path_buf()));
        }
        Ok(mesh)
    }

    /// Centre and radius of a sphere enclosing all vertices.
    pub fn bounding_sphere(&self) -> (Vec3, f32) {
        if self.positions.is_empty() {
            return (Vec3::ZERO, 0.0);
        }
        let (min, max) = self
            .positions
            .iter()
            .fold((Vec3::MAX, Vec3::MIN), |(min, max), p| (min.min(*p), max.max(*p)));
        let center = (min + max) * 0.5;
        let radius = self
            .positions
            .iter()
            .map(|p| p.distance(center))
            .fold(0.0, f32::max);
        (center, radius)
    }

    fn push_polygon(&mut self, polygon: &[u32]) {
        for i in 1..polygon.len().saturating_sub(1) {
            self.triangles.push([polygon[0], polygon[i], polygon[i + 1]]);
        }
    }
}

fn parse_error(path: &Path, line: usize, reason: impl Into<String>) -> PreviewError {
    PreviewError::Parse {
        path: path.to_path_buf(),
        line,
        reason: reason.into(),
    }
}

fn parse_floats<'a>(
    parts: impl Iterator<Item = &'a str>,
    path: &Path,
    line: usize,
) -> Result<Vec3, PreviewError> {
    let values = parts
        .take(3)
        .map(|part| part.parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| parse_error(path, line, err.to_string()))?;
    match values[..] {
        [x, y, z] => Ok(Vec3::new(x, y, z)),
        _ => Err(parse_error(path, line, "expected three coordinates")),
    }
}

/// Parses Wavefront OBJ vertices and faces; other statements are ignored.
fn parse_obj(source: &str, path: &Path) -> Result<PreviewMesh, PreviewError> {
    let mut mesh = PreviewMesh::default();
    for (index, line) in source.lines().enumerate() {
        let line_number = index + 1;
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("v") => mesh.positions.push(parse_floats(parts, path, line_number)?),
            Some("f") => {
                let count = mesh.positions.len() as i64;
                let mut polygon = Vec::new();
                for vertex in parts {
                    // `v`, `v/t`, `v//n` or `v/t/n`; only the position is used.
                    let position = vertex.split('/').next().unwrap_or_default();
                    let index: i64 = position
                        .parse()
                        .map_err(|_| parse_error(path, line_number, format!("bad index {vertex}")))?;
                    let resolved = if index < 0 { count + index } else { index - 1 };
                    if resolved < 0 || resolved >= count {
                        return Err(parse_error(
                            path,
                            line_number,
                            format!("index {index} out of range"),
                        ));
                    }
                    polygon.push(resolved as u32);
                }
                if polygon.len() < 3 {
                    return Err(parse_error(path, line_number, "face with fewer than 3 vertices"));
                }
                mesh.push_polygon(&polygon);
            }
            _ => {}
        }
    }
    Ok(mesh)
}

/// Parses an ASCII PLY file with `x y z` as the first vertex properties.
fn parse_ply(source: &str, path: &Path) -> Result<PreviewMesh, PreviewError> {
    let mut lines = source.lines().enumerate();
    match lines.next() {
        Some((_, "ply")) => {}
        _ => return Err(parse_error(path, 1, "missing ply magic")),
    }

    let mut vertex_count = 0usize;
    let mut face_count = 0usize;
    for (index, line) in lines.by_ref() {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some("format"), Some(format), _) if format != "ascii" => {
                return Err(PreviewError::UnsupportedFormat(format!("ply {format}")));
            }
            (Some("element"), Some(kind), Some(count)) => {
                let count = count
                    .parse()
                    .map_err(|_| parse_error(path, index + 1, "bad element count"))?;
                match kind {
                    "vertex" => vertex_count = count,
                    "face" => face_count = count,
                    _ => {}
                }
            }
            (Some("end_header"), _, _) => break,
            _ => {}
        }
    }

    let mut mesh = PreviewMesh::default();
    let mut body = lines.filter(|(_, line)| !line.trim().is_empty());
    for _ in 0..vertex_count {
        let (index, line) = body
            .next()
            .ok_or_else(|| parse_error(path, 0, "missing vertex data"))?;
        mesh.positions
            .push(parse_floats(line.split_whitespace(), path, index + 1)?);
    }
    for _ in 0..face_count {
        let (index, line) = body
            .next()
            .ok_or_else(|| parse_error(path, 0, "missing face data"))?;
        let values = line
            .split_whitespace()
            .map(str::parse::<u32>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| parse_error(path, index + 1, err.to_string()))?;
        let Some((&count, indices)) = values.split_first() else {
            continue;
        };
        let polygon = indices
            .get(..count as usize)
            .ok_or_else(|| parse_error(path, index + 1, "short face"))?;
        if polygon.iter().any(|&i| i as usize >= mesh.positions.len()) {
            return Err(parse_error(path, index + 1, "vertex index out of range"));
        }
        mesh.push_polygon(polygon);
    }
    Ok(mesh)
}

/// Preview camera placement and clip planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Framing {
    pub transform: Transform,
    pub near: f32,
    pub far: f32,
}

/// Frames the whole mesh from a fixed oblique direction.
pub(crate) fn frame_mesh(mesh: &PreviewMesh, aspect: f32) -> Framing {
    let (center, radius) = mesh.bounding_sphere();
    let radius = radius.max(1e-3);
    // Fit the sphere into the narrower of the two fields of view.
    let half_fov = (PREVIEW_FOV * 0.5).min(((PREVIEW_FOV * 0.5).tan() * aspect).atan());
    let distance = radius / half_fov.sin() * FRAME_MARGIN;
    let eye = center + VIEW_DIRECTION.normalize() * distance;

    Framing {
        transform: Transform::from_translation(eye).looking_at(center, Vec3::Y),
        near: (distance - radius * FRAME_MARGIN).max(distance * 1e-3),
        far: distance + radius * FRAME_MARGIN,
    }
}

fn framing_camera(mesh: &PreviewMesh, viewport: Vec2) -> (CameraView, Vec3) {
    let aspect = viewport.x / viewport.y;
    let framing = frame_mesh(mesh, aspect);
    let projection = Mat4::perspective_rh(PREVIEW_FOV, aspect, framing.near, framing.far);
    (
        CameraView::from_transform(&framing.transform, projection, viewport),
        framing.transform.translation,
    )
}

/// Renders `mesh` grey-shaded under a headlight into `context` and returns
/// the image.
pub fn render_preview(context: &mut RenderContext, mesh: &PreviewMesh) -> RgbaImage {
    context.clear();
    let viewport = Vec2::new(context.width() as f32, context.height() as f32);
    let (camera, eye) = framing_camera(mesh, viewport);
    let projected: Vec<Vec3> = mesh.positions.iter().map(|p| camera.project(*p)).collect();

    for &[i0, i1, i2] in &mesh.triangles {
        let (a, b, c) = (i0 as usize, i1 as usize, i2 as usize);
        let (Some(pa), Some(pb), Some(pc)) = (projected.get(a), projected.get(b), projected.get(c))
        else {
            continue;
        };
        if [pa.z, pb.z, pc.z].iter().any(|z| !(0.0..=1.0).contains(z)) {
            continue;
        }

        let (wa, wb, wc) = (mesh.positions[a], mesh.positions[b], mesh.positions[c]);
        let normal = (wb - wa).cross(wc - wa).normalize_or_zero();
        let to_light = (eye - (wa + wb + wc) / 3.0).normalize_or_zero();
        let shade = (AMBIENT + DIFFUSE * normal.dot(to_light).abs()).min(255.0) as u8;
        context.fill_triangle(*pa, *pb, *pc, Rgba([shade, shade, shade, 255]));
    }

    context.color().clone()
}

/// Loads the model file and renders it at `size`.
pub fn render_object_model(object_model: &ObjectModel, size: UVec2) -> Result<RgbaImage, PreviewError> {
    let mesh = PreviewMesh::load(&object_model.absolute_path())?;
    let mut context = RenderContext::new(size.x, size.y)?;
    Ok(render_preview(&mut context, &mesh))
}

type PreviewCallback =
    Box<dyn FnMut(&ObjectModel, Result<&RgbaImage, &PreviewError>) + Send + Sync>;

struct PreviewJob {
    object_model: Arc<ObjectModel>,
    task: Task<Result<RgbaImage, PreviewError>>,
}

/// Renders queued object models one at a time and hands each result to a
/// callback from [`poll`](Self::poll).
#[derive(Resource)]
pub struct PreviewRenderer {
    size: UVec2,
    queue: VecDeque<Arc<ObjectModel>>,
    in_flight: Option<PreviewJob>,
    callback: Option<PreviewCallback>,
}

impl Default for PreviewRenderer {
    fn default() -> Self {
        Self::new(UVec2::new(300, 300))
    }
}

impl PreviewRenderer {
    /// Renderer producing images of `size` pixels.
    pub fn new(size: UVec2) -> Self {
        Self {
            size,
            queue: VecDeque::new(),
            in_flight: None,
            callback: None,
        }
    }

    /// Size of subsequently started renders.
    pub fn size(&self) -> UVec2 {
        self.size
    }

    /// Changes the size of renders started from now on.
    pub fn set_size(&mut self, size: UVec2) {
        self.size = size;
    }

    /// Sets the callback receiving each finished render.
    pub fn set_callback(
        &mut self,
        callback: impl FnMut(&ObjectModel, Result<&RgbaImage, &PreviewError>) + Send + Sync + 'static,
    ) {
        self.callback = Some(Box::new(callback));
    }

    /// Queues one object model.
    pub fn request(&mut self, object_model: Arc<ObjectModel>) {
        self.queue.push_back(object_model);
        self.start_next();
    }

    /// Replaces the queue with `object_models`. A render already in flight
    /// still completes.
    pub fn render_all(&mut self, object_models: impl IntoIterator<Item = Arc<ObjectModel>>) {
        self.queue.clear();
        self.queue.extend(object_models);
        self.start_next();
    }

    /// Number of requests not yet finished, including the one in flight.
    pub fn pending(&self) -> usize {
        self.queue.len() + usize::from(self.in_flight.is_some())
    }

    /// Whether nothing is queued or rendering.
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    fn start_next(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        let Some(object_model) = self.queue.pop_front() else {
            return;
        };
        let size = self.size;
        let model = Arc::clone(&object_model);
        let pool = AsyncComputeTaskPool::get_or_init(TaskPool::new);
        let task = pool.spawn(async move { render_object_model(&model, size) });
        debug!("rendering preview of {}", object_model.path);
        self.in_flight = Some(PreviewJob { object_model, task });
    }

    /// Delivers a finished render, if any, and starts the next one. Returns
    /// whether a render was delivered.
    pub fn poll(&mut self) -> bool {
        let Some(job) = &mut self.in_flight else {
            return false;
        };
        let Some(result) = block_on(future::poll_once(&mut job.task)) else {
            return false;
        };
        let Some(job) = self.in_flight.take() else {
            return false;
        };

        if let Err(err) = &result {
            warn!("preview of {} failed: {err}", job.object_model.path);
        }
        if let Some(callback) = &mut self.callback {
            callback(&job.object_model, result.as_ref());
        }
        self.start_next();
        true
    }
}

/// Deliver finished previews each frame.
pub fn poll_previews(renderer: Option<ResMut<PreviewRenderer>>) {
    if let Some(mut renderer) = renderer {
        renderer.poll();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUBE_OBJ: &str = "\
# unit cube
v -1 -1 -1
v 1 -1 -1
v 1 1 -1
v -1 1 -1
v -1 -1 1
v 1 -1 1
v 1 1 1
v -1 1 1
f 1 2 3 4
f 5/1 6/2 7/3 8/4
f 1//1 2//1 6//1 5//1
f -5 -6 -2 -1
f 2 3 7 6
f 1 5 8 4
";

    #[test]
    fn obj_faces_are_fanned() {
        let mesh = parse_obj(CUBE_OBJ, Path::new("cube.obj")).unwrap();
        assert_eq!(mesh.positions.len(), 8);
        assert_eq!(mesh.triangles.len(), 12);
        // `f -5 -6 -2 -1` refers to vertices 4 3 7 8.
        assert_eq!(mesh.triangles[6], [3, 2, 6]);
    }

    #[test]
    fn obj_index_out_of_range_is_an_error() {
        let err = parse_obj("v 0 0 0\nf 1 2 3\n", Path::new("bad.obj")).unwrap_err();
        assert!(matches!(err, PreviewError::Parse { line: 2, .. }));
    }

    #[test]
    fn ascii_ply_is_parsed() {
        let ply = "\
ply
format ascii 1.0
element vertex 3
property float x
property float y
property float z
element face 1
property list uchar int vertex_indices
end_header
0 0 0
1 0 0
0 1 0
3 0 1 2
";
        let mesh = parse_ply(ply, Path::new("tri.ply")).unwrap();
        assert_eq!(mesh.positions.len(), 3);
        assert_eq!(mesh.triangles, vec![[0, 1, 2]]);
    }

    #[test]
    fn binary_ply_and_fbx_are_unsupported() {
        let ply = "ply\nformat binary_little_endian 1.0\nend_header\n";
        assert!(matches!(
            parse_ply(ply, Path::new("b.ply")),
            Err(PreviewError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            PreviewMesh::load(Path::new("model.fbx")),
            Err(PreviewError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn cube_preview_is_framed_and_shaded() {
        let mesh = parse_obj(CUBE_OBJ, Path::new("cube.obj")).unwrap();
        let mut context = RenderContext::new(64, 48).unwrap();
        let image = render_preview(&mut context, &mesh);

        assert_eq!(image.dimensions(), (64, 48));
        let centre = image.get_pixel(32, 24);
        assert!(centre[0] >= AMBIENT as u8);
        assert_eq!(image.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        let lit = image.pixels().filter(|p| p[0] > 0).count();
        assert!(lit > 64 * 48 / 10);
    }

    #[test]
    fn renderer_delivers_queued_previews_in_order() {
        use parking_lot::Mutex;

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cube.obj"), CUBE_OBJ).unwrap();
        fs::write(dir.path().join("scan.fbx"), b"").unwrap();

        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        let mut renderer = PreviewRenderer::new(UVec2::new(32, 32));
        renderer.set_callback(move |model, result| {
            let size = result.ok().map(|image| image.dimensions());
            sink.lock().push((model.path.clone(), size));
        });

        renderer.render_all([
            Arc::new(ObjectModel::new("cube.obj", dir.path())),
            Arc::new(ObjectModel::new("scan.fbx", dir.path())),
        ]);
        assert_eq!(renderer.pending(), 2);

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while !renderer.is_idle() {
            renderer.poll();
            assert!(std::time::Instant::now() < deadline, "previews did not finish");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        assert_eq!(
            *results.lock(),
            vec![
                ("cube.obj".to_owned(), Some((32, 32))),
                ("scan.fbx".to_owned(), None),
            ]
        );
    }

    #[test]
    fn zero_size_context_is_rejected() {
        assert!(matches!(
            RenderContext::new(0, 10),
            Err(PreviewError::InvalidSize(0, 10))
        ));
    }
}
