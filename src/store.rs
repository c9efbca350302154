//! Loading and persisting annotation data.
//!
//! [`JsonLoadAndStoreStrategy`] reads images from a folder with an
//! `info.json` holding the camera parameters, object models from a folder
//! tree, and poses from a single JSON file keyed by image path:
//!
//! ```json
//! {
//!   "0001.png": [
//!     { "id": "...", "obj": "obj_05.ply", "R": [1, 0, 0, 0, 1, 0, 0, 0, 1], "t": [0, 0, 500] }
//!   ]
//! }
//! ```
//!
//! `R` is row-major. Entries without an `id` get one, which is written back.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::error::StoreError;
use crate::model::{create_pose_id, unique_pose_id, Image, ObjectModel, Pose};

/// Image file extensions that are loaded, compared case-insensitively.
pub const IMAGE_FILE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "tiff"];
/// Object model file extensions that are loaded, compared case-insensitively.
pub const OBJECT_MODEL_FILE_EXTENSIONS: [&str; 4] = ["obj", "ply", "3ds", "fbx"];
/// Name of the camera parameter file inside the images folder.
pub const CAMERA_INFO_FILE: &str = "info.json";

/// Source of images, object models and poses.
pub trait LoadAndStoreStrategy {
    /// Loads the images in natural file name order.
    fn load_images(&self) -> Result<Vec<Image>, StoreError>;

    /// Loads the object models in natural file name order.
    fn load_object_models(&self) -> Result<Vec<ObjectModel>, StoreError>;

    /// Loads the poses that refer to known images and object models.
    fn load_poses(
        &self,
        images: &[Arc<Image>],
        object_models: &[Arc<ObjectModel>],
    ) -> Result<Vec<Pose>, StoreError>;

    /// Writes `pose`, replacing an entry with the same id, or removes it when
    /// `delete` is set.
    fn persist_pose(&self, pose: &Pose, delete: bool) -> Result<(), StoreError>;
}

/// Locations [`JsonLoadAndStoreStrategy`] reads from and writes to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorePaths {
    /// Folder with the images and `info.json`.
    pub images_path: PathBuf,
    /// Optional folder with one segmentation image per image.
    pub segmentation_images_path: Option<PathBuf>,
    /// Folder tree with the object models.
    pub object_models_path: PathBuf,
    /// JSON file with the poses.
    pub poses_file_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CameraInfo {
    #[serde(rename = "K")]
    k: [f32; 9],
    near_plane: Option<f32>,
    far_plane: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PoseEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    obj: String,
    #[serde(rename = "R")]
    rotation: [f32; 9],
    #[serde(rename = "t")]
    translation: [f32; 3],
}

impl PoseEntry {
    fn from_pose(pose: &Pose) -> Self {
        Self {
            id: Some(pose.id.clone()),
            obj: pose.object_model.path.clone(),
            rotation: pose.rotation_matrix().transpose().to_cols_array(),
            translation: pose.position.to_array(),
        }
    }
}

/// Compares strings the way a person orders file names: digit runs by
/// numeric value, everything else case-insensitively.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();

    loop {
        match (a_chars.peek().copied(), b_chars.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let mut da = String::new();
                while let Some(c) = a_chars.next_if(|c| c.is_ascii_digit()) {
                    da.push(c);
                }
                let mut db = String::new();
                while let Some(c) = b_chars.next_if(|c| c.is_ascii_digit()) {
                    db.push(c);
                }
                let ta = da.trim_start_matches('0');
                let tb = db.trim_start_matches('0');
                let ordering = ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(ca), Some(cb)) => {
                let ordering = ca.to_lowercase().cmp(cb.to_lowercase());
                if ordering != Ordering::Equal {
                    return ordering;
                }
                a_chars.next();
                b_chars.next();
            }
        }
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// File names with one of `extensions` directly inside `dir`, naturally sorted.
fn list_files(dir: &Path, extensions: &[&str]) -> Result<Vec<String>, StoreError> {
    let io_err = |source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = entry.path();
        if path.is_file() && has_extension(&path, extensions) {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    files.sort_by(|a, b| natural_cmp(a, b));
    Ok(files)
}

fn read_json(path: &Path) -> Result<Value, StoreError> {
    let data = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json(path: &Path, value: &Value) -> Result<(), StoreError> {
    let data = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, data).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Stores annotation data as JSON files next to the images.
#[derive(Debug, Clone, Default)]
pub struct JsonLoadAndStoreStrategy {
    paths: StorePaths,
}

impl JsonLoadAndStoreStrategy {
    /// Creates a strategy over `paths`.
    pub fn new(paths: StorePaths) -> Self {
        Self { paths }
    }

    /// Current locations.
    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Replaces the locations. Data is reread on the next load.
    pub fn set_paths(&mut self, paths: StorePaths) {
        self.paths = paths;
    }

    fn read_poses_document(&self) -> Result<Map<String, Value>, StoreError> {
        let path = &self.paths.poses_file_path;
        if !path.exists() {
            return Err(StoreError::PosesFileMissing(path.clone()));
        }
        match read_json(path)? {
            Value::Object(map) => Ok(map),
            _ => Err(StoreError::MalformedPosesFile(path.clone())),
        }
    }
}

impl LoadAndStoreStrategy for JsonLoadAndStoreStrategy {
    fn load_images(&self) -> Result<Vec<Image>, StoreError> {
        let images_path = &self.paths.images_path;
        if !images_path.exists() {
            return Err(StoreError::ImagesPathMissing(images_path.clone()));
        }
        if let Some(segmentation_path) = &self.paths.segmentation_images_path {
            if !segmentation_path.exists() {
                return Err(StoreError::SegmentationPathMissing(segmentation_path.clone()));
            }
        }

        let image_files = list_files(images_path, &IMAGE_FILE_EXTENSIONS)?;
        if image_files.is_empty() {
            return Err(StoreError::NoImages(images_path.clone()));
        }

        let segmentation_files = match &self.paths.segmentation_images_path {
            Some(dir) => {
                let files = list_files(dir, &IMAGE_FILE_EXTENSIONS)?;
                if files.len() == image_files.len() {
                    Some((dir, files))
                } else {
                    warn!(
                        "{} segmentation images for {} images, ignoring segmentation images",
                        files.len(),
                        image_files.len()
                    );
                    None
                }
            }
            None => None,
        };

        let info_path = images_path.join(CAMERA_INFO_FILE);
        if !info_path.exists() {
            return Err(StoreError::CameraInfoMissing(images_path.clone()));
        }
        let info: HashMap<String, Value> =
            serde_json::from_value(read_json(&info_path)?).map_err(|source| StoreError::Json {
                path: info_path.clone(),
                source,
            })?;

        let mut images = Vec::with_capacity(image_files.len());
        for (index, file) in image_files.iter().enumerate() {
            let Some(entry) = info.get(file) else {
                warn!("no camera parameters for {file} in {}", info_path.display());
                continue;
            };
            let camera: CameraInfo = match serde_json::from_value(entry.clone()) {
                Ok(camera) => camera,
                Err(err) => {
                    warn!("invalid camera parameters for {file}: {err}");
                    continue;
                }
            };
            let segmentation = segmentation_files
                .as_ref()
                .map(|(dir, files)| dir.join(&files[index]));

            let mut image = Image::new(
                file.clone(),
                segmentation,
                images_path.clone(),
                Mat3::from_cols_array(&camera.k).transpose(),
            );
            if let Some(near) = camera.near_plane {
                image.near_plane = near;
            }
            if let Some(far) = camera.far_plane {
                image.far_plane = far;
            }
            images.push(image);
        }
        Ok(images)
    }

    fn load_object_models(&self) -> Result<Vec<ObjectModel>, StoreError> {
        let root = &self.paths.object_models_path;
        if !root.exists() {
            return Err(StoreError::ObjectModelsPathMissing(root.clone()));
        }

        let mut object_models = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("skipping unreadable entry under {}: {err}", root.display());
                    continue;
                }
            };
            if !entry.file_type().is_file()
                || !has_extension(entry.path(), &OBJECT_MODEL_FILE_EXTENSIONS)
            {
                continue;
            }
            let base_path = entry.path().parent().unwrap_or(root).to_path_buf();
            object_models.push(ObjectModel::new(
                entry.file_name().to_string_lossy().into_owned(),
                base_path,
            ));
        }
        object_models.sort_by(|a, b| natural_cmp(&a.path, &b.path));
        Ok(object_models)
    }

    fn load_poses(
        &self,
        images: &[Arc<Image>],
        object_models: &[Arc<ObjectModel>],
    ) -> Result<Vec<Pose>, StoreError> {
        let mut document = self.read_poses_document()?;
        let image_map: HashMap<&str, &Arc<Image>> = images
            .iter()
            .map(|image| (image.image_path.as_str(), image))
            .collect();
        let object_model_map: HashMap<&str, &Arc<ObjectModel>> = object_models
            .iter()
            .map(|model| (model.path.as_str(), model))
            .collect();

        let mut poses = Vec::new();
        let mut ids = HashSet::new();
        let mut document_dirty = false;

        for (image_path, entries) in document.iter_mut() {
            let Some(entries) = entries.as_array_mut() else {
                warn!("poses for {image_path} are not a list, skipping");
                continue;
            };
            for raw in entries.iter_mut() {
                let entry: PoseEntry = match serde_json::from_value(raw.clone()) {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!("skipping malformed pose for {image_path}: {err}");
                        continue;
                    }
                };
                // Entries for images or models we do not manage are skipped.
                let (Some(image), Some(object_model)) = (
                    image_map.get(image_path.as_str()),
                    object_model_map.get(entry.obj.as_str()),
                ) else {
                    continue;
                };

                let id = match entry.id {
                    Some(id) => id,
                    None => {
                        let id = unique_pose_id(create_pose_id(image, object_model), |id| {
                            ids.contains(id)
                        });
                        if let Some(object) = raw.as_object_mut() {
                            object.insert("id".to_owned(), Value::String(id.clone()));
                            document_dirty = true;
                        }
                        id
                    }
                };
                ids.insert(id.clone());

                poses.push(Pose::from_rotation_matrix(
                    id,
                    Vec3::from_array(entry.translation),
                    Mat3::from_cols_array(&entry.rotation).transpose(),
                    Arc::clone(image),
                    Arc::clone(object_model),
                ));
            }
        }

        if document_dirty {
            info!("writing generated pose ids to {}", self.paths.poses_file_path.display());
            write_json(&self.paths.poses_file_path, &Value::Object(document))?;
        }
        Ok(poses)
    }

    fn persist_pose(&self, pose: &Pose, delete: bool) -> Result<(), StoreError> {
        let mut document = self.read_poses_document()?;
        let image_path = pose.image.image_path.clone();

        let matches_id = |entry: &Value| {
            entry.get("id").and_then(Value::as_str) == Some(pose.id.as_str())
        };

        if delete {
            if let Some(Value::Array(entries)) = document.get_mut(&image_path) {
                entries.retain(|entry| !matches_id(entry));
            }
        } else {
            let new_entry = serde_json::to_value(PoseEntry::from_pose(pose)).map_err(|source| {
                StoreError::Json {
                    path: self.paths.poses_file_path.clone(),
                    source,
                }
            })?;
            let entries = document
                .entry(image_path)
                .or_insert_with(|| Value::Array(Vec::new()));
            if !entries.is_array() {
                *entries = Value::Array(Vec::new());
            }
            if let Value::Array(entries) = entries {
                match entries.iter_mut().find(|entry| matches_id(entry)) {
                    Some(existing) => *existing = new_entry,
                    None => entries.push(new_entry),
                }
            }
        }

        write_json(&self.paths.poses_file_path, &Value::Object(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_order_compares_numbers_by_value() {
        let mut names = vec!["img10.png", "img2.png", "Img1.png", "img02b.png", "a.png"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(
            names,
            vec!["a.png", "Img1.png", "img2.png", "img02b.png", "img10.png"]
        );
    }

    #[test]
    fn extensions_match_case_insensitively() {
        assert!(has_extension(Path::new("a/B.PNG"), &IMAGE_FILE_EXTENSIONS));
        assert!(has_extension(Path::new("m.Ply"), &OBJECT_MODEL_FILE_EXTENSIONS));
        assert!(!has_extension(Path::new("info.json"), &IMAGE_FILE_EXTENSIONS));
        assert!(!has_extension(Path::new("noext"), &IMAGE_FILE_EXTENSIONS));
    }

    fn write_dataset(root: &Path) -> StorePaths {
        let images = root.join("images");
        let models = root.join("models").join("linemod");
        fs::create_dir_all(&images).unwrap();
        fs::create_dir_all(&models).unwrap();
        for name in ["img10.png", "img2.png", "img1.png", "notes.txt"] {
            fs::write(images.join(name), b"").unwrap();
        }
        let k = "[500, 0, 320, 0, 500, 240, 0, 0, 1]";
        fs::write(
            images.join(CAMERA_INFO_FILE),
            format!(
                r#"{{"img1.png": {{"K": {k}}}, "img2.png": {{"K": {k}, "near_plane": 10}},
                    "img10.png": {{"K": {k}}}}}"#
            ),
        )
        .unwrap();
        fs::write(models.join("obj_2.ply"), b"").unwrap();
        fs::write(models.join("obj_10.obj"), b"").unwrap();
        fs::write(models.join("readme.md"), b"").unwrap();

        let poses = root.join("poses.json");
        fs::write(
            &poses,
            r#"{
                "img1.png": [
                    {"id": "first", "obj": "obj_2.ply", "R": [1,0,0,0,1,0,0,0,1], "t": [0, 0, 500]},
                    {"obj": "obj_10.obj", "R": [0,-1,0,1,0,0,0,0,1], "t": [10, 20, 600]},
                    {"obj": "unknown.ply", "R": [1,0,0,0,1,0,0,0,1], "t": [0, 0, 0]}
                ],
                "missing.png": [
                    {"id": "orphan", "obj": "obj_2.ply", "R": [1,0,0,0,1,0,0,0,1], "t": [0, 0, 0]}
                ]
            }"#,
        )
        .unwrap();

        StorePaths {
            images_path: images,
            segmentation_images_path: None,
            object_models_path: root.join("models"),
            poses_file_path: poses,
        }
    }

    #[test]
    fn loads_dataset_in_natural_order() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = JsonLoadAndStoreStrategy::new(write_dataset(dir.path()));

        let images = strategy.load_images().unwrap();
        let names: Vec<_> = images.iter().map(|i| i.image_path.as_str()).collect();
        assert_eq!(names, vec!["img1.png", "img2.png", "img10.png"]);
        assert_eq!(images[1].near_plane, 10.0);
        // K is stored row-major, so the principal point is in the last column.
        assert_eq!(images[0].camera_matrix.z_axis, Vec3::new(320.0, 240.0, 1.0));

        let models = strategy.load_object_models().unwrap();
        let names: Vec<_> = models.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(names, vec!["obj_2.ply", "obj_10.obj"]);
        assert!(models[0].absolute_path().ends_with("linemod/obj_2.ply"));
    }

    #[test]
    fn missing_ids_are_generated_and_written_back() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_dataset(dir.path());
        let strategy = JsonLoadAndStoreStrategy::new(paths.clone());
        let images: Vec<_> = strategy.load_images().unwrap().into_iter().map(Arc::new).collect();
        let models: Vec<_> = strategy
            .load_object_models()
            .unwrap()
            .into_iter()
            .map(Arc::new)
            .collect();

        let poses = strategy.load_poses(&images, &models).unwrap();
        assert_eq!(poses.len(), 2);
        assert_eq!(poses[0].id, "first");
        let generated = poses[1].id.clone();
        assert!(generated.starts_with("img1_obj_10_"));
        assert_eq!(poses[1].position, Vec3::new(10.0, 20.0, 600.0));
        let x = poses[1].rotation * Vec3::X;
        assert!((x - Vec3::Y).length() < 1e-5);

        let written = fs::read_to_string(&paths.poses_file_path).unwrap();
        assert!(written.contains(&generated));
        let reloaded = strategy.load_poses(&images, &models).unwrap();
        assert_eq!(reloaded[1].id, generated);
    }

    #[test]
    fn persist_replaces_and_deletes_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_dataset(dir.path());
        let strategy = JsonLoadAndStoreStrategy::new(paths.clone());
        let images: Vec<_> = strategy.load_images().unwrap().into_iter().map(Arc::new).collect();
        let models: Vec<_> = strategy
            .load_object_models()
            .unwrap()
            .into_iter()
            .map(Arc::new)
            .collect();
        let mut pose = strategy
            .load_poses(&images, &models)
            .unwrap()
            .into_iter()
            .find(|pose| pose.id == "first")
            .unwrap();

        pose.position = Vec3::new(1.0, 2.0, 3.0);
        strategy.persist_pose(&pose, false).unwrap();
        let poses = strategy.load_poses(&images, &models).unwrap();
        assert_eq!(poses.len(), 2);
        assert_eq!(
            poses.iter().find(|p| p.id == "first").unwrap().position,
            Vec3::new(1.0, 2.0, 3.0)
        );

        strategy.persist_pose(&pose, true).unwrap();
        let poses = strategy.load_poses(&images, &models).unwrap();
        assert!(poses.iter().all(|p| p.id != "first"));
        // Entries for images we do not manage survive rewrites.
        let written = fs::read_to_string(&paths.poses_file_path).unwrap();
        assert!(written.contains("orphan"));
    }

    #[test]
    fn missing_locations_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = JsonLoadAndStoreStrategy::new(StorePaths {
            images_path: dir.path().join("nope"),
            segmentation_images_path: None,
            object_models_path: dir.path().join("nope"),
            poses_file_path: dir.path().join("poses.json"),
        });
        assert!(matches!(
            strategy.load_images(),
            Err(StoreError::ImagesPathMissing(_))
        ));
        assert!(matches!(
            strategy.load_object_models(),
            Err(StoreError::ObjectModelsPathMissing(_))
        ));
        assert!(matches!(
            strategy.load_poses(&[], &[]),
            Err(StoreError::PosesFileMissing(_))
        ));
    }

    #[test]
    fn pose_entry_writes_row_major_rotation() {
        let image = Arc::new(Image::new("a.png", None, "/i", Mat3::IDENTITY));
        let model = Arc::new(ObjectModel::new("m.obj", "/m"));
        let rotation = Mat3::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let pose = Pose::from_rotation_matrix("p", Vec3::new(1.0, 2.0, 3.0), rotation, image, model);
        let entry = PoseEntry::from_pose(&pose);
        // Row 0 of a +90 degree turn about Z is (0, -1, 0).
        assert!((entry.rotation[0]).abs() < 1e-5);
        assert!((entry.rotation[1] + 1.0).abs() < 1e-5);
        assert_eq!(entry.translation, [1.0, 2.0, 3.0]);
    }
}
