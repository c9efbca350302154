//! User settings profiles and the window state, persisted as JSON.
//!
//! The default location is `<config dir>/bevy_pose_annotator/settings.json`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use bevy::log::debug;
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::store::StorePaths;

/// Folder name under the platform configuration directory.
pub const APPLICATION_DIR: &str = "bevy_pose_annotator";
/// Settings file name.
pub const SETTINGS_FILE: &str = "settings.json";
/// Identifier of the profile used when none is chosen.
pub const DEFAULT_PROFILE: &str = "default";

const COLOR_CODE_DELIMITER: char = '.';

/// One settings profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name of the profile.
    pub identifier: String,
    /// Folder with the images and `info.json`.
    pub images_path: PathBuf,
    /// Optional folder with segmentation images.
    pub segmentation_images_path: Option<PathBuf>,
    /// Folder tree with the object models.
    pub object_models_path: PathBuf,
    /// Poses JSON file.
    pub poses_file_path: PathBuf,
    /// Interpreter running the network scripts.
    pub python_interpreter_path: PathBuf,
    /// Training script.
    pub training_script_path: PathBuf,
    /// Inference script.
    pub inference_script_path: PathBuf,
    /// JSON config handed to the network scripts.
    pub network_config_path: PathBuf,
    /// Segmentation colour code (`r.g.b`) per object model path.
    pub segmentation_codes: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(DEFAULT_PROFILE)
    }
}

impl Settings {
    /// Empty profile named `identifier`.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            images_path: PathBuf::new(),
            segmentation_images_path: None,
            object_models_path: PathBuf::new(),
            poses_file_path: PathBuf::new(),
            python_interpreter_path: PathBuf::new(),
            training_script_path: PathBuf::new(),
            inference_script_path: PathBuf::new(),
            network_config_path: PathBuf::new(),
            segmentation_codes: BTreeMap::new(),
        }
    }

    /// Data locations for a [`JsonLoadAndStoreStrategy`](crate::JsonLoadAndStoreStrategy).
    pub fn store_paths(&self) -> StorePaths {
        StorePaths {
            images_path: self.images_path.clone(),
            segmentation_images_path: self.segmentation_images_path.clone(),
            object_models_path: self.object_models_path.clone(),
            poses_file_path: self.poses_file_path.clone(),
        }
    }

    /// Segmentation colour of an object model.
    pub fn segmentation_code_for_object_model(&self, object_model: &str) -> Option<[u8; 3]> {
        self.segmentation_codes
            .get(object_model)
            .and_then(|code| color_from_segmentation_code(code))
    }

    /// Sets the segmentation colour of an object model.
    pub fn set_segmentation_code_for_object_model(&mut self, object_model: &str, color: [u8; 3]) {
        self.segmentation_codes
            .insert(object_model.to_owned(), segmentation_code_from_color(color));
    }
}

/// `r.g.b` code of a colour.
pub fn segmentation_code_from_color([r, g, b]: [u8; 3]) -> String {
    format!("{r}{COLOR_CODE_DELIMITER}{g}{COLOR_CODE_DELIMITER}{b}")
}

/// Colour of an `r.g.b` code, `None` if it is not three 0..=255 components.
pub fn color_from_segmentation_code(code: &str) -> Option<[u8; 3]> {
    let mut parts = code.split(COLOR_CODE_DELIMITER).map(|p| p.trim().parse::<u8>());
    let color = [
        parts.next()?.ok()?,
        parts.next()?.ok()?,
        parts.next()?.ok()?,
    ];
    parts.next().is_none().then_some(color)
}

/// Size and position of the main window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowState {
    /// Width in logical pixels.
    pub width: u32,
    /// Height in logical pixels.
    pub height: u32,
    /// Left edge on the desktop.
    pub x: i32,
    /// Top edge on the desktop.
    pub y: i32,
}

impl Default for WindowState {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            x: 0,
            y: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SettingsDocument {
    profiles: BTreeMap<String, Settings>,
    window: Option<WindowState>,
}

/// Reads and writes the settings file.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
    document: SettingsDocument,
}

impl SettingsStore {
    /// Default settings file location.
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        dirs::config_dir()
            .map(|dir| dir.join(APPLICATION_DIR).join(SETTINGS_FILE))
            .ok_or(SettingsError::NoConfigDir)
    }

    /// Opens the settings at the default location.
    pub fn open_default() -> Result<Self, SettingsError> {
        Self::open(Self::default_path()?)
    }

    /// Opens the settings at `path`. A missing file yields empty settings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let document = if path.exists() {
            let data = fs::read_to_string(&path).map_err(|source| SettingsError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&data).map_err(|source| SettingsError::Json {
                path: path.clone(),
                source,
            })?
        } else {
            debug!("no settings at {}, using defaults", path.display());
            SettingsDocument::default()
        };
        Ok(Self { path, document })
    }

    /// Location of the settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identifiers of all stored profiles.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.document.profiles.keys().map(String::as_str)
    }

    /// The profile `identifier`, or an empty one with that name.
    pub fn load_settings(&self, identifier: &str) -> Settings {
        self.document
            .profiles
            .get(identifier)
            .cloned()
            .unwrap_or_else(|| Settings::new(identifier))
    }

    /// Stores a profile under its identifier and writes the file.
    pub fn save_settings(&mut self, settings: Settings) -> Result<(), SettingsError> {
        self.document
            .profiles
            .insert(settings.identifier.clone(), settings);
        self.write()
    }

    /// Removes a profile and writes the file. Returns whether it existed.
    pub fn remove_settings(&mut self, identifier: &str) -> Result<bool, SettingsError> {
        let removed = self.document.profiles.remove(identifier).is_some();
        if removed {
            self.write()?;
        }
        Ok(removed)
    }

    /// Last saved window state, or the default.
    pub fn window_state(&self) -> WindowState {
        self.document.window.unwrap_or_default()
    }

    /// Remembers the window state and writes the file.
    pub fn save_window_state(&mut self, state: WindowState) -> Result<(), SettingsError> {
        self.document.window = Some(state);
        self.write()
    }

    fn write(&self) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let data =
            serde_json::to_string_pretty(&self.document).map_err(|source| SettingsError::Json {
                path: self.path.clone(),
                source,
            })?;
        fs::write(&self.path, data).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segmentation_codes_parse_three_components() {
        assert_eq!(segmentation_code_from_color([12, 0, 255]), "12.0.255");
        assert_eq!(color_from_segmentation_code("12.0.255"), Some([12, 0, 255]));
        assert_eq!(color_from_segmentation_code("12.0"), None);
        assert_eq!(color_from_segmentation_code("1.2.3.4"), None);
        assert_eq!(color_from_segmentation_code("256.0.0"), None);
    }

    #[test]
    fn settings_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);

        let mut store = SettingsStore::open(&path).unwrap();
        assert_eq!(store.load_settings("lab").identifier, "lab");
        assert_eq!(store.window_state(), WindowState::default());

        let mut settings = Settings::new("lab");
        settings.images_path = "/data/images".into();
        settings.set_segmentation_code_for_object_model("obj_01.ply", [255, 0, 0]);
        store.save_settings(settings.clone()).unwrap();
        let window = WindowState {
            width: 800,
            height: 600,
            x: 10,
            y: 20,
        };
        store.save_window_state(window).unwrap();

        let reopened = SettingsStore::open(&path).unwrap();
        assert_eq!(reopened.load_settings("lab"), settings);
        assert_eq!(reopened.window_state(), window);
        assert_eq!(
            reopened
                .load_settings("lab")
                .segmentation_code_for_object_model("obj_01.ply"),
            Some([255, 0, 0])
        );
        assert_eq!(reopened.identifiers().collect::<Vec<_>>(), vec!["lab"]);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            SettingsStore::open(&path),
            Err(SettingsError::Json { .. })
        ));
    }
}
