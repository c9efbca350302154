//! Error types for the annotation data, settings, script bridge, pose
//! recovery and preview renderer. The gizmo itself has no error path.

use std::path::PathBuf;

use kornia_pnp::PnPError;
use thiserror::Error;

use crate::recover::RecoveryState;

/// Failure to load or persist annotation data.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The images folder does not exist.
    #[error("the specified images path does not exist: {0}")]
    ImagesPathMissing(PathBuf),
    /// The segmentation images folder does not exist.
    #[error("the specified segmentation images path does not exist: {0}")]
    SegmentationPathMissing(PathBuf),
    /// The object models folder does not exist.
    #[error("the specified object models path does not exist: {0}")]
    ObjectModelsPathMissing(PathBuf),
    /// The images folder holds no supported image files.
    #[error("no images found at {0}")]
    NoImages(PathBuf),
    /// `info.json` with the camera parameters is missing next to the images.
    #[error("could not find info.json with the camera parameters in {0}")]
    CameraInfoMissing(PathBuf),
    /// An image has no (or a malformed) entry in `info.json`.
    #[error("invalid camera parameters for image {image}: {reason}")]
    InvalidCameraInfo {
        /// Image file name.
        image: String,
        /// What is wrong with the entry.
        reason: String,
    },
    /// The poses file does not exist.
    #[error("the specified poses file does not exist: {0}")]
    PosesFileMissing(PathBuf),
    /// The poses file is not a JSON object.
    #[error("the poses file {0} is not a JSON object")]
    MalformedPosesFile(PathBuf),
    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File or folder involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// A JSON document could not be parsed or written.
    #[error("JSON error in {path}: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to load or save settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// No configuration directory is known for this platform.
    #[error("no configuration directory available on this platform")]
    NoConfigDir,
    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not valid JSON.
    #[error("malformed settings file {path}: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to prepare or run an external network script.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The interpreter or script is not configured.
    #[error("{0} is not set")]
    NotConfigured(&'static str),
    /// The network config file is not a JSON object.
    #[error("network config {0} is not a JSON object")]
    MalformedConfig(PathBuf),
    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// A JSON document could not be parsed or written.
    #[error("JSON error in {path}: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// The interpreter could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Interpreter that failed to start.
        program: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Failure to load a mesh or render a preview.
#[derive(Debug, Error)]
pub enum PreviewError {
    /// The mesh format is recognised but not supported.
    #[error("unsupported mesh format: {0}")]
    UnsupportedFormat(String),
    /// The mesh file could not be parsed.
    #[error("failed to parse {path} line {line}: {reason}")]
    Parse {
        /// File involved.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// What went wrong.
        reason: String,
    },
    /// The mesh has no triangles.
    #[error("mesh {0} has no faces")]
    EmptyMesh(PathBuf),
    /// The render target has a zero dimension.
    #[error("invalid render target size {0}x{1}")]
    InvalidSize(u32, u32),
    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Failure to recover a pose from point correspondences.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// The correspondences are incomplete or too few.
    #[error("not ready for pose recovery, state is {0:?}")]
    NotReady(RecoveryState),
    /// No image was selected.
    #[error("no image set")]
    NoImage,
    /// No object model was selected.
    #[error("no object model set")]
    NoObjectModel,
    /// The PnP solver failed.
    #[error("pose estimation failed: {0}")]
    Solver(#[from] PnPError),
    /// The recovered pose could not be persisted.
    #[error("the recovered pose could not be stored")]
    NotStored,
}
