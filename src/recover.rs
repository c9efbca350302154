//! Pose recovery from clicked 2D–3D point correspondences.
//!
//! The user alternates between clicking a pixel in the image and the matching
//! point on the object model. Once enough complete pairs exist, the pose of
//! the model in the camera frame is solved with EPnP and stored through the
//! model manager.

use std::sync::Arc;

use bevy::prelude::*;
use kornia_pnp::{solve_pnp, PnPMethod};

use crate::error::RecoveryError;
use crate::events::{ListenerId, Listeners};
use crate::manager::CachingModelManager;
use crate::model::{Image, ObjectModel};
use crate::store::LoadAndStoreStrategy;

/// Fewest correspondences the PnP solver accepts.
pub const MIN_PNP_POINTS: usize = 4;

/// Where the correspondence collection stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryState {
    /// No points collected.
    #[default]
    Empty,
    /// A 3D point waits for its image point.
    Missing2DPoint,
    /// An image point waits for its 3D point.
    Missing3DPoint,
    /// All points are paired but there are too few pairs.
    NotEnoughCorrespondences,
    /// A pose can be recovered.
    ReadyForPoseCreation,
}

/// Notification sent by [`PoseRecoverer`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryEvent {
    /// The state changed.
    StateChanged(RecoveryState),
    /// Points were added or cleared.
    CorrespondencesChanged,
    /// A pose with this id was recovered and stored.
    PoseRecovered(String),
}

/// Collects point correspondences for one image and object model and turns
/// them into a pose.
///
/// Image points are in pixels, object points in model coordinates. The
/// `i`-th image point pairs with the `i`-th object point. Adding a second
/// point on the same side before its partner replaces the pending one.
#[derive(Debug, Resource)]
pub struct PoseRecoverer {
    image: Option<Arc<Image>>,
    object_model: Option<Arc<ObjectModel>>,
    points_2d: Vec<Vec2>,
    points_3d: Vec<Vec3>,
    minimum_number_of_points: usize,
    state: RecoveryState,
    listeners: Listeners<RecoveryEvent>,
}

impl Default for PoseRecoverer {
    fn default() -> Self {
        Self {
            image: None,
            object_model: None,
            points_2d: Vec::new(),
            points_3d: Vec::new(),
            minimum_number_of_points: MIN_PNP_POINTS,
            state: RecoveryState::Empty,
            listeners: Listeners::default(),
        }
    }
}

impl PoseRecoverer {
    /// Creates an empty recoverer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for [`RecoveryEvent`]s.
    pub fn subscribe(
        &mut self,
        callback: impl FnMut(&RecoveryEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.subscribe(callback)
    }

    /// Removes a callback registered with [`subscribe`](Self::subscribe).
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Current state.
    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// Selected image, if any.
    pub fn image(&self) -> Option<&Arc<Image>> {
        self.image.as_ref()
    }

    /// Selected object model, if any.
    pub fn object_model(&self) -> Option<&Arc<ObjectModel>> {
        self.object_model.as_ref()
    }

    /// Collected image points.
    pub fn points_2d(&self) -> &[Vec2] {
        &self.points_2d
    }

    /// Collected object points.
    pub fn points_3d(&self) -> &[Vec3] {
        &self.points_3d
    }

    /// Number of complete pairs.
    pub fn number_of_complete_correspondences(&self) -> usize {
        self.points_2d.len().min(self.points_3d.len())
    }

    /// Pairs needed beyond which recovery is possible.
    pub fn minimum_number_of_points(&self) -> usize {
        self.minimum_number_of_points
    }

    /// Changes the pair threshold. Never goes below what the solver needs.
    pub fn set_minimum_number_of_points(&mut self, number_of_points: usize) {
        self.minimum_number_of_points = number_of_points.max(MIN_PNP_POINTS);
        if self.points_2d.len() == self.points_3d.len()
            && self.points_2d.len() > self.minimum_number_of_points
        {
            self.set_state(RecoveryState::ReadyForPoseCreation);
        } else if self.state == RecoveryState::ReadyForPoseCreation {
            self.set_state(RecoveryState::NotEnoughCorrespondences);
        }
    }

    /// Selects the image. A different image drops the collected points.
    pub fn set_image(&mut self, image: Arc<Image>) {
        if self.image.as_deref() == Some(image.as_ref()) {
            return;
        }
        self.image = Some(image);
        self.clear_points();
    }

    /// Selects the object model. A different model drops the collected
    /// points.
    pub fn set_object_model(&mut self, object_model: Arc<ObjectModel>) {
        if self.object_model.as_deref() == Some(object_model.as_ref()) {
            return;
        }
        self.object_model = Some(object_model);
        self.clear_points();
    }

    /// Adds a clicked image point.
    pub fn add_2d_point(&mut self, point: Vec2) {
        self.points_2d.push(point);
        let (added, other) = (self.points_2d.len(), self.points_3d.len());
        if added > other + 1 {
            self.points_2d.remove(added - 2);
            self.listeners.emit(&RecoveryEvent::CorrespondencesChanged);
            return;
        }
        self.update_state_after_add(added, other, RecoveryState::Missing3DPoint);
    }

    /// Adds a clicked object point.
    pub fn add_3d_point(&mut self, point: Vec3) {
        self.points_3d.push(point);
        let (added, other) = (self.points_3d.len(), self.points_2d.len());
        if added > other + 1 {
            self.points_3d.remove(added - 2);
            self.listeners.emit(&RecoveryEvent::CorrespondencesChanged);
            return;
        }
        self.update_state_after_add(added, other, RecoveryState::Missing2DPoint);
    }

    /// Drops the image, the object model and all points.
    pub fn reset(&mut self) {
        self.image = None;
        self.object_model = None;
        self.clear_points();
    }

    /// Solves the pose from the collected pairs with the image's camera
    /// matrix and adds it through `manager`. On success the recoverer is
    /// reset and the id of the new pose returned.
    pub fn recover_pose<S: LoadAndStoreStrategy>(
        &mut self,
        manager: &mut CachingModelManager<S>,
    ) -> Result<String, RecoveryError> {
        if self.state != RecoveryState::ReadyForPoseCreation {
            return Err(RecoveryError::NotReady(self.state));
        }
        let image = self.image.clone().ok_or(RecoveryError::NoImage)?;
        let object_model = self
            .object_model
            .clone()
            .ok_or(RecoveryError::NoObjectModel)?;

        let (position, rotation) =
            solve_camera_pose(&self.points_3d, &self.points_2d, image.camera_matrix)?;
        let id = manager
            .add_pose(image, object_model, position, rotation)
            .ok_or(RecoveryError::NotStored)?;

        info!("recovered pose {id} from {} correspondences", self.points_2d.len());
        self.reset();
        self.listeners.emit(&RecoveryEvent::PoseRecovered(id.clone()));
        Ok(id)
    }

    fn update_state_after_add(&mut self, added: usize, other: usize, missing: RecoveryState) {
        let state = if added == other && added > self.minimum_number_of_points {
            RecoveryState::ReadyForPoseCreation
        } else if added == other {
            RecoveryState::NotEnoughCorrespondences
        } else {
            missing
        };
        self.set_state(state);
        self.listeners.emit(&RecoveryEvent::CorrespondencesChanged);
    }

    fn clear_points(&mut self) {
        self.points_2d.clear();
        self.points_3d.clear();
        self.set_state(RecoveryState::Empty);
        self.listeners.emit(&RecoveryEvent::CorrespondencesChanged);
    }

    fn set_state(&mut self, state: RecoveryState) {
        if self.state != state {
            self.state = state;
            self.listeners.emit(&RecoveryEvent::StateChanged(state));
        }
    }
}

/// Pose of the object in the camera frame from object points and their
/// pixel positions, for a distortion-free camera with matrix `k`.
///
/// Returns the translation and rotation mapping object coordinates into the
/// camera frame.
pub fn solve_camera_pose(
    object_points: &[Vec3],
    image_points: &[Vec2],
    k: Mat3,
) -> Result<(Vec3, Quat), RecoveryError> {
    let world: Vec<[f32; 3]> = object_points.iter().map(|p| p.to_array()).collect();
    let image: Vec<[f32; 2]> = image_points.iter().map(|p| p.to_array()).collect();
    // Rows of K.
    let k_rows = k.transpose().to_cols_array_2d();

    let result = solve_pnp(&world, &image, &k_rows, None, PnPMethod::EPnPDefault)?;
    let rotation = Mat3::from_cols_array_2d(&result.rotation).transpose();
    Ok((
        Vec3::from_array(result.translation),
        Quat::from_mat3(&rotation).normalize(),
    ))
}
