//! In-memory annotation data with persistence through a
//! [`LoadAndStoreStrategy`].
//!
//! Every mutation is persisted before it becomes visible: a pose that could
//! not be written is never added, an update that could not be written is
//! rolled back, and a pose whose deletion could not be written stays.

use std::collections::HashMap;
use std::sync::Arc;

use bevy::prelude::*;

use crate::error::StoreError;
use crate::events::{DataKinds, ListenerId, Listeners, ManagerState, ModelEvent};
use crate::model::{create_pose_id, unique_pose_id, Image, ObjectModel, Pose};
use crate::store::LoadAndStoreStrategy;

/// Caches images, object models and poses and keeps per-image and
/// per-model pose lookups.
pub struct CachingModelManager<S> {
    strategy: S,
    state: ManagerState,
    images: Vec<Arc<Image>>,
    object_models: Vec<Arc<ObjectModel>>,
    poses: Vec<Pose>,
    poses_for_images: HashMap<String, Vec<usize>>,
    poses_for_object_models: HashMap<String, Vec<usize>>,
    listeners: Listeners<ModelEvent>,
}

impl<S: LoadAndStoreStrategy> CachingModelManager<S> {
    /// Creates an empty manager; call [`reload`](Self::reload) to load data.
    pub fn new(strategy: S) -> Self {
        Self {
            strategy,
            state: ManagerState::Empty,
            images: Vec::new(),
            object_models: Vec::new(),
            poses: Vec::new(),
            poses_for_images: HashMap::new(),
            poses_for_object_models: HashMap::new(),
            listeners: Listeners::default(),
        }
    }

    /// The underlying strategy.
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Mutable access to the strategy, e.g. to change its paths before a reload.
    pub fn strategy_mut(&mut self) -> &mut S {
        &mut self.strategy
    }

    /// Current state.
    pub fn state(&self) -> ManagerState {
        self.state
    }

    /// Registers an event callback.
    pub fn subscribe(
        &mut self,
        callback: impl FnMut(&ModelEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.subscribe(callback)
    }

    /// Removes an event callback.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    fn set_state(&mut self, state: ManagerState) {
        self.state = state;
        self.listeners.emit(&ModelEvent::StateChanged(state));
    }

    fn report(&mut self, error: &StoreError) {
        error!("{error}");
        self.listeners.emit(&ModelEvent::Error(error.to_string()));
    }

    /// Reloads everything from the strategy.
    pub fn reload(&mut self) {
        self.load(DataKinds::all());
    }

    /// Reloads the lists named in `kinds`. Poses are always reloaded since
    /// they refer to images and object models.
    pub fn on_data_changed(&mut self, kinds: DataKinds) {
        self.load(kinds | DataKinds::POSES);
    }

    fn load(&mut self, kinds: DataKinds) {
        self.set_state(ManagerState::Loading);
        let mut failed = false;

        if kinds.contains(DataKinds::IMAGES) {
            match self.strategy.load_images() {
                Ok(images) => self.images = images.into_iter().map(Arc::new).collect(),
                Err(err) => {
                    self.images.clear();
                    self.report(&err);
                    failed = true;
                }
            }
        }
        if kinds.contains(DataKinds::OBJECT_MODELS) {
            match self.strategy.load_object_models() {
                Ok(models) => self.object_models = models.into_iter().map(Arc::new).collect(),
                Err(err) => {
                    self.object_models.clear();
                    self.report(&err);
                    failed = true;
                }
            }
        }
        match self
            .strategy
            .load_poses(&self.images, &self.object_models)
        {
            Ok(poses) => self.poses = poses,
            Err(err) => {
                self.poses.clear();
                self.report(&err);
                failed = true;
            }
        }
        self.rebuild_cache();

        info!(
            "loaded {} images, {} object models, {} poses",
            self.images.len(),
            self.object_models.len(),
            self.poses.len()
        );
        self.set_state(if failed {
            ManagerState::ErrorOccurred
        } else {
            ManagerState::Ready
        });
        self.listeners.emit(&ModelEvent::DataChanged(kinds));
    }

    fn rebuild_cache(&mut self) {
        self.poses_for_images.clear();
        self.poses_for_object_models.clear();
        for (index, pose) in self.poses.iter().enumerate() {
            self.poses_for_images
                .entry(pose.image.image_path.clone())
                .or_default()
                .push(index);
            self.poses_for_object_models
                .entry(pose.object_model.path.clone())
                .or_default()
                .push(index);
        }
    }

    /// All images.
    pub fn images(&self) -> &[Arc<Image>] {
        &self.images
    }

    /// All object models.
    pub fn object_models(&self) -> &[Arc<ObjectModel>] {
        &self.object_models
    }

    /// All poses.
    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    /// The pose with `id`.
    pub fn pose_by_id(&self, id: &str) -> Option<&Pose> {
        self.poses.iter().find(|pose| pose.id == id)
    }

    /// Poses placed over `image`.
    pub fn poses_for_image(&self, image: &Image) -> Vec<&Pose> {
        self.cached(&self.poses_for_images, &image.image_path)
    }

    /// Poses of `object_model`.
    pub fn poses_for_object_model(&self, object_model: &ObjectModel) -> Vec<&Pose> {
        self.cached(&self.poses_for_object_models, &object_model.path)
    }

    /// Poses of `object_model` placed over `image`.
    pub fn poses_for_image_and_object_model(
        &self,
        image: &Image,
        object_model: &ObjectModel,
    ) -> Vec<&Pose> {
        self.poses_for_image(image)
            .into_iter()
            .filter(|pose| pose.object_model.path == object_model.path)
            .collect()
    }

    fn cached<'a>(&'a self, cache: &HashMap<String, Vec<usize>>, key: &str) -> Vec<&'a Pose> {
        cache
            .get(key)
            .map(|indices| indices.iter().map(|&i| &self.poses[i]).collect())
            .unwrap_or_default()
    }

    /// Creates, persists and adds a pose. Returns its id, or `None` if it
    /// could not be persisted.
    pub fn add_pose(
        &mut self,
        image: Arc<Image>,
        object_model: Arc<ObjectModel>,
        position: Vec3,
        rotation: Quat,
    ) -> Option<String> {
        let id = unique_pose_id(create_pose_id(&image, &object_model), |id| {
            self.pose_by_id(id).is_some()
        });
        self.add_existing_pose(Pose::new(id, position, rotation, image, object_model))
    }

    /// Persists and adds a fully built pose. Returns its id, or `None` if it
    /// could not be persisted or the id is already in use.
    pub fn add_existing_pose(&mut self, pose: Pose) -> Option<String> {
        if self.pose_by_id(&pose.id).is_some() {
            warn!("pose {} already exists", pose.id);
            return None;
        }
        if let Err(err) = self.strategy.persist_pose(&pose, false) {
            self.report(&err);
            return None;
        }

        let id = pose.id.clone();
        self.poses.push(pose);
        self.rebuild_cache();
        self.listeners.emit(&ModelEvent::PoseAdded(id.clone()));
        Some(id)
    }

    /// Changes a pose and persists it; the change is rolled back if
    /// persisting fails. Returns whether the pose was updated.
    pub fn update_pose(&mut self, id: &str, position: Vec3, rotation: Quat) -> bool {
        let Some(index) = self.poses.iter().position(|pose| pose.id == id) else {
            return false;
        };

        let pose = &mut self.poses[index];
        let previous = (pose.position, pose.rotation);
        pose.position = position;
        pose.rotation = rotation;

        if let Err(err) = self.strategy.persist_pose(&self.poses[index], false) {
            let pose = &mut self.poses[index];
            (pose.position, pose.rotation) = previous;
            self.report(&err);
            return false;
        }

        self.listeners.emit(&ModelEvent::PoseUpdated(id.to_owned()));
        true
    }

    /// Deletes a pose from storage and then from memory. Returns whether it
    /// was removed.
    pub fn remove_pose(&mut self, id: &str) -> bool {
        let Some(index) = self.poses.iter().position(|pose| pose.id == id) else {
            return false;
        };
        if let Err(err) = self.strategy.persist_pose(&self.poses[index], true) {
            self.report(&err);
            return false;
        }

        self.poses.remove(index);
        self.rebuild_cache();
        self.listeners.emit(&ModelEvent::PoseDeleted(id.to_owned()));
        true
    }
}
