//! Typed change notifications for the annotation data.

use bitflags::bitflags;

bitflags! {
    /// Which lists of annotation data changed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DataKinds: u8 {
        /// The image list.
        const IMAGES = 1 << 0;
        /// The object model list.
        const OBJECT_MODELS = 1 << 1;
        /// The pose list.
        const POSES = 1 << 2;
    }
}

/// Lifecycle of the model manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManagerState {
    /// Nothing loaded yet.
    #[default]
    Empty,
    /// A (re)load is running.
    Loading,
    /// Data is loaded.
    Ready,
    /// The last load reported an error.
    ErrorOccurred,
}

/// Notification sent by the model manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    /// The manager state changed.
    StateChanged(ManagerState),
    /// Lists were reloaded.
    DataChanged(DataKinds),
    /// A pose with this id was added.
    PoseAdded(String),
    /// The pose with this id was changed.
    PoseUpdated(String),
    /// The pose with this id was removed.
    PoseDeleted(String),
    /// Loading or persisting failed.
    Error(String),
}

/// Handle returned by [`Listeners::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<E> = Box<dyn FnMut(&E) + Send + Sync>;

/// Callbacks for events of type `E`, called in subscription order.
pub struct Listeners<E> {
    next_id: u64,
    callbacks: Vec<(ListenerId, Callback<E>)>,
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self {
            next_id: 0,
            callbacks: Vec::new(),
        }
    }
}

impl<E> std::fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.callbacks.len())
            .finish()
    }
}

impl<E> Listeners<E> {
    /// Registers `callback` and returns a handle to remove it again.
    pub fn subscribe(&mut self, callback: impl FnMut(&E) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.callbacks.push((id, Box::new(callback)));
        id
    }

    /// Removes a callback. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(listener, _)| *listener != id);
        self.callbacks.len() != before
    }

    /// Calls every callback with `event`.
    pub fn emit(&mut self, event: &E) {
        for (_, callback) in &mut self.callbacks {
            callback(event);
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}
