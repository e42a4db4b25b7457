//! Collection state held behind an [`crate::EntityStore`].

use fleetdeck_core::{Entity, StoreError, StoreResult};
use futures_util::future::{BoxFuture, Shared};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Handle to the outstanding `list` request, awaited by every joiner.
pub(crate) type SharedFetch = Shared<BoxFuture<'static, StoreResult<()>>>;

/// Bulk fetch lifecycle of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Unfetched,
    Loading,
    Loaded,
}

/// Mutation in flight for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Idle,
    Saving,
    Deleting,
}

/// Per-item status entry. `Idle` entries only exist to carry an error.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemState {
    pub status: ItemStatus,
    pub error: Option<StoreError>,
}

impl ItemState {
    pub fn in_flight(status: ItemStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    pub fn failed(error: StoreError) -> Self {
        Self {
            status: ItemStatus::Idle,
            error: Some(error),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.status != ItemStatus::Idle
    }
}

/// Local mirror of one server-held collection.
pub struct CollectionState<T: Entity> {
    pub(crate) items: IndexMap<T::Key, T>,
    pub(crate) status: CollectionStatus,
    pub(crate) item_states: HashMap<T::Key, ItemState>,
    pub(crate) last_error: Option<StoreError>,
    pub(crate) selected: IndexSet<T::Key>,
    pub(crate) active: Option<T::Key>,
    pub(crate) saving: usize,
    pub(crate) saved: bool,
    pub(crate) list_in_flight: Option<SharedFetch>,
}

impl<T: Entity> Default for CollectionState<T> {
    fn default() -> Self {
        Self {
            items: IndexMap::new(),
            status: CollectionStatus::Unfetched,
            item_states: HashMap::new(),
            last_error: None,
            selected: IndexSet::new(),
            active: None,
            saving: 0,
            saved: false,
            list_in_flight: None,
        }
    }
}

impl<T: Entity> fmt::Debug for CollectionState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionState")
            .field("model", &T::MODEL)
            .field("items", &self.items.len())
            .field("status", &self.status)
            .field("item_states", &self.item_states)
            .field("last_error", &self.last_error)
            .field("selected", &self.selected)
            .field("active", &self.active)
            .field("saving", &self.saving)
            .field("saved", &self.saved)
            .field("list_in_flight", &self.list_in_flight.is_some())
            .finish()
    }
}

impl<T: Entity> CollectionState<T> {
    /// Items in server arrival order.
    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.items.get(key)
    }

    pub fn contains(&self, key: &T::Key) -> bool {
        self.items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn status(&self) -> CollectionStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&StoreError> {
        self.last_error.as_ref()
    }

    pub fn item_state(&self, key: &T::Key) -> Option<&ItemState> {
        self.item_states.get(key)
    }

    pub fn item_states(&self) -> impl Iterator<Item = (&T::Key, &ItemState)> {
        self.item_states.iter()
    }

    /// Keys with a create/update/delete in flight, sorted.
    pub fn processing(&self) -> Vec<T::Key> {
        let mut keys: Vec<T::Key> = self
            .item_states
            .iter()
            .filter(|(_, state)| state.is_in_flight())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Selected keys in selection order. May name keys no longer held.
    pub fn selected(&self) -> impl Iterator<Item = &T::Key> {
        self.selected.iter()
    }

    pub fn is_selected(&self, key: &T::Key) -> bool {
        self.selected.contains(key)
    }

    pub fn active_key(&self) -> Option<&T::Key> {
        self.active.as_ref()
    }

    pub fn active(&self) -> Option<&T> {
        self.active.as_ref().and_then(|key| self.items.get(key))
    }

    pub fn saving(&self) -> bool {
        self.saving > 0
    }

    pub fn saved(&self) -> bool {
        self.saved
    }

    /// Insert or replace in place, keyed by the entity's own key.
    pub(crate) fn upsert(&mut self, entity: T) {
        self.items.insert(entity.key(), entity);
    }

    /// Replace the whole item list. Duplicate keys keep the last record at
    /// the first position.
    pub(crate) fn replace_all(&mut self, entities: Vec<T>) {
        self.items = entities
            .into_iter()
            .map(|entity| (entity.key(), entity))
            .collect();
    }

    /// Drop an item and everything that refers to it.
    pub(crate) fn forget(&mut self, key: &T::Key) -> Option<T> {
        self.item_states.remove(key);
        self.selected.shift_remove(key);
        if self.active.as_ref() == Some(key) {
            self.active = None;
        }
        self.items.shift_remove(key)
    }

    /// Whether the status entry for `key` is still the one this reply set.
    pub(crate) fn owns_status(&self, key: &T::Key, status: ItemStatus) -> bool {
        self.item_states
            .get(key)
            .map(|state| state.status == status)
            .unwrap_or(false)
    }

    /// Record a key-scoped failure without disturbing an in-flight status.
    pub(crate) fn record_item_error(&mut self, key: T::Key, error: StoreError) {
        self.item_states
            .entry(key)
            .and_modify(|state| state.error = Some(error.clone()))
            .or_insert_with(|| ItemState::failed(error));
    }

    /// Clear transient errors and flags. Never touches items, the collection
    /// status or in-flight entries.
    pub(crate) fn cleanup(&mut self) {
        self.last_error = None;
        self.saved = false;
        self.item_states.retain(|_, state| state.is_in_flight());
        for state in self.item_states.values_mut() {
            state.error = None;
        }
    }
}
