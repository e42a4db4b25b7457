//! User selection over a collection.
//!
//! Selection is purely local. Keys stay selected until unselected, cleared,
//! or the record is deleted.

use crate::store::EntityStore;
use fleetdeck_core::{Dispatcher, Entity, StoreResult};

impl<T: Entity, D: Dispatcher> EntityStore<T, D> {
    pub fn select(&self, key: T::Key) -> StoreResult<()> {
        self.lock()?.selected.insert(key);
        Ok(())
    }

    pub fn unselect(&self, key: &T::Key) -> StoreResult<()> {
        self.lock()?.selected.shift_remove(key);
        Ok(())
    }

    /// Flip a key's selection. Returns whether it is now selected.
    pub fn toggle_selected(&self, key: T::Key) -> StoreResult<bool> {
        let mut state = self.lock()?;
        if state.selected.shift_remove(&key) {
            Ok(false)
        } else {
            state.selected.insert(key);
            Ok(true)
        }
    }

    /// Replace the selection.
    pub fn set_selected(&self, keys: impl IntoIterator<Item = T::Key>) -> StoreResult<()> {
        self.lock()?.selected = keys.into_iter().collect();
        Ok(())
    }

    pub fn clear_selected(&self) -> StoreResult<()> {
        self.lock()?.selected.clear();
        Ok(())
    }

    pub fn selected(&self) -> StoreResult<Vec<T::Key>> {
        self.read(|state| state.selected().cloned().collect())
    }

    pub fn is_selected(&self, key: &T::Key) -> StoreResult<bool> {
        self.read(|state| state.is_selected(key))
    }

    /// Selected records that are still held, in selection order.
    pub fn selected_items(&self) -> StoreResult<Vec<T>> {
        self.read(|state| {
            state
                .selected()
                .filter_map(|key| state.get(key).cloned())
                .collect()
        })
    }
}
