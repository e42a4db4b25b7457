//! Per-entity facades over the generic store.
//!
//! A [`Facade`] derefs to its [`EntityStore`], so every engine operation is
//! available directly. On top it adds pure projections over the held items:
//! filter-language search and the kind-specific lookups defined next to each
//! model.

use crate::models::{field_value, lookup, Searchable};
use fleetdeck_core::{Dispatcher, StoreResult};
use fleetdeck_filter::{
    matches, parse, FieldAccessor, FieldValue, PredicateSet, ValueSpec, SELECTED_FIELD,
};
use fleetdeck_store::EntityStore;
use serde_json::Value as JsonValue;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

/// Value of the `in` field that refers to the current selection.
pub const SELECTED_VALUE: &str = "selected";

pub struct Facade<T: Searchable, D: Dispatcher> {
    store: EntityStore<T, D>,
}

impl<T: Searchable, D: Dispatcher> Clone for Facade<T, D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<T: Searchable, D: Dispatcher> Deref for Facade<T, D> {
    type Target = EntityStore<T, D>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Reads filter fields from an entity's serialized form.
pub struct JsonAccessor<T> {
    _kind: PhantomData<fn() -> T>,
}

impl<T> Default for JsonAccessor<T> {
    fn default() -> Self {
        Self { _kind: PhantomData }
    }
}

impl<T: Searchable> FieldAccessor<JsonValue> for JsonAccessor<T> {
    fn value(&self, entity: &JsonValue, field: &str) -> Option<FieldValue> {
        lookup(entity, T::field_path(field)).and_then(field_value)
    }

    fn default_value(&self, entity: &JsonValue) -> Option<FieldValue> {
        self.value(entity, T::DEFAULT_FIELD)
    }
}

/// `in:(selected)` holds for selected items, `!in:(selected)` for the rest.
/// Any other value names nothing and never matches.
fn selection_matches(spec: &ValueSpec, selected: bool) -> bool {
    if spec.values.is_empty() {
        return true;
    }
    if !spec.contains(SELECTED_VALUE) {
        return false;
    }
    selected != spec.negated
}

impl<T: Searchable, D: Dispatcher> Facade<T, D> {
    pub fn new(dispatcher: Arc<D>) -> Self {
        Self {
            store: EntityStore::new(dispatcher),
        }
    }

    pub fn store(&self) -> &EntityStore<T, D> {
        &self.store
    }

    /// First held item satisfying `predicate`, in collection order.
    pub fn first_where(&self, predicate: impl Fn(&T) -> bool) -> StoreResult<Option<T>> {
        self.read(|state| state.items().find(|item| predicate(item)).cloned())
    }

    pub fn all_where(&self, predicate: impl Fn(&T) -> bool) -> StoreResult<Vec<T>> {
        self.read(|state| state.items().filter(|item| predicate(item)).cloned().collect())
    }

    /// Held items matching `predicates`, in collection order.
    pub fn search(&self, predicates: &PredicateSet) -> StoreResult<Vec<T>> {
        let mut predicates = predicates.clone();
        let selection = predicates.remove(SELECTED_FIELD);
        let accessor = JsonAccessor::<T>::default();

        self.read(|state| {
            state
                .items()
                .filter(|item| {
                    if let Some(spec) = &selection {
                        if !selection_matches(spec, state.is_selected(&item.key())) {
                            return false;
                        }
                    }
                    if predicates.is_empty() {
                        return true;
                    }
                    let json = serde_json::to_value(*item).unwrap_or(JsonValue::Null);
                    matches(&json, &predicates, &accessor)
                })
                .cloned()
                .collect()
        })
    }

    /// Parse `text` as a filter expression and search with it.
    pub fn search_text(&self, text: &str) -> StoreResult<Vec<T>> {
        self.search(&parse(text))
    }

    /// Items whose `field` holds `value`.
    pub fn find_by(&self, field: &str, value: &str) -> StoreResult<Vec<T>> {
        self.search(&PredicateSet::new().with_clause(field, false, [value]))
    }

    pub fn count(&self, predicates: &PredicateSet) -> StoreResult<usize> {
        self.search(predicates).map(|items| items.len())
    }
}
