//! Generic entity store.
//!
//! Each remote operation marks the collection state synchronously, then runs
//! its request on a spawned task. The task applies the reply under the state
//! lock before the caller sees the result, so a caller that stops waiting
//! does not stop the reply from landing. The lock is never held across an
//! await; replies are applied one at a time in arrival order.

use crate::state::{CollectionState, CollectionStatus, ItemState, ItemStatus};
use fleetdeck_core::{
    Dispatcher, Entity, Method, Notify, NotifyAction, PrimaryKey, RemoteError, Request,
    StoreError, StoreResult,
};
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

type Reply = Result<JsonValue, RemoteError>;

/// Synchronized local mirror of one server-held collection.
///
/// Cheap to clone; clones share state.
pub struct EntityStore<T: Entity, D: Dispatcher> {
    pub(crate) state: Arc<Mutex<CollectionState<T>>>,
    dispatcher: Arc<D>,
}

impl<T: Entity, D: Dispatcher> Clone for EntityStore<T, D> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

fn lock_state<T: Entity>(
    state: &Mutex<CollectionState<T>>,
) -> StoreResult<MutexGuard<'_, CollectionState<T>>> {
    state.lock().map_err(|_| StoreError::LockPoisoned)
}

fn decode<E: DeserializeOwned>(value: JsonValue) -> Result<E, RemoteError> {
    serde_json::from_value(value).map_err(RemoteError::from)
}

async fn join<R>(handle: JoinHandle<StoreResult<R>>) -> StoreResult<R> {
    handle.await.unwrap_or_else(|err| {
        Err(StoreError::Aborted {
            reason: err.to_string(),
        })
    })
}

/// `{PK_FIELD: key, ..payload}`.
fn keyed_params<T: Entity>(key: &T::Key, payload: JsonValue) -> JsonValue {
    let mut params = match payload {
        JsonValue::Object(map) => map,
        JsonValue::Null => Map::new(),
        other => {
            tracing::warn!(
                model = T::MODEL,
                payload = %other,
                "Ignoring non-object update payload"
            );
            Map::new()
        }
    };
    params.insert(T::PK_FIELD.to_string(), key.to_json());
    JsonValue::Object(params)
}

/// Apply a `list` reply. On failure the status returns to `previous`, so a
/// loaded collection stays loaded with its stale items.
fn apply_list<T: Entity>(
    state: &mut CollectionState<T>,
    reply: Reply,
    previous: CollectionStatus,
) -> StoreResult<()> {
    state.list_in_flight = None;
    match reply.and_then(decode::<Vec<T>>) {
        Ok(items) => {
            tracing::info!(model = T::MODEL, count = items.len(), "Collection loaded");
            state.replace_all(items);
            state.status = CollectionStatus::Loaded;
            Ok(())
        }
        Err(err) => {
            let err = StoreError::from(err);
            state.status = previous;
            state.last_error = Some(err.clone());
            Err(err)
        }
    }
}

impl<T: Entity, D: Dispatcher> EntityStore<T, D> {
    pub fn new(dispatcher: Arc<D>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CollectionState::default())),
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &Arc<D> {
        &self.dispatcher
    }

    pub fn model(&self) -> &'static str {
        T::MODEL
    }

    pub(crate) fn lock(&self) -> StoreResult<MutexGuard<'_, CollectionState<T>>> {
        lock_state(&self.state)
    }

    /// Send `request` on its own task and apply the reply there.
    fn spawn_request<R, F>(&self, request: Request, apply: F) -> JoinHandle<StoreResult<R>>
    where
        R: Send + 'static,
        F: FnOnce(&mut CollectionState<T>, Reply) -> StoreResult<R> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            let endpoint = request.endpoint();
            tracing::debug!(endpoint = %endpoint, "Sending request");
            let reply = dispatcher.send(request).await;
            if let Err(err) = &reply {
                tracing::warn!(endpoint = %endpoint, error = %err, "Request failed");
            }
            let mut state = lock_state(&state)?;
            apply(&mut state, reply)
        })
    }

    // ========================================================================
    // REMOTE OPERATIONS
    // ========================================================================

    /// Load the whole collection, joining a `list` already in flight.
    ///
    /// On failure the previous items and status are kept and the error is
    /// recorded as the collection error.
    pub async fn fetch_all(&self) -> StoreResult<Vec<T>> {
        let fetch = {
            let mut state = self.lock()?;
            match &state.list_in_flight {
                Some(fetch) => {
                    tracing::debug!(model = T::MODEL, "Joining in-flight list request");
                    fetch.clone()
                }
                None => {
                    let previous = std::mem::replace(&mut state.status, CollectionStatus::Loading);
                    let handle = self.spawn_request(Request::list(T::MODEL), move |state, reply| {
                        apply_list::<T>(state, reply, previous)
                    });
                    let fetch = join(handle).boxed().shared();
                    state.list_in_flight = Some(fetch.clone());
                    fetch
                }
            }
        };
        fetch.await?;
        self.all()
    }

    /// Fetch the collection unless it is already loaded.
    pub async fn ensure_loaded(&self) -> StoreResult<()> {
        if self.status()? == CollectionStatus::Loaded {
            return Ok(());
        }
        self.fetch_all().await.map(|_| ())
    }

    /// Fetch one record and upsert it. The collection status is untouched.
    pub async fn fetch_one(&self, key: T::Key) -> StoreResult<T> {
        let request = Request::new(Method::Get, T::MODEL, T::key_params(&key));
        let handle = self.spawn_request(request, move |state, reply| {
            match reply.and_then(decode::<T>) {
                Ok(entity) => {
                    state.upsert(entity.clone());
                    Ok(entity)
                }
                Err(err) => {
                    let err = StoreError::from(err);
                    state.record_item_error(key, err.clone());
                    Err(err)
                }
            }
        });
        join(handle).await
    }

    /// Return the cached record, fetching it when absent.
    pub async fn get(&self, key: T::Key) -> StoreResult<T> {
        if let Some(entity) = self.by_key(&key)? {
            return Ok(entity);
        }
        self.fetch_one(key).await
    }

    /// Create a record from `payload` and append the server's copy.
    pub async fn create(&self, payload: JsonValue) -> StoreResult<T> {
        self.lock()?.saving += 1;
        let request = Request::new(Method::Create, T::MODEL, payload);
        let handle = self.spawn_request(request, |state, reply| {
            state.saving = state.saving.saturating_sub(1);
            match reply.and_then(decode::<T>) {
                Ok(entity) => {
                    tracing::info!(model = T::MODEL, key = %entity.key(), "Created");
                    state.upsert(entity.clone());
                    state.saved = true;
                    Ok(entity)
                }
                Err(err) => {
                    let err = StoreError::from(err);
                    state.last_error = Some(err.clone());
                    Err(err)
                }
            }
        });
        join(handle).await
    }

    /// Update a held record in place.
    ///
    /// A reply for a record removed in the meantime is dropped rather than
    /// re-inserting it.
    pub async fn update(&self, key: T::Key, payload: JsonValue) -> StoreResult<T> {
        let params = {
            let mut state = self.lock()?;
            if !state.contains(&key) {
                return Err(StoreError::unknown_key(T::MODEL, &key));
            }
            state
                .item_states
                .insert(key.clone(), ItemState::in_flight(ItemStatus::Saving));
            keyed_params::<T>(&key, payload)
        };

        let request = Request::new(Method::Update, T::MODEL, params);
        let handle = self.spawn_request(request, move |state, reply| {
            let owned = state.owns_status(&key, ItemStatus::Saving);
            match reply.and_then(decode::<T>) {
                Ok(entity) => {
                    if owned {
                        state.item_states.remove(&key);
                    }
                    match state.items.get_mut(&key) {
                        Some(slot) => {
                            *slot = entity.clone();
                            state.saved = true;
                        }
                        None => tracing::debug!(
                            model = T::MODEL,
                            key = %key,
                            "Dropping update reply for removed item"
                        ),
                    }
                    Ok(entity)
                }
                Err(err) => {
                    let err = StoreError::from(err);
                    if owned {
                        state.item_states.insert(key, ItemState::failed(err.clone()));
                    }
                    Err(err)
                }
            }
        });
        join(handle).await
    }

    /// Delete a held record.
    pub async fn delete(&self, key: T::Key) -> StoreResult<()> {
        {
            let mut state = self.lock()?;
            if !state.contains(&key) {
                return Err(StoreError::unknown_key(T::MODEL, &key));
            }
            state
                .item_states
                .insert(key.clone(), ItemState::in_flight(ItemStatus::Deleting));
        }

        let request = Request::new(Method::Delete, T::MODEL, T::key_params(&key));
        let handle = self.spawn_request(request, move |state, reply| {
            let owned = state.owns_status(&key, ItemStatus::Deleting);
            match reply {
                Ok(_) => {
                    tracing::info!(model = T::MODEL, key = %key, "Deleted");
                    state.items.shift_remove(&key);
                    state.selected.shift_remove(&key);
                    if state.active.as_ref() == Some(&key) {
                        state.active = None;
                    }
                    if owned {
                        state.item_states.remove(&key);
                    }
                    state.saved = true;
                    Ok(())
                }
                Err(err) => {
                    let err = StoreError::from(err);
                    if owned {
                        state.item_states.insert(key, ItemState::failed(err.clone()));
                    }
                    Err(err)
                }
            }
        });
        join(handle).await
    }

    /// Mark a record as the focused one on the server, or clear the focus.
    pub async fn set_active(&self, key: Option<T::Key>) -> StoreResult<Option<T>> {
        let params = key.as_ref().map(T::key_params).unwrap_or(JsonValue::Null);
        let request = Request::new(Method::SetActive, T::MODEL, params);
        let handle = self.spawn_request(request, move |state, reply| match key {
            None => match reply {
                Ok(_) => {
                    state.active = None;
                    Ok(None)
                }
                Err(err) => {
                    let err = StoreError::from(err);
                    state.last_error = Some(err.clone());
                    Err(err)
                }
            },
            Some(key) => match reply.and_then(decode::<T>) {
                Ok(entity) => {
                    state.active = Some(entity.key());
                    state.upsert(entity.clone());
                    Ok(Some(entity))
                }
                Err(err) => {
                    let err = StoreError::from(err);
                    state.record_item_error(key, err.clone());
                    Err(err)
                }
            },
        });
        join(handle).await
    }

    // ========================================================================
    // LOCAL OPERATIONS
    // ========================================================================

    /// Clear the collection error, the saved flag and settled item entries.
    pub fn cleanup(&self) -> StoreResult<()> {
        self.lock()?.cleanup();
        Ok(())
    }

    /// Apply a server push. Returns whether the notification was for this
    /// collection and changed it.
    ///
    /// Creates upsert. Updates only replace held items, so a push for a record
    /// this client never listed is not adopted.
    pub fn apply_notify(&self, notify: &Notify) -> StoreResult<bool> {
        if notify.name != T::MODEL {
            return Ok(false);
        }
        match notify.action {
            NotifyAction::Create => {
                let entity: T = decode(notify.data.clone())?;
                tracing::debug!(
                    model = T::MODEL,
                    key = %entity.key(),
                    "Applying create notification"
                );
                self.lock()?.upsert(entity);
                Ok(true)
            }
            NotifyAction::Update => {
                let entity: T = decode(notify.data.clone())?;
                let key = entity.key();
                let mut state = self.lock()?;
                match state.items.get_mut(&key) {
                    Some(slot) => {
                        tracing::debug!(model = T::MODEL, key = %key, "Applying update");
                        *slot = entity;
                        Ok(true)
                    }
                    None => {
                        tracing::debug!(model = T::MODEL, key = %key, "Ignoring update, not held");
                        Ok(false)
                    }
                }
            }
            NotifyAction::Delete => {
                let key = T::key_from_json(&notify.data).ok_or_else(|| {
                    RemoteError::decode(format!("{} delete notification without key", T::MODEL))
                })?;
                tracing::debug!(model = T::MODEL, key = %key, "Applying delete notification");
                Ok(self.lock()?.forget(&key).is_some())
            }
            NotifyAction::Unknown => {
                tracing::debug!(model = T::MODEL, "Ignoring unknown notification action");
                Ok(false)
            }
        }
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Run a pure projection over the current state.
    pub fn read<R>(&self, f: impl FnOnce(&CollectionState<T>) -> R) -> StoreResult<R> {
        let state = self.lock()?;
        Ok(f(&state))
    }

    pub fn all(&self) -> StoreResult<Vec<T>> {
        self.read(|state| state.items().cloned().collect())
    }

    pub fn by_key(&self, key: &T::Key) -> StoreResult<Option<T>> {
        self.read(|state| state.get(key).cloned())
    }

    pub fn status(&self) -> StoreResult<CollectionStatus> {
        self.read(|state| state.status())
    }

    /// The collection-scoped error, if any.
    pub fn errors(&self) -> StoreResult<Option<StoreError>> {
        self.read(|state| state.last_error().cloned())
    }

    pub fn item_status(&self, key: &T::Key) -> StoreResult<Option<ItemState>> {
        self.read(|state| state.item_state(key).cloned())
    }

    pub fn active(&self) -> StoreResult<Option<T>> {
        self.read(|state| state.active().cloned())
    }

    pub fn len(&self) -> StoreResult<usize> {
        self.read(|state| state.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        self.read(|state| state.is_empty())
    }

    pub fn processing(&self) -> StoreResult<Vec<T::Key>> {
        self.read(|state| state.processing())
    }

    pub fn saving(&self) -> StoreResult<bool> {
        self.read(|state| state.saving())
    }

    pub fn saved(&self) -> StoreResult<bool> {
        self.read(|state| state.saved())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetdeck_test_utils::fixtures::{zone, zone_json};
    use fleetdeck_test_utils::{MockDispatcher, TestZone};
    use serde_json::json;

    fn store(mock: &Arc<MockDispatcher>) -> EntityStore<TestZone, MockDispatcher> {
        EntityStore::new(Arc::clone(mock))
    }

    #[test]
    fn test_keyed_params_merges_key() {
        let params = keyed_params::<TestZone>(&3, json!({"description": "lab"}));
        assert_eq!(params, json!({"id": 3, "description": "lab"}));
        assert_eq!(keyed_params::<TestZone>(&3, JsonValue::Null), json!({"id": 3}));
    }

    #[tokio::test]
    async fn test_fetch_all_loads_collection() {
        let mock = Arc::new(MockDispatcher::new());
        mock.reply_ok(Method::List, json!([zone_json(1, "a"), zone_json(2, "b")]));
        let zones = store(&mock);

        let items = zones.fetch_all().await.unwrap();
        assert_eq!(items, vec![zone(1, "a"), zone(2, "b")]);
        assert_eq!(zones.status().unwrap(), CollectionStatus::Loaded);
    }

    #[tokio::test]
    async fn test_fetch_all_failure_keeps_items() {
        let mock = Arc::new(MockDispatcher::new());
        mock.reply_ok(Method::List, json!([zone_json(1, "a")]));
        mock.reply_err(Method::List, RemoteError::transport("reset"));
        let zones = store(&mock);

        zones.fetch_all().await.unwrap();
        let err = zones.fetch_all().await.unwrap_err();

        assert!(matches!(err, StoreError::Remote(RemoteError::Transport { .. })));
        assert_eq!(zones.status().unwrap(), CollectionStatus::Loaded);
        assert_eq!(zones.len().unwrap(), 1);
        assert_eq!(zones.errors().unwrap(), Some(err));
    }

    #[tokio::test]
    async fn test_ensure_loaded_skips_when_loaded() {
        let mock = Arc::new(MockDispatcher::new());
        mock.reply_ok(Method::List, json!([]));
        let zones = store(&mock);

        zones.ensure_loaded().await.unwrap();
        zones.ensure_loaded().await.unwrap();
        assert_eq!(mock.request_count(Method::List), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_key_sends_nothing() {
        let mock = Arc::new(MockDispatcher::new());
        let zones = store(&mock);

        let err = zones.update(9, json!({"name": "x"})).await.unwrap_err();
        assert_eq!(err, StoreError::unknown_key("zone", 9));
        let err = zones.delete(9).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownKey { .. }));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_get_uses_cache_then_fetches() {
        let mock = Arc::new(MockDispatcher::new());
        mock.reply_ok(Method::List, json!([zone_json(1, "a")]));
        mock.reply_ok(Method::Get, zone_json(2, "b"));
        let zones = store(&mock);
        zones.fetch_all().await.unwrap();

        assert_eq!(zones.get(1).await.unwrap(), zone(1, "a"));
        assert_eq!(mock.request_count(Method::Get), 0);
        assert_eq!(zones.get(2).await.unwrap(), zone(2, "b"));
        assert_eq!(mock.request_count(Method::Get), 1);
        assert_eq!(zones.len().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_fetch_one_failure_is_key_scoped() {
        let mock = Arc::new(MockDispatcher::new());
        mock.reply_err(
            Method::Get,
            RemoteError::NotFound {
                model: "zone".to_string(),
                key: "5".to_string(),
            },
        );
        let zones = store(&mock);

        assert!(zones.fetch_one(5).await.is_err());
        assert!(zones.errors().unwrap().is_none());
        let state = zones.item_status(&5).unwrap().unwrap();
        assert_eq!(state.status, ItemStatus::Idle);
        assert!(state.error.is_some());
        assert_eq!(zones.status().unwrap(), CollectionStatus::Unfetched);
    }

    #[tokio::test]
    async fn test_set_active_and_clear() {
        let mock = Arc::new(MockDispatcher::new());
        mock.reply_ok(Method::SetActive, zone_json(4, "d"));
        mock.reply_ok(Method::SetActive, JsonValue::Null);
        let zones = store(&mock);

        let active = zones.set_active(Some(4)).await.unwrap();
        assert_eq!(active, Some(zone(4, "d")));
        assert_eq!(zones.active().unwrap(), Some(zone(4, "d")));

        assert_eq!(zones.set_active(None).await.unwrap(), None);
        assert!(zones.active().unwrap().is_none());
        assert_eq!(mock.requests()[1].params, JsonValue::Null);
    }

    #[tokio::test]
    async fn test_create_failure_is_collection_scoped() {
        let mock = Arc::new(MockDispatcher::new());
        mock.reply_err(Method::Create, RemoteError::rejected(json!({"name": "taken"})));
        let zones = store(&mock);

        assert!(zones.create(json!({"name": "a"})).await.is_err());
        assert!(zones.errors().unwrap().is_some());
        assert!(!zones.saving().unwrap());
        assert!(!zones.saved().unwrap());
    }

    #[tokio::test]
    async fn test_create_decode_failure_recorded() {
        let mock = Arc::new(MockDispatcher::new());
        mock.reply_ok(Method::Create, json!({"unexpected": true}));
        let zones = store(&mock);

        let err = zones.create(json!({"name": "a"})).await.unwrap_err();
        assert!(matches!(err, StoreError::Remote(RemoteError::Decode { .. })));
        assert!(zones.is_empty().unwrap());
    }

    #[test]
    fn test_apply_notify_routes_by_model() {
        let mock = Arc::new(MockDispatcher::new());
        let zones = store(&mock);

        let other = Notify {
            name: "machine".to_string(),
            action: NotifyAction::Create,
            data: json!({"system_id": "abc"}),
        };
        assert!(!zones.apply_notify(&other).unwrap());

        let create = Notify {
            name: "zone".to_string(),
            action: NotifyAction::Create,
            data: zone_json(1, "a"),
        };
        assert!(zones.apply_notify(&create).unwrap());
        assert!(zones.apply_notify(&create).unwrap());
        assert_eq!(zones.len().unwrap(), 1);

        let delete = Notify {
            name: "zone".to_string(),
            action: NotifyAction::Delete,
            data: json!(1),
        };
        assert!(zones.apply_notify(&delete).unwrap());
        assert!(zones.is_empty().unwrap());
        assert!(!zones.apply_notify(&delete).unwrap());
    }

    #[test]
    fn test_update_notify_only_replaces_held_items() {
        let mock = Arc::new(MockDispatcher::new());
        let zones = store(&mock);
        let update = |id, name| Notify {
            name: "zone".to_string(),
            action: NotifyAction::Update,
            data: zone_json(id, name),
        };

        assert!(!zones.apply_notify(&update(1, "a")).unwrap());
        assert!(zones.is_empty().unwrap());

        zones.lock().unwrap().upsert(zone(1, "a"));
        assert!(zones.apply_notify(&update(1, "renamed")).unwrap());
        assert_eq!(zones.all().unwrap(), vec![zone(1, "renamed")]);
    }

    #[test]
    fn test_apply_notify_bad_payload() {
        let mock = Arc::new(MockDispatcher::new());
        let zones = store(&mock);
        let notify = Notify {
            name: "zone".to_string(),
            action: NotifyAction::Delete,
            data: json!({"name": "no key"}),
        };
        let err = zones.apply_notify(&notify).unwrap_err();
        assert!(matches!(err, StoreError::Remote(RemoteError::Decode { .. })));
    }
}
