//! FLEETDECK Test Utilities
//!
//! Shared test infrastructure for the fleetdeck workspace:
//! - A scripted/deferred mock dispatcher
//! - Small entity types with numeric and string keys
//! - Proptest generators for entities and notifications
//! - Fixtures and custom assertions

pub use fleetdeck_core::{
    Dispatcher, Entity, Method, Notify, NotifyAction, PrimaryKey, RemoteError, Request,
    StoreError, StoreResult,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// Reply a dispatcher resolves a request with.
pub type Reply = Result<JsonValue, RemoteError>;

// ============================================================================
// MOCK DISPATCHER
// ============================================================================

struct PendingReply {
    request: Request,
    reply: oneshot::Sender<Reply>,
}

#[derive(Default)]
struct MockState {
    requests: Vec<Request>,
    scripted: HashMap<Method, VecDeque<Reply>>,
    pending: Vec<PendingReply>,
    deferred: bool,
}

/// Dispatcher double that records every request.
///
/// Replies come from a per-method script, consumed in order. Without a
/// scripted reply, a scripted mock fails the request with a transport error
/// and a deferred mock parks it until the test calls [`MockDispatcher::resolve`].
#[derive(Default)]
pub struct MockDispatcher {
    state: Mutex<MockState>,
}

impl MockDispatcher {
    /// Mock that answers only from its script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that parks unscripted requests until resolved.
    pub fn deferred() -> Self {
        let mock = Self::default();
        mock.state().deferred = true;
        mock
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a reply for the next unanswered request of `method`.
    pub fn push_reply(&self, method: Method, reply: Reply) {
        self.state()
            .scripted
            .entry(method)
            .or_default()
            .push_back(reply);
    }

    pub fn reply_ok(&self, method: Method, value: JsonValue) {
        self.push_reply(method, Ok(value));
    }

    pub fn reply_err(&self, method: Method, error: RemoteError) {
        self.push_reply(method, Err(error));
    }

    /// Every request sent so far, in send order.
    pub fn requests(&self) -> Vec<Request> {
        self.state().requests.clone()
    }

    pub fn request_count(&self, method: Method) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|request| request.method == method)
            .count()
    }

    /// Number of parked requests for `method`.
    pub fn pending(&self, method: Method) -> usize {
        self.state()
            .pending
            .iter()
            .filter(|pending| pending.request.method == method)
            .count()
    }

    /// Resolve the oldest parked request for `method`. Returns false when
    /// nothing was parked.
    pub fn resolve(&self, method: Method, reply: Reply) -> bool {
        let parked = {
            let mut state = self.state();
            let index = state
                .pending
                .iter()
                .position(|pending| pending.request.method == method);
            index.map(|index| state.pending.remove(index))
        };
        match parked {
            Some(pending) => pending.reply.send(reply).is_ok(),
            None => false,
        }
    }

    /// Wait until `count` requests for `method` are parked.
    ///
    /// # Panics
    ///
    /// Panics after five seconds.
    pub async fn wait_for_pending(&self, method: Method, count: usize) {
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            while self.pending(method) < count {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(
            waited.is_ok(),
            "timed out waiting for {count} pending {method} request(s)"
        );
    }
}

#[async_trait]
impl Dispatcher for MockDispatcher {
    async fn send(&self, request: Request) -> Reply {
        let receiver = {
            let mut state = self.state();
            state.requests.push(request.clone());
            let scripted = state
                .scripted
                .get_mut(&request.method)
                .and_then(VecDeque::pop_front);
            if let Some(reply) = scripted {
                return reply;
            }
            if !state.deferred {
                return Err(RemoteError::transport(format!(
                    "no scripted reply for {}",
                    request.endpoint()
                )));
            }
            let (sender, receiver) = oneshot::channel();
            state.pending.push(PendingReply {
                request,
                reply: sender,
            });
            receiver
        };
        receiver
            .await
            .unwrap_or_else(|_| Err(RemoteError::transport("mock reply dropped")))
    }
}

// ============================================================================
// TEST ENTITIES
// ============================================================================

/// Entity with a numeric key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestZone {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Entity for TestZone {
    type Key = u64;
    const MODEL: &'static str = "zone";
    const PK_FIELD: &'static str = "id";

    fn key(&self) -> u64 {
        self.id
    }
}

/// Entity with a string key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMachine {
    pub system_id: String,
    pub hostname: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Entity for TestMachine {
    type Key = String;
    const MODEL: &'static str = "machine";
    const PK_FIELD: &'static str = "system_id";

    fn key(&self) -> String {
        self.system_id.clone()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for fleetdeck test types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_zone_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,11}"
    }

    /// Zone ids are drawn from a small range so collisions are common.
    pub fn arb_zone() -> impl Strategy<Value = TestZone> {
        (0u64..16, arb_zone_name(), "[a-z ]{0,12}").prop_map(|(id, name, description)| {
            TestZone {
                id,
                name,
                description,
            }
        })
    }

    pub fn arb_machine() -> impl Strategy<Value = TestMachine> {
        (
            "[a-z0-9]{6}",
            "[a-z][a-z0-9-]{0,11}",
            prop_oneof![Just("default"), Just("lab"), Just("prod")],
            prop::collection::vec(prop_oneof![Just("gpu"), Just("nvme"), Just("virtual")], 0..3),
        )
            .prop_map(|(system_id, hostname, zone, tags)| TestMachine {
                system_id,
                hostname,
                zone: zone.to_string(),
                tags: tags.into_iter().map(str::to_string).collect(),
            })
    }

    /// A zone notification: create, update or delete.
    pub fn arb_zone_notify() -> impl Strategy<Value = Notify> {
        prop_oneof![
            arb_zone().prop_map(|zone| fixtures::notify("zone", NotifyAction::Create, &zone)),
            arb_zone().prop_map(|zone| fixtures::notify("zone", NotifyAction::Update, &zone)),
            (0u64..16).prop_map(|id| Notify {
                name: "zone".to_string(),
                action: NotifyAction::Delete,
                data: JsonValue::from(id),
            }),
        ]
    }

    pub fn arb_zone_list() -> impl Strategy<Value = Vec<TestZone>> {
        prop::collection::vec(arb_zone(), 0..12)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made entities and payloads.

    use super::*;
    use serde_json::json;

    pub fn zone(id: u64, name: &str) -> TestZone {
        TestZone {
            id,
            name: name.to_string(),
            description: String::new(),
        }
    }

    pub fn zone_json(id: u64, name: &str) -> JsonValue {
        json!({"id": id, "name": name, "description": ""})
    }

    pub fn machine(system_id: &str, hostname: &str, zone: &str) -> TestMachine {
        TestMachine {
            system_id: system_id.to_string(),
            hostname: hostname.to_string(),
            zone: zone.to_string(),
            tags: Vec::new(),
        }
    }

    pub fn machine_json(system_id: &str, hostname: &str, zone: &str) -> JsonValue {
        json!({"system_id": system_id, "hostname": hostname, "zone": zone, "tags": []})
    }

    /// Notification carrying a full record.
    pub fn notify<E: Serialize>(name: &str, action: NotifyAction, data: &E) -> Notify {
        Notify {
            name: name.to_string(),
            action,
            data: serde_json::to_value(data).unwrap_or(JsonValue::Null),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over collections.

    use super::*;
    use std::collections::HashSet;

    /// Assert no primary key appears twice.
    pub fn assert_unique_keys<T: Entity>(items: &[T]) {
        let mut seen = HashSet::new();
        for item in items {
            let key = item.key();
            assert!(seen.insert(key.clone()), "duplicate {} key {}", T::MODEL, key);
        }
    }

    /// Assert the keys of `items`, in order.
    pub fn assert_keys<T: Entity>(items: &[T], expected: &[T::Key]) {
        let keys: Vec<T::Key> = items.iter().map(Entity::key).collect();
        assert_eq!(keys, expected, "{} keys differ", T::MODEL);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let mock = MockDispatcher::new();
        mock.reply_ok(Method::Get, zone_json(1, "a"));
        mock.reply_err(Method::Get, RemoteError::transport("down"));

        let first = mock.send(Request::new(Method::Get, "zone", JsonValue::Null)).await;
        let second = mock.send(Request::new(Method::Get, "zone", JsonValue::Null)).await;
        let third = mock.send(Request::list("zone")).await;

        assert_eq!(first, Ok(zone_json(1, "a")));
        assert!(second.is_err());
        assert!(matches!(third, Err(RemoteError::Transport { .. })));
        assert_eq!(mock.requests().len(), 3);
        assert_eq!(mock.request_count(Method::Get), 2);
    }

    #[tokio::test]
    async fn test_deferred_reply_waits_for_resolve() {
        let mock = Arc::new(MockDispatcher::deferred());
        let sender = Arc::clone(&mock);
        let task = tokio::spawn(async move { sender.send(Request::list("zone")).await });

        mock.wait_for_pending(Method::List, 1).await;
        assert!(!mock.resolve(Method::Delete, Ok(JsonValue::Null)));
        assert!(mock.resolve(Method::List, Ok(serde_json::json!([]))));

        let reply = task.await.unwrap();
        assert_eq!(reply, Ok(serde_json::json!([])));
        assert_eq!(mock.pending(Method::List), 0);
    }

    #[test]
    fn test_fixture_round_trip() {
        let decoded: TestZone = serde_json::from_value(zone_json(3, "c")).unwrap();
        assert_eq!(decoded, zone(3, "c"));
        let decoded: TestMachine =
            serde_json::from_value(machine_json("abc", "node", "lab")).unwrap();
        assert_eq!(decoded, machine("abc", "node", "lab"));
    }

    #[test]
    fn test_assert_keys() {
        assertions::assert_keys(&[zone(2, "b"), zone(1, "a")], &[2, 1]);
        assertions::assert_unique_keys(&[zone(2, "b"), zone(1, "a")]);
    }
}
