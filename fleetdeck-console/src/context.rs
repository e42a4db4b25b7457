//! Session context owning every collection.
//!
//! There is no global registry: one [`AppContext`] is built per session and
//! passed to whatever needs a collection. The CLI reaches collections by kind
//! name through the object-safe [`CollectionHandle`].

use crate::events::ConsoleEvent;
use crate::facade::Facade;
use crate::models::{
    BootResource, Controller, Device, DhcpSnippet, Discovery, Domain, Fabric, Machine,
    PackageRepository, Pod, ResourcePool, Script, Searchable, Space, SshKey, Subnet, Tag, User,
    Vlan, Zone,
};
use async_trait::async_trait;
use fleetdeck_core::{Dispatcher, Entity, FleetError, FleetResult, Notify, RemoteError};
use fleetdeck_filter::PredicateSet;
use fleetdeck_store::CollectionStatus;
use futures_util::future::join_all;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Shorthand kind names accepted on the command line.
const KIND_ALIASES: &[(&str, &str)] = &[
    ("image", "bootresource"),
    ("kvm", "pod"),
    ("pool", "resourcepool"),
    ("repository", "packagerepository"),
    ("snippet", "dhcpsnippet"),
];

/// Kind-erased access to one collection.
#[async_trait]
pub trait CollectionHandle: Send + Sync {
    /// Backend model name.
    fn kind(&self) -> &'static str;

    fn status(&self) -> FleetResult<CollectionStatus>;

    /// Load the collection if needed and return the items matching `filter`.
    async fn list(&self, filter: &PredicateSet) -> FleetResult<Vec<JsonValue>>;

    /// One record by its key as typed on a command line.
    async fn get(&self, key: &str) -> FleetResult<JsonValue>;

    async fn delete(&self, key: &str) -> FleetResult<()>;

    fn apply_notify(&self, notify: &Notify) -> FleetResult<bool>;

    /// Re-run the bulk fetch if the collection was loaded. Returns whether it
    /// was.
    async fn refetch_if_loaded(&self) -> FleetResult<bool>;

    fn cleanup(&self) -> FleetResult<()>;
}

fn parse_key<T: Entity>(key: &str) -> FleetResult<T::Key> {
    key.trim()
        .parse::<T::Key>()
        .map_err(|_| FleetError::InvalidKey {
            model: T::MODEL.to_string(),
            key: key.to_string(),
        })
}

fn to_json<T: Entity>(item: &T) -> FleetResult<JsonValue> {
    serde_json::to_value(item).map_err(|err| FleetError::from(RemoteError::from(err)))
}

#[async_trait]
impl<T: Searchable, D: Dispatcher> CollectionHandle for Facade<T, D> {
    fn kind(&self) -> &'static str {
        T::MODEL
    }

    fn status(&self) -> FleetResult<CollectionStatus> {
        Ok(self.store().status()?)
    }

    async fn list(&self, filter: &PredicateSet) -> FleetResult<Vec<JsonValue>> {
        self.ensure_loaded().await?;
        self.search(filter)?.iter().map(to_json).collect()
    }

    async fn get(&self, key: &str) -> FleetResult<JsonValue> {
        let key = parse_key::<T>(key)?;
        let item = self.store().get(key).await?;
        to_json(&item)
    }

    async fn delete(&self, key: &str) -> FleetResult<()> {
        let key = parse_key::<T>(key)?;
        // Deletes are only issued for held records.
        if self.by_key(&key)?.is_none() {
            self.fetch_one(key.clone()).await?;
        }
        self.store().delete(key).await?;
        Ok(())
    }

    fn apply_notify(&self, notify: &Notify) -> FleetResult<bool> {
        Ok(self.store().apply_notify(notify)?)
    }

    async fn refetch_if_loaded(&self) -> FleetResult<bool> {
        if self.store().status()? != CollectionStatus::Loaded {
            return Ok(false);
        }
        self.fetch_all().await?;
        Ok(true)
    }

    fn cleanup(&self) -> FleetResult<()> {
        Ok(self.store().cleanup()?)
    }
}

macro_rules! app_context {
    ($( $field:ident: $kind:ty ),* $(,)?) => {
        /// Model names of every collection, in declaration order.
        pub const KINDS: &[&str] = &[ $( <$kind as Entity>::MODEL, )* ];

        /// Every collection of one console session.
        pub struct AppContext<D: Dispatcher> {
            dispatcher: Arc<D>,
            $( pub $field: Facade<$kind, D>, )*
        }

        impl<D: Dispatcher> AppContext<D> {
            pub fn new(dispatcher: Arc<D>) -> Self {
                Self {
                    $( $field: Facade::new(Arc::clone(&dispatcher)), )*
                    dispatcher,
                }
            }

            /// Every collection, in declaration order.
            pub fn collections(&self) -> Vec<&dyn CollectionHandle> {
                vec![ $( &self.$field as &dyn CollectionHandle, )* ]
            }
        }
    };
}

app_context! {
    machines: Machine,
    devices: Device,
    controllers: Controller,
    pods: Pod,
    subnets: Subnet,
    vlans: Vlan,
    fabrics: Fabric,
    spaces: Space,
    domains: Domain,
    zones: Zone,
    resource_pools: ResourcePool,
    users: User,
    tags: Tag,
    discoveries: Discovery,
    boot_resources: BootResource,
    ssh_keys: SshKey,
    dhcp_snippets: DhcpSnippet,
    package_repositories: PackageRepository,
    scripts: Script,
}

impl<D: Dispatcher> AppContext<D> {
    pub fn dispatcher(&self) -> &Arc<D> {
        &self.dispatcher
    }

    pub fn kinds(&self) -> &'static [&'static str] {
        KINDS
    }

    /// Collection for a kind name. Accepts the model name, a plural form
    /// (`machines`) or a shorthand (`image`, `kvm`, `pool`).
    pub fn collection(&self, kind: &str) -> FleetResult<&dyn CollectionHandle> {
        let wanted = kind.trim().to_ascii_lowercase();
        let singular = match wanted.strip_suffix("ies") {
            Some(stem) => format!("{stem}y"),
            None => wanted.strip_suffix('s').unwrap_or(&wanted).to_string(),
        };
        let resolved = KIND_ALIASES
            .iter()
            .find(|(alias, _)| *alias == wanted || *alias == singular)
            .map(|(_, model)| *model);
        let collections = self.collections();
        let position = collections.iter().position(|c| {
            Some(c.kind()) == resolved || c.kind() == wanted || c.kind() == singular
        });
        match position {
            Some(index) => Ok(collections[index]),
            None => Err(FleetError::UnknownKind(kind.to_string())),
        }
    }

    /// Apply a server push to the collection it names.
    pub fn route_notify(&self, notify: &Notify) -> FleetResult<bool> {
        match self.collections().into_iter().find(|c| c.kind() == notify.name) {
            Some(collection) => collection.apply_notify(notify),
            None => {
                tracing::debug!(model = %notify.name, "No collection for notification");
                Ok(false)
            }
        }
    }

    /// Refetch every loaded collection after a reconnect. Notifications sent
    /// while disconnected are lost, so loaded data may be stale.
    ///
    /// Returns how many collections were refetched. Failures are logged and
    /// recorded as collection errors.
    pub async fn on_reconnect(&self) -> usize {
        let collections = self.collections();
        let results = join_all(collections.iter().map(|c| c.refetch_if_loaded())).await;
        let mut refetched = 0;
        for (collection, result) in collections.iter().zip(results) {
            match result {
                Ok(true) => refetched += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(model = collection.kind(), error = %err, "Refetch failed")
                }
            }
        }
        tracing::info!(refetched, "Collections refetched after reconnect");
        refetched
    }

    /// Clear errors and settled flags on every collection.
    pub fn cleanup_all(&self) -> FleetResult<()> {
        for collection in self.collections() {
            collection.cleanup()?;
        }
        Ok(())
    }

    /// Like [`handle_event`](Self::handle_event), but a failure is logged and
    /// swallowed so a long-running consumer keeps going. Returns whether the
    /// event applied cleanly.
    pub async fn absorb_event(&self, event: &ConsoleEvent) -> bool {
        match self.handle_event(event).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to apply event");
                false
            }
        }
    }

    /// React to one dispatcher event.
    pub async fn handle_event(&self, event: &ConsoleEvent) -> FleetResult<()> {
        match event {
            ConsoleEvent::Notify(notify) => {
                self.route_notify(notify)?;
            }
            ConsoleEvent::Connected { reconnect: true } => {
                self.on_reconnect().await;
            }
            ConsoleEvent::Connected { reconnect: false } => {}
            ConsoleEvent::Disconnected { reason } => {
                tracing::info!(reason = %reason, "Connection lost");
            }
            ConsoleEvent::Error(message) => {
                tracing::warn!(error = %message, "Dispatcher error");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetdeck_test_utils::MockDispatcher;

    #[test]
    fn test_kind_lookup() {
        let context = AppContext::new(Arc::new(MockDispatcher::new()));
        assert_eq!(context.kinds().len(), 19);
        assert_eq!(context.collection("machine").unwrap().kind(), "machine");
        assert_eq!(context.collection("Machines").unwrap().kind(), "machine");
        assert_eq!(context.collection("images").unwrap().kind(), "bootresource");
        assert_eq!(context.collection("kvm").unwrap().kind(), "pod");
        assert_eq!(context.collection("subnets").unwrap().kind(), "subnet");
        assert_eq!(context.collection("discoveries").unwrap().kind(), "discovery");
        assert!(matches!(
            context.collection("toaster"),
            Err(FleetError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_kinds_unique() {
        let context = AppContext::new(Arc::new(MockDispatcher::new()));
        let collected: Vec<&str> = context.collections().iter().map(|c| c.kind()).collect();
        assert_eq!(collected, context.kinds());
        let mut kinds = collected;
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), 19);
    }

    #[test]
    fn test_parse_key_by_kind() {
        assert_eq!(parse_key::<Zone>(" 4 ").unwrap(), 4);
        assert!(matches!(
            parse_key::<Zone>("abc"),
            Err(FleetError::InvalidKey { .. })
        ));
        assert_eq!(parse_key::<Machine>("x7kq2n").unwrap(), "x7kq2n");
    }
}
