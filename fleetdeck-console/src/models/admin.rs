//! Administrative records: users, keys, tags, pools, snippets, repositories
//! and scripts.

use super::network::DEFAULT_NAME;
use crate::facade::Facade;
use fleetdeck_core::{Dispatcher, StoreResult};

crate::impl_entity! {
    pub struct ResourcePool {
        key id: u64,
        name: String,
        description: String,
        machine_total_count: u64,
    }
    model = "resourcepool",
    search = "name",
}

crate::impl_entity! {
    pub struct User {
        key id: u64,
        username: String,
        email: String,
        last_name: String,
        is_superuser: bool,
    }
    model = "user",
    search = "username",
}

crate::impl_entity! {
    pub struct Tag {
        key id: u64,
        name: String,
        definition: String,
        comment: String,
        kernel_opts: Option<String>,
    }
    model = "tag",
    search = "name",
}

crate::impl_entity! {
    /// A public SSH key installed on deployed machines.
    pub struct SshKey {
        key id: u64,
        key: String,
        user: u64,
        display: String,
    }
    model = "sshkey",
    search = "key",
}

crate::impl_entity! {
    pub struct DhcpSnippet {
        key id: u64,
        name: String,
        description: String,
        enabled: bool,
        subnet: Option<u64>,
        node: Option<String>,
    }
    model = "dhcpsnippet",
    search = "name",
}

crate::impl_entity! {
    pub struct PackageRepository {
        key id: u64,
        name: String,
        url: String,
        enabled: bool,
        distributions: Vec<String>,
    }
    model = "packagerepository",
    search = "name",
}

crate::impl_entity! {
    /// A commissioning or testing script.
    pub struct Script {
        key id: u64,
        name: String,
        description: String,
        tags: Vec<String>,
    }
    model = "script",
    search = "name",
}

impl<D: Dispatcher> Facade<ResourcePool, D> {
    pub fn by_name(&self, name: &str) -> StoreResult<Option<ResourcePool>> {
        self.first_where(|pool| pool.name == name)
    }

    pub fn default_pool(&self) -> StoreResult<Option<ResourcePool>> {
        self.by_name(DEFAULT_NAME)
    }
}

impl<D: Dispatcher> Facade<User, D> {
    pub fn by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.first_where(|user| user.username == username)
    }

    pub fn superusers(&self) -> StoreResult<Vec<User>> {
        self.all_where(|user| user.is_superuser)
    }
}

impl<D: Dispatcher> Facade<Tag, D> {
    pub fn by_name(&self, name: &str) -> StoreResult<Option<Tag>> {
        self.first_where(|tag| tag.name == name)
    }
}

impl<D: Dispatcher> Facade<SshKey, D> {
    pub fn for_user(&self, user_id: u64) -> StoreResult<Vec<SshKey>> {
        self.all_where(|key| key.user == user_id)
    }
}

impl<D: Dispatcher> Facade<DhcpSnippet, D> {
    pub fn for_subnet(&self, subnet_id: u64) -> StoreResult<Vec<DhcpSnippet>> {
        self.all_where(|snippet| snippet.subnet == Some(subnet_id))
    }

    pub fn for_node(&self, system_id: &str) -> StoreResult<Vec<DhcpSnippet>> {
        self.all_where(|snippet| snippet.node.as_deref() == Some(system_id))
    }

    /// Snippets attached to neither a subnet nor a node.
    pub fn global(&self) -> StoreResult<Vec<DhcpSnippet>> {
        self.all_where(|snippet| snippet.subnet.is_none() && snippet.node.is_none())
    }
}

impl<D: Dispatcher> Facade<PackageRepository, D> {
    pub fn enabled(&self) -> StoreResult<Vec<PackageRepository>> {
        self.all_where(|repository| repository.enabled)
    }
}

impl<D: Dispatcher> Facade<Script, D> {
    pub fn by_name(&self, name: &str) -> StoreResult<Option<Script>> {
        self.first_where(|script| script.name == name)
    }
}
