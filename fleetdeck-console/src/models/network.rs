//! Networking and placement: subnets, VLANs, fabrics, spaces, domains, zones
//! and discovered neighbours.

use crate::facade::Facade;
use fleetdeck_core::{Dispatcher, StoreResult};

/// Name of the zone and pool every install starts with.
pub const DEFAULT_NAME: &str = "default";

crate::impl_entity! {
    pub struct Subnet {
        key id: u64,
        cidr: String,
        name: String,
        vlan: u64,
        space: Option<u64>,
        gateway_ip: Option<String>,
        managed: bool,
    }
    model = "subnet",
    search = "cidr",
}

crate::impl_entity! {
    pub struct Vlan {
        key id: u64,
        name: String,
        vid: u64,
        fabric: u64,
        space: Option<u64>,
        dhcp_on: bool,
    }
    model = "vlan",
    search = "name",
}

crate::impl_entity! {
    pub struct Fabric {
        key id: u64,
        name: String,
        class_type: Option<String>,
        default_vlan_id: u64,
        vlan_ids: Vec<u64>,
    }
    model = "fabric",
    search = "name",
}

crate::impl_entity! {
    pub struct Space {
        key id: u64,
        name: String,
        subnet_ids: Vec<u64>,
        vlan_ids: Vec<u64>,
    }
    model = "space",
    search = "name",
}

crate::impl_entity! {
    /// A DNS domain.
    pub struct Domain {
        key id: u64,
        name: String,
        authoritative: bool,
        is_default: bool,
        ttl: Option<u64>,
    }
    model = "domain",
    search = "name",
}

crate::impl_entity! {
    /// An availability zone.
    pub struct Zone {
        key id: u64,
        name: String,
        description: String,
    }
    model = "zone",
    search = "name",
}

crate::impl_entity! {
    /// A device seen on the network but not yet managed.
    pub struct Discovery {
        key discovery_id: String,
        hostname: String,
        ip: String,
        mac_address: String,
        observer_hostname: String,
        vid: Option<u64>,
    }
    model = "discovery",
    search = "hostname",
    aliases {
        "mac" => "mac_address",
        "observer" => "observer_hostname",
    },
}

impl<D: Dispatcher> Facade<Subnet, D> {
    pub fn for_vlan(&self, vlan_id: u64) -> StoreResult<Vec<Subnet>> {
        self.all_where(|subnet| subnet.vlan == vlan_id)
    }

    pub fn for_space(&self, space_id: u64) -> StoreResult<Vec<Subnet>> {
        self.all_where(|subnet| subnet.space == Some(space_id))
    }

    pub fn by_cidr(&self, cidr: &str) -> StoreResult<Option<Subnet>> {
        self.first_where(|subnet| subnet.cidr == cidr)
    }
}

impl<D: Dispatcher> Facade<Vlan, D> {
    pub fn for_fabric(&self, fabric_id: u64) -> StoreResult<Vec<Vlan>> {
        self.all_where(|vlan| vlan.fabric == fabric_id)
    }

    /// VLANs with DHCP served by the backend.
    pub fn dhcp_enabled(&self) -> StoreResult<Vec<Vlan>> {
        self.all_where(|vlan| vlan.dhcp_on)
    }
}

impl<D: Dispatcher> Facade<Fabric, D> {
    pub fn by_name(&self, name: &str) -> StoreResult<Option<Fabric>> {
        self.first_where(|fabric| fabric.name == name)
    }
}

impl<D: Dispatcher> Facade<Space, D> {
    pub fn by_name(&self, name: &str) -> StoreResult<Option<Space>> {
        self.first_where(|space| space.name == name)
    }
}

impl<D: Dispatcher> Facade<Domain, D> {
    pub fn by_name(&self, name: &str) -> StoreResult<Option<Domain>> {
        self.first_where(|domain| domain.name == name)
    }

    pub fn default_domain(&self) -> StoreResult<Option<Domain>> {
        self.first_where(|domain| domain.is_default)
    }
}

impl<D: Dispatcher> Facade<Zone, D> {
    pub fn by_name(&self, name: &str) -> StoreResult<Option<Zone>> {
        self.first_where(|zone| zone.name == name)
    }

    pub fn default_zone(&self) -> StoreResult<Option<Zone>> {
        self.by_name(DEFAULT_NAME)
    }
}

impl<D: Dispatcher> Facade<Discovery, D> {
    pub fn by_mac(&self, mac: &str) -> StoreResult<Option<Discovery>> {
        self.first_where(|discovery| discovery.mac_address.eq_ignore_ascii_case(mac))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetdeck_core::Entity;
    use serde_json::json;

    #[test]
    fn test_discovery_string_key() {
        let discovery: Discovery = serde_json::from_value(json!({
            "discovery_id": "MTAuMC4wLjEsMDA6MTE=",
            "ip": "10.0.0.1",
            "mac_address": "00:11:22:33:44:55"
        }))
        .unwrap();
        assert_eq!(discovery.key(), "MTAuMC4wLjEsMDA6MTE=");
        assert_eq!(discovery.hostname, "");
        assert_eq!(Discovery::MODEL, "discovery");
    }

    #[test]
    fn test_subnet_optional_fields() {
        let subnet: Subnet =
            serde_json::from_value(json!({"id": 3, "cidr": "10.0.0.0/24", "vlan": 5, "space": null}))
                .unwrap();
        assert_eq!(subnet.space, None);
        assert_eq!(subnet.gateway_ip, None);
        assert_eq!(Subnet::key_params(&subnet.key()), json!({"id": 3}));
    }
}
