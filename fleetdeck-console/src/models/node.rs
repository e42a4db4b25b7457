//! Nodes: machines, devices, controllers and VM hosts.

use super::ModelRef;
use crate::facade::Facade;
use fleetdeck_core::{Dispatcher, StoreResult};

crate::impl_entity! {
    /// A deployable bare-metal machine.
    pub struct Machine {
        key system_id: String,
        hostname: String,
        fqdn: String,
        status: String,
        owner: String,
        architecture: String,
        cpu_count: u64,
        /// Memory in GiB.
        memory: f64,
        zone: ModelRef,
        pool: ModelRef,
        domain: ModelRef,
        pod: Option<ModelRef>,
    }
    model = "machine",
    search = "hostname",
    aliases {
        "zone" => "zone.name",
        "pool" => "pool.name",
        "domain" => "domain.name",
        "pod" => "pod.name",
        "arch" => "architecture",
    },
}

crate::impl_entity! {
    /// A non-deployable device with addresses managed by the backend.
    pub struct Device {
        key system_id: String,
        hostname: String,
        fqdn: String,
        owner: String,
        primary_mac: String,
        zone: ModelRef,
        domain: ModelRef,
    }
    model = "device",
    search = "hostname",
    aliases {
        "zone" => "zone.name",
        "domain" => "domain.name",
        "mac" => "primary_mac",
    },
}

crate::impl_entity! {
    /// A region or rack controller.
    pub struct Controller {
        key system_id: String,
        hostname: String,
        fqdn: String,
        node_type_display: String,
        version: String,
        zone: ModelRef,
        domain: ModelRef,
    }
    model = "controller",
    search = "hostname",
    aliases {
        "zone" => "zone.name",
        "domain" => "domain.name",
        "type" => "node_type_display",
    },
}

crate::impl_entity! {
    /// A VM host (KVM pod).
    pub struct Pod {
        key id: u64,
        name: String,
        #[serde(rename = "type")]
        pod_type: String,
        zone: u64,
        pool: u64,
    }
    model = "pod",
    search = "name",
}

impl<D: Dispatcher> Facade<Machine, D> {
    pub fn by_hostname(&self, hostname: &str) -> StoreResult<Option<Machine>> {
        self.first_where(|machine| machine.hostname == hostname)
    }

    pub fn in_zone(&self, zone: &str) -> StoreResult<Vec<Machine>> {
        self.all_where(|machine| machine.zone.name == zone)
    }

    pub fn in_pool(&self, pool: &str) -> StoreResult<Vec<Machine>> {
        self.all_where(|machine| machine.pool.name == pool)
    }

    /// Machines composed on the given VM host.
    pub fn on_pod(&self, pod_id: u64) -> StoreResult<Vec<Machine>> {
        self.all_where(|machine| machine.pod.as_ref().map(|pod| pod.id) == Some(pod_id))
    }
}

impl<D: Dispatcher> Facade<Device, D> {
    pub fn by_hostname(&self, hostname: &str) -> StoreResult<Option<Device>> {
        self.first_where(|device| device.hostname == hostname)
    }

    pub fn by_mac(&self, mac: &str) -> StoreResult<Option<Device>> {
        self.first_where(|device| device.primary_mac.eq_ignore_ascii_case(mac))
    }
}

impl<D: Dispatcher> Facade<Controller, D> {
    pub fn by_hostname(&self, hostname: &str) -> StoreResult<Option<Controller>> {
        self.first_where(|controller| controller.hostname == hostname)
    }
}

impl<D: Dispatcher> Facade<Pod, D> {
    pub fn by_name(&self, name: &str) -> StoreResult<Option<Pod>> {
        self.first_where(|pod| pod.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Searchable;
    use fleetdeck_core::Entity;
    use serde_json::json;

    #[test]
    fn test_machine_payload_keeps_extra_fields() {
        let payload = json!({
            "system_id": "x7kq2n",
            "hostname": "rack1-node4",
            "status": "Ready",
            "zone": {"id": 1, "name": "default"},
            "pool": {"id": 0, "name": "default"},
            "power_state": "off",
            "tags": [1, 4]
        });
        let machine: Machine = serde_json::from_value(payload.clone()).unwrap();
        assert_eq!(machine.key(), "x7kq2n");
        assert_eq!(machine.zone.name, "default");
        assert!(machine.pod.is_none());
        assert_eq!(machine.extra["power_state"], "off");

        let back = serde_json::to_value(&machine).unwrap();
        assert_eq!(back["power_state"], "off");
        assert_eq!(back["tags"], json!([1, 4]));
    }

    #[test]
    fn test_machine_field_paths() {
        assert_eq!(Machine::field_path("zone"), "zone.name");
        assert_eq!(Machine::field_path("status"), "status");
        assert_eq!(Machine::DEFAULT_FIELD, "hostname");
        assert_eq!(Machine::PK_FIELD, "system_id");
        assert_eq!(Pod::field_path("zone"), "zone");
    }

    #[test]
    fn test_pod_type_renamed() {
        let pod: Pod = serde_json::from_value(json!({"id": 2, "name": "kvm1", "type": "virsh"}))
            .unwrap();
        assert_eq!(pod.pod_type, "virsh");
        assert_eq!(serde_json::to_value(&pod).unwrap()["type"], "virsh");
    }
}
