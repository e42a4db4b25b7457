//! Boot images.

use crate::facade::Facade;
use fleetdeck_core::{Dispatcher, StoreResult};

crate::impl_entity! {
    /// A synced or uploaded boot image.
    pub struct BootResource {
        key id: u64,
        name: String,
        title: String,
        arch: String,
        status: String,
        complete: bool,
    }
    model = "bootresource",
    search = "name",
    aliases {
        "os" => "name",
    },
}

impl<D: Dispatcher> Facade<BootResource, D> {
    pub fn by_name(&self, name: &str) -> StoreResult<Vec<BootResource>> {
        self.all_where(|image| image.name == name)
    }

    /// Images still downloading or importing.
    pub fn incomplete(&self) -> StoreResult<Vec<BootResource>> {
        self.all_where(|image| !image.complete)
    }
}
