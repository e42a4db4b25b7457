//! FLEETDECK entity store engine
//!
//! One [`EntityStore`] mirrors one server-held collection. It tracks the
//! collection's fetch lifecycle, per-item mutation status and the errors of
//! both, and keeps at most one `list` request in flight.
//!
//! ```ignore
//! let zones: EntityStore<Zone, _> = EntityStore::new(dispatcher.clone());
//! zones.fetch_all().await?;
//! zones.update(3, json!({"description": "lab"})).await?;
//! ```

pub mod selection;
pub mod state;
pub mod store;

pub use state::{CollectionState, CollectionStatus, ItemState, ItemStatus};
pub use store::EntityStore;
