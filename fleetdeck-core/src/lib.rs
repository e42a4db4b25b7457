//! fleetdeck core - shared vocabulary
//!
//! Entity and key traits, the request/notify envelope, the dispatcher
//! contract, and the error taxonomy. Every other fleetdeck crate depends on
//! this one; it holds no state and performs no I/O.

pub mod dispatch;
pub mod entity;
pub mod error;
pub mod request;

pub use dispatch::Dispatcher;
pub use entity::{Entity, PrimaryKey};
pub use error::{FleetError, FleetResult, RemoteError, StoreError, StoreResult};
pub use request::{Method, Notify, NotifyAction, Request};

use chrono::{DateTime, Utc};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Current time as a [`Timestamp`].
pub fn now() -> Timestamp {
    Utc::now()
}
