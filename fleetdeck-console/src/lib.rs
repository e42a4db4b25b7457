//! fleetdeck console
//!
//! Everything between the two engines and a terminal:
//!
//! ```text
//!   main.rs (clap) ──► AppContext ──► Facade<T, D> ──► EntityStore<T, D>
//!                          ▲                                  │
//!                          │ ConsoleEvent                     │ Request
//!                          │                                  ▼
//!                      WsDispatcher ◄──────── protocol ◄── Dispatcher
//! ```
//!
//! `models` defines the entity kinds, `facade` adds filter search to each
//! store, `context` owns one facade per kind and routes server pushes, and
//! `dispatcher` speaks the websocket protocol.

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod facade;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod protocol;

pub use config::{ConfigError, ConsoleConfig};
pub use context::{AppContext, CollectionHandle, KINDS};
pub use dispatcher::{DispatchError, WsDispatcher, WsSettings};
pub use error::{ConsoleError, ConsoleResult};
pub use events::ConsoleEvent;
pub use facade::Facade;
pub use models::Searchable;
