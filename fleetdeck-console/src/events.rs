//! Event types emitted by the websocket dispatcher.

use fleetdeck_core::Notify;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleEvent {
    /// A connection was established. `reconnect` is false only for the first.
    Connected { reconnect: bool },
    Disconnected { reason: String },
    Notify(Notify),
    Error(String),
}
