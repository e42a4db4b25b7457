//! The request dispatcher contract.
//!
//! The store never talks to a socket directly; it hands each [`Request`] to a
//! dispatcher and awaits the reply. Ordering, batching and timeouts are the
//! dispatcher's business. The only guarantee the store relies on is that every
//! `send` eventually resolves exactly once.

use crate::error::RemoteError;
use crate::request::Request;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Sends requests to the backend and resolves their replies.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    /// Send a request and wait for its reply payload.
    async fn send(&self, request: Request) -> Result<JsonValue, RemoteError>;
}

#[async_trait]
impl<D: Dispatcher + ?Sized> Dispatcher for Arc<D> {
    async fn send(&self, request: Request) -> Result<JsonValue, RemoteError> {
        (**self).send(request).await
    }
}
