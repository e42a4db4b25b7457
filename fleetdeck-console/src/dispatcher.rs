//! Websocket dispatcher with reconnect backoff.
//!
//! One background task owns the socket. Callers hand it encoded frames over a
//! channel and park on a oneshot keyed by `request_id`; the task resolves the
//! oneshot when the matching response arrives. Server pushes are forwarded as
//! [`ConsoleEvent::Notify`].
//!
//! When the connection drops, every parked request fails with
//! [`RemoteError::Transport`] and the task reconnects with jittered
//! exponential backoff. Requests issued while disconnected fail immediately.

use crate::config::{ConsoleConfig, ReconnectConfig};
use crate::events::ConsoleEvent;
use crate::protocol::{classify, IncomingMessage, OutgoingMessage, ProtocolError};
use async_trait::async_trait;
use fleetdeck_core::{Dispatcher, RemoteError, Request};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{InvalidHeaderValue, COOKIE};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Reply = Result<JsonValue, RemoteError>;
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Capacity of the event channel handed back by [`WsDispatcher::spawn`].
pub const EVENT_BUFFER: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Invalid auth header: {0}")]
    Header(#[from] InvalidHeaderValue),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("No connection after {timeout_ms}ms")]
    ConnectTimeout { timeout_ms: u64 },
    #[error("Dispatcher stopped")]
    Stopped,
}

/// Connection settings, derived from [`ConsoleConfig`].
#[derive(Debug, Clone)]
pub struct WsSettings {
    pub endpoint: String,
    pub session_id: Option<String>,
    pub csrf_token: Option<String>,
    pub request_timeout: Duration,
    pub ping_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl WsSettings {
    pub fn from_config(config: &ConsoleConfig) -> Self {
        Self {
            endpoint: config.ws_endpoint.trim().to_string(),
            session_id: config.auth.session_id.clone(),
            csrf_token: config.auth.csrf_token.clone(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            ping_interval: Duration::from_millis(config.ping_interval_ms),
            reconnect: config.reconnect.clone(),
        }
    }

    /// Endpoint with the CSRF token appended as a query parameter.
    pub fn url(&self) -> String {
        match non_empty(&self.csrf_token) {
            Some(token) => {
                let separator = if self.endpoint.contains('?') { '&' } else { '?' };
                format!(
                    "{}{}csrftoken={}",
                    self.endpoint,
                    separator,
                    urlencoding::encode(token)
                )
            }
            None => self.endpoint.clone(),
        }
    }

    /// `Cookie` header carrying the session, if any credential is set.
    pub fn cookie(&self) -> Option<String> {
        let cookies: Vec<String> = [
            ("sessionid", non_empty(&self.session_id)),
            ("csrftoken", non_empty(&self.csrf_token)),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|value| format!("{name}={value}")))
        .collect();
        if cookies.is_empty() {
            None
        } else {
            Some(cookies.join("; "))
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// ============================================================================
// SHARED STATE
// ============================================================================

struct Pending {
    endpoint: String,
    reply: oneshot::Sender<Reply>,
}

struct Shared {
    pending: Mutex<HashMap<u64, Pending>>,
    outgoing: mpsc::UnboundedSender<String>,
    next_id: AtomicU64,
    connected: AtomicBool,
    request_timeout: Duration,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, HashMap<u64, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn take(&self, request_id: u64) -> Option<Pending> {
        self.pending().remove(&request_id)
    }

    fn resolve(&self, request_id: u64, reply: Reply) {
        match self.take(request_id) {
            Some(pending) => {
                tracing::debug!(
                    request_id,
                    endpoint = %pending.endpoint,
                    ok = reply.is_ok(),
                    "Response received"
                );
                // The caller may have timed out and gone away.
                let _ = pending.reply.send(reply);
            }
            None => tracing::debug!(request_id, "Dropping response for unknown request"),
        }
    }

    /// Park a request and queue its frame.
    ///
    /// The connected check, the frame queue and the pending table are all
    /// touched under the pending lock, which [`Shared::disconnect`] also holds,
    /// so a frame is either drained with its request failed or never queued.
    fn enqueue(
        &self,
        request_id: u64,
        endpoint: String,
        text: String,
    ) -> Result<oneshot::Receiver<Reply>, RemoteError> {
        let mut pending = self.pending();
        if !self.connected.load(Ordering::SeqCst) {
            return Err(RemoteError::transport("not connected"));
        }
        if self.outgoing.send(text).is_err() {
            return Err(RemoteError::transport("connection task stopped"));
        }
        let (reply, receiver) = oneshot::channel();
        pending.insert(request_id, Pending { endpoint, reply });
        Ok(receiver)
    }

    /// Mark the connection down, drop frames queued for it and fail every
    /// parked request. Returns how many requests were failed.
    fn disconnect(&self, reason: &str, outgoing: &mut mpsc::UnboundedReceiver<String>) -> usize {
        let mut pending = self.pending();
        self.connected.store(false, Ordering::SeqCst);
        while outgoing.try_recv().is_ok() {}
        fail_pending(&mut pending, reason)
    }

    /// Fail every parked request. Returns how many were failed.
    fn fail_all(&self, reason: &str) -> usize {
        fail_pending(&mut self.pending(), reason)
    }
}

fn fail_pending(pending: &mut HashMap<u64, Pending>, reason: &str) -> usize {
    let count = pending.len();
    for (request_id, entry) in pending.drain() {
        tracing::debug!(request_id, endpoint = %entry.endpoint, "Failing pending request");
        let _ = entry.reply.send(Err(RemoteError::transport(reason)));
    }
    count
}

// ============================================================================
// DISPATCHER
// ============================================================================

/// [`Dispatcher`] over a reconnecting websocket.
pub struct WsDispatcher {
    shared: Arc<Shared>,
}

impl WsDispatcher {
    /// Start the connection task.
    ///
    /// The returned receiver must be drained or dropped: the connection task
    /// waits for room in it before processing further frames.
    pub fn spawn(settings: WsSettings) -> (Arc<Self>, mpsc::Receiver<ConsoleEvent>) {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            outgoing: outgoing_tx,
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(false),
            request_timeout: settings.request_timeout,
        });
        tokio::spawn(run_connection(
            Arc::downgrade(&shared),
            settings,
            outgoing_rx,
            event_tx,
        ));
        (Arc::new(Self { shared }), event_rx)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Requests waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.shared.pending().len()
    }
}

#[async_trait]
impl Dispatcher for WsDispatcher {
    async fn send(&self, request: Request) -> Reply {
        if !self.is_connected() {
            return Err(RemoteError::transport("not connected"));
        }
        let request_id = self.shared.next_id();
        let endpoint = request.endpoint();
        let text = OutgoingMessage::request(request_id, &request)
            .encode()
            .map_err(|e| RemoteError::decode(e.to_string()))?;

        let reply_rx = self.shared.enqueue(request_id, endpoint.clone(), text)?;
        tracing::debug!(request_id, endpoint = %endpoint, "Request sent");

        match tokio::time::timeout(self.shared.request_timeout, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(RemoteError::transport("connection closed")),
            Err(_) => {
                self.shared.take(request_id);
                let timeout_ms = self.shared.request_timeout.as_millis() as u64;
                tracing::warn!(request_id, endpoint = %endpoint, timeout_ms, "Request timed out");
                Err(RemoteError::Timeout { timeout_ms })
            }
        }
    }
}

/// Wait for the first [`ConsoleEvent::Connected`], logging anything before it.
pub async fn wait_for_connection(
    events: &mut mpsc::Receiver<ConsoleEvent>,
    timeout: Duration,
) -> Result<(), DispatchError> {
    let waited = tokio::time::timeout(timeout, async {
        while let Some(event) = events.recv().await {
            match event {
                ConsoleEvent::Connected { .. } => return Ok(()),
                ConsoleEvent::Error(message) => {
                    tracing::warn!(error = %message, "Connection attempt failed")
                }
                other => tracing::debug!(event = ?other, "Event before connection"),
            }
        }
        Err(DispatchError::Stopped)
    })
    .await;
    waited.unwrap_or(Err(DispatchError::ConnectTimeout {
        timeout_ms: timeout.as_millis() as u64,
    }))
}

// ============================================================================
// CONNECTION TASK
// ============================================================================

enum SessionEnd {
    Closed(String),
    Shutdown,
}

async fn connect(settings: &WsSettings) -> Result<WsStream, DispatchError> {
    let mut request = settings.url().into_client_request()?;
    if let Some(cookie) = settings.cookie() {
        request
            .headers_mut()
            .insert(COOKIE, HeaderValue::from_str(&cookie)?);
    }
    let (stream, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}

async fn run_connection(
    shared: Weak<Shared>,
    settings: WsSettings,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    events: mpsc::Sender<ConsoleEvent>,
) {
    let mut backoff = settings.reconnect.initial_ms;
    let mut connected_before = false;
    loop {
        if shared.strong_count() == 0 {
            break;
        }
        match connect(&settings).await {
            Ok(stream) => {
                let Some(handle) = shared.upgrade() else {
                    break;
                };
                handle.connected.store(true, Ordering::SeqCst);
                drop(handle);
                tracing::info!(endpoint = %settings.endpoint, reconnect = connected_before, "Connected");
                let _ = events
                    .send(ConsoleEvent::Connected {
                        reconnect: connected_before,
                    })
                    .await;
                connected_before = true;
                backoff = settings.reconnect.initial_ms;

                let end =
                    run_session(stream, &shared, &mut outgoing, &events, settings.ping_interval)
                        .await;
                let reason = match end {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Closed(reason) => reason,
                };
                if let Some(handle) = shared.upgrade() {
                    let failed = handle.disconnect(&reason, &mut outgoing);
                    tracing::warn!(reason = %reason, failed, "Disconnected");
                }
                let _ = events.send(ConsoleEvent::Disconnected { reason }).await;
            }
            Err(err) => {
                tracing::warn!(endpoint = %settings.endpoint, error = %err, "Connect failed");
                let _ = events.send(ConsoleEvent::Error(err.to_string())).await;
            }
        }

        let delay = jittered_backoff(backoff, settings.reconnect.jitter_ms);
        tracing::debug!(delay_ms = delay, "Reconnecting");
        tokio::time::sleep(Duration::from_millis(delay)).await;
        backoff = next_backoff(backoff, &settings.reconnect);
    }
    if let Some(handle) = shared.upgrade() {
        handle.connected.store(false, Ordering::SeqCst);
        handle.fail_all("dispatcher stopped");
    }
    tracing::debug!("Connection task stopped");
}

async fn run_session(
    stream: WsStream,
    shared: &Weak<Shared>,
    outgoing: &mut mpsc::UnboundedReceiver<String>,
    events: &mpsc::Sender<ConsoleEvent>,
    ping_interval: Duration,
) -> SessionEnd {
    let (mut sink, mut source) = stream.split();
    let mut ping = tokio::time::interval_at(
        tokio::time::Instant::now() + ping_interval,
        ping_interval,
    );

    loop {
        tokio::select! {
            frame = outgoing.recv() => {
                let Some(text) = frame else {
                    let _ = sink.close().await;
                    return SessionEnd::Shutdown;
                };
                if let Err(err) = sink.send(Message::Text(text)).await {
                    return SessionEnd::Closed(err.to_string());
                }
            }
            message = source.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let Some(handle) = shared.upgrade() else {
                            return SessionEnd::Shutdown;
                        };
                        handle_frame(&handle, &text, events).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        return SessionEnd::Closed("closed by server".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return SessionEnd::Closed(err.to_string()),
                    None => return SessionEnd::Closed("connection closed".to_string()),
                }
            }
            _ = ping.tick() => {
                let Some(handle) = shared.upgrade() else {
                    return SessionEnd::Shutdown;
                };
                let request_id = handle.next_id();
                drop(handle);
                match OutgoingMessage::ping(request_id).encode() {
                    Ok(text) => {
                        tracing::trace!(request_id, "Ping");
                        if let Err(err) = sink.send(Message::Text(text)).await {
                            return SessionEnd::Closed(err.to_string());
                        }
                    }
                    Err(err) => tracing::error!(error = %err, "Failed to encode ping"),
                }
            }
        }
    }
}

async fn handle_frame(shared: &Shared, text: &str, events: &mpsc::Sender<ConsoleEvent>) {
    match classify(text) {
        Ok(IncomingMessage::Response { request_id, result }) => shared.resolve(request_id, result),
        Ok(IncomingMessage::Notify(notify)) => {
            tracing::debug!(model = %notify.name, action = ?notify.action, "Notification");
            let _ = events.send(ConsoleEvent::Notify(notify)).await;
        }
        Ok(IncomingMessage::PingReply { request_id }) => {
            tracing::trace!(request_id, "Pong");
        }
        Err(err) => {
            tracing::warn!(error = %err, "Undecodable frame");
            let _ = events
                .send(ConsoleEvent::Error(format!("WS decode error: {}", err)))
                .await;
        }
    }
}

fn next_backoff(backoff_ms: u64, reconnect: &ReconnectConfig) -> u64 {
    let next = (backoff_ms as f64 * reconnect.multiplier) as u64;
    next.min(reconnect.max_ms)
}

fn jittered_backoff(base_ms: u64, jitter_ms: u64) -> u64 {
    if jitter_ms == 0 {
        return base_ms;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_nanos(0))
        .subsec_nanos() as u64;
    let jitter = nanos % jitter_ms;
    base_ms.saturating_add(jitter)
}
