//! A single relay websocket.
//!
//! The socket is split on connect: the write half stays here behind a lock,
//! the read half moves into a spawned receive task that parses every text
//! frame and pushes it into the shared [`MessagePool`].

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use super::error::{RelayError, RelayResult};
use super::types::{ConnectionOptions, RelayConnectionStatus, RelayPolicy, RelayState};
use crate::nostr::RelayMessage;
use crate::pool::MessagePool;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Checks that `url` is a websocket URL with a host.
///
/// # Errors
///
/// Returns [`RelayError::InvalidUrl`] for anything else.
pub fn validate_relay_url(url: &str) -> RelayResult<Url> {
    let parsed = Url::parse(url).map_err(|e| RelayError::InvalidUrl(format!("{url}: {e}")))?;

    if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
        return Err(RelayError::InvalidUrl(format!(
            "URL must use ws:// or wss:// scheme, got: {}",
            parsed.scheme()
        )));
    }
    if !parsed.has_host() {
        return Err(RelayError::InvalidUrl(format!("{url}: missing host")));
    }

    Ok(parsed)
}

/// One relay, its state and its receive task.
pub struct RelayConnection {
    url: String,
    policy: RelayPolicy,
    state: Arc<RwLock<RelayState>>,
    sink: Mutex<Option<WsSink>>,
    recv_task: StdMutex<Option<JoinHandle<()>>>,
    pool: Arc<MessagePool>,
}

impl RelayConnection {
    /// Registers a relay without connecting.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidUrl`] if the URL is not `ws://` or `wss://`.
    pub fn new(url: &str, policy: RelayPolicy, pool: Arc<MessagePool>) -> RelayResult<Self> {
        validate_relay_url(url)?;
        Ok(Self {
            url: url.to_string(),
            policy,
            state: Arc::new(RwLock::new(RelayState::Disconnected)),
            sink: Mutex::new(None),
            recv_task: StdMutex::new(None),
            pool,
        })
    }

    /// The relay URL as registered.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Read/write policy.
    #[must_use]
    pub const fn policy(&self) -> RelayPolicy {
        self.policy
    }

    /// Current state.
    pub async fn state(&self) -> RelayState {
        self.state.read().await.clone()
    }

    /// True if the relay is open.
    pub async fn is_open(&self) -> bool {
        self.state.read().await.is_open()
    }

    /// Snapshot of URL, state and policy.
    pub async fn status(&self) -> RelayConnectionStatus {
        RelayConnectionStatus {
            url: self.url.clone(),
            state: self.state().await,
            policy: self.policy,
        }
    }

    /// Opens the websocket and starts the receive task.
    ///
    /// Does nothing if the relay is already open or connecting.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails or times out. The relay is
    /// left in [`RelayState::Failed`].
    pub async fn connect(&self, options: &ConnectionOptions) -> RelayResult<()> {
        {
            let mut state = self.state.write().await;
            if !state.can_open() {
                return Ok(());
            }
            *state = RelayState::Connecting;
        }

        info!("Connecting to relay: {}", self.url);

        let stream = match self.handshake(options).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to connect to relay {}: {}", self.url, e);
                *self.state.write().await = RelayState::Failed {
                    reason: e.to_string(),
                };
                return Err(e);
            }
        };

        let (write, read) = stream.split();
        *self.sink.lock().await = Some(write);
        *self.state.write().await = RelayState::Open;

        let handle = tokio::spawn(receive_loop(
            self.url.clone(),
            read,
            Arc::clone(&self.state),
            Arc::clone(&self.pool),
        ));
        if let Some(previous) = self.replace_recv_task(Some(handle)) {
            previous.abort();
        }

        info!("Connected to relay: {}", self.url);
        Ok(())
    }

    async fn handshake(&self, options: &ConnectionOptions) -> RelayResult<WsStream> {
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()
            .map_err(|e| RelayError::Tls(e.to_string()))?;

        let connecting = connect_async_tls_with_config(
            self.url.as_str(),
            None,
            false,
            Some(Connector::NativeTls(tls)),
        );

        let (stream, _response) = timeout(options.connect_timeout, connecting)
            .await
            .map_err(|_| {
                RelayError::Timeout(format!(
                    "connection to {} after {:?}",
                    self.url, options.connect_timeout
                ))
            })?
            .map_err(|e| RelayError::Connection {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;

        Ok(stream)
    }

    /// Writes one text frame.
    ///
    /// A failed or timed-out write marks the relay [`RelayState::Failed`].
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotConnected`] if the relay is not open, or the
    /// write error.
    pub async fn send(&self, text: &str, send_timeout: Duration) -> RelayResult<()> {
        let result = {
            let mut sink = self.sink.lock().await;
            let Some(sink) = sink.as_mut() else {
                return Err(RelayError::NotConnected(self.url.clone()));
            };

            match timeout(send_timeout, sink.send(Message::text(text.to_string()))).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(RelayError::Send {
                    url: self.url.clone(),
                    reason: e.to_string(),
                }),
                Err(_) => Err(RelayError::Timeout(format!(
                    "send to {} after {send_timeout:?}",
                    self.url
                ))),
            }
        };

        if let Err(e) = &result {
            self.fail(e.to_string()).await;
        }
        result
    }

    /// Stops the receive task, marks the relay closed and sends a close
    /// frame. Safe to call in any state.
    ///
    /// The close frame gets at most `close_timeout`, including the wait for
    /// a write already in progress, so a peer that stopped reading cannot
    /// stall the caller.
    pub async fn close(&self, close_timeout: Duration) {
        {
            let mut state = self.state.write().await;
            if matches!(*state, RelayState::Open | RelayState::Connecting) {
                *state = RelayState::Closed;
            }
        }

        if let Some(handle) = self.replace_recv_task(None) {
            handle.abort();
            debug!("Stopped receive task for {}", self.url);
        }

        let closing = async {
            let sink = self.sink.lock().await.take();
            match sink {
                Some(mut sink) => sink.send(Message::Close(None)).await,
                None => Ok(()),
            }
        };
        match timeout(close_timeout, closing).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Close frame to {} not sent: {}", self.url, e),
            Err(_) => debug!(
                "Close frame to {} timed out after {:?}",
                self.url, close_timeout
            ),
        }
    }

    async fn fail(&self, reason: String) {
        {
            let mut state = self.state.write().await;
            // A write that was still pending when the relay was closed.
            if *state == RelayState::Closed {
                debug!("Write to closed relay {} ended: {}", self.url, reason);
            } else {
                warn!("Relay {} failed: {}", self.url, reason);
                *state = RelayState::Failed { reason };
            }
        }
        self.sink.lock().await.take();
        if let Some(handle) = self.replace_recv_task(None) {
            handle.abort();
        }
    }

    fn replace_recv_task(&self, handle: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        let mut slot = self
            .recv_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, handle)
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        if let Some(handle) = self.replace_recv_task(None) {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for RelayConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConnection")
            .field("url", &self.url)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

async fn receive_loop(
    url: String,
    mut read: WsSource,
    state: Arc<RwLock<RelayState>>,
    pool: Arc<MessagePool>,
) {
    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_text(&url, text.as_str(), &pool),
            Ok(Message::Close(_)) => {
                info!("Relay {} closed connection", url);
                let mut state = state.write().await;
                if state.is_open() {
                    *state = RelayState::Closed;
                }
                return;
            }
            // Ping replies are handled by tungstenite
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket error from {}: {}", url, e);
                let mut state = state.write().await;
                if state.is_open() {
                    *state = RelayState::Failed {
                        reason: e.to_string(),
                    };
                }
                return;
            }
        }
    }

    debug!("Stream from {} ended", url);
    let mut state = state.write().await;
    if state.is_open() {
        *state = RelayState::Closed;
    }
}

/// Parses one inbound frame and routes it into the pool.
///
/// Malformed frames and events with a bad id or signature are dropped; the
/// connection keeps going.
pub(crate) fn handle_text(url: &str, text: &str, pool: &MessagePool) {
    let message = match RelayMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("Dropping message from {}: {}", url, e);
            return;
        }
    };

    if let RelayMessage::Event {
        subscription_id,
        event,
    } = &message
    {
        if let Err(e) = event.verify() {
            warn!(
                "Dropping invalid event {} on {} from {}: {}",
                event.id(),
                subscription_id,
                url,
                e
            );
            return;
        }
    }

    match message {
        RelayMessage::Ok {
            event_id,
            accepted,
            message,
        } => {
            if accepted {
                debug!("Relay {} accepted event {}", url, event_id);
            } else {
                warn!("Relay {} rejected event {}: {}", url, event_id, message);
            }
        }
        other => {
            pool.push_relay_message(url, other);
        }
    }
}
