//! High-level client: post notes, exchange direct messages, stream traffic.

use std::ops::ControlFlow;
use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::config::ClientConfig;
use super::error::{ClientError, Result};
use crate::nostr::encryption::EncryptedPayload;
use crate::nostr::{Event, EventKind, Filter, Filters, Keys, PublicKey, UnsignedEvent};
use crate::pool::{EoseMessage, EventMessage, MessagePool, NoticeMessage};
use crate::relay::{RelayConnectionStatus, RelayManager};

/// Lifecycle of a [`NostrClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Created, relays registered, nothing opened.
    Uninitialized,
    /// `connect` has run.
    Connected,
    /// `close` has run. Terminal.
    Closed,
}

impl ClientState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }
}

/// Callbacks for [`NostrClient::subscribe_all`].
///
/// Every method defaults to continuing, so implementors only override the
/// categories they care about. Returning [`ControlFlow::Break`] from any of
/// them ends the subscription.
pub trait PoolHandler {
    /// Called for each new event.
    fn on_event(&mut self, _message: &EventMessage) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    /// Called for each relay notice.
    fn on_notice(&mut self, _message: &NoticeMessage) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    /// Called for each end-of-stored-events marker.
    fn on_eose(&mut self, _message: &EoseMessage) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// A Nostr client bound to one identity and a fixed set of relays.
///
/// Streaming calls (`get_posts`, `receive_dms`, `subscribe_all`) all drain
/// the same event queue, so run one at a time. They return when their
/// callback breaks or when [`Self::close`] is called; share the client
/// through an `Arc` to close it from another task.
///
/// # Example
///
/// ```rust,no_run
/// use std::ops::ControlFlow;
/// use nostr_relay_client::client::{ClientConfig, NostrClient};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ClientConfig::new().with_relay("wss://relay.damus.io");
/// let client = NostrClient::new(config)?;
/// client.connect().await?;
///
/// let note = client.post("hello").await?;
/// println!("posted {}", note.id());
///
/// client
///     .get_posts(None, |event| {
///         println!("{}: {}", event.pubkey(), event.content());
///         ControlFlow::Continue(())
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct NostrClient {
    keys: Keys,
    config: ClientConfig,
    manager: Arc<RelayManager>,
    state: RwLock<ClientState>,
}

impl NostrClient {
    /// Builds a client from configuration. Does not connect.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or its secret key
    /// does not parse.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let keys = config.keys()?;
        Self::with_keys(keys, config)
    }

    /// Builds a client with explicit keys; the config's `secret_key` is
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_keys(keys: Keys, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            keys,
            config,
            manager: Arc::new(RelayManager::new()),
            state: RwLock::new(ClientState::Uninitialized),
        })
    }

    /// This client's public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.keys.public_key()
    }

    /// This client's keys.
    #[must_use]
    pub const fn keys(&self) -> &Keys {
        &self.keys
    }

    /// The configuration the client was built with.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The underlying relay manager.
    #[must_use]
    pub fn relay_manager(&self) -> &RelayManager {
        &self.manager
    }

    /// The pool inbound traffic lands in.
    #[must_use]
    pub fn message_pool(&self) -> Arc<MessagePool> {
        self.manager.message_pool()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ClientState {
        *self.state.read().await
    }

    /// Snapshot of every relay.
    pub async fn relay_statuses(&self) -> Vec<RelayConnectionStatus> {
        self.manager.relay_statuses().await
    }

    /// Registers the configured relays and opens them.
    ///
    /// Calling it again while connected retries relays that failed. Relays
    /// that fail are logged and left out; the call succeeds even if none
    /// open.
    ///
    /// Returns the number of open relays.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidState`] after [`Self::close`].
    pub async fn connect(&self) -> Result<usize> {
        let mut state = self.state.write().await;
        if *state == ClientState::Closed {
            return Err(ClientError::InvalidState {
                expected: ClientState::Connected.as_str(),
                actual: ClientState::Closed.as_str(),
            });
        }

        self.manager.add_relays(&self.config.relays).await?;
        let open = self
            .manager
            .open_connections(&self.config.connection_options())
            .await;
        *state = ClientState::Connected;
        drop(state);

        if open == 0 {
            warn!("No relays could be opened");
        }
        info!("Client {} connected to {} relays", self.keys.pubkey_hex(), open);
        Ok(open)
    }

    /// Closes every relay and the message pool. Idempotent.
    ///
    /// Running streaming calls return once they have drained what was
    /// already queued.
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        if *state == ClientState::Closed {
            return;
        }
        self.manager.close_connections().await;
        self.manager.message_pool().close();
        *state = ClientState::Closed;
        drop(state);
        info!("Client closed");
    }

    /// Signs and publishes a text note.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidState`] unless connected, or an error
    /// if signing fails. Individual relay failures are not errors.
    pub async fn post(&self, content: &str) -> Result<Event> {
        self.ensure_connected().await?;

        let event = UnsignedEvent::text_note(content, self.keys.public_key()).sign(&self.keys)?;
        let sent = self.manager.publish_event(&event).await?;
        debug!("Posted note {} to {} relays", event.id(), sent);
        Ok(event)
    }

    /// Encrypts `content` for `recipient` and publishes it as a kind 4
    /// event.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidState`] unless connected, or an error
    /// if key agreement, encryption or signing fails.
    pub async fn send_dm(&self, content: &str, recipient: &PublicKey) -> Result<Event> {
        self.ensure_connected().await?;

        let secret = self.keys.shared_secret(recipient)?;
        let event = UnsignedEvent::encrypted_direct_message(
            self.keys.public_key(),
            recipient,
            content,
            &secret,
        )?
        .sign(&self.keys)?;

        let sent = self.manager.publish_event(&event).await?;
        debug!("Sent DM {} to {} relays", event.id(), sent);
        Ok(event)
    }

    /// Subscribes to text notes, optionally from one author, and calls
    /// `on_event` for each new one until it breaks or the client closes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidState`] unless connected.
    pub async fn get_posts<F>(&self, author: Option<PublicKey>, on_event: F) -> Result<()>
    where
        F: FnMut(&Event) -> ControlFlow<()>,
    {
        let mut filter = Filter::new().kinds([EventKind::TextNote]);
        if let Some(author) = author {
            filter = filter.authors([author]);
        }

        self.stream_events(Filters::from(filter), on_event).await
    }

    /// Subscribes to direct messages from `counterparty` to this client and
    /// calls `on_message` with each decrypted text.
    ///
    /// Messages that do not decrypt with our key are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidState`] unless connected.
    pub async fn receive_dms<F>(&self, counterparty: &PublicKey, mut on_message: F) -> Result<()>
    where
        F: FnMut(&Event, &str) -> ControlFlow<()>,
    {
        let filter = Filter::new()
            .kinds([EventKind::EncryptedDirectMessage])
            .authors([*counterparty])
            .pubkey_refs([self.keys.public_key()]);

        self.stream_events(Filters::from(filter), |event| {
            if !EncryptedPayload::is_encrypted_content(event.content()) {
                debug!("Skipping DM {} without encrypted payload", event.id());
                return ControlFlow::Continue(());
            }
            match event.decrypt_direct_message(&self.keys) {
                Ok(plaintext) => on_message(event, &plaintext),
                Err(e) if e.is_decryption_failure() => {
                    debug!("Skipping DM {}: {}", event.id(), e);
                    ControlFlow::Continue(())
                }
                Err(e) => {
                    warn!("Cannot read DM {}: {}", event.id(), e);
                    ControlFlow::Continue(())
                }
            }
        })
        .await
    }

    /// Dispatches every pooled event, notice and EOSE marker to `handler`
    /// until a callback breaks or the client closes.
    ///
    /// Sends no subscription of its own; pair it with
    /// [`RelayManager::request_subscription`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidState`] before [`Self::connect`].
    pub async fn subscribe_all<H: PoolHandler>(&self, handler: &mut H) -> Result<()> {
        if self.state().await == ClientState::Uninitialized {
            return Err(Self::not_connected(ClientState::Uninitialized));
        }

        let pool = self.manager.message_pool();
        loop {
            let flow = tokio::select! {
                Some(message) = pool.next_event() => handler.on_event(&message),
                Some(message) = pool.next_notice() => handler.on_notice(&message),
                Some(message) = pool.next_eose_notice() => handler.on_eose(&message),
                else => break,
            };
            if flow.is_break() {
                break;
            }
        }
        Ok(())
    }

    async fn stream_events<F>(&self, filters: Filters, mut on_event: F) -> Result<()>
    where
        F: FnMut(&Event) -> ControlFlow<()>,
    {
        self.ensure_connected().await?;

        let subscription_id = new_subscription_id();
        // Closes the subscription even if this future is dropped mid-stream.
        let guard = SubscriptionGuard {
            manager: Arc::clone(&self.manager),
            subscription_id: Some(subscription_id.clone()),
        };
        let sent = self
            .manager
            .request_subscription(&subscription_id, filters.clone())
            .await?;
        debug!("Subscription {} sent to {} relays", subscription_id, sent);

        let pool = self.manager.message_pool();
        while let Some(message) = pool.next_event().await {
            if !filters.matches(&message.event) {
                continue;
            }
            if on_event(&message.event).is_break() {
                break;
            }
        }

        guard.close().await;
        Ok(())
    }

    async fn ensure_connected(&self) -> Result<()> {
        let state = self.state().await;
        if state == ClientState::Connected {
            Ok(())
        } else {
            Err(Self::not_connected(state))
        }
    }

    const fn not_connected(actual: ClientState) -> ClientError {
        ClientError::InvalidState {
            expected: ClientState::Connected.as_str(),
            actual: actual.as_str(),
        }
    }
}

impl std::fmt::Debug for NostrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NostrClient")
            .field("public_key", &self.keys.public_key())
            .field("relays", &self.config.relays)
            .finish_non_exhaustive()
    }
}

/// Sends `CLOSE` for a streaming subscription.
///
/// The normal exit path awaits [`SubscriptionGuard::close`]. If the stream is
/// dropped first (timeout, `select!`, task abort), `Drop` spawns the close on
/// the current runtime instead.
struct SubscriptionGuard {
    manager: Arc<RelayManager>,
    subscription_id: Option<String>,
}

impl SubscriptionGuard {
    async fn close(mut self) {
        if let Some(id) = self.subscription_id.take() {
            close_subscription(&self.manager, &id).await;
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let Some(id) = self.subscription_id.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let manager = Arc::clone(&self.manager);
                runtime.spawn(async move { close_subscription(&manager, &id).await });
            }
            Err(_) => debug!("No runtime left to close subscription {}", id),
        }
    }
}

async fn close_subscription(manager: &RelayManager, subscription_id: &str) {
    if let Err(e) = manager.close_subscription(subscription_id).await {
        debug!("Could not close subscription {}: {}", subscription_id, e);
    }
}

fn new_subscription_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_client() -> NostrClient {
        NostrClient::new(ClientConfig::new()).unwrap()
    }

    #[test]
    fn subscription_ids_are_random_hex() {
        let a = new_subscription_id();
        let b = new_subscription_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn new_rejects_invalid_relay() {
        let config = ClientConfig::new().with_relay("ftp://relay.example.com");
        assert!(matches!(
            NostrClient::new(config),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn seeded_client_has_deterministic_pubkey() {
        let seed = "01".repeat(32);
        let a = NostrClient::new(ClientConfig::new().with_secret_key(seed.clone())).unwrap();
        let b = NostrClient::new(ClientConfig::new().with_secret_key(seed)).unwrap();
        assert_eq!(a.public_key(), b.public_key());
    }

    #[tokio::test]
    async fn post_before_connect_is_invalid_state() {
        let client = offline_client();
        let result = client.post("hello").await;
        assert!(matches!(
            result,
            Err(ClientError::InvalidState {
                actual: "uninitialized",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn subscribe_all_before_connect_is_invalid_state() {
        struct Nothing;
        impl PoolHandler for Nothing {}

        let client = offline_client();
        assert!(client.subscribe_all(&mut Nothing).await.is_err());
    }

    #[tokio::test]
    async fn connect_with_no_relays_succeeds() {
        let client = offline_client();
        assert_eq!(client.connect().await.unwrap(), 0);
        assert_eq!(client.state().await, ClientState::Connected);

        let note = client.post("nobody hears this").await.unwrap();
        assert!(note.is_valid());
    }

    #[tokio::test]
    async fn close_is_terminal_and_idempotent() {
        let client = offline_client();
        client.connect().await.unwrap();
        client.close().await;
        client.close().await;

        assert_eq!(client.state().await, ClientState::Closed);
        assert!(client.message_pool().is_closed());
        assert!(matches!(
            client.connect().await,
            Err(ClientError::InvalidState { .. })
        ));
        assert!(matches!(
            client.post("late").await,
            Err(ClientError::InvalidState {
                actual: "closed",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn subscribe_all_returns_after_close() {
        struct Counter(usize);
        impl PoolHandler for Counter {
            fn on_notice(&mut self, _message: &NoticeMessage) -> ControlFlow<()> {
                self.0 += 1;
                ControlFlow::Continue(())
            }
        }

        let client = offline_client();
        client.connect().await.unwrap();
        let pool = client.message_pool();
        pool.push_relay_message(
            "wss://a",
            crate::nostr::RelayMessage::Notice {
                message: "one".to_string(),
            },
        );
        client.close().await;

        let mut counter = Counter(0);
        client.subscribe_all(&mut counter).await.unwrap();
        assert_eq!(counter.0, 1);
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let seed = "01".repeat(32);
        let client = NostrClient::new(ClientConfig::new().with_secret_key(seed.clone())).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains(&seed));
        assert!(debug.contains("NostrClient"));
    }
}
