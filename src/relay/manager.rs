//! Relay manager for event publishing and subscription.
//!
//! The manager owns every [`RelayConnection`] and the shared
//! [`MessagePool`] their receive tasks write into. Outbound commands fan out
//! to all open relays concurrently; a relay that fails is marked
//! [`RelayState::Failed`] and skipped from then on, without affecting its
//! siblings or the caller.
//!
//! There is no automatic reconnection. Calling
//! [`RelayManager::open_connections`] again reopens closed and failed relays
//! and replays the tracked subscriptions to them.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::connection::RelayConnection;
use super::error::{RelayError, RelayResult};
use super::types::{ConnectionOptions, RelayConnectionStatus, RelayPolicy, RelayState};
use crate::nostr::{ClientMessage, Event, Filters};
use crate::pool::MessagePool;

/// Manager for a set of relay connections.
///
/// # Example
///
/// ```rust,no_run
/// use nostr_relay_client::relay::{ConnectionOptions, RelayManager};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = RelayManager::new();
/// manager.add_relay("wss://relay.damus.io").await?;
/// manager.add_relay("wss://nos.lol").await?;
///
/// let opened = manager.open_connections(&ConnectionOptions::default()).await;
/// println!("{opened} relays open");
///
/// let pool = manager.message_pool();
/// while let Some(message) = pool.next_event().await {
///     println!("{} from {}", message.event.id(), message.relay_url);
/// }
/// # Ok(())
/// # }
/// ```
pub struct RelayManager {
    /// Registered relays, in insertion order.
    relays: RwLock<Vec<Arc<RelayConnection>>>,

    /// Subscriptions to replay when a relay opens.
    subscriptions: RwLock<HashMap<String, Filters>>,

    /// Options from the last `open_connections` call.
    options: RwLock<ConnectionOptions>,

    /// Sink for everything the relays send.
    pool: Arc<MessagePool>,
}

impl Default for RelayManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayManager {
    /// Creates a manager with a fresh message pool.
    #[must_use]
    pub fn new() -> Self {
        Self::with_pool(Arc::new(MessagePool::new()))
    }

    /// Creates a manager that feeds an existing pool.
    #[must_use]
    pub fn with_pool(pool: Arc<MessagePool>) -> Self {
        Self {
            relays: RwLock::new(Vec::new()),
            subscriptions: RwLock::new(HashMap::new()),
            options: RwLock::new(ConnectionOptions::default()),
            pool,
        }
    }

    /// The pool inbound traffic is pushed into.
    #[must_use]
    pub fn message_pool(&self) -> Arc<MessagePool> {
        Arc::clone(&self.pool)
    }

    /// Registers a read/write relay. Does not connect.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidUrl`] for a non-websocket URL.
    pub async fn add_relay(&self, url: &str) -> RelayResult<()> {
        self.add_relay_with_policy(url, RelayPolicy::default()).await
    }

    /// Registers a relay with an explicit read/write policy.
    ///
    /// Adding a URL that is already registered is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidUrl`] for a non-websocket URL.
    pub async fn add_relay_with_policy(&self, url: &str, policy: RelayPolicy) -> RelayResult<()> {
        let connection = RelayConnection::new(url, policy, Arc::clone(&self.pool))?;

        let mut relays = self.relays.write().await;
        if relays.iter().any(|relay| relay.url() == url) {
            debug!("Relay {} already registered", url);
            return Ok(());
        }
        relays.push(Arc::new(connection));
        drop(relays);

        debug!("Registered relay {} ({:?})", url, policy);
        Ok(())
    }

    /// Validates and registers several relays.
    ///
    /// # Errors
    ///
    /// Returns the first invalid URL. Relays before it stay registered.
    pub async fn add_relays<I, S>(&self, urls: I) -> RelayResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for url in urls {
            self.add_relay(url.as_ref()).await?;
        }
        Ok(())
    }

    /// Number of registered relays.
    pub async fn relay_count(&self) -> usize {
        self.relays.read().await.len()
    }

    /// Connects every relay that is not already open, concurrently.
    ///
    /// Each relay succeeds or fails on its own; failures are logged and
    /// leave that relay [`RelayState::Failed`]. Tracked subscriptions are
    /// sent to every readable relay opened by this call.
    ///
    /// Returns the number of relays open afterwards.
    pub async fn open_connections(&self, options: &ConnectionOptions) -> usize {
        *self.options.write().await = options.clone();

        let relays = self.relays_snapshot().await;
        let mut to_open = Vec::new();
        for relay in relays {
            if relay.state().await.can_open() {
                to_open.push(relay);
            }
        }

        let attempts = to_open.iter().map(|relay| async move {
            relay.connect(options).await.map(|()| Arc::clone(relay))
        });
        let opened: Vec<Arc<RelayConnection>> =
            join_all(attempts).await.into_iter().flatten().collect();

        if !opened.is_empty() {
            self.replay_subscriptions(&opened, options).await;
        }

        let open_count = self.open_count().await;
        info!(
            "Opened {} of {} relays ({} open in total)",
            opened.len(),
            to_open.len(),
            open_count
        );
        open_count
    }

    async fn replay_subscriptions(
        &self,
        relays: &[Arc<RelayConnection>],
        options: &ConnectionOptions,
    ) {
        let requests: Vec<String> = {
            let subscriptions = self.subscriptions.read().await;
            subscriptions
                .iter()
                .filter_map(|(id, filters)| {
                    ClientMessage::Req {
                        subscription_id: id.clone(),
                        filters: filters.clone(),
                    }
                    .to_json()
                    .inspect_err(|e| warn!("Cannot serialize subscription {}: {}", id, e))
                    .ok()
                })
                .collect()
        };
        if requests.is_empty() {
            return;
        }

        let sends = relays
            .iter()
            .filter(|relay| relay.policy().read)
            .map(|relay| {
                let requests = &requests;
                async move {
                    for request in requests {
                        if let Err(e) = relay.send(request, options.send_timeout).await {
                            warn!("Subscription replay to {} failed: {}", relay.url(), e);
                            return;
                        }
                    }
                    debug!(
                        "Replayed {} subscriptions to {}",
                        requests.len(),
                        relay.url()
                    );
                }
            });
        join_all(sends).await;
    }

    /// Closes every relay and stops every receive task. Idempotent.
    ///
    /// The message pool is left open so queued messages can still be read.
    pub async fn close_connections(&self) {
        let close_timeout = self.options.read().await.send_timeout;
        let relays = self.relays_snapshot().await;
        join_all(relays.iter().map(|relay| relay.close(close_timeout))).await;
        info!("Closed {} relay connections", relays.len());
    }

    /// Writes `text` to every open relay, concurrently.
    ///
    /// Relays that are not open are skipped. A relay whose write fails or
    /// times out is marked failed; the error is logged, not returned.
    ///
    /// Returns the number of relays the message was written to.
    pub async fn publish_message(&self, text: &str) -> usize {
        self.fan_out(text, |_| true).await
    }

    /// Publishes a signed event to every open, writable relay.
    ///
    /// # Errors
    ///
    /// Returns an error only if the event cannot be serialized.
    pub async fn publish_event(&self, event: &Event) -> RelayResult<usize> {
        let message = event.to_message()?;
        let sent = self.fan_out(&message, |policy| policy.write).await;
        debug!("Event {} written to {} relays", event.id(), sent);
        Ok(sent)
    }

    /// Records a subscription for replay on (re)open. Sends nothing.
    pub async fn add_subscription(&self, subscription_id: &str, filters: Filters) {
        self.subscriptions
            .write()
            .await
            .insert(subscription_id.to_string(), filters);
    }

    /// Records a subscription and sends its `REQ` to every open, readable
    /// relay.
    ///
    /// # Errors
    ///
    /// Returns an error if the filters cannot be serialized.
    pub async fn request_subscription(
        &self,
        subscription_id: &str,
        filters: Filters,
    ) -> RelayResult<usize> {
        let request = ClientMessage::Req {
            subscription_id: subscription_id.to_string(),
            filters: filters.clone(),
        }
        .to_json()?;

        self.add_subscription(subscription_id, filters).await;
        let sent = self.fan_out(&request, |policy| policy.read).await;
        debug!("Subscription {} sent to {} relays", subscription_id, sent);
        Ok(sent)
    }

    /// Forgets a subscription and sends `CLOSE` to every open, readable
    /// relay.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Nostr`] if the message cannot be serialized.
    pub async fn close_subscription(&self, subscription_id: &str) -> RelayResult<usize> {
        self.subscriptions.write().await.remove(subscription_id);

        let close = ClientMessage::Close {
            subscription_id: subscription_id.to_string(),
        }
        .to_json()?;
        Ok(self.fan_out(&close, |policy| policy.read).await)
    }

    /// Ids of tracked subscriptions.
    pub async fn subscription_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.subscriptions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of every registered relay.
    pub async fn relay_statuses(&self) -> Vec<RelayConnectionStatus> {
        let relays = self.relays_snapshot().await;
        let mut statuses = Vec::with_capacity(relays.len());
        for relay in &relays {
            statuses.push(relay.status().await);
        }
        statuses
    }

    /// State of one relay, if registered.
    pub async fn relay_state(&self, url: &str) -> Option<RelayState> {
        let relay = self
            .relays_snapshot()
            .await
            .into_iter()
            .find(|relay| relay.url() == url)?;
        Some(relay.state().await)
    }

    async fn open_count(&self) -> usize {
        let mut count = 0;
        for relay in self.relays_snapshot().await {
            if relay.is_open().await {
                count += 1;
            }
        }
        count
    }

    async fn relays_snapshot(&self) -> Vec<Arc<RelayConnection>> {
        self.relays.read().await.clone()
    }

    async fn fan_out(&self, text: &str, allowed: impl Fn(&RelayPolicy) -> bool) -> usize {
        let send_timeout = self.options.read().await.send_timeout;
        let relays = self.relays_snapshot().await;

        let sends = relays
            .iter()
            .filter(|relay| allowed(&relay.policy()))
            .map(|relay| async move {
                if !relay.is_open().await {
                    return false;
                }
                match relay.send(text, send_timeout).await {
                    Ok(()) => true,
                    Err(RelayError::NotConnected(_)) => false,
                    Err(e) => {
                        warn!("Dropping message for {}: {}", relay.url(), e);
                        false
                    }
                }
            });

        join_all(sends).await.into_iter().filter(|sent| *sent).count()
    }
}
