//! The shared inbound queue.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::debug;

use crate::nostr::RelayMessage;
use crate::pool::types::{EoseMessage, EventMessage, NoticeMessage, PooledMessage};

#[derive(Default)]
struct PoolState {
    events: VecDeque<EventMessage>,
    notices: VecDeque<NoticeMessage>,
    eose_notices: VecDeque<EoseMessage>,
    seen_event_ids: HashSet<String>,
}

/// Merges inbound traffic from every relay into three FIFO queues.
///
/// Events are deduplicated by id across all relays for the lifetime of the
/// pool: the first relay to deliver an id wins and later copies are
/// discarded. Notices and EOSE markers are never deduplicated.
///
/// The set of seen ids is never pruned, so memory grows with the number of
/// distinct events received. A long-lived consumer that cares should create
/// a fresh pool per session.
///
/// `pop_*` never blocks; `next_*` waits until a message arrives or the pool
/// is closed and drained.
#[derive(Default)]
pub struct MessagePool {
    state: Mutex<PoolState>,
    events_ready: Notify,
    notices_ready: Notify,
    eose_ready: Notify,
    closed: AtomicBool,
}

impl std::fmt::Debug for MessagePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MessagePool")
            .field("events", &state.events.len())
            .field("notices", &state.notices.len())
            .field("eose_notices", &state.eose_notices.len())
            .field("seen_event_ids", &state.seen_event_ids.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl MessagePool {
    /// Creates an empty, open pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the queues half-updated,
    // so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a message. Returns false if it was a duplicate event.
    pub fn push(&self, message: PooledMessage) -> bool {
        let mut state = self.lock();
        match message {
            PooledMessage::Event(event_message) => {
                if !state
                    .seen_event_ids
                    .insert(event_message.event.id().to_string())
                {
                    debug!(
                        event_id = event_message.event.id(),
                        relay = %event_message.relay_url,
                        "Dropping duplicate event"
                    );
                    return false;
                }
                state.events.push_back(event_message);
                drop(state);
                self.events_ready.notify_one();
            }
            PooledMessage::Notice(notice) => {
                state.notices.push_back(notice);
                drop(state);
                self.notices_ready.notify_one();
            }
            PooledMessage::Eose(eose) => {
                state.eose_notices.push_back(eose);
                drop(state);
                self.eose_ready.notify_one();
            }
        }
        true
    }

    /// Queues a parsed relay message. `OK` results are not queued.
    pub fn push_relay_message(&self, relay_url: &str, message: RelayMessage) -> bool {
        PooledMessage::from_relay_message(relay_url, message).is_some_and(|m| self.push(m))
    }

    /// True if an event is waiting.
    #[must_use]
    pub fn has_events(&self) -> bool {
        !self.lock().events.is_empty()
    }

    /// Takes the oldest event, if any.
    #[must_use]
    pub fn pop_event(&self) -> Option<EventMessage> {
        self.lock().events.pop_front()
    }

    /// Waits for the next event. `None` once closed and drained.
    pub async fn next_event(&self) -> Option<EventMessage> {
        self.next_from(&self.events_ready, |state| state.events.pop_front())
            .await
    }

    /// True if a notice is waiting.
    #[must_use]
    pub fn has_notices(&self) -> bool {
        !self.lock().notices.is_empty()
    }

    /// Takes the oldest notice, if any.
    #[must_use]
    pub fn pop_notice(&self) -> Option<NoticeMessage> {
        self.lock().notices.pop_front()
    }

    /// Waits for the next notice. `None` once closed and drained.
    pub async fn next_notice(&self) -> Option<NoticeMessage> {
        self.next_from(&self.notices_ready, |state| state.notices.pop_front())
            .await
    }

    /// True if an EOSE marker is waiting.
    #[must_use]
    pub fn has_eose_notices(&self) -> bool {
        !self.lock().eose_notices.is_empty()
    }

    /// Takes the oldest EOSE marker, if any.
    #[must_use]
    pub fn pop_eose_notice(&self) -> Option<EoseMessage> {
        self.lock().eose_notices.pop_front()
    }

    /// Waits for the next EOSE marker. `None` once closed and drained.
    pub async fn next_eose_notice(&self) -> Option<EoseMessage> {
        self.next_from(&self.eose_ready, |state| state.eose_notices.pop_front())
            .await
    }

    /// Number of distinct event ids seen so far.
    #[must_use]
    pub fn seen_event_count(&self) -> usize {
        self.lock().seen_event_ids.len()
    }

    /// Closes the pool and wakes every waiter.
    ///
    /// Queued messages can still be drained; pushes after close are still
    /// accepted so in-flight receive tasks do not race the shutdown.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.events_ready.notify_waiters();
        self.notices_ready.notify_waiters();
        self.eose_ready.notify_waiters();
    }

    /// True once [`Self::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn next_from<T>(
        &self,
        ready: &Notify,
        pop: impl Fn(&mut PoolState) -> Option<T>,
    ) -> Option<T> {
        loop {
            // Register before checking so a push or close between the check
            // and the await is not missed.
            let notified = ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let popped = {
                let mut state = self.lock();
                pop(&mut *state)
            };
            if popped.is_some() {
                return popped;
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }
}
