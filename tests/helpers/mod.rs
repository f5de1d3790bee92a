//! Reusable test helpers for relay and client integration tests.
//!
//! [`MockRelay`] is a small in-process relay on `127.0.0.1`: it stores
//! published events, answers `REQ` with stored matches followed by `EOSE`,
//! forwards new events to matching open subscriptions, and can push
//! arbitrary scripted text to every connected client. No network access is
//! needed.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use nostr_relay_client::nostr::{Event, Filter, Filters};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// How long helpers wait before failing a test.
pub const WAIT: Duration = Duration::from_secs(5);

/// Installs a test-writer tracing subscriber once. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Awaits `future`, failing the test if it takes longer than [`WAIT`].
pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("timed out waiting in test")
}

/// A `ws://` URL on which nothing is listening.
pub async fn unused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("ws://{addr}")
}

#[derive(Clone, Debug)]
enum Outbound {
    Raw(String),
    Event(Event),
}

#[derive(Default)]
struct Shared {
    received: Mutex<Vec<String>>,
    events: Mutex<Vec<Event>>,
    received_notify: Notify,
    connections: Mutex<usize>,
}

/// An in-process relay for tests.
pub struct MockRelay {
    url: String,
    shared: Arc<Shared>,
    outbound: broadcast::Sender<Outbound>,
    accept_task: JoinHandle<()>,
}

impl MockRelay {
    /// Starts listening on an ephemeral port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let shared = Arc::new(Shared::default());
        let (outbound, _) = broadcast::channel(256);

        let accept_shared = Arc::clone(&shared);
        let accept_outbound = outbound.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                // Subscribe before the handshake so nothing sent after the
                // client sees the connection open is missed.
                let rx = accept_outbound.subscribe();
                let shared = Arc::clone(&accept_shared);
                let outbound = accept_outbound.clone();
                tokio::spawn(serve(stream, shared, outbound, rx));
            }
        });

        Self {
            url: format!("ws://{addr}"),
            shared,
            outbound,
            accept_task,
        }
    }

    /// URL clients should connect to.
    pub fn url(&self) -> String {
        self.url.clone()
    }

    /// Sends raw text to every connected client.
    pub fn send_raw(&self, text: impl Into<String>) {
        let _ = self.outbound.send(Outbound::Raw(text.into()));
    }

    /// Sends `["EVENT", subscription_id, event]` to every connected client,
    /// whether or not it subscribed.
    pub fn send_event(&self, subscription_id: &str, event: &Event) {
        self.send_raw(json!(["EVENT", subscription_id, event]).to_string());
    }

    /// Every text frame received so far, in order.
    pub fn received(&self) -> Vec<String> {
        self.shared.received.lock().expect("lock").clone()
    }

    /// Received frames parsed as JSON arrays whose first element is `kind`.
    pub fn received_of(&self, kind: &str) -> Vec<Value> {
        self.received()
            .iter()
            .filter_map(|text| serde_json::from_str::<Value>(text).ok())
            .filter(|value| value.get(0).and_then(Value::as_str) == Some(kind))
            .collect()
    }

    /// Events accepted so far.
    pub fn stored_events(&self) -> Vec<Event> {
        self.shared.events.lock().expect("lock").clone()
    }

    /// Number of clients that have completed the handshake.
    pub fn connection_count(&self) -> usize {
        *self.shared.connections.lock().expect("lock")
    }

    /// Waits until a received frame satisfies `predicate` and returns it.
    pub async fn wait_for(&self, predicate: impl Fn(&str) -> bool) -> String {
        within(async {
            loop {
                let notified = self.shared.received_notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(found) = self.received().into_iter().find(|text| predicate(text)) {
                    return found;
                }
                notified.await;
            }
        })
        .await
    }

    /// Waits for a frame of the given type, e.g. `"REQ"`.
    pub async fn wait_for_kind(&self, kind: &str) -> Value {
        let prefix = format!("[\"{kind}\"");
        let text = self.wait_for(|text| text.starts_with(&prefix)).await;
        serde_json::from_str(&text).expect("relay received JSON")
    }
}

impl Drop for MockRelay {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// A relay that completes the websocket handshake and then never reads, so
/// the client's writes back up once the socket buffers fill.
pub struct StalledRelay {
    url: String,
    accept_task: JoinHandle<()>,
}

impl StalledRelay {
    /// Starts listening on an ephemeral port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let accept_task = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                    held.push(ws);
                }
            }
        });

        Self {
            url: format!("ws://{addr}"),
            accept_task,
        }
    }

    /// URL clients should connect to.
    pub fn url(&self) -> String {
        self.url.clone()
    }
}

impl Drop for StalledRelay {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve(
    stream: TcpStream,
    shared: Arc<Shared>,
    outbound: broadcast::Sender<Outbound>,
    mut rx: broadcast::Receiver<Outbound>,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    *shared.connections.lock().expect("lock") += 1;

    let mut subscriptions: HashMap<String, Filters> = HashMap::new();

    loop {
        tokio::select! {
            frame = ws.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text.as_str().to_string(),
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                shared.received.lock().expect("lock").push(text.clone());
                shared.received_notify.notify_waiters();

                for reply in handle_client_text(&text, &shared, &outbound, &mut subscriptions) {
                    if ws.send(Message::text(reply)).await.is_err() {
                        return;
                    }
                }
            }
            out = rx.recv() => {
                let replies: Vec<String> = match out {
                    Ok(Outbound::Raw(text)) => vec![text],
                    Ok(Outbound::Event(event)) => subscriptions
                        .iter()
                        .filter(|(_, filters)| filters.matches(&event))
                        .map(|(id, _)| json!(["EVENT", id, event]).to_string())
                        .collect(),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                for reply in replies {
                    if ws.send(Message::text(reply)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

fn handle_client_text(
    text: &str,
    shared: &Shared,
    outbound: &broadcast::Sender<Outbound>,
    subscriptions: &mut HashMap<String, Filters>,
) -> Vec<String> {
    let Ok(Value::Array(parts)) = serde_json::from_str::<Value>(text) else {
        return vec![json!(["NOTICE", "invalid: not a JSON array"]).to_string()];
    };

    match parts.first().and_then(Value::as_str) {
        Some("EVENT") => {
            let Some(Ok(event)) = parts.get(1).map(|v| serde_json::from_value::<Event>(v.clone()))
            else {
                return vec![json!(["NOTICE", "invalid: bad event"]).to_string()];
            };
            if event.verify().is_err() {
                return vec![json!(["OK", event.id(), false, "invalid: bad signature"]).to_string()];
            }
            shared.events.lock().expect("lock").push(event.clone());
            let ok = json!(["OK", event.id(), true, ""]).to_string();
            let _ = outbound.send(Outbound::Event(event));
            vec![ok]
        }
        Some("REQ") => {
            let Some(id) = parts.get(1).and_then(Value::as_str) else {
                return vec![json!(["NOTICE", "invalid: missing subscription id"]).to_string()];
            };
            let filters: Filters = Filters::new(
                parts[2..]
                    .iter()
                    .filter_map(|v| serde_json::from_value::<Filter>(v.clone()).ok())
                    .collect(),
            );

            let mut replies: Vec<String> = shared
                .events
                .lock()
                .expect("lock")
                .iter()
                .filter(|event| filters.matches(event))
                .map(|event| json!(["EVENT", id, event]).to_string())
                .collect();
            replies.push(json!(["EOSE", id]).to_string());
            subscriptions.insert(id.to_string(), filters);
            replies
        }
        Some("CLOSE") => {
            if let Some(id) = parts.get(1).and_then(Value::as_str) {
                subscriptions.remove(id);
            }
            Vec::new()
        }
        _ => vec![json!(["NOTICE", "unknown command"]).to_string()],
    }
}
