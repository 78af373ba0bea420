use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn};
use uuid::Uuid;

use async_trait::async_trait;

use crate::models::{AuthRecord, Result, TabCollection, VaultError};
use crate::sync::store::{auth_path, tabs_path, RemoteStore};

const FEED_CAPACITY: usize = 16;
const OUTBOUND_CAPACITY: usize = 64;

/// Message sent to the realtime store
#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
enum ClientMessage {
    #[serde(rename = "subscribe")]
    Subscribe { path: String },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { path: String },
    #[serde(rename = "put")]
    Put {
        #[serde(rename = "requestId")]
        request_id: String,
        path: String,
        value: serde_json::Value,
    },
    #[serde(rename = "get")]
    Get {
        #[serde(rename = "requestId")]
        request_id: String,
        path: String,
    },
}

/// Message received from the realtime store
#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
enum ServerMessage {
    /// Full value under a subscribed path; `None` when the path is empty
    #[serde(rename = "snapshot")]
    Snapshot {
        path: String,
        value: Option<serde_json::Value>,
    },
    #[serde(rename = "ack")]
    Ack {
        #[serde(rename = "requestId")]
        request_id: String,
        ok: bool,
        error: Option<String>,
    },
    #[serde(rename = "value")]
    Value {
        #[serde(rename = "requestId")]
        request_id: String,
        value: Option<serde_json::Value>,
    },
}

#[derive(Debug)]
enum Reply {
    Ack { ok: bool, error: Option<String> },
    Value(Option<serde_json::Value>),
}

/// Routes inbound server messages to snapshot feeds and pending requests
#[derive(Default)]
struct Router {
    feeds: Mutex<HashMap<String, mpsc::Sender<TabCollection>>>,
    pending: Mutex<HashMap<String, oneshot::Sender<Reply>>>,
}

impl Router {
    async fn route(&self, msg: ServerMessage) {
        match msg {
            ServerMessage::Snapshot { path, value } => {
                let snapshot = match value {
                    None => TabCollection::new(),
                    Some(value) => match serde_json::from_value(value) {
                        Ok(tabs) => tabs,
                        Err(e) => {
                            warn!("Unreadable snapshot for '{}': {}", path, e);
                            return;
                        }
                    },
                };
                let feeds = self.feeds.lock().await;
                if let Some(tx) = feeds.get(&path) {
                    if tx.try_send(snapshot).is_err() {
                        warn!("Snapshot feed for '{}' is full or closed", path);
                    }
                }
            }
            ServerMessage::Ack {
                request_id,
                ok,
                error,
            } => {
                if let Some(tx) = self.pending.lock().await.remove(&request_id) {
                    let _ = tx.send(Reply::Ack { ok, error });
                }
            }
            ServerMessage::Value { request_id, value } => {
                if let Some(tx) = self.pending.lock().await.remove(&request_id) {
                    let _ = tx.send(Reply::Value(value));
                }
            }
        }
    }
}

/// WebSocket client for the namespaced realtime key-value store
///
/// One connection per client; a writer task owns the sink and a reader task
/// dispatches snapshots and request replies. The concrete wire shape is the
/// store's contract; this client only assumes subscribe/put semantics over
/// namespaced paths.
pub struct RealtimeClient {
    outbound: mpsc::Sender<Message>,
    router: Arc<Router>,
}

impl RealtimeClient {
    /// Connect to the realtime store at the given WebSocket URL
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| VaultError::Remote(format!("connect to '{}' failed: {}", url, e)))?;
        info!("Connected to realtime store at {}", url);

        let (mut sink, mut stream) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);

        // Writer task owns the sink
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    error!("Realtime send failed: {}", e);
                    break;
                }
            }
        });

        let router = Arc::new(Router::default());
        let reader_router = router.clone();
        tokio::spawn(async move {
            while let Some(Ok(msg)) = stream.next().await {
                if let Message::Text(txt) = msg {
                    match serde_json::from_str::<ServerMessage>(txt.as_str()) {
                        Ok(server_msg) => reader_router.route(server_msg).await,
                        Err(e) => warn!("Unparseable message from realtime store: {}", e),
                    }
                }
            }
            info!("Realtime connection closed");
        });

        Ok(Self { outbound, router })
    }

    async fn send(&self, msg: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(msg)?;
        self.outbound
            .send(Message::text(json))
            .await
            .map_err(|_| VaultError::Remote("realtime connection closed".to_string()))
    }

    /// Send a request and wait for its reply
    async fn request(&self, request_id: String, msg: ClientMessage) -> Result<Reply> {
        let (tx, rx) = oneshot::channel();
        self.router
            .pending
            .lock()
            .await
            .insert(request_id.clone(), tx);

        if let Err(e) = self.send(&msg).await {
            self.router.pending.lock().await.remove(&request_id);
            return Err(e);
        }

        rx.await
            .map_err(|_| VaultError::Remote("connection closed before reply".to_string()))
    }
}

#[async_trait]
impl RemoteStore for RealtimeClient {
    async fn subscribe(&self, session_id: &str) -> Result<mpsc::Receiver<TabCollection>> {
        let path = tabs_path(session_id);
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        self.router.feeds.lock().await.insert(path.clone(), tx);

        if let Err(e) = self.send(&ClientMessage::Subscribe { path: path.clone() }).await {
            self.router.feeds.lock().await.remove(&path);
            return Err(VaultError::RemoteSubscribeFailed(e.to_string()));
        }
        Ok(rx)
    }

    async fn write(&self, session_id: &str, tabs: &TabCollection) -> Result<()> {
        let request_id = Uuid::new_v4().to_string();
        let msg = ClientMessage::Put {
            request_id: request_id.clone(),
            path: tabs_path(session_id),
            value: serde_json::to_value(tabs)?,
        };

        match self.request(request_id, msg).await {
            Ok(Reply::Ack { ok: true, .. }) => Ok(()),
            Ok(Reply::Ack { error, .. }) => Err(VaultError::RemoteWriteFailed(
                error.unwrap_or_else(|| "rejected by store".to_string()),
            )),
            Ok(Reply::Value(_)) => Err(VaultError::RemoteWriteFailed(
                "unexpected reply to put".to_string(),
            )),
            Err(e) => Err(VaultError::RemoteWriteFailed(e.to_string())),
        }
    }

    async fn unsubscribe(&self, session_id: &str) {
        let path = tabs_path(session_id);
        self.router.feeds.lock().await.remove(&path);
        if let Err(e) = self.send(&ClientMessage::Unsubscribe { path }).await {
            warn!("Unsubscribe for '{}' not delivered: {}", session_id, e);
        }
    }

    async fn fetch_auth(&self, session_id: &str) -> Result<Option<AuthRecord>> {
        let request_id = Uuid::new_v4().to_string();
        let msg = ClientMessage::Get {
            request_id: request_id.clone(),
            path: auth_path(session_id),
        };

        match self.request(request_id, msg).await? {
            Reply::Value(None) => Ok(None),
            Reply::Value(Some(value)) => Ok(Some(serde_json::from_value(value)?)),
            Reply::Ack { .. } => Err(VaultError::Remote(
                "unexpected reply to get".to_string(),
            )),
        }
    }

    async fn put_auth(&self, session_id: &str, record: &AuthRecord) -> Result<()> {
        let request_id = Uuid::new_v4().to_string();
        let msg = ClientMessage::Put {
            request_id: request_id.clone(),
            path: auth_path(session_id),
            value: serde_json::to_value(record)?,
        };

        match self.request(request_id, msg).await? {
            Reply::Ack { ok: true, .. } => Ok(()),
            Reply::Ack { error, .. } => Err(VaultError::Remote(
                error.unwrap_or_else(|| "auth write rejected".to_string()),
            )),
            Reply::Value(_) => Err(VaultError::Remote(
                "unexpected reply to put".to_string(),
            )),
        }
    }
}
