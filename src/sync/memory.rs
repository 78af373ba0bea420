use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::models::{AuthRecord, Result, TabCollection, VaultError};
use crate::sync::store::RemoteStore;

/// Snapshot channel capacity per subscriber
const FEED_CAPACITY: usize = 16;

/// In-process realtime store
///
/// Backs tests and offline operation. Fans every write out to all live
/// subscribers of the session and delivers the current state immediately on
/// subscribe, the way the external store's change feed behaves.
#[derive(Default)]
pub struct MemoryStore {
    tabs: Mutex<HashMap<String, TabCollection>>,
    auth: Mutex<HashMap<String, AuthRecord>>,
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<TabCollection>>>>,
    fail_writes: AtomicBool,
    fail_subscribes: AtomicBool,
    write_count: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `write` calls fail, simulating a backend outage
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `subscribe` calls fail
    pub fn set_fail_subscribes(&self, fail: bool) {
        self.fail_subscribes.store(fail, Ordering::SeqCst);
    }

    /// Number of writes that reached the store
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }

    /// Current remote state for a session
    pub async fn tabs_for(&self, session_id: &str) -> TabCollection {
        self.tabs
            .lock()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn fan_out(&self, session_id: &str, snapshot: &TabCollection) {
        let mut subscribers = self.subscribers.lock().await;
        if let Some(senders) = subscribers.get_mut(session_id) {
            senders.retain(|tx| tx.try_send(snapshot.clone()).is_ok());
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn subscribe(&self, session_id: &str) -> Result<mpsc::Receiver<TabCollection>> {
        if self.fail_subscribes.load(Ordering::SeqCst) {
            return Err(VaultError::RemoteSubscribeFailed(
                "memory store offline".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel(FEED_CAPACITY);

        // Deliver the current state immediately, then register for changes
        let current = self.tabs_for(session_id).await;
        let _ = tx.try_send(current);

        self.subscribers
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(tx);

        debug!("Subscribed to session '{}'", session_id);
        Ok(rx)
    }

    async fn write(&self, session_id: &str, tabs: &TabCollection) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(VaultError::RemoteWriteFailed(
                "memory store offline".to_string(),
            ));
        }

        self.tabs
            .lock()
            .await
            .insert(session_id.to_string(), tabs.clone());
        self.write_count.fetch_add(1, Ordering::SeqCst);

        self.fan_out(session_id, tabs).await;
        Ok(())
    }

    async fn unsubscribe(&self, session_id: &str) {
        // Dropping the senders closes every subscriber's feed
        self.subscribers.lock().await.remove(session_id);
        debug!("Unsubscribed from session '{}'", session_id);
    }

    async fn fetch_auth(&self, session_id: &str) -> Result<Option<AuthRecord>> {
        Ok(self.auth.lock().await.get(session_id).cloned())
    }

    async fn put_auth(&self, session_id: &str, record: &AuthRecord) -> Result<()> {
        self.auth
            .lock()
            .await
            .insert(session_id.to_string(), record.clone());
        Ok(())
    }
}
