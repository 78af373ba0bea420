use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::auth::SessionIdentity;
use crate::cache::DurabilityCache;
use crate::models::Result;
use crate::sync::engine::SessionState;
use crate::sync::store::RemoteStore;

/// Debounced write scheduler
///
/// Coalesces rapid local mutations into a single delayed write: each edit
/// replaces the one pending timer task, so absent further edits exactly one
/// full write reaches the remote store and the durability cache, no sooner
/// than the quiet interval after the last edit.
pub struct WriteScheduler {
    state: Arc<Mutex<SessionState>>,
    store: Arc<dyn RemoteStore>,
    cache: DurabilityCache,
    identity: Arc<RwLock<SessionIdentity>>,
    quiet: Duration,
    /// At most one outstanding scheduled write at any instant
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl WriteScheduler {
    pub fn new(
        state: Arc<Mutex<SessionState>>,
        store: Arc<dyn RemoteStore>,
        cache: DurabilityCache,
        identity: Arc<RwLock<SessionIdentity>>,
        quiet: Duration,
    ) -> Self {
        Self {
            state,
            store,
            cache,
            identity,
            quiet,
            pending: Mutex::new(None),
        }
    }

    /// Cancel any pending write and arm a fresh quiet-interval timer
    pub async fn notify_edit(&self) {
        let mut pending = self.pending.lock().await;
        if let Some(task) = pending.take() {
            task.abort();
        }

        let state = self.state.clone();
        let store = self.store.clone();
        let cache = self.cache.clone();
        let identity = self.identity.clone();

        // Anchor the deadline at the edit, not at the task's first poll
        let sleep = tokio::time::sleep(self.quiet);
        *pending = Some(tokio::spawn(async move {
            sleep.await;
            if let Err(e) = flush(&state, store.as_ref(), &cache, &identity).await {
                warn!("Scheduled write failed, will retry on next edit: {}", e);
            }
        }));
    }

    /// Cancel the pending write without flushing
    ///
    /// Part of session teardown; a cancelled write leaves the dirty flag as
    /// it was.
    pub async fn cancel(&self) {
        if let Some(task) = self.pending.lock().await.take() {
            task.abort();
        }
    }

    /// Flush immediately, bypassing the quiet interval
    ///
    /// Used by the explicit save action. Cancels the pending timer first so
    /// the same content is not written twice.
    pub async fn flush_now(&self) -> Result<()> {
        self.cancel().await;
        flush(&self.state, self.store.as_ref(), &self.cache, &self.identity).await
    }
}

/// Write the current tab collection through to cache and remote
///
/// The cache write is unconditional. The dirty flag is cleared only when no
/// newer edit arrived while the remote write was in flight, guarded by the
/// edit-generation counter captured before the await.
async fn flush(
    state: &Arc<Mutex<SessionState>>,
    store: &dyn RemoteStore,
    cache: &DurabilityCache,
    identity: &Arc<RwLock<SessionIdentity>>,
) -> Result<()> {
    let (tabs, generation) = {
        let s = state.lock().await;
        (s.tabs.clone(), s.edit_generation)
    };
    let identity = identity.read().await.clone();

    if let Err(e) = cache.store(&identity, &tabs) {
        warn!("Durability cache write failed for '{}': {}", identity.id(), e);
    }

    match store.write(identity.id(), &tabs).await {
        Ok(()) => {
            let mut s = state.lock().await;
            if s.edit_generation == generation {
                s.dirty = false;
                debug!(
                    "Wrote {} tab(s) for session '{}'",
                    tabs.len(),
                    identity.id()
                );
            } else {
                // A newer edit landed mid-write; its own timer is already
                // armed, so leave the dirty flag set for it
                debug!(
                    "Write for session '{}' superseded by a newer edit",
                    identity.id()
                );
            }
            Ok(())
        }
        Err(e) => {
            warn!(
                "Remote write failed for '{}', cache copy retained: {}",
                identity.id(),
                e
            );
            Err(e)
        }
    }
}
