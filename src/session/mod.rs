use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::{self, remembered, SessionIdentity, VerifyOutcome};
use crate::cache::DurabilityCache;
use crate::models::{Result, Tab, TabCollection, VaultError};
use crate::sync::{
    merge_snapshot, MergeOutcome, RemoteStore, SessionState, WriteScheduler,
};

/// Rendered view of the current session state
#[derive(Debug, Clone)]
pub struct VaultView {
    pub tabs: TabCollection,
    pub active_tab: Option<String>,
    pub dirty: bool,
}

/// Session statistics, assembled from the auth record and local state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub session_id: String,
    pub created: Option<DateTime<Utc>>,
    pub last_access: Option<DateTime<Utc>>,
    pub access_count: u64,
    pub tab_count: usize,
}

/// One joined session: identity, tab collection, scheduler and the
/// subscription pump
///
/// Owns every piece of per-session state so that a session switch is a clean
/// teardown: unsubscribe, cancel the pending write, drop the state. Nothing
/// survives into the next session.
pub struct VaultSession {
    identity: Arc<RwLock<SessionIdentity>>,
    state: Arc<Mutex<SessionState>>,
    store: Arc<dyn RemoteStore>,
    cache: DurabilityCache,
    scheduler: Arc<WriteScheduler>,
    pump: Option<JoinHandle<()>>,
    cache_only: bool,
}

impl VaultSession {
    /// Open a session for an established identity
    ///
    /// Subscribes to the remote change feed; when the subscription fails the
    /// session degrades to cache-only mode, serving and persisting tabs
    /// locally until a future reconnect.
    pub async fn open(
        identity: SessionIdentity,
        store: Arc<dyn RemoteStore>,
        cache: DurabilityCache,
        quiet: Duration,
    ) -> Result<Self> {
        let session_id = identity.id().to_string();
        let identity = Arc::new(RwLock::new(identity));
        let state = Arc::new(Mutex::new(SessionState::default()));
        let scheduler = Arc::new(WriteScheduler::new(
            state.clone(),
            store.clone(),
            cache.clone(),
            identity.clone(),
            quiet,
        ));

        let (pump, cache_only) = match store.subscribe(&session_id).await {
            Ok(mut feed) => {
                let pump_state = state.clone();
                let pump_cache = cache.clone();
                let pump_identity = identity.clone();
                let pump_scheduler = scheduler.clone();
                let pump_session = session_id.clone();
                let handle = tokio::spawn(async move {
                    let mut initial = true;
                    while let Some(snapshot) = feed.recv().await {
                        apply_remote(
                            &pump_state,
                            &pump_cache,
                            &pump_identity,
                            &pump_scheduler,
                            snapshot,
                            initial,
                        )
                        .await;
                        initial = false;
                    }
                    debug!("Snapshot feed ended for session '{}'", pump_session);
                });
                (Some(handle), false)
            }
            Err(e) => {
                warn!(
                    "Subscribe failed for '{}', degrading to cache-only mode: {}",
                    session_id, e
                );
                let id = identity.read().await.clone();
                let mut s = state.lock().await;
                match cache.load(&id) {
                    Ok(Some(tabs)) => {
                        s.tabs = tabs;
                        s.fix_active_tab();
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Cache load failed for '{}': {}", session_id, e),
                }
                drop(s);
                (None, true)
            }
        };

        info!(
            "Opened session '{}'{}",
            session_id,
            if cache_only { " (cache-only)" } else { "" }
        );

        Ok(Self {
            identity,
            state,
            store,
            cache,
            scheduler,
            pump,
            cache_only,
        })
    }

    pub async fn session_id(&self) -> String {
        self.identity.read().await.id().to_string()
    }

    /// True when the session runs without a remote subscription
    pub fn is_cache_only(&self) -> bool {
        self.cache_only
    }

    /// Replace the text of the active tab
    ///
    /// The first keystroke into an empty session creates the first tab
    /// lazily.
    pub async fn edit_active_tab(&self, text: &str) -> Result<()> {
        {
            let mut s = self.state.lock().await;
            let id = match &s.active_tab {
                Some(id) => id.clone(),
                None => {
                    let tab = Tab::new("Tab 1");
                    let id = tab.id.clone();
                    s.tabs.insert(id.clone(), tab);
                    s.active_tab = Some(id.clone());
                    id
                }
            };
            if let Some(tab) = s.tabs.get_mut(&id) {
                tab.text = text.to_string();
                tab.last_modified = Utc::now();
            }
            s.record_edit();
        }
        self.scheduler.notify_edit().await;
        Ok(())
    }

    /// Rename the active tab
    pub async fn rename_active_tab(&self, title: &str) -> Result<()> {
        {
            let mut s = self.state.lock().await;
            let id = s
                .active_tab
                .clone()
                .ok_or_else(|| VaultError::UnknownTab("no active tab".to_string()))?;
            if let Some(tab) = s.tabs.get_mut(&id) {
                tab.title = title.to_string();
                tab.last_modified = Utc::now();
            }
            s.record_edit();
        }
        self.scheduler.notify_edit().await;
        Ok(())
    }

    /// Create a new tab and make it active
    pub async fn create_tab(&self, title: &str) -> Result<String> {
        let id = {
            let mut s = self.state.lock().await;
            let tab = Tab::new(title);
            let id = tab.id.clone();
            s.tabs.insert(id.clone(), tab);
            s.active_tab = Some(id.clone());
            s.record_edit();
            id
        };
        self.scheduler.notify_edit().await;
        Ok(id)
    }

    /// Make another tab the active one
    ///
    /// Selection is local; it does not mark the session dirty.
    pub async fn select_tab(&self, tab_id: &str) -> Result<()> {
        let mut s = self.state.lock().await;
        if !s.tabs.contains_key(tab_id) {
            return Err(VaultError::UnknownTab(tab_id.to_string()));
        }
        s.active_tab = Some(tab_id.to_string());
        Ok(())
    }

    /// Delete a tab by explicit user action
    pub async fn delete_tab(&self, tab_id: &str) -> Result<()> {
        {
            let mut s = self.state.lock().await;
            if s.tabs.remove(tab_id).is_none() {
                return Err(VaultError::UnknownTab(tab_id.to_string()));
            }
            s.fix_active_tab();
            s.record_edit();
        }
        self.scheduler.notify_edit().await;
        Ok(())
    }

    /// Explicit save: write through immediately, skipping the quiet interval
    pub async fn save_now(&self) -> Result<()> {
        self.scheduler.flush_now().await
    }

    /// Current tabs, active tab and dirty flag for rendering
    pub async fn view(&self) -> VaultView {
        let s = self.state.lock().await;
        VaultView {
            tabs: s.tabs.clone(),
            active_tab: s.active_tab.clone(),
            dirty: s.dirty,
        }
    }

    /// Session statistics from the auth record plus local tab count
    pub async fn stats(&self) -> Result<SessionStats> {
        let session_id = self.session_id().await;
        let record = self.store.fetch_auth(&session_id).await?;
        let s = self.state.lock().await;
        Ok(SessionStats {
            session_id,
            created: record.as_ref().map(|r| r.created),
            last_access: record.as_ref().map(|r| r.last_access),
            access_count: record.map(|r| r.access_count).unwrap_or(0),
            tab_count: s.tabs.len(),
        })
    }

    /// Change the session passphrase
    ///
    /// Verifies the current passphrase against the stored auth record,
    /// replaces the hash, re-keys the durability cache entry and refreshes
    /// the remembered session if it points here.
    pub async fn change_passphrase(&self, current: &str, new: &str) -> Result<()> {
        let session_id = self.session_id().await;
        let current_hash = auth::derive_secret(current);
        let new_hash = auth::derive_secret(new);

        let mut record = self
            .store
            .fetch_auth(&session_id)
            .await?
            .ok_or_else(|| VaultError::Remote("auth record missing".to_string()))?;
        if record.password_hash != current_hash {
            return Err(VaultError::PasswordMismatch(session_id));
        }

        record.password_hash = new_hash.clone();
        record.password_changed = Some(Utc::now());
        self.store.put_auth(&session_id, &record).await?;

        let old_identity = self.identity.read().await.clone();
        let new_identity = SessionIdentity::from_parts(session_id.clone(), new_hash);

        // Re-key the cache entry so the new identity keeps its backup
        if let Some(tabs) = self.cache.load(&old_identity)? {
            self.cache.store(&new_identity, &tabs)?;
            self.cache.remove(&old_identity)?;
        }
        if remembered::restore(self.cache.dir()).is_some_and(|r| r.id() == session_id) {
            remembered::remember(self.cache.dir(), &new_identity)?;
        }

        *self.identity.write().await = new_identity;
        info!("Passphrase changed for session '{}'", session_id);
        Ok(())
    }

    /// Tear the session down
    ///
    /// Unsubscribes the change feed and cancels the pending write before the
    /// state is dropped, so no stale callback can write into a session
    /// opened afterwards.
    pub async fn close(mut self) {
        let session_id = self.session_id().await;
        self.scheduler.cancel().await;
        self.store.unsubscribe(&session_id).await;
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        info!("Closed session '{}'", session_id);
    }
}

/// Feed one remote snapshot through the merge engine
///
/// The durability cache is only consulted for the initial snapshot after
/// subscribing, when the remote side is empty and no local edit is pending;
/// a seed from the cache schedules a write-through so the remote converges
/// to it. Later empty snapshots mean the tabs were deleted remotely and are
/// adopted as-is.
async fn apply_remote(
    state: &Arc<Mutex<SessionState>>,
    cache: &DurabilityCache,
    identity: &Arc<RwLock<SessionIdentity>>,
    scheduler: &Arc<WriteScheduler>,
    snapshot: TabCollection,
    initial: bool,
) {
    let needs_write_through = {
        let mut s = state.lock().await;
        let cached = if initial && snapshot.is_empty() && !s.dirty {
            let id = identity.read().await.clone();
            match cache.load(&id) {
                Ok(cached) => cached,
                Err(e) => {
                    warn!("Cache load failed for '{}': {}", id.id(), e);
                    None
                }
            }
        } else {
            None
        };

        let outcome = merge_snapshot(&mut s, snapshot, cached);
        if outcome == MergeOutcome::SeededFromCache {
            // Cache content is newer than the (empty) remote; treat it like
            // a local edit so the scheduler pushes it out
            s.record_edit();
            true
        } else {
            false
        }
    };

    if needs_write_through {
        scheduler.notify_edit().await;
    }
}

/// The vault: at most one joined session at a time
///
/// Every operation requires an established session; without one it fails
/// with `NotAuthenticated`. Switching sessions tears the previous one down
/// completely before the next subscription is opened.
pub struct Vault {
    store: Arc<dyn RemoteStore>,
    cache: DurabilityCache,
    quiet: Duration,
    current: Option<VaultSession>,
}

impl Vault {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache_dir: impl Into<PathBuf>,
        quiet: Duration,
    ) -> Self {
        Self {
            store,
            cache: DurabilityCache::new(cache_dir),
            quiet,
            current: None,
        }
    }

    /// Join a session, creating it when the id is unclaimed
    ///
    /// # Returns
    /// Whether the session was newly created.
    pub async fn login(
        &mut self,
        raw_id: &str,
        passphrase: &str,
        remember: bool,
    ) -> Result<bool> {
        self.close_current().await;

        let (identity, is_new) =
            auth::authenticate(self.store.as_ref(), raw_id, passphrase).await?;
        if remember {
            remembered::remember(self.cache.dir(), &identity)?;
        }

        let session =
            VaultSession::open(identity, self.store.clone(), self.cache.clone(), self.quiet)
                .await?;
        self.current = Some(session);
        Ok(is_new)
    }

    /// Rejoin the remembered session, if one is stored and still valid
    pub async fn restore_remembered(&mut self) -> Result<bool> {
        let Some(identity) = remembered::restore(self.cache.dir()) else {
            return Ok(false);
        };

        match auth::verify(self.store.as_ref(), identity.id(), identity.verifier()).await {
            Ok(VerifyOutcome::Match) => {}
            Ok(_) => {
                // Session deleted or passphrase changed elsewhere
                remembered::forget(self.cache.dir());
                return Ok(false);
            }
            Err(e) => {
                warn!(
                    "Store unreachable, restoring remembered session offline: {}",
                    e
                );
            }
        }

        self.close_current().await;
        let session =
            VaultSession::open(identity, self.store.clone(), self.cache.clone(), self.quiet)
                .await?;
        self.current = Some(session);
        Ok(true)
    }

    /// Leave the current session and forget any remembered one
    pub async fn logout(&mut self) {
        remembered::forget(self.cache.dir());
        self.close_current().await;
    }

    /// Close the current session without forgetting a remembered one
    pub async fn shutdown(&mut self) {
        self.close_current().await;
    }

    async fn close_current(&mut self) {
        if let Some(session) = self.current.take() {
            session.close().await;
        }
    }

    /// The joined session, or `NotAuthenticated`
    pub fn session(&self) -> Result<&VaultSession> {
        self.current.as_ref().ok_or(VaultError::NotAuthenticated)
    }

    pub async fn edit_active_tab(&self, text: &str) -> Result<()> {
        self.session()?.edit_active_tab(text).await
    }

    pub async fn rename_active_tab(&self, title: &str) -> Result<()> {
        self.session()?.rename_active_tab(title).await
    }

    pub async fn create_tab(&self, title: &str) -> Result<String> {
        self.session()?.create_tab(title).await
    }

    pub async fn select_tab(&self, tab_id: &str) -> Result<()> {
        self.session()?.select_tab(tab_id).await
    }

    pub async fn delete_tab(&self, tab_id: &str) -> Result<()> {
        self.session()?.delete_tab(tab_id).await
    }

    pub async fn save_now(&self) -> Result<()> {
        self.session()?.save_now().await
    }

    pub async fn view(&self) -> Result<VaultView> {
        Ok(self.session()?.view().await)
    }

    pub async fn stats(&self) -> Result<SessionStats> {
        self.session()?.stats().await
    }

    pub async fn change_passphrase(&self, current: &str, new: &str) -> Result<()> {
        self.session()?.change_passphrase(current, new).await
    }
}
