use tracing::debug;

use crate::models::{first_tab_id, TabCollection};

/// Process-local state of the active session
///
/// Owned exclusively by the merge engine; read and modified only between
/// suspension points of the single-threaded execution context, so the dirty
/// flag and generation counter need no further synchronization.
#[derive(Debug, Default)]
pub struct SessionState {
    pub tabs: TabCollection,
    pub active_tab: Option<String>,
    /// True while a local edit has not been confirmed written remotely
    pub dirty: bool,
    /// Bumped on every local edit; the write path compares it before and
    /// after the asynchronous write to decide whether to clear `dirty`
    pub edit_generation: u64,
}

impl SessionState {
    /// Mark a local mutation that has not reached the remote store yet
    pub fn record_edit(&mut self) {
        self.dirty = true;
        self.edit_generation += 1;
    }

    /// Re-select an active tab after the collection changed
    ///
    /// Keeps the current selection when it still exists, otherwise picks an
    /// arbitrary tab; an empty collection leaves nothing active.
    pub fn fix_active_tab(&mut self) {
        if let Some(id) = &self.active_tab {
            if !self.tabs.contains_key(id) {
                self.active_tab = None;
            }
        }
        if self.active_tab.is_none() {
            self.active_tab = first_tab_id(&self.tabs);
        }
    }
}

/// What the merge engine decided to do with a remote snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Clean local state, remote adopted wholesale
    AdoptedRemote,
    /// Dirty local state, active tab kept over the remote copy
    PreservedActiveTab,
    /// Remote empty, collection seeded from the durability cache; the
    /// caller must schedule a write-through so the remote converges
    SeededFromCache,
    /// Neither remote nor cached data; first tab is created lazily on the
    /// first keystroke
    Empty,
}

/// Reconcile an incoming remote snapshot against the local state
///
/// `cached` is the durability-cache copy for this session and is only
/// consulted when the remote snapshot is empty.
///
/// While dirty, every remote entry is taken except the currently active tab,
/// which keeps its local in-memory version. Concurrent remote edits to
/// *other* tabs made during the same window are dropped with the rest of the
/// local copy; the merge is last-writer-biased, not a per-tab reconciliation.
pub fn merge_snapshot(
    state: &mut SessionState,
    remote: TabCollection,
    cached: Option<TabCollection>,
) -> MergeOutcome {
    let outcome = if state.dirty {
        let mut merged = remote;
        if let Some(active_id) = &state.active_tab {
            if let Some(local) = state.tabs.get(active_id) {
                merged.insert(active_id.clone(), local.clone());
            }
        }
        state.tabs = merged;
        MergeOutcome::PreservedActiveTab
    } else if remote.is_empty() {
        match cached {
            Some(tabs) if !tabs.is_empty() => {
                state.tabs = tabs;
                MergeOutcome::SeededFromCache
            }
            _ => {
                state.tabs = TabCollection::new();
                MergeOutcome::Empty
            }
        }
    } else {
        state.tabs = remote;
        MergeOutcome::AdoptedRemote
    };

    state.fix_active_tab();
    debug!(
        "Merged remote snapshot: {:?}, {} tab(s), active {:?}",
        outcome,
        state.tabs.len(),
        state.active_tab
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tab;

    fn tab(id: &str, title: &str, text: &str) -> Tab {
        let mut t = Tab::new(title);
        t.id = id.to_string();
        t.text = text.to_string();
        t
    }

    fn collection(tabs: &[Tab]) -> TabCollection {
        tabs.iter().map(|t| (t.id.clone(), t.clone())).collect()
    }

    #[test]
    fn clean_state_adopts_remote_wholesale() {
        let mut state = SessionState::default();
        state.tabs = collection(&[tab("t1", "A", "stale")]);
        state.active_tab = Some("t1".to_string());

        let remote = collection(&[tab("t1", "A", "fresh"), tab("t2", "B", "")]);
        let outcome = merge_snapshot(&mut state, remote.clone(), None);

        assert_eq!(outcome, MergeOutcome::AdoptedRemote);
        assert_eq!(state.tabs, remote);
        assert_eq!(state.active_tab.as_deref(), Some("t1"));
    }

    #[test]
    fn dirty_state_preserves_the_active_tab() {
        let mut state = SessionState::default();
        state.tabs = collection(&[tab("t1", "A", "new")]);
        state.active_tab = Some("t1".to_string());
        state.record_edit();

        let remote = collection(&[tab("t1", "A", "old")]);
        let outcome = merge_snapshot(&mut state, remote, None);

        assert_eq!(outcome, MergeOutcome::PreservedActiveTab);
        assert_eq!(state.tabs["t1"].text, "new");
        assert_eq!(state.tabs["t1"].title, "A");
    }

    #[test]
    fn dirty_merge_takes_remote_entries_for_other_tabs() {
        let mut state = SessionState::default();
        state.tabs = collection(&[tab("t1", "A", "typing"), tab("t2", "B", "local-b")]);
        state.active_tab = Some("t1".to_string());
        state.record_edit();

        let remote = collection(&[tab("t1", "A", "old"), tab("t2", "B", "remote-b")]);
        merge_snapshot(&mut state, remote, None);

        assert_eq!(state.tabs["t1"].text, "typing");
        // Non-active local edits lose to the remote copy (documented policy)
        assert_eq!(state.tabs["t2"].text, "remote-b");
    }

    #[test]
    fn empty_remote_seeds_from_cache() {
        let mut state = SessionState::default();
        let cached = collection(&[tab("t1", "A", "from cache")]);

        let outcome = merge_snapshot(&mut state, TabCollection::new(), Some(cached.clone()));

        assert_eq!(outcome, MergeOutcome::SeededFromCache);
        assert_eq!(state.tabs, cached);
        assert_eq!(state.active_tab.as_deref(), Some("t1"));
    }

    #[test]
    fn no_remote_and_no_cache_yields_empty_state() {
        let mut state = SessionState::default();
        let outcome = merge_snapshot(&mut state, TabCollection::new(), None);

        assert_eq!(outcome, MergeOutcome::Empty);
        assert!(state.tabs.is_empty());
        assert!(state.active_tab.is_none());
    }

    #[test]
    fn active_tab_deleted_remotely_falls_back_to_another() {
        let mut state = SessionState::default();
        state.tabs = collection(&[tab("t1", "A", ""), tab("t2", "B", "")]);
        state.active_tab = Some("t1".to_string());

        let remote = collection(&[tab("t2", "B", "")]);
        merge_snapshot(&mut state, remote, None);

        assert_eq!(state.active_tab.as_deref(), Some("t2"));
    }
}
