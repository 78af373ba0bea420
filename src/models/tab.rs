use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One titled text document within a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: String,
    pub title: String,
    pub text: String,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl Tab {
    /// Create a new empty tab with a fresh id
    pub fn new(title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            text: String::new(),
            created: now,
            last_modified: now,
        }
    }
}

/// The full synchronized state for one session
///
/// Maps tab id to tab. Insertion order is irrelevant; the remote store
/// replaces the whole collection on every write.
pub type TabCollection = HashMap<String, Tab>;

/// Pick an arbitrary tab id from a collection, if any
///
/// Used after a merge when no tab is active but the collection is non-empty.
pub fn first_tab_id(tabs: &TabCollection) -> Option<String> {
    tabs.keys().next().cloned()
}
