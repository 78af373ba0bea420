use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Auth record stored under a session's auth namespace
///
/// Created when a session id is claimed for the first time; subsequent
/// logins verify against `password_hash` and bump the access counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthRecord {
    pub password_hash: String,
    pub created: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub access_count: u64,
    /// Absent until the passphrase is changed for the first time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_changed: Option<DateTime<Utc>>,
}

impl AuthRecord {
    /// Fresh record for a newly claimed session
    pub fn new(password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            password_hash,
            created: now,
            last_access: now,
            access_count: 1,
            password_changed: None,
        }
    }

    /// Record another successful login
    pub fn touch(&mut self) {
        self.last_access = Utc::now();
        self.access_count += 1;
    }
}
