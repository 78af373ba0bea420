use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::models::{AuthRecord, Result, TabCollection};

/// Namespace path for a session's tab collection
pub fn tabs_path(session_id: &str) -> String {
    format!("sessions/{}/tabs", session_id)
}

/// Namespace path for a session's auth record
pub fn auth_path(session_id: &str) -> String {
    format!("sessions/{}/auth", session_id)
}

/// Contract of the external realtime key-value store
///
/// Each session maps to a namespace derived from its canonical id; the auth
/// record under the same namespace already encodes the secret, so the path
/// carries the id alone.
///
/// Snapshots are delivered at-least-once and their order is not guaranteed
/// relative to local writes: a stale snapshot may arrive after a local write
/// races it. The merge engine is responsible for not letting such a snapshot
/// clobber in-flight edits.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Open a continuous change feed for a session's tab collection
    ///
    /// The full collection is delivered on every remote change, starting
    /// with the current state (empty when the session holds no data yet).
    async fn subscribe(&self, session_id: &str) -> Result<mpsc::Receiver<TabCollection>>;

    /// Replace the entire remote tab collection
    ///
    /// Whole-collection replace, not a patch. Carries no timeout of its own;
    /// failures surface as `RemoteWriteFailed`.
    async fn write(&self, session_id: &str, tabs: &TabCollection) -> Result<()>;

    /// Stop snapshot delivery for a session
    ///
    /// Must run before switching sessions so a stale subscription cannot
    /// mutate the next session's state.
    async fn unsubscribe(&self, session_id: &str);

    /// Fetch the auth record for a session, if one exists
    async fn fetch_auth(&self, session_id: &str) -> Result<Option<AuthRecord>>;

    /// Create or replace the auth record for a session
    async fn put_auth(&self, session_id: &str, record: &AuthRecord) -> Result<()>;
}
