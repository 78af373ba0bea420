use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::auth::SessionIdentity;
use crate::models::Result;

/// How long a remembered session stays valid
const REMEMBER_DAYS: i64 = 7;

const REMEMBER_FILE: &str = "remembered.json";

/// Remembered session stored beside the durability cache
///
/// Lets a client rejoin its last session without re-entering credentials.
/// The verifier is already one-way hashed; the raw passphrase is never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RememberedSession {
    session_id: String,
    password_hash: String,
    expiry: DateTime<Utc>,
}

fn remember_path(dir: &Path) -> PathBuf {
    dir.join(REMEMBER_FILE)
}

/// Persist the identity so `restore` can re-establish it later
pub fn remember(dir: &Path, identity: &SessionIdentity) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let record = RememberedSession {
        session_id: identity.id().to_string(),
        password_hash: identity.verifier().to_string(),
        expiry: Utc::now() + Duration::days(REMEMBER_DAYS),
    };
    let json = serde_json::to_string(&record)?;
    std::fs::write(remember_path(dir), json)?;
    info!("Remembered session '{}'", identity.id());
    Ok(())
}

/// Restore a previously remembered identity
///
/// Returns `None` when nothing was remembered, the record is unreadable, or
/// it has expired; an expired or corrupt record is removed.
pub fn restore(dir: &Path) -> Option<SessionIdentity> {
    let path = remember_path(dir);
    let raw = std::fs::read_to_string(&path).ok()?;

    let record: RememberedSession = match serde_json::from_str(&raw) {
        Ok(record) => record,
        Err(e) => {
            warn!("Discarding unreadable remembered session: {}", e);
            let _ = std::fs::remove_file(&path);
            return None;
        }
    };

    if record.expiry <= Utc::now() {
        info!("Remembered session '{}' expired", record.session_id);
        let _ = std::fs::remove_file(&path);
        return None;
    }

    Some(SessionIdentity::from_parts(
        record.session_id,
        record.password_hash,
    ))
}

/// Forget any remembered session
pub fn forget(dir: &Path) {
    let _ = std::fs::remove_file(remember_path(dir));
}
