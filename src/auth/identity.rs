use sha2::{Digest, Sha256};
use tracing::info;

use crate::models::{AuthRecord, Result, VaultError};
use crate::sync::RemoteStore;

/// Application-wide salt mixed into every passphrase verifier
const PASSPHRASE_SALT: &str = "textVault_salt_2024";

/// Minimum and maximum length of a normalized session id
const MIN_ID_LEN: usize = 3;
const MAX_ID_LEN: usize = 50;

/// Canonical identity of a joined session
///
/// Immutable once established; discarded together with the in-memory tab
/// collection on logout or session switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    session_id: String,
    verifier: String,
}

impl SessionIdentity {
    pub(crate) fn from_parts(session_id: String, verifier: String) -> Self {
        Self {
            session_id,
            verifier,
        }
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// Stable, collision-resistant key for the local durability cache
    ///
    /// Mixes the verifier into the key so two sessions can never share a
    /// cache entry even if an id is reclaimed with a different passphrase.
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.session_id.as_bytes());
        hasher.update(b":");
        hasher.update(self.verifier.as_bytes());
        hex_encode(&hasher.finalize())
    }
}

/// Outcome of checking a verifier against the stored auth record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Match,
    Mismatch,
    NotFound,
}

/// Normalize a raw session id to its canonical form
///
/// Lowercases, strips everything outside `[a-z0-9_-]` and truncates to 50
/// characters. Fails with `InvalidIdentity` when fewer than 3 characters
/// survive.
pub fn normalize(raw_id: &str) -> Result<String> {
    let normalized: String = raw_id
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_')
        .take(MAX_ID_LEN)
        .collect();

    if normalized.len() < MIN_ID_LEN {
        return Err(VaultError::InvalidIdentity(format!(
            "session id must be at least {} characters of letters, numbers, hyphens or underscores",
            MIN_ID_LEN
        )));
    }

    Ok(normalized)
}

/// Derive the opaque verifier from a raw passphrase
///
/// One-way and deterministic: hex SHA-256 over the passphrase plus the fixed
/// application salt.
pub fn derive_secret(raw_passphrase: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_passphrase.as_bytes());
    hasher.update(PASSPHRASE_SALT.as_bytes());
    hex_encode(&hasher.finalize())
}

/// Check a verifier against the auth record stored for a session
pub async fn verify(
    store: &dyn RemoteStore,
    session_id: &str,
    verifier: &str,
) -> Result<VerifyOutcome> {
    match store.fetch_auth(session_id).await? {
        Some(record) if record.password_hash == verifier => Ok(VerifyOutcome::Match),
        Some(_) => Ok(VerifyOutcome::Mismatch),
        None => Ok(VerifyOutcome::NotFound),
    }
}

/// Establish a session identity against the remote store
///
/// Creates the auth record when the session id is unclaimed, otherwise
/// verifies the passphrase and bumps the access counters.
///
/// # Returns
/// The established identity and whether the session was newly created.
pub async fn authenticate(
    store: &dyn RemoteStore,
    raw_id: &str,
    raw_passphrase: &str,
) -> Result<(SessionIdentity, bool)> {
    let session_id = normalize(raw_id)?;
    let verifier = derive_secret(raw_passphrase);

    let is_new = match store.fetch_auth(&session_id).await? {
        Some(mut record) => {
            if record.password_hash != verifier {
                return Err(VaultError::PasswordMismatch(session_id));
            }
            record.touch();
            store.put_auth(&session_id, &record).await?;
            false
        }
        None => {
            let record = AuthRecord::new(verifier.clone());
            store.put_auth(&session_id, &record).await?;
            true
        }
    };

    if is_new {
        info!("Created new session '{}'", session_id);
    } else {
        info!("Authenticated into existing session '{}'", session_id);
    }

    Ok((
        SessionIdentity {
            session_id,
            verifier,
        },
        is_new,
    ))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
