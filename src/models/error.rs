use thiserror::Error;

pub type Result<T> = std::result::Result<T, VaultError>;

/// Error taxonomy for the vault
///
/// All variants are recoverable at the session level; none are fatal to the
/// process. `RemoteWriteFailed` leaves the dirty flag set so a future edit
/// retries; `RemoteSubscribeFailed` degrades the session to cache-only mode.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("invalid session id: {0}")]
    InvalidIdentity(String),

    #[error("no session established")]
    NotAuthenticated,

    #[error("wrong passphrase for session '{0}'")]
    PasswordMismatch(String),

    #[error("remote write failed: {0}")]
    RemoteWriteFailed(String),

    #[error("remote subscribe failed: {0}")]
    RemoteSubscribeFailed(String),

    #[error("remote store error: {0}")]
    Remote(String),

    #[error("no such tab: {0}")]
    UnknownTab(String),

    #[error("cache error: {0}")]
    Cache(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
