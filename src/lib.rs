pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod session;
pub mod sync;

pub use models::{AuthRecord, Result, Tab, TabCollection, VaultError};
pub use session::Vault;
