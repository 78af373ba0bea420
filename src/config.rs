use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// WebSocket URL of the realtime store
    #[serde(default = "default_store_url")]
    pub store_url: String,

    /// Directory for the local durability cache
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Quiet interval for the debounced write scheduler, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Session id for headless operation
    pub session_id: Option<String>,

    /// Passphrase for headless operation
    pub session_passphrase: Option<String>,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Quiet interval as a `Duration`
    pub fn debounce_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_url: default_store_url(),
            cache_dir: default_cache_dir(),
            debounce_ms: default_debounce_ms(),
            environment: default_environment(),
            log_level: default_log_level(),
            session_id: None,
            session_passphrase: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_store_url() -> String {
    "ws://127.0.0.1:9090/rt".to_string()
}

fn default_cache_dir() -> String {
    ".textvault-cache".to_string()
}

fn default_debounce_ms() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}
