use std::panic;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use textvault_sync::config::Config;
use textvault_sync::sync::{MemoryStore, RealtimeClient, RemoteStore};
use textvault_sync::Vault;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "textvault_sync=debug,info".into()
        }))
        .init();

    info!("Starting sync client...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    // Connect to the realtime store, falling back to an in-process store
    // when it is unreachable
    let store: Arc<dyn RemoteStore> = match RealtimeClient::connect(&config.store_url).await {
        Ok(client) => {
            info!("📡 Realtime store connected at {}", config.store_url);
            Arc::new(client)
        }
        Err(e) => {
            warn!("Realtime store unreachable ({}), running offline", e);
            Arc::new(MemoryStore::new())
        }
    };

    let mut vault = Vault::new(store, config.cache_dir.clone(), config.debounce_interval());

    // Rejoin the remembered session or log in with configured credentials
    let restored = match vault.restore_remembered().await {
        Ok(restored) => restored,
        Err(e) => {
            warn!("Could not restore remembered session: {}", e);
            false
        }
    };

    if restored {
        info!("🔐 Restored remembered session");
    } else {
        match (&config.session_id, &config.session_passphrase) {
            (Some(id), Some(passphrase)) => match vault.login(id, passphrase, true).await {
                Ok(true) => info!("🔐 Created new session"),
                Ok(false) => info!("🔐 Joined existing session"),
                Err(e) => {
                    error!("Login failed: {}", e);
                    return;
                }
            },
            _ => {
                error!(
                    "No remembered session and no credentials configured \
                     (set SESSION_ID and SESSION_PASSPHRASE)"
                );
                return;
            }
        }
    }

    if let Ok(stats) = vault.stats().await {
        info!(
            "Session '{}' holds {} tab(s), access count {}",
            stats.session_id, stats.tab_count, stats.access_count
        );
    }

    info!("Sync client running, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    // Flush any pending edit before tearing the session down
    if let Err(e) = vault.save_now().await {
        warn!("Final save failed, cache copy retained: {}", e);
    }
    vault.shutdown().await;
    info!("Shutdown complete");
}
