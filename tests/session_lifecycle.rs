use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use textvault_sync::sync::{MemoryStore, RemoteStore};
use textvault_sync::{Vault, VaultError};

const QUIET_MS: u64 = 600;

fn vault_on(store: Arc<MemoryStore>, dir: &TempDir) -> Vault {
    Vault::new(
        store as Arc<dyn RemoteStore>,
        dir.path(),
        Duration::from_millis(QUIET_MS),
    )
}

async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

async fn past_quiet_interval() {
    tokio::time::advance(Duration::from_millis(QUIET_MS + 100)).await;
    settle().await;
}

#[tokio::test(start_paused = true)]
async fn malformed_session_ids_are_rejected() {
    let store = Arc::new(MemoryStore::new());
    let dir = TempDir::new().unwrap();
    let mut vault = vault_on(store, &dir);

    assert!(matches!(
        vault.login("a!", "pw", false).await,
        Err(VaultError::InvalidIdentity(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn wrong_passphrase_is_rejected_for_an_existing_session() {
    let store = Arc::new(MemoryStore::new());
    let dir = TempDir::new().unwrap();
    let mut vault = vault_on(store.clone(), &dir);

    assert!(vault.login("alpha-1", "right", false).await.unwrap());
    vault.logout().await;

    assert!(matches!(
        vault.login("alpha-1", "wrong", false).await,
        Err(VaultError::PasswordMismatch(_))
    ));

    // Rejoining with the right passphrase is not a new session
    assert!(!vault.login("alpha-1", "right", false).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn switching_sessions_cancels_the_old_pending_write() {
    let store = Arc::new(MemoryStore::new());
    let dir = TempDir::new().unwrap();
    let mut vault = vault_on(store.clone(), &dir);

    vault.login("alpha-1", "pw", false).await.unwrap();
    settle().await;
    vault.edit_active_tab("never lands").await.unwrap();

    // Switch away before the quiet interval elapses
    vault.login("beta-2", "pw", false).await.unwrap();
    settle().await;
    past_quiet_interval().await;

    assert!(store.tabs_for("alpha-1").await.is_empty());
    assert_eq!(store.write_count(), 0);

    // The new session starts from its own empty state
    let view = vault.view().await.unwrap();
    assert!(view.tabs.is_empty());
    assert!(view.active_tab.is_none());
}

#[tokio::test(start_paused = true)]
async fn stale_subscription_cannot_reach_the_new_session() {
    let store = Arc::new(MemoryStore::new());
    let dir = TempDir::new().unwrap();
    let mut vault = vault_on(store.clone(), &dir);

    vault.login("alpha-1", "pw", false).await.unwrap();
    settle().await;
    vault.login("beta-2", "pw", false).await.unwrap();
    settle().await;

    // A late write into the old session's namespace
    let mut tabs = textvault_sync::TabCollection::new();
    let tab = textvault_sync::Tab::new("ghost");
    tabs.insert(tab.id.clone(), tab);
    store.write("alpha-1", &tabs).await.unwrap();
    settle().await;

    assert!(vault.view().await.unwrap().tabs.is_empty());
}

#[tokio::test(start_paused = true)]
async fn remembered_session_survives_a_restart_until_logout() {
    let store = Arc::new(MemoryStore::new());
    let dir = TempDir::new().unwrap();

    let mut vault = vault_on(store.clone(), &dir);
    vault.login("alpha-1", "pw", true).await.unwrap();
    settle().await;
    vault.shutdown().await;

    // "Restart": a fresh vault over the same cache directory
    let mut vault = vault_on(store.clone(), &dir);
    assert!(vault.restore_remembered().await.unwrap());
    assert_eq!(vault.session().unwrap().session_id().await, "alpha-1");

    // Logout forgets the remembered session
    vault.logout().await;
    let mut vault = vault_on(store, &dir);
    assert!(!vault.restore_remembered().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn remembered_session_is_dropped_when_the_passphrase_changed_elsewhere() {
    let store = Arc::new(MemoryStore::new());
    let dir = TempDir::new().unwrap();

    let mut vault = vault_on(store.clone(), &dir);
    vault.login("alpha-1", "pw", true).await.unwrap();
    settle().await;
    vault.shutdown().await;

    // Another client changes the passphrase
    let other_dir = TempDir::new().unwrap();
    let mut other = vault_on(store.clone(), &other_dir);
    other.login("alpha-1", "pw", false).await.unwrap();
    other.change_passphrase("pw", "rotated").await.unwrap();
    other.shutdown().await;

    let mut vault = vault_on(store, &dir);
    assert!(!vault.restore_remembered().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn subscribe_failure_degrades_to_cache_only_mode() {
    let store = Arc::new(MemoryStore::new());
    let dir = TempDir::new().unwrap();

    // Populate the cache while the store is reachable
    let mut vault = vault_on(store.clone(), &dir);
    vault.login("alpha-1", "pw", false).await.unwrap();
    settle().await;
    vault.edit_active_tab("survives outages").await.unwrap();
    past_quiet_interval().await;
    vault.shutdown().await;

    // Store stops accepting subscriptions
    store.set_fail_subscribes(true);
    let mut vault = vault_on(store.clone(), &dir);
    vault.login("alpha-1", "pw", false).await.unwrap();

    let session = vault.session().unwrap();
    assert!(session.is_cache_only());
    let view = vault.view().await.unwrap();
    assert_eq!(view.tabs.len(), 1);
    assert_eq!(
        view.tabs[view.active_tab.as_ref().unwrap()].text,
        "survives outages"
    );
}

#[tokio::test(start_paused = true)]
async fn change_passphrase_rekeys_the_cache_and_auth_record() {
    let store = Arc::new(MemoryStore::new());
    let dir = TempDir::new().unwrap();

    let mut vault = vault_on(store.clone(), &dir);
    vault.login("alpha-1", "old-pw", false).await.unwrap();
    settle().await;
    vault.edit_active_tab("keep me").await.unwrap();
    past_quiet_interval().await;

    assert!(matches!(
        vault.change_passphrase("wrong", "new-pw").await,
        Err(VaultError::PasswordMismatch(_))
    ));
    let record = store.fetch_auth("alpha-1").await.unwrap().unwrap();
    assert!(record.password_changed.is_none());

    vault.change_passphrase("old-pw", "new-pw").await.unwrap();
    let record = store.fetch_auth("alpha-1").await.unwrap().unwrap();
    assert!(record.password_changed.is_some());
    vault.shutdown().await;

    // Old passphrase no longer opens the session
    let mut vault = vault_on(store.clone(), &dir);
    assert!(matches!(
        vault.login("alpha-1", "old-pw", false).await,
        Err(VaultError::PasswordMismatch(_))
    ));

    // The new one does, and the re-keyed cache still seeds a fresh backend
    let store2 = Arc::new(MemoryStore::new());
    let mut vault = vault_on(store2.clone(), &dir);
    vault.login("alpha-1", "new-pw", false).await.unwrap();
    settle().await;
    let view = vault.view().await.unwrap();
    assert_eq!(
        view.tabs[view.active_tab.as_ref().unwrap()].text,
        "keep me"
    );
}

#[tokio::test(start_paused = true)]
async fn stats_reflect_access_count_and_tab_count() {
    let store = Arc::new(MemoryStore::new());
    let dir = TempDir::new().unwrap();
    let mut vault = vault_on(store.clone(), &dir);

    vault.login("alpha-1", "pw", false).await.unwrap();
    settle().await;
    vault.create_tab("first").await.unwrap();
    vault.create_tab("second").await.unwrap();

    let stats = vault.stats().await.unwrap();
    assert_eq!(stats.session_id, "alpha-1");
    assert_eq!(stats.access_count, 1);
    assert_eq!(stats.tab_count, 2);

    vault.login("alpha-1", "pw", false).await.unwrap();
    settle().await;
    assert_eq!(vault.stats().await.unwrap().access_count, 2);
}

#[tokio::test(start_paused = true)]
async fn tab_management_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let dir = TempDir::new().unwrap();
    let mut vault = vault_on(store.clone(), &dir);

    vault.login("alpha-1", "pw", false).await.unwrap();
    settle().await;

    let first = vault.create_tab("notes").await.unwrap();
    let second = vault.create_tab("scratch").await.unwrap();
    assert_eq!(vault.view().await.unwrap().active_tab.as_ref(), Some(&second));

    vault.select_tab(&first).await.unwrap();
    vault.edit_active_tab("into the first tab").await.unwrap();
    assert!(matches!(
        vault.select_tab("missing").await,
        Err(VaultError::UnknownTab(_))
    ));

    vault.delete_tab(&second).await.unwrap();
    let view = vault.view().await.unwrap();
    assert_eq!(view.tabs.len(), 1);
    assert_eq!(view.active_tab.as_ref(), Some(&first));

    past_quiet_interval().await;
    let remote = store.tabs_for("alpha-1").await;
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[&first].text, "into the first tab");
}
