use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::auth::SessionIdentity;
use crate::models::{Result, TabCollection};

/// Local durability cache
///
/// One JSON file per session under the cache directory, named by the
/// identity's cache key. The cache receives every scheduled write
/// unconditionally, so a session keeps its tabs across restarts even when
/// the remote store is unreachable.
#[derive(Debug, Clone)]
pub struct DurabilityCache {
    dir: PathBuf,
}

impl DurabilityCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, identity: &SessionIdentity) -> PathBuf {
        self.dir.join(format!("{}.json", identity.cache_key()))
    }

    /// Persist the full tab collection for a session
    ///
    /// Writes to a temp file and renames so a crash mid-write never leaves a
    /// truncated entry behind.
    pub fn store(&self, identity: &SessionIdentity, tabs: &TabCollection) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(identity);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_vec(tabs)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;

        debug!(
            "Cached {} tab(s) for session '{}'",
            tabs.len(),
            identity.id()
        );
        Ok(())
    }

    /// Load the cached tab collection for a session, if one exists
    pub fn load(&self, identity: &SessionIdentity) -> Result<Option<TabCollection>> {
        let path = self.entry_path(identity);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let tabs: TabCollection = serde_json::from_slice(&raw)?;
        info!(
            "Loaded {} cached tab(s) for session '{}'",
            tabs.len(),
            identity.id()
        );
        Ok(Some(tabs))
    }

    /// Drop the cache entry for a session
    pub fn remove(&self, identity: &SessionIdentity) -> Result<()> {
        match std::fs::remove_file(self.entry_path(identity)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::derive_secret;
    use crate::models::Tab;
    use tempfile::TempDir;

    fn identity(id: &str, pw: &str) -> SessionIdentity {
        SessionIdentity::from_parts(id.to_string(), derive_secret(pw))
    }

    fn one_tab(text: &str) -> TabCollection {
        let mut tab = Tab::new("notes");
        tab.text = text.to_string();
        let mut tabs = TabCollection::new();
        tabs.insert(tab.id.clone(), tab);
        tabs
    }

    #[test]
    fn store_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let cache = DurabilityCache::new(dir.path());
        let id = identity("alpha-1", "pw");

        let tabs = one_tab("hello");
        cache.store(&id, &tabs).unwrap();
        assert_eq!(cache.load(&id).unwrap(), Some(tabs));
    }

    #[test]
    fn missing_entry_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let cache = DurabilityCache::new(dir.path());
        assert!(cache.load(&identity("alpha-1", "pw")).unwrap().is_none());
    }

    #[test]
    fn entries_are_keyed_by_identity_not_just_id() {
        let dir = TempDir::new().unwrap();
        let cache = DurabilityCache::new(dir.path());

        cache.store(&identity("alpha-1", "pw"), &one_tab("mine")).unwrap();
        // Same id, different passphrase: different cache entry
        assert!(cache
            .load(&identity("alpha-1", "other"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let cache = DurabilityCache::new(dir.path());
        let id = identity("alpha-1", "pw");

        cache.store(&id, &one_tab("x")).unwrap();
        cache.remove(&id).unwrap();
        cache.remove(&id).unwrap();
        assert!(cache.load(&id).unwrap().is_none());
    }
}
