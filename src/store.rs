use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Key-value storage for per-session state. Values are opaque strings
/// (JSON in practice); `ttl: None` keeps an entry until it is deleted.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String, ttl: Option<Duration>);

    fn delete(&self, key: &str);

    /// Read and remove in one step.
    fn take(&self, key: &str) -> Option<String> {
        let value = self.get(key);
        self.delete(key);
        value
    }
}

/// Namespaces a store key under a client session id.
pub fn scoped_key(session_id: &str, name: &str) -> String {
    format!("{}:{}", session_id, name)
}

pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn load_json<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Ignoring corrupt stored value for {}: {}", key, e);
            None
        }
    }
}

pub fn save_json<T: Serialize>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> anyhow::Result<()> {
    store.set(key, serde_json::to_string(value)?, ttl);
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
    persist_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Store that mirrors every write into `path` and starts from its contents.
    pub fn persistent(path: PathBuf) -> Self {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Failed to create state directory {}: {}", parent.display(), e);
            }
        }

        let store = Self {
            entries: RwLock::new(HashMap::new()),
            persist_path: Some(path),
        };
        store.load_entries();
        store
    }

    fn load_entries(&self) {
        let Some(path) = &self.persist_path else {
            return;
        };

        match fs::read_to_string(path) {
            Ok(data) => {
                if let Ok(mut loaded) = serde_json::from_str::<HashMap<String, StoredEntry>>(&data)
                {
                    let now = Utc::now();
                    loaded.retain(|_, entry| entry.is_live(now));
                    let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
                    *entries = loaded;
                    info!("Loaded {} stored entries from disk", entries.len());
                } else {
                    debug!("Failed to parse state file");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No existing state file found");
            }
            Err(e) => {
                error!("Failed to load state: {}", e);
            }
        }
    }

    fn save_entries(&self) {
        let Some(path) = &self.persist_path else {
            return;
        };

        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        match serde_json::to_string_pretty(&*entries) {
            Ok(data) => {
                if let Err(e) = fs::write(path, data) {
                    error!("Failed to save state: {}", e);
                } else {
                    debug!("Saved {} entries to disk", entries.len());
                }
            }
            Err(e) => {
                error!("Failed to serialize state: {}", e);
            }
        }
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let now = Utc::now();
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: drop it so it can't be revived by a later load
        debug!("Stored entry expired: {}", key);
        self.delete(key);
        None
    }

    fn set(&self, key: &str, value: String, ttl: Option<Duration>) {
        let now = Utc::now();
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| now + ttl);

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(key.to_string(), StoredEntry { value, expires_at });
        drop(entries); // Release lock before saving
        self.save_entries();
    }

    fn delete(&self, key: &str) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let removed = entries.remove(key).is_some();
        drop(entries);

        if removed {
            self.save_entries();
        }
    }

    fn take(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.remove(key)?;
        drop(entries);
        self.save_entries();

        entry.is_live(Utc::now()).then_some(entry.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let store = MemoryStore::in_memory();
        store.set("a", "1".to_string(), None);
        assert_eq!(store.get("a").as_deref(), Some("1"));

        store.delete("a");
        assert_eq!(store.get("a"), None);

        // deleting twice is fine
        store.delete("a");
    }

    #[test]
    fn expired_entries_are_invisible() {
        let store = MemoryStore::in_memory();
        store.set("short", "x".to_string(), Some(Duration::ZERO));
        assert_eq!(store.get("short"), None);
        assert_eq!(store.take("short"), None);
    }

    #[test]
    fn take_consumes_once() {
        let store = MemoryStore::in_memory();
        store.set("state", "abc".to_string(), Some(Duration::from_secs(600)));
        assert_eq!(store.take("state").as_deref(), Some("abc"));
        assert_eq!(store.take("state"), None);
    }

    #[test]
    fn corrupt_json_reads_as_absent() {
        let store = MemoryStore::in_memory();
        store.set("settings", "{not json".to_string(), None);
        let loaded: Option<serde_json::Value> = load_json(&store, "settings");
        assert!(loaded.is_none());
    }

    #[test]
    fn scoped_keys_do_not_collide() {
        assert_ne!(scoped_key("one", "conn"), scoped_key("two", "conn"));
        assert_eq!(scoped_key("sid", "conn"), "sid:conn");
    }

    #[test]
    fn persistent_store_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = MemoryStore::persistent(path.clone());
        store.set("keep", "\"yes\"".to_string(), None);
        store.set("gone", "\"no\"".to_string(), Some(Duration::ZERO));
        drop(store);

        let reloaded = MemoryStore::persistent(path);
        assert_eq!(reloaded.get("keep").as_deref(), Some("\"yes\""));
        assert_eq!(reloaded.get("gone"), None);
    }

    #[test]
    fn unwritable_directory_still_serves_from_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let store = MemoryStore::persistent(blocker.join("state.json"));
        store.set("k", "\"v\"".to_string(), None);
        assert_eq!(store.get("k").as_deref(), Some("\"v\""));
    }
}
