// ============================================
// File: crates/wisp-server/src/management/store.rs
// ============================================
//! # Hash Store
//!
//! ## Creation Reason
//! Durable key-value persistence for effective configurations and status
//! records, behind a trait so services run against memory in tests.
//!
//! ## Main Functionality
//! - `HashStore`: get / set / get-all / delete-many per namespace
//! - `MemoryStore`: process-local store
//! - `JsonFileStore`: one JSON object file per namespace, write-through
//!
//! ## ⚠️ Important Note for Next Developer
//! - `JsonFileStore` rewrites the whole namespace file on every write via
//!   a temp file and rename; fine for fleet sizes in the low thousands
//! - Writes to one namespace are serialized; namespaces are independent
//!
//! ## Last Modified
//! v0.1.0 - Initial store implementation

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, ServerError};

// ============================================
// Namespace
// ============================================

/// Store namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// Effective configuration documents keyed by uid.
    EffectiveConfig,
    /// Station status records keyed by station MAC.
    StationStatus,
    /// Asset status records keyed by uid.
    AssetStatus,
}

impl Namespace {
    /// All namespaces.
    pub const ALL: [Self; 3] = [Self::EffectiveConfig, Self::StationStatus, Self::AssetStatus];

    /// Stable name, also used as the file stem.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EffectiveConfig => "effective_config",
            Self::StationStatus => "station_status",
            Self::AssetStatus => "asset_status",
        }
    }
}

// ============================================
// HashStore Trait
// ============================================

/// Hash-mapping persistence.
#[async_trait]
pub trait HashStore: Send + Sync {
    /// Reads one value.
    async fn get(&self, ns: Namespace, key: &str) -> Result<Option<Value>>;

    /// Writes one value.
    async fn set(&self, ns: Namespace, key: &str, value: Value) -> Result<()>;

    /// Reads every value in a namespace.
    async fn get_all(&self, ns: Namespace) -> Result<BTreeMap<String, Value>>;

    /// Deletes keys; absent keys are ignored.
    async fn delete(&self, ns: Namespace, keys: &[String]) -> Result<()>;
}

// ============================================
// MemoryStore
// ============================================

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<Namespace, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HashStore for MemoryStore {
    async fn get(&self, ns: Namespace, key: &str) -> Result<Option<Value>> {
        Ok(self.data.read().get(&ns).and_then(|m| m.get(key)).cloned())
    }

    async fn set(&self, ns: Namespace, key: &str, value: Value) -> Result<()> {
        self.data.write().entry(ns).or_default().insert(key.to_string(), value);
        Ok(())
    }

    async fn get_all(&self, ns: Namespace) -> Result<BTreeMap<String, Value>> {
        Ok(self.data.read().get(&ns).cloned().unwrap_or_default())
    }

    async fn delete(&self, ns: Namespace, keys: &[String]) -> Result<()> {
        if let Some(map) = self.data.write().get_mut(&ns) {
            for key in keys {
                map.remove(key);
            }
        }
        Ok(())
    }
}

// ============================================
// JsonFileStore
// ============================================

/// File-backed store. Every namespace is cached in memory and written
/// through to `<data_dir>/<namespace>.json` on change.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    cache: RwLock<HashMap<Namespace, BTreeMap<String, Value>>>,
    write_locks: HashMap<Namespace, Mutex<()>>,
}

impl JsonFileStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    /// Fails if the directory cannot be created or a namespace file is
    /// not a JSON object.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let mut cache = HashMap::new();
        let mut write_locks = HashMap::new();
        for ns in Namespace::ALL {
            let path = dir.join(format!("{}.json", ns.as_str()));
            let map = match tokio::fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<BTreeMap<String, Value>>(&bytes)
                    .map_err(|e| ServerError::store(ns.as_str(), format!("{}: {e}", path.display())))?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
                Err(e) => return Err(e.into()),
            };
            debug!(namespace = ns.as_str(), entries = map.len(), "Namespace loaded");
            cache.insert(ns, map);
            write_locks.insert(ns, Mutex::new(()));
        }

        info!(dir = %dir.display(), "JSON file store opened");
        Ok(Self {
            dir,
            cache: RwLock::new(cache),
            write_locks,
        })
    }

    fn path_of(&self, ns: Namespace) -> PathBuf {
        self.dir.join(format!("{}.json", ns.as_str()))
    }

    async fn mutate<F>(&self, ns: Namespace, f: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, Value>),
    {
        let Some(lock) = self.write_locks.get(&ns) else {
            return Err(ServerError::store(ns.as_str(), "namespace not opened"));
        };
        let _guard = lock.lock().await;

        let bytes = {
            let mut cache = self.cache.write();
            let map = cache.entry(ns).or_default();
            f(map);
            serde_json::to_vec_pretty(map).map_err(|e| ServerError::store(ns.as_str(), e.to_string()))?
        };

        let path = self.path_of(ns);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl HashStore for JsonFileStore {
    async fn get(&self, ns: Namespace, key: &str) -> Result<Option<Value>> {
        Ok(self.cache.read().get(&ns).and_then(|m| m.get(key)).cloned())
    }

    async fn set(&self, ns: Namespace, key: &str, value: Value) -> Result<()> {
        let key = key.to_string();
        self.mutate(ns, move |map| {
            map.insert(key, value);
        })
        .await
    }

    async fn get_all(&self, ns: Namespace) -> Result<BTreeMap<String, Value>> {
        Ok(self.cache.read().get(&ns).cloned().unwrap_or_default())
    }

    async fn delete(&self, ns: Namespace, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.mutate(ns, |map| {
            for key in keys {
                map.remove(key);
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_namespaces_are_independent() {
        let store = MemoryStore::new();
        store.set(Namespace::EffectiveConfig, "ap-1", json!({"a": 1})).await.unwrap();
        store.set(Namespace::AssetStatus, "ap-1", json!({"b": 2})).await.unwrap();

        assert_eq!(
            store.get(Namespace::EffectiveConfig, "ap-1").await.unwrap(),
            Some(json!({"a": 1}))
        );
        assert_eq!(store.get_all(Namespace::AssetStatus).await.unwrap().len(), 1);
        assert!(store.get(Namespace::StationStatus, "ap-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_delete_many() {
        let store = MemoryStore::new();
        for key in ["a", "b", "c"] {
            store.set(Namespace::StationStatus, key, json!(key)).await.unwrap();
        }
        store
            .delete(Namespace::StationStatus, &["a".into(), "c".into(), "zz".into()])
            .await
            .unwrap();

        let all = store.get_all(Namespace::StationStatus).await.unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonFileStore::open(dir.path()).await.unwrap();
            store.set(Namespace::EffectiveConfig, "ap-1", json!({"_ts": 7})).await.unwrap();
            store.set(Namespace::EffectiveConfig, "ap-2", json!({"_ts": 8})).await.unwrap();
            store.delete(Namespace::EffectiveConfig, &["ap-2".into()]).await.unwrap();
        }

        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let all = store.get_all(Namespace::EffectiveConfig).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["ap-1"], json!({"_ts": 7}));
        assert!(!dir.path().join("effective_config.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_namespace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("asset_status.json"), b"[1,2]").unwrap();
        assert!(matches!(
            JsonFileStore::open(dir.path()).await,
            Err(ServerError::Store { namespace: "asset_status", .. })
        ));
    }
}
