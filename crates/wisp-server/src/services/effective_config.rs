// ============================================
// File: crates/wisp-server/src/services/effective_config.rs
// ============================================
//! # Effective Config Store
//!
//! ## Creation Reason
//! Holds the last committed configuration document of every asset and
//! decides when a change is real enough to push.
//!
//! ## Main Functionality
//! - `get` / `set` / `delete` per uid, cached in memory, persisted in the
//!   `EffectiveConfig` namespace
//! - `_ts` stamping on every committed write
//! - Equivalence check ignoring `_ts`, suppressing redundant pushes
//! - `publicKey` in a document registers the asset identity
//! - `load` rebuilds cache and identity bindings at startup
//!
//! ## Set Flow
//! ```text
//! set(uid, doc)
//!   ├─ not an object ──────────────► InvalidDocument
//!   ├─ publicKey present ──────────► IdentityRegistry::register_asset
//!   ├─ equal to previous sans _ts ─► Unchanged (debug log only)
//!   └─ otherwise: _ts = now, persist, cache, schedule push ─► Committed
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial effective config store

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use wisp_common::{AssetUid, Timestamp, TunnelPublicKey};

use crate::error::{Result, ServerError};
use crate::management::{HashStore, Namespace};
use crate::services::{IdentityRegistry, PushScheduler};

/// Controller-assigned timestamp field.
pub const TS_FIELD: &str = "_ts";

/// Asset public key field.
pub const PUBLIC_KEY_FIELD: &str = "publicKey";

/// Outcome of [`EffectiveConfigStore::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// Equivalent to the stored document; nothing written.
    Unchanged,
    /// Written with the given `_ts`; push scheduled.
    Committed(Timestamp),
}

/// Per-uid effective configuration.
pub struct EffectiveConfigStore {
    store: Arc<dyn HashStore>,
    cache: DashMap<AssetUid, Value>,
    identity: Arc<IdentityRegistry>,
    scheduler: Arc<PushScheduler>,
}

impl EffectiveConfigStore {
    /// Creates an empty store. Call [`Self::load`] to restore state.
    #[must_use]
    pub fn new(
        store: Arc<dyn HashStore>,
        identity: Arc<IdentityRegistry>,
        scheduler: Arc<PushScheduler>,
    ) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            identity,
            scheduler,
        }
    }

    /// Loads every persisted document into the cache and re-registers the
    /// identities they carry. Returns how many documents were loaded.
    ///
    /// # Errors
    /// Fails if the store cannot be read.
    pub async fn load(&self) -> Result<usize> {
        let all = self.store.get_all(Namespace::EffectiveConfig).await?;
        for (uid, doc) in all {
            let uid = AssetUid::from(uid);
            match public_key_in(&doc) {
                Ok(Some(key)) => {
                    self.identity.register_asset(&uid, &key);
                }
                Ok(None) => {}
                Err(e) => warn!(uid = %uid, error = %e, "Persisted document has an invalid publicKey"),
            }
            self.cache.insert(uid, doc);
        }
        info!(documents = self.cache.len(), assets = self.identity.count(), "Effective configuration restored");
        Ok(self.cache.len())
    }

    /// Returns the last committed document.
    #[must_use]
    pub fn get(&self, uid: &AssetUid) -> Option<Value> {
        self.cache.get(uid).map(|doc| doc.value().clone())
    }

    /// Returns the `_ts` of the last committed document.
    #[must_use]
    pub fn timestamp_of(&self, uid: &AssetUid) -> Option<Timestamp> {
        self.cache
            .get(uid)
            .and_then(|doc| doc.get(TS_FIELD).and_then(Value::as_i64))
            .map(Timestamp::from_millis)
    }

    /// Every uid with a committed document.
    #[must_use]
    pub fn uids(&self) -> Vec<AssetUid> {
        self.cache.iter().map(|e| e.key().clone()).collect()
    }

    /// Runs the checks [`Self::set`] applies to `doc` without writing
    /// or registering anything.
    ///
    /// # Errors
    /// `InvalidDocument` under the same conditions as [`Self::set`].
    pub fn check(uid: &AssetUid, doc: &Value) -> Result<()> {
        let Some(fields) = doc.as_object() else {
            return Err(ServerError::invalid_document(uid, "document must be a JSON object"));
        };
        public_key_in_map(fields)
            .map(|_| ())
            .map_err(|reason| ServerError::invalid_document(uid, reason))
    }

    /// Commits `doc` for `uid` unless it is equivalent to the current one.
    ///
    /// # Errors
    /// - `InvalidDocument`: `doc` is not an object or has a bad `publicKey`
    /// - `Store`/`Io`: persistence failed; nothing is cached or pushed
    pub async fn set(&self, uid: &AssetUid, doc: Value) -> Result<SetOutcome> {
        let Value::Object(mut fields) = doc else {
            return Err(ServerError::invalid_document(uid, "document must be a JSON object"));
        };

        let key = public_key_in_map(&fields).map_err(|reason| ServerError::invalid_document(uid, reason))?;
        if let Some(key) = key {
            self.identity.register_asset(uid, &key);
        }

        if let Some(previous) = self.cache.get(uid) {
            if equivalent(previous.value(), &fields) {
                debug!(uid = %uid, "Effective configuration unchanged");
                return Ok(SetOutcome::Unchanged);
            }
        }

        let ts = Timestamp::now();
        fields.insert(TS_FIELD.into(), Value::from(ts.as_millis()));
        let doc = Value::Object(fields);

        self.store.set(Namespace::EffectiveConfig, uid.as_str(), doc.clone()).await?;
        self.cache.insert(uid.clone(), doc);
        self.scheduler.schedule(uid);

        info!(uid = %uid, ts = %ts, "Effective configuration committed");
        Ok(SetOutcome::Committed(ts))
    }

    /// Removes `uid`: identity, document and any pending push. Idempotent.
    ///
    /// # Errors
    /// Fails if the store delete fails.
    pub async fn delete(&self, uid: &AssetUid) -> Result<()> {
        self.scheduler.cancel(uid);
        self.identity.deregister(uid);
        self.store
            .delete(Namespace::EffectiveConfig, &[uid.as_str().to_string()])
            .await?;
        if self.cache.remove(uid).is_some() {
            info!(uid = %uid, "Effective configuration deleted");
        }
        Ok(())
    }
}

/// Deep equality ignoring `_ts` on both sides.
fn equivalent(previous: &Value, candidate: &Map<String, Value>) -> bool {
    let Some(previous) = previous.as_object() else {
        return false;
    };
    let strip = |m: &Map<String, Value>| -> Map<String, Value> {
        m.iter()
            .filter(|(k, _)| k.as_str() != TS_FIELD)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    };
    strip(previous) == strip(candidate)
}

fn public_key_in_map(fields: &Map<String, Value>) -> std::result::Result<Option<TunnelPublicKey>, String> {
    match fields.get(PUBLIC_KEY_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s
            .parse()
            .map(Some)
            .map_err(|e| format!("invalid publicKey: {e}")),
        Some(_) => Err("publicKey must be a string".into()),
    }
}

fn public_key_in(doc: &Value) -> std::result::Result<Option<TunnelPublicKey>, String> {
    doc.as_object().map_or(Ok(None), public_key_in_map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::management::MemoryStore;

    const KEY: &str = "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=";

    struct Fixture {
        store: Arc<MemoryStore>,
        identity: Arc<IdentityRegistry>,
        scheduler: Arc<PushScheduler>,
        ready: mpsc::UnboundedReceiver<AssetUid>,
        effective: EffectiveConfigStore,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(IdentityRegistry::new());
        let (scheduler, ready) = PushScheduler::new(Duration::from_secs(2));
        let scheduler = Arc::new(scheduler);
        let effective = EffectiveConfigStore::new(
            Arc::clone(&store) as Arc<dyn HashStore>,
            Arc::clone(&identity),
            Arc::clone(&scheduler),
        );
        Fixture {
            store,
            identity,
            scheduler,
            ready,
            effective,
        }
    }

    #[tokio::test]
    async fn test_set_then_get_adds_ts() {
        let f = fixture();
        let uid = AssetUid::from("ap-1");
        let doc = json!({"ssids": [{"name": "Guest", "vlan": 20}], "txPower": 17});

        let SetOutcome::Committed(ts) = f.effective.set(&uid, doc.clone()).await.unwrap() else {
            panic!("expected commit");
        };

        let mut expected = doc;
        expected["_ts"] = json!(ts.as_millis());
        assert_eq!(f.effective.get(&uid), Some(expected.clone()));
        assert_eq!(f.effective.timestamp_of(&uid), Some(ts));
        assert_eq!(
            f.store.get(Namespace::EffectiveConfig, "ap-1").await.unwrap(),
            Some(expected)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_equivalent_set_schedules_once() {
        let mut f = fixture();
        let uid = AssetUid::from("ap-1");

        let first = f.effective.set(&uid, json!({"a": 1})).await.unwrap();
        assert!(matches!(first, SetOutcome::Committed(_)));

        let echoed = f.effective.get(&uid).unwrap();
        assert_eq!(f.effective.set(&uid, echoed).await.unwrap(), SetOutcome::Unchanged);
        assert_eq!(
            f.effective.set(&uid, json!({"a": 1, "_ts": 12})).await.unwrap(),
            SetOutcome::Unchanged
        );

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(f.ready.recv().await, Some(uid));
        assert!(f.ready.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejects_non_object() {
        let f = fixture();
        let uid = AssetUid::from("ap-1");
        for bad in [json!([1, 2]), json!("x"), json!(null)] {
            assert!(matches!(
                f.effective.set(&uid, bad).await,
                Err(ServerError::InvalidDocument { .. })
            ));
        }
        assert!(f.effective.get(&uid).is_none());
        assert_eq!(f.scheduler.pending_count(), 0);
        assert!(f.store.get_all(Namespace::EffectiveConfig).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_public_key_registers_identity() {
        let f = fixture();
        let uid = AssetUid::from("ap-1");
        f.effective.set(&uid, json!({"publicKey": KEY})).await.unwrap();
        assert_eq!(f.identity.public_key_of(&uid).unwrap().as_str(), KEY);

        assert!(f.effective.set(&uid, json!({"publicKey": "short"})).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_cancels_push() {
        let f = fixture();
        let uid = AssetUid::from("ap-1");
        f.effective.set(&uid, json!({"publicKey": KEY})).await.unwrap();
        assert!(f.scheduler.is_pending(&uid));

        f.effective.delete(&uid).await.unwrap();
        f.effective.delete(&uid).await.unwrap();

        assert!(f.effective.get(&uid).is_none());
        assert!(!f.identity.contains("ap-1"));
        assert!(!f.scheduler.is_pending(&uid));
    }

    #[tokio::test]
    async fn test_load_rebuilds_registry() {
        let f = fixture();
        f.store
            .set(Namespace::EffectiveConfig, "ap-1", json!({"publicKey": KEY, "_ts": 5}))
            .await
            .unwrap();
        f.store
            .set(Namespace::EffectiveConfig, "ap-2", json!({"_ts": 6}))
            .await
            .unwrap();

        assert_eq!(f.effective.load().await.unwrap(), 2);
        assert!(f.identity.contains("ap-1"));
        assert!(!f.identity.contains("ap-2"));
        assert_eq!(f.effective.timestamp_of(&"ap-2".into()), Some(Timestamp::from_millis(6)));
        assert_eq!(f.scheduler.pending_count(), 0);
    }
}
