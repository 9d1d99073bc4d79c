// ============================================
// File: crates/wisp-server/src/management/config.rs
// ============================================
//! # Network Configuration Manager

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use wisp_common::{AssetUid, TunnelPublicKey};

use crate::error::{Result, ServerError};
use crate::services::EffectiveConfigStore;

// ============================================
// Network Document
// ============================================

/// Fleet-wide configuration source: assets and the templates they use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkDocument {
    /// Per-asset entries keyed by uid.
    #[serde(default)]
    pub assets: BTreeMap<AssetUid, AssetEntry>,
    /// Templates keyed by id; each must be a JSON object.
    #[serde(default)]
    pub templates: BTreeMap<String, Value>,
    /// Sections owned by other tooling, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One asset in the network document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// Registered tunnel public key.
    #[serde(rename = "publicKey", default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<TunnelPublicKey>,
    /// Template the asset inherits from.
    #[serde(rename = "templateId", default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    /// Asset-specific overrides, layered over the template.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl AssetEntry {
    /// Creates a placeholder entry using `template_id`.
    #[must_use]
    pub fn placeholder(template_id: impl Into<String>) -> Self {
        Self {
            template_id: Some(template_id.into()),
            ..Self::default()
        }
    }
}

/// Id of the default template for a device type.
#[must_use]
pub fn default_template_id(device_type: &str) -> String {
    format!("default_{device_type}")
}

impl NetworkDocument {
    /// Inserts the default template for `device_type` if absent.
    /// Returns `true` if the document changed.
    pub fn ensure_default_template(&mut self, device_type: &str) -> bool {
        let id = default_template_id(device_type);
        if self.templates.contains_key(&id) {
            return false;
        }
        let mut body = Map::new();
        body.insert("deviceType".into(), Value::String(device_type.to_string()));
        self.templates.insert(id, Value::Object(body));
        true
    }

    /// Checks template shape and references.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (id, template) in &self.templates {
            if !template.is_object() {
                errors.push(format!("template '{id}' must be an object"));
            }
        }
        let mut owners: HashMap<&TunnelPublicKey, &AssetUid> = HashMap::new();
        for (uid, entry) in &self.assets {
            if let Some(template_id) = &entry.template_id {
                if !self.templates.contains_key(template_id) {
                    errors.push(format!("asset '{uid}' references unknown template '{template_id}'"));
                }
            }
            if let Some(key) = &entry.public_key {
                if let Some(owner) = owners.insert(key, uid) {
                    errors.push(format!("assets '{owner}' and '{uid}' share public key {key}"));
                }
            }
        }
        errors
    }

    /// Drops `key` from every asset other than `uid`. Returns the uids it
    /// was taken from.
    pub fn release_key(&mut self, key: &TunnelPublicKey, uid: &AssetUid) -> Vec<AssetUid> {
        let mut released = Vec::new();
        for (other, entry) in &mut self.assets {
            if other != uid && entry.public_key.as_ref() == Some(key) {
                entry.public_key = None;
                released.push(other.clone());
            }
        }
        released
    }

    /// Builds the effective document of one asset: template fields, then
    /// asset fields, then `publicKey`.
    #[must_use]
    pub fn effective_for(&self, entry: &AssetEntry) -> Value {
        let mut doc = entry
            .template_id
            .as_ref()
            .and_then(|id| self.templates.get(id))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        for (key, value) in &entry.fields {
            doc.insert(key.clone(), value.clone());
        }
        if let Some(key) = &entry.public_key {
            doc.insert("publicKey".into(), Value::String(key.to_string()));
        }
        Value::Object(doc)
    }
}

// ============================================
// ConfigManager Trait
// ============================================

/// Owner of the network document.
///
/// Callers performing a read-modify-write hold the guard from
/// [`ConfigManager::acquire_lock`] across `active_config`, `try_apply` and
/// `save`. None of those methods take the lock themselves.
#[async_trait]
pub trait ConfigManager: Send + Sync {
    /// Acquires the global configuration lock.
    async fn acquire_lock(&self) -> OwnedMutexGuard<()>;

    /// Returns the active document.
    async fn active_config(&self) -> NetworkDocument;

    /// Validates and applies `doc`, updating every effective
    /// configuration. Returns the errors; empty means applied.
    ///
    /// A document that fails validation changes nothing. A store failure
    /// during the commit leaves the assets written before it committed and
    /// keeps the previous active document.
    async fn try_apply(&self, doc: NetworkDocument) -> Vec<String>;

    /// Persists `doc`.
    async fn save(&self, doc: &NetworkDocument) -> Result<()>;
}

// ============================================
// LocalConfigManager
// ============================================

/// Configuration manager backed by a JSON file.
pub struct LocalConfigManager {
    lock: Arc<Mutex<()>>,
    active: RwLock<NetworkDocument>,
    path: Option<PathBuf>,
    effective: Arc<EffectiveConfigStore>,
}

impl LocalConfigManager {
    /// Creates an in-memory manager starting from `doc`.
    #[must_use]
    pub fn new(doc: NetworkDocument, effective: Arc<EffectiveConfigStore>) -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            active: RwLock::new(doc),
            path: None,
            effective,
        }
    }

    /// Loads the document at `path`; a missing file starts empty.
    ///
    /// # Errors
    /// Fails if the file exists but is not a valid document.
    pub async fn open(path: impl Into<PathBuf>, effective: Arc<EffectiveConfigStore>) -> Result<Self> {
        let path = path.into();
        let doc = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| ServerError::config_load(path.display().to_string(), e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No network configuration yet, starting empty");
                NetworkDocument::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path),
            ..Self::new(doc, effective)
        })
    }

    /// Applies the loaded document once under the lock, so edits made
    /// while the controller was down reach the effective store.
    ///
    /// # Errors
    /// Returns `ApplyFailed` if the document does not validate.
    pub async fn apply_active(&self) -> Result<()> {
        let _guard = self.acquire_lock().await;
        let doc = self.active_config().await;
        let errors = self.try_apply(doc).await;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ServerError::ApplyFailed { errors })
        }
    }
}

#[async_trait]
impl ConfigManager for LocalConfigManager {
    async fn acquire_lock(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.lock).lock_owned().await
    }

    async fn active_config(&self) -> NetworkDocument {
        self.active.read().clone()
    }

    async fn try_apply(&self, doc: NetworkDocument) -> Vec<String> {
        let mut errors = doc.validate();
        let derived: Vec<(&AssetUid, Value)> = doc
            .assets
            .iter()
            .map(|(uid, entry)| (uid, doc.effective_for(entry)))
            .collect();
        for (uid, effective) in &derived {
            if let Err(e) = EffectiveConfigStore::check(uid, effective) {
                errors.push(e.to_string());
            }
        }
        if !errors.is_empty() {
            debug!(errors = errors.len(), "Network configuration rejected, nothing applied");
            return errors;
        }

        // only store failures can stop the loops below part way
        for (uid, effective) in derived {
            if let Err(e) = self.effective.set(uid, effective).await {
                errors.push(format!("asset '{uid}': {e}"));
            }
        }

        let wanted: BTreeSet<&AssetUid> = doc.assets.keys().collect();
        for uid in self.effective.uids() {
            if !wanted.contains(&uid) {
                debug!(uid = %uid, "Asset removed from network configuration");
                if let Err(e) = self.effective.delete(&uid).await {
                    errors.push(format!("asset '{uid}': {e}"));
                }
            }
        }

        if errors.is_empty() {
            *self.active.write() = doc;
        } else {
            warn!(errors = ?errors, "Network configuration partially applied");
        }
        errors
    }

    async fn save(&self, doc: &NetworkDocument) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let bytes = serde_json::to_vec_pretty(doc)
            .map_err(|e| ServerError::store("network_config", e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!(path = %path.display(), assets = doc.assets.len(), "Network configuration saved");
        Ok(())
    }
}
