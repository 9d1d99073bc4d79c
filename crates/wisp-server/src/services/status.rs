// ============================================
// File: crates/wisp-server/src/services/status.rs
// ============================================
//! # Status Aggregator
//!
//! ## Creation Reason
//! Keeps "which station is on which asset" and "what does each asset
//! look like" for steering and the management surface.
//!
//! ## Eviction Rules
//! - Station records expire by age (`station_ttl`, 30s by default): a read
//!   never returns an expired record and deletes it from the store
//! - Asset records expire by membership: a read never returns a record
//!   whose uid is not in the identity registry and deletes it
//!
//! ## Last Modified
//! v0.1.0 - Initial status aggregator

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use wisp_common::{AssetUid, MacAddress, Timestamp};
use wisp_core::protocol::{BssInfo, StatusReport};

use crate::error::{Result, ServerError};
use crate::management::{HashStore, Namespace};
use crate::services::IdentityRegistry;

// ============================================
// Records
// ============================================

/// Station association as last reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationStatus {
    /// Station hardware address.
    #[serde(rename = "staMAC")]
    pub sta_mac: MacAddress,
    /// Asset the station is associated to.
    #[serde(rename = "assetUID")]
    pub asset_uid: AssetUid,
    /// SSID, as reported.
    #[serde(default)]
    pub ssid: Option<String>,
    /// Interface, as reported.
    #[serde(default)]
    pub intf: Option<String>,
    /// BSSID from the asset's advertised table.
    #[serde(default)]
    pub bssid: Option<String>,
    /// Band from the asset's advertised table.
    #[serde(default)]
    pub band: Option<String>,
    /// Observation time.
    pub observed_at: Timestamp,
    /// Remaining device fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Asset snapshot as last reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetStatus {
    /// Asset identifier.
    pub uid: AssetUid,
    /// Observation time.
    pub observed_at: Timestamp,
    /// Hardware address the asset reported.
    #[serde(default)]
    pub mac: Option<String>,
    /// Seconds since boot.
    #[serde(default)]
    pub system_uptime: Option<u64>,
    /// Seconds since agent start.
    #[serde(default)]
    pub process_uptime: Option<u64>,
    /// Agent version.
    #[serde(default)]
    pub version: Option<String>,
    /// Per-radio utilization.
    #[serde(default)]
    pub channel_utilization: Option<Value>,
    /// WAN mode.
    #[serde(default)]
    pub wan_mode: Option<Value>,
    /// Upstream APs.
    #[serde(rename = "upstreamAPs", default)]
    pub upstream_aps: Vec<Value>,
    /// Advertised BSSes per SSID.
    #[serde(default)]
    pub ssids: BTreeMap<String, Vec<BssInfo>>,
}

impl AssetStatus {
    /// Finds the advertised BSS for `ssid` on `band`.
    #[must_use]
    pub fn find_bss_on_band(&self, ssid: &str, band: &str) -> Option<&BssInfo> {
        self.ssids.get(ssid)?.iter().find(|bss| bss.band == band)
    }
}

// ============================================
// StatusAggregator
// ============================================

/// Station and asset status with eviction on read.
pub struct StatusAggregator {
    store: Arc<dyn HashStore>,
    identity: Arc<IdentityRegistry>,
    station_ttl: Duration,
}

impl StatusAggregator {
    /// Creates an aggregator.
    #[must_use]
    pub fn new(store: Arc<dyn HashStore>, identity: Arc<IdentityRegistry>, station_ttl: Duration) -> Self {
        Self {
            store,
            identity,
            station_ttl,
        }
    }

    /// Stores every station in `report` as associated to `owner`, enriched
    /// with BSSID and band where its SSID and interface match an
    /// advertised BSS.
    ///
    /// # Errors
    /// Fails if the store rejects a write.
    pub async fn record_station_status(&self, report: &StatusReport, owner: &AssetUid) -> Result<usize> {
        let observed_at = Timestamp::now();
        for entry in &report.stations {
            let bss = match (&entry.ssid, &entry.intf) {
                (Some(ssid), Some(intf)) => report.find_bss(ssid, intf),
                _ => None,
            };

            let record = StationStatus {
                sta_mac: entry.mac.clone(),
                asset_uid: owner.clone(),
                ssid: entry.ssid.clone(),
                intf: entry.intf.clone(),
                bssid: bss.map(|b| b.bssid.clone()),
                band: bss.map(|b| b.band.clone()),
                observed_at,
                fields: entry.fields.clone(),
            };
            self.store
                .set(
                    Namespace::StationStatus,
                    record.sta_mac.as_str(),
                    to_value(Namespace::StationStatus, &record)?,
                )
                .await?;
        }
        trace!(uid = %owner, stations = report.stations.len(), "Station status recorded");
        Ok(report.stations.len())
    }

    /// Stores the asset snapshot in `report` under `owner`.
    ///
    /// # Errors
    /// Fails if the store rejects the write.
    pub async fn record_asset_status(&self, report: &StatusReport, owner: &AssetUid) -> Result<()> {
        let record = AssetStatus {
            uid: owner.clone(),
            observed_at: Timestamp::now(),
            mac: report.mac.clone(),
            system_uptime: report.system_uptime,
            process_uptime: report.process_uptime,
            version: report.version.clone(),
            channel_utilization: report.channel_utilization.clone(),
            wan_mode: report.wan_mode.clone(),
            upstream_aps: report.upstream_aps.clone(),
            ssids: report.ssids.clone(),
        };
        self.store
            .set(Namespace::AssetStatus, owner.as_str(), to_value(Namespace::AssetStatus, &record)?)
            .await
    }

    /// Returns the fresh record for `mac`, deleting it if expired.
    ///
    /// # Errors
    /// Fails if the store cannot be read or the expired record deleted.
    pub async fn get_station(&self, mac: &MacAddress) -> Result<Option<StationStatus>> {
        let Some(raw) = self.store.get(Namespace::StationStatus, mac.as_str()).await? else {
            return Ok(None);
        };
        match decode::<StationStatus>(mac.as_str(), raw) {
            Some(record) if !record.observed_at.is_older_than(self.station_ttl) => Ok(Some(record)),
            _ => {
                debug!(sta = %mac, "Stale station record purged");
                self.store
                    .delete(Namespace::StationStatus, &[mac.as_str().to_string()])
                    .await?;
                Ok(None)
            }
        }
    }

    /// Returns every fresh station record, deleting expired ones.
    ///
    /// # Errors
    /// Fails if the store cannot be read or expired records deleted.
    pub async fn get_all_stations(&self) -> Result<Vec<StationStatus>> {
        let all = self.store.get_all(Namespace::StationStatus).await?;
        let mut fresh = Vec::with_capacity(all.len());
        let mut stale = Vec::new();

        for (key, raw) in all {
            match decode::<StationStatus>(&key, raw) {
                Some(record) if !record.observed_at.is_older_than(self.station_ttl) => fresh.push(record),
                _ => stale.push(key),
            }
        }

        if !stale.is_empty() {
            debug!(purged = stale.len(), "Stale station records purged");
            self.store.delete(Namespace::StationStatus, &stale).await?;
        }
        Ok(fresh)
    }

    /// Returns the record for `uid` if it is still registered, deleting
    /// it otherwise.
    ///
    /// # Errors
    /// Fails if the store cannot be read or the orphan deleted.
    pub async fn get_asset_status(&self, uid: &AssetUid) -> Result<Option<AssetStatus>> {
        let Some(raw) = self.store.get(Namespace::AssetStatus, uid.as_str()).await? else {
            return Ok(None);
        };
        if self.identity.contains(uid.as_str()) {
            if let Some(record) = decode::<AssetStatus>(uid.as_str(), raw) {
                return Ok(Some(record));
            }
        }
        debug!(uid = %uid, "Orphaned asset status purged");
        self.store
            .delete(Namespace::AssetStatus, &[uid.as_str().to_string()])
            .await?;
        Ok(None)
    }

    /// Returns every record whose uid is registered, deleting the rest.
    ///
    /// # Errors
    /// Fails if the store cannot be read or orphans deleted.
    pub async fn get_all_asset_status(&self) -> Result<Vec<AssetStatus>> {
        let all = self.store.get_all(Namespace::AssetStatus).await?;
        let mut live = Vec::with_capacity(all.len());
        let mut orphaned = Vec::new();

        for (key, raw) in all {
            let record = if self.identity.contains(&key) {
                decode::<AssetStatus>(&key, raw)
            } else {
                None
            };
            match record {
                Some(record) => live.push(record),
                None => orphaned.push(key),
            }
        }

        if !orphaned.is_empty() {
            debug!(purged = orphaned.len(), "Orphaned asset status purged");
            self.store.delete(Namespace::AssetStatus, &orphaned).await?;
        }
        Ok(live)
    }
}

fn to_value<T: Serialize>(ns: Namespace, record: &T) -> Result<Value> {
    serde_json::to_value(record).map_err(|e| ServerError::store(ns.as_str(), e.to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(key: &str, raw: Value) -> Option<T> {
    match serde_json::from_value(raw) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(key, error = %e, "Unreadable status record");
            None
        }
    }
}
