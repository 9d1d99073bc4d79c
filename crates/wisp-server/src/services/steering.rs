// ============================================
// File: crates/wisp-server/src/services/steering.rs
// ============================================
//! # BSS Steering Engine
//!
//! ## Creation Reason
//! Turns "move this station to that asset" into a concrete BSSID and
//! channel the station's current asset can act on.
//!
//! ## Decision Flow
//! ```text
//! station record (fresh) ──► current asset, current ssid/band
//!        │
//!        ▼
//! target asset status ──► advertised BSS for (ssid, band)
//!        │
//!        ▼
//! SteerCommand{staMac, dstBSSID, dstChannel} ──► CURRENT asset
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The command goes to the asset serving the station, never the target;
//!   the target is only consulted for topology
//!
//! ## Last Modified
//! v0.1.0 - Initial steering engine

use std::sync::Arc;

use tracing::debug;

use wisp_common::{AssetUid, MacAddress};
use wisp_core::protocol::SteerCommand;

use crate::error::{Result, ServerError};
use crate::services::StatusAggregator;

/// Resolved steering decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SteerDecision {
    /// Asset currently serving the station; receives the command.
    pub via: AssetUid,
    /// Command to send.
    pub command: SteerCommand,
}

/// Steering engine.
pub struct SteeringEngine {
    status: Arc<StatusAggregator>,
}

impl SteeringEngine {
    /// Creates an engine over `status`.
    #[must_use]
    pub fn new(status: Arc<StatusAggregator>) -> Self {
        Self { status }
    }

    /// Decides how to move `sta_mac` onto `target`.
    ///
    /// `target_ssid` and `target_band` default to the station's current
    /// SSID and band.
    ///
    /// # Errors
    /// - `StationUnknown`: no fresh record for the station
    /// - `MissingTopology`: target has no status, or does not advertise
    ///   the SSID on the band
    pub async fn decide(
        &self,
        sta_mac: &MacAddress,
        target: &AssetUid,
        target_ssid: Option<&str>,
        target_band: Option<&str>,
    ) -> Result<SteerDecision> {
        let station = self
            .status
            .get_station(sta_mac)
            .await?
            .ok_or_else(|| ServerError::StationUnknown(sta_mac.clone()))?;

        let ssid = target_ssid
            .map(str::to_string)
            .or_else(|| station.ssid.clone())
            .ok_or_else(|| ServerError::missing_topology(target, "station reports no SSID"))?;
        let band = target_band
            .map(str::to_string)
            .or_else(|| station.band.clone())
            .ok_or_else(|| ServerError::missing_topology(target, "station band unknown"))?;

        let target_status = self
            .status
            .get_asset_status(target)
            .await?
            .ok_or_else(|| ServerError::missing_topology(target, "no status reported"))?;

        if !target_status.ssids.contains_key(&ssid) {
            return Err(ServerError::missing_topology(
                target,
                format!("SSID '{ssid}' not advertised"),
            ));
        }
        let bss = target_status
            .find_bss_on_band(&ssid, &band)
            .ok_or_else(|| ServerError::missing_topology(target, format!("SSID '{ssid}' not on band {band}")))?;

        debug!(
            sta = %sta_mac,
            via = %station.asset_uid,
            target = %target,
            bssid = %bss.bssid,
            channel = bss.channel,
            "Steering decision"
        );

        Ok(SteerDecision {
            via: station.asset_uid,
            command: SteerCommand {
                sta_mac: sta_mac.clone(),
                dst_bssid: bss.bssid.clone(),
                dst_channel: bss.channel,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use std::time::Duration;
    use wisp_common::TunnelPublicKey;
    use wisp_core::protocol::StatusReport;

    use crate::management::{HashStore, MemoryStore};
    use crate::services::IdentityRegistry;

    async fn engine() -> SteeringEngine {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn HashStore>;
        let identity = Arc::new(IdentityRegistry::new());
        identity.register_asset(&"ap-1".into(), &TunnelPublicKey::from_bytes([1; 32]));
        identity.register_asset(&"ap-2".into(), &TunnelPublicKey::from_bytes([2; 32]));
        let status = Arc::new(StatusAggregator::new(store, identity, Duration::from_secs(30)));

        let ap1: StatusReport = serde_json::from_value(json!({
            "ssids": {"Guest": [{"intf": "wlan0", "bssid": "B1", "band": "2.4g", "channel": 6}]},
            "stations": [{"mac": "AA:BB:CC:DD:EE:FF", "ssid": "Guest", "intf": "wlan0"}]
        }))
        .unwrap();
        let ap2: StatusReport = serde_json::from_value(json!({
            "ssids": {"Guest": [
                {"intf": "wlan0", "bssid": "B2", "band": "2.4g", "channel": 11},
                {"intf": "wlan1", "bssid": "X", "band": "5g", "channel": 40}
            ]}
        }))
        .unwrap();

        status.record_station_status(&ap1, &"ap-1".into()).await.unwrap();
        status.record_asset_status(&ap1, &"ap-1".into()).await.unwrap();
        status.record_asset_status(&ap2, &"ap-2".into()).await.unwrap();
        SteeringEngine::new(status)
    }

    fn sta() -> MacAddress {
        "AA:BB:CC:DD:EE:FF".parse().unwrap()
    }

    #[tokio::test]
    async fn test_steer_resolves_target_bss_and_routes_via_current() {
        let engine = engine().await;
        let decision = engine
            .decide(&sta(), &"ap-2".into(), Some("Guest"), Some("5g"))
            .await
            .unwrap();

        assert_eq!(decision.via.as_str(), "ap-1");
        assert_eq!(decision.command.dst_bssid, "X");
        assert_eq!(decision.command.dst_channel, 40);
        assert_eq!(decision.command.sta_mac, sta());
    }

    #[tokio::test]
    async fn test_defaults_to_current_ssid_and_band() {
        let engine = engine().await;
        let decision = engine.decide(&sta(), &"ap-2".into(), None, None).await.unwrap();
        assert_eq!(decision.command.dst_bssid, "B2");
        assert_eq!(decision.command.dst_channel, 11);
    }

    #[tokio::test]
    async fn test_missing_ssid_or_band_fails() {
        let engine = engine().await;
        assert!(matches!(
            engine.decide(&sta(), &"ap-2".into(), Some("Office"), Some("5g")).await,
            Err(ServerError::MissingTopology { .. })
        ));
        assert!(matches!(
            engine.decide(&sta(), &"ap-2".into(), Some("Guest"), Some("6g")).await,
            Err(ServerError::MissingTopology { .. })
        ));
        assert!(matches!(
            engine.decide(&sta(), &"ap-9".into(), None, None).await,
            Err(ServerError::MissingTopology { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_station_fails() {
        let engine = engine().await;
        let other: MacAddress = "00:11:22:33:44:55".parse().unwrap();
        assert!(matches!(
            engine.decide(&other, &"ap-2".into(), None, None).await,
            Err(ServerError::StationUnknown(_))
        ));
    }
}
