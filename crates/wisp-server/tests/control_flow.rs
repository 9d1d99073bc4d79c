//! End-to-end control flow over mock transports.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use wisp_common::{AssetUid, TunnelPublicKey};
use wisp_server::management::{HashStore, MemoryStore, PeerTable, StaticPeerTable};
use wisp_server::server::{supervise_listeners, ListenerPair, RestartBackoff};
use wisp_server::services::ControllerTunnel;
use wisp_server::{Controller, ControllerSettings};
use wisp_transport::{MockTransport, Transport};

const PUBLIC_SRC: &str = "203.0.113.9:41000";

struct Fleet {
    controller: Arc<Controller>,
    peers: Arc<StaticPeerTable>,
    control: Arc<MockTransport>,
    raw: Arc<MockTransport>,
    shutdown: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Fleet {
    async fn start() -> Self {
        let peers = Arc::new(StaticPeerTable::default());
        let tunnel = ControllerTunnel {
            public_key: Some(key(100)),
            controller_ip: "10.8.0.1".parse().unwrap(),
            listen_port: 51820,
            endpoint: Some("vpn.example.net:51820".into()),
        };
        let (controller, ready) = Controller::open(
            ControllerSettings::default(),
            Arc::new(MemoryStore::new()) as Arc<dyn HashStore>,
            Arc::clone(&peers) as Arc<dyn PeerTable>,
            tunnel,
        )
        .await
        .unwrap();
        let controller = Arc::new(controller);

        let control = Arc::new(MockTransport::new("10.8.0.1:7700".parse().unwrap()));
        let raw = Arc::new(MockTransport::new("0.0.0.0:7701".parse().unwrap()));
        let (shutdown, _) = broadcast::channel(1);

        let bind = {
            let control = Arc::clone(&control);
            let raw = Arc::clone(&raw);
            move || -> wisp_server::Result<ListenerPair> {
                Ok((
                    Arc::clone(&control) as Arc<dyn Transport>,
                    Arc::clone(&raw) as Arc<dyn Transport>,
                ))
            }
        };
        let channel = Arc::clone(controller.channel());
        let tasks = vec![
            tokio::spawn(supervise_listeners(
                Arc::clone(&channel),
                bind,
                RestartBackoff::new(Duration::from_millis(500), Duration::from_secs(30)),
                shutdown.subscribe(),
            )),
            tokio::spawn(Arc::clone(&channel).run_push_worker(ready, shutdown.subscribe())),
        ];

        let fleet = Self {
            controller,
            peers,
            control,
            raw,
            shutdown,
            tasks,
        };
        fleet.settle(Duration::from_millis(10)).await;
        fleet
    }

    async fn settle(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Raw registration twice around peer adoption, as an asset retrying would.
    async fn onboard(&self, uid: &str, k: TunnelPublicKey, last_octet: u8) {
        let register = json!({"type": "raw_auth_register", "uid": uid, "publicKey": k.as_str()});
        self.raw.inject(register.to_string(), PUBLIC_SRC.parse().unwrap());
        self.settle(Duration::from_millis(10)).await;

        self.peers.adopt(k, IpAddr::from([10, 8, 0, last_octet]));
        self.controller.refresh_peers().await.unwrap();

        self.raw.inject(register.to_string(), PUBLIC_SRC.parse().unwrap());
        self.settle(Duration::from_millis(10)).await;
    }

    fn status_from(&self, last_octet: u8, report: &Value) {
        self.control
            .inject(report.to_string(), asset(last_octet, 40000));
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        for task in self.tasks {
            task.await.unwrap();
        }
        self.controller.shutdown();
    }
}

fn key(byte: u8) -> TunnelPublicKey {
    TunnelPublicKey::from_bytes([byte; 32])
}

fn asset(last_octet: u8, port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::from([10, 8, 0, last_octet]), port)
}

fn decode_all(datagrams: Vec<Vec<u8>>) -> Vec<Value> {
    datagrams
        .iter()
        .map(|d| serde_json::from_slice(d).unwrap())
        .collect()
}

fn of_type(messages: &[Value], msg_type: &str) -> Vec<Value> {
    messages
        .iter()
        .filter(|m| m["type"] == msg_type)
        .cloned()
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_onboarding_status_and_steer() {
    let fleet = Fleet::start().await;

    // first raw registration: placeholder entry only
    let register = json!({"type": "raw_auth_register", "uid": "ap-1", "publicKey": key(1).as_str()});
    fleet.raw.inject(register.to_string(), PUBLIC_SRC.parse().unwrap());
    fleet.settle(Duration::from_millis(10)).await;
    assert!(fleet.raw.sent().is_empty());
    assert!(fleet.controller.identity().contains("ap-1"));
    let doc = fleet.controller.config().active_config().await;
    assert_eq!(doc.assets[&AssetUid::from("ap-1")].template_id.as_deref(), Some("default_ap"));

    // adoption by the provisioner, then the asset retries
    fleet.peers.adopt(key(1), IpAddr::from([10, 8, 0, 7]));
    fleet.controller.refresh_peers().await.unwrap();
    fleet.raw.inject(register.to_string(), PUBLIC_SRC.parse().unwrap());
    fleet.settle(Duration::from_millis(10)).await;

    let grants = decode_all(fleet.raw.sent_to(PUBLIC_SRC.parse().unwrap()));
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0]["type"], "raw_auth_grant");
    assert_eq!(grants[0]["tunnelIP"], "10.8.0.7");
    assert_eq!(grants[0]["controllerIP"], "10.8.0.1");
    assert_eq!(grants[0]["publicKey"], key(100).as_str());
    assert_eq!(grants[0]["endpoint"], "vpn.example.net:51820");

    // the placeholder commit is pushed once the debounce window passes
    fleet.settle(Duration::from_secs(3)).await;
    let to_ap1 = decode_all(fleet.control.sent_to(asset(7, 7700)));
    let pushes = of_type(&to_ap1, "push_config");
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0]["config"]["deviceType"], "ap");
    assert_eq!(pushes[0]["config"]["publicKey"], key(1).as_str());
    assert_eq!(pushes[0]["tunnel"]["publicKey"], key(100).as_str());
    assert_eq!(pushes[0]["tunnel"]["tunnelIP"], "10.8.0.7");

    fleet.onboard("ap-2", key(2), 8).await;

    fleet.status_from(
        7,
        &json!({
            "type": "status",
            "mac": "02:00:00:00:00:01",
            "ssids": {"Guest": [{"intf": "wlan0", "bssid": "B1", "band": "2.4g", "channel": 6}]},
            "stations": [{"mac": "aa:bb:cc:dd:ee:ff", "ssid": "Guest", "intf": "wlan0", "rssi": -61}]
        }),
    );
    fleet.status_from(
        8,
        &json!({
            "type": "status",
            "ssids": {"Guest": [
                {"intf": "wlan0", "bssid": "B2", "band": "2.4g", "channel": 11},
                {"intf": "wlan1", "bssid": "X", "band": "5g", "channel": 40}
            ]}
        }),
    );
    fleet.settle(Duration::from_millis(10)).await;

    let stations = fleet.controller.stations().await.unwrap();
    assert_eq!(stations.len(), 1);
    assert_eq!(stations[0].asset_uid.as_str(), "ap-1");
    assert_eq!(stations[0].bssid.as_deref(), Some("B1"));
    assert_eq!(fleet.controller.asset_statuses().await.unwrap().len(), 2);

    fleet.control.take_sent();
    let command = fleet
        .controller
        .steer("AA:BB:CC:DD:EE:FF", "ap-2", Some("Guest"), Some("5g"))
        .await
        .unwrap();
    assert_eq!(command.dst_bssid, "X");

    let sent = fleet.control.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, asset(7, 7700));
    let steer: Value = serde_json::from_slice(&sent[0].0).unwrap();
    assert_eq!(
        steer,
        json!({"type": "steer", "staMac": "AA:BB:CC:DD:EE:FF", "dstBSSID": "X", "dstChannel": 40})
    );

    // SSID the target does not advertise: nothing sent
    assert!(fleet
        .controller
        .steer("AA:BB:CC:DD:EE:FF", "ap-2", Some("Office"), None)
        .await
        .is_err());
    assert!(fleet.control.sent().is_empty());

    fleet.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_unknown_address_is_dropped() {
    let fleet = Fleet::start().await;
    fleet.onboard("ap-1", key(1), 7).await;
    fleet.settle(Duration::from_secs(3)).await;
    fleet.control.take_sent();

    fleet.status_from(
        99,
        &json!({
            "type": "status",
            "stations": [{"mac": "aa:bb:cc:dd:ee:ff", "ssid": "Guest", "intf": "wlan0"}]
        }),
    );
    fleet
        .control
        .inject(r#"{"type":"pull_config"}"#, asset(99, 40000));
    fleet.settle(Duration::from_secs(3)).await;

    assert!(fleet.controller.stations().await.unwrap().is_empty());
    assert_eq!(fleet.controller.asset_statuses().await.unwrap().len(), 0);
    assert_eq!(fleet.controller.scheduler().pending_count(), 0);
    assert!(fleet.control.sent().is_empty());

    fleet.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_writes_pushes_latest_once() {
    let fleet = Fleet::start().await;
    fleet.onboard("ap-1", key(1), 7).await;
    fleet.settle(Duration::from_secs(3)).await;
    fleet.control.take_sent();

    let uid = AssetUid::from("ap-1");
    let effective = fleet.controller.effective();
    effective
        .set(&uid, json!({"publicKey": key(1).as_str(), "txPower": 14}))
        .await
        .unwrap();
    fleet.settle(Duration::from_millis(500)).await;
    effective
        .set(&uid, json!({"publicKey": key(1).as_str(), "txPower": 20}))
        .await
        .unwrap();
    fleet.settle(Duration::from_secs(3)).await;

    let pushes = of_type(&decode_all(fleet.control.sent_to(asset(7, 7700))), "push_config");
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0]["config"]["txPower"], 20);

    fleet.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_pull_config_and_heartbeat() {
    let fleet = Fleet::start().await;
    fleet.onboard("ap-1", key(1), 7).await;
    fleet.settle(Duration::from_secs(3)).await;
    fleet.control.take_sent();

    fleet
        .control
        .inject(r#"{"type":"pull_config"}"#, asset(7, 40000));
    fleet.settle(Duration::from_secs(3)).await;
    let pushes = of_type(&decode_all(fleet.control.sent_to(asset(7, 7700))), "push_config");
    assert_eq!(pushes.len(), 1);

    let ts = fleet
        .controller
        .effective()
        .timestamp_of(&"ap-1".into())
        .unwrap();
    assert_eq!(fleet.controller.channel().send_heartbeats().await, 1);
    let heartbeats = of_type(&decode_all(fleet.control.sent_to(asset(7, 7700))), "heartbeat");
    assert_eq!(heartbeats, vec![json!({"type": "heartbeat", "ts": ts.as_millis()})]);

    fleet.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_push_after_teardown() {
    let fleet = Fleet::start().await;
    fleet.onboard("ap-1", key(1), 7).await;
    fleet.settle(Duration::from_secs(3)).await;

    let controller = Arc::clone(&fleet.controller);
    let control = Arc::clone(&fleet.control);
    fleet.stop().await;
    control.take_sent();

    // a datagram task that was already running when the listeners stopped
    controller
        .channel()
        .handle_control_datagram(br#"{"type":"pull_config"}"#, asset(7, 40000))
        .await;
    controller
        .effective()
        .set(&"ap-1".into(), json!({"publicKey": key(1).as_str(), "txPower": 9}))
        .await
        .unwrap();
    assert_eq!(controller.scheduler().pending_count(), 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(control.sent().is_empty());
}
