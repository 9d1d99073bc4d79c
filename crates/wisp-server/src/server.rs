// ============================================
// File: crates/wisp-server/src/server.rs
// ============================================
//! # Server Orchestrator
//!
//! ## Creation Reason
//! Builds the controller from configuration and runs its tasks until
//! shutdown.
//!
//! ## Main Functionality
//! - `Server`: lifecycle, task spawning, graceful shutdown
//! - `supervise_listeners`: binds both listeners, hands each datagram to
//!   its own task, rebinds both after any socket failure
//! - `RestartBackoff`: bounded exponential backoff with jitter
//!
//! ## Task Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Server                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐ ┌──────────┐ ┌────────────┐ ┌──────────┐  │
//! │  │  Listener    │ │Heartbeat │ │Peer refresh│ │  Push    │  │
//! │  │  supervisor  │ │  (30s)   │ │   (10s)    │ │  worker  │  │
//! │  └──────┬───────┘ └────┬─────┘ └─────┬──────┘ └────┬─────┘  │
//! │         │ task per     │             │             │        │
//! │         ▼ datagram     ▼             ▼             ▼        │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │          Controller (services + ControlChannel)      │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Listener Recovery
//! ```text
//! bind both ──ok──► receive loop ──socket error──► detach + shutdown both
//!    ▲  │                                              │
//!    │  └─fail──────────────┐                          │
//!    │                      ▼                          ▼
//!    └──────────── sleep(backoff + jitter) ◄───────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Restarts are unbounded in count; only the delay is capped
//! - Shutdown broadcasts first, joins the tasks, then cancels push timers;
//!   the scheduler refuses new timers after that, so datagram tasks still
//!   in flight cannot arm one
//!
//! ## Last Modified
//! v0.1.0 - Initial server implementation

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use wisp_common::AssetUid;
use wisp_transport::{Transport, UdpTransport, MAX_DATAGRAM_SIZE};

use crate::config::ServerConfig;
use crate::controller::{Controller, ControllerSettings};
use crate::error::{Result, ServerError};
use crate::handlers::ControlChannel;
use crate::management::{
    deriver_for, load_controller_key, FilePeerTable, HashStore, JsonFileStore, PeerTable,
};
use crate::services::ControllerTunnel;

/// Bound control and raw transports.
pub type ListenerPair = (Arc<dyn Transport>, Arc<dyn Transport>);

// ============================================
// RestartBackoff
// ============================================

/// Exponential rebind delay with up to 25% added jitter.
#[derive(Debug, Clone)]
pub struct RestartBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl RestartBackoff {
    /// Creates a backoff starting at `initial`, capped at `max`.
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Returns the next delay and doubles the base for the one after.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = (self.current * 2).min(self.max);
        let spread = u64::try_from(base.as_millis() / 4).unwrap_or(u64::MAX);
        let jitter = if spread == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=spread)
        };
        base + Duration::from_millis(jitter)
    }

    /// Back to the initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// Delay ceiling.
    #[must_use]
    pub const fn max(&self) -> Duration {
        self.max
    }
}

// ============================================
// Listener supervision
// ============================================

/// Keeps both listeners bound until shutdown.
///
/// `bind` is called for every (re)start. A session that stayed up longer
/// than the backoff ceiling resets the backoff.
pub async fn supervise_listeners<B>(
    channel: Arc<ControlChannel>,
    mut bind: B,
    mut backoff: RestartBackoff,
    mut shutdown: broadcast::Receiver<()>,
) where
    B: FnMut() -> Result<ListenerPair> + Send,
{
    loop {
        match bind() {
            Ok((control, raw)) => {
                channel.attach(Arc::clone(&control), Arc::clone(&raw));
                info!(
                    control = %display_addr(control.as_ref()),
                    raw = %display_addr(raw.as_ref()),
                    "Listeners bound"
                );

                let started = Instant::now();
                let failure = receive_loop(&channel, control.as_ref(), raw.as_ref(), &mut shutdown).await;

                for transport in channel.detach() {
                    if let Err(e) = transport.shutdown().await {
                        debug!(error = %e, "Listener shutdown error");
                    }
                }

                let Some(e) = failure else {
                    debug!("Listener supervisor stopping");
                    return;
                };
                if e.should_restart_listeners() {
                    error!(error = %e, "Listener failed, restarting both listeners");
                } else {
                    warn!(error = %e, "Listener stopped unexpectedly, restarting both listeners");
                }
                if started.elapsed() > backoff.max() {
                    backoff.reset();
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to bind listeners");
            }
        }

        let delay = backoff.next_delay();
        debug!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "Rebinding listeners after delay");
        tokio::select! {
            _ = shutdown.recv() => {
                debug!("Listener supervisor stopping");
                return;
            }
            () = tokio::time::sleep(delay) => {}
        }
    }
}

/// Receives from both listeners until shutdown (`None`) or a socket
/// error (`Some`).
async fn receive_loop(
    channel: &Arc<ControlChannel>,
    control: &dyn Transport,
    raw: &dyn Transport,
    shutdown: &mut broadcast::Receiver<()>,
) -> Option<ServerError> {
    let mut control_buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut raw_buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            _ = shutdown.recv() => return None,
            result = control.recv(&mut control_buf) => match result {
                Ok((len, source)) => {
                    let payload = control_buf[..len].to_vec();
                    let channel = Arc::clone(channel);
                    tokio::spawn(async move {
                        channel.handle_control_datagram(&payload, source.addr).await;
                    });
                }
                Err(e) => return Some(e.into()),
            },
            result = raw.recv(&mut raw_buf) => match result {
                Ok((len, source)) => {
                    let payload = raw_buf[..len].to_vec();
                    let channel = Arc::clone(channel);
                    tokio::spawn(async move {
                        channel.handle_raw_datagram(&payload, source.addr).await;
                    });
                }
                Err(e) => return Some(e.into()),
            },
        }
    }
}

fn display_addr(transport: &dyn Transport) -> String {
    transport
        .local_addr()
        .map_or_else(|_| "unknown".to_string(), |a| a.to_string())
}

/// Binds UDP listeners on the two addresses.
///
/// # Errors
/// Fails if either bind fails.
pub fn bind_udp(control: SocketAddr, raw: SocketAddr) -> Result<ListenerPair> {
    let control: Arc<dyn Transport> = Arc::new(UdpTransport::bind_addr(control)?);
    let raw: Arc<dyn Transport> = Arc::new(UdpTransport::bind_addr(raw)?);
    Ok((control, raw))
}

// ============================================
// Server
// ============================================

/// Main wisp controller server.
///
/// # Lifecycle
/// 1. Create with `Server::new(config)`
/// 2. Start with `server.run().await`
/// 3. Shutdown via Ctrl+C or [`Server::shutdown`]
pub struct Server {
    /// Server configuration.
    config: ServerConfig,
    /// Shutdown flag.
    shutdown: Arc<AtomicBool>,
    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Creates a new server instance.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Runs the server until shutdown.
    ///
    /// # Errors
    /// Returns error if controller state cannot be restored.
    pub async fn run(&self) -> Result<()> {
        info!("Starting wisp controller v{}", env!("CARGO_PKG_VERSION"));

        let shutdown_rx = self.shutdown_tx.subscribe();
        let (controller, ready) = self.init_controller().await?;
        let controller = Arc::new(controller);
        let channel = Arc::clone(controller.channel());

        let mut tasks: Vec<(&str, JoinHandle<()>)> = Vec::new();

        let control_addr = self.config.control_addr();
        let raw_addr = self.config.network.raw_auth_addr;
        let backoff = RestartBackoff::new(
            self.config.control.restart_backoff_initial(),
            self.config.control.restart_backoff_max(),
        );
        tasks.push((
            "listeners",
            tokio::spawn(supervise_listeners(
                Arc::clone(&channel),
                move || bind_udp(control_addr, raw_addr),
                backoff,
                self.shutdown_tx.subscribe(),
            )),
        ));

        tasks.push(("heartbeat", self.spawn_heartbeat_task(Arc::clone(&channel))));
        tasks.push(("peer_refresh", self.spawn_peer_refresh_task(Arc::clone(&controller))));
        tasks.push((
            "push_worker",
            tokio::spawn(Arc::clone(&channel).run_push_worker(ready, self.shutdown_tx.subscribe())),
        ));

        info!(
            control = %control_addr,
            raw = %raw_addr,
            "Controller started"
        );

        self.wait_for_shutdown(shutdown_rx).await;

        info!("Shutting down controller...");
        self.shutdown();

        for (name, task) in tasks {
            match tokio::time::timeout(Duration::from_secs(5), task).await {
                Ok(Ok(())) => debug!("Task '{}' completed", name),
                Ok(Err(e)) => warn!("Task '{}' failed: {}", name, e),
                Err(_) => warn!("Task '{}' timed out during shutdown", name),
            }
        }

        // listeners are down; datagram tasks still in flight cannot schedule past this
        controller.shutdown();

        for transport in channel.detach() {
            if let Err(e) = transport.shutdown().await {
                warn!("Listener shutdown error: {}", e);
            }
        }

        info!("Controller shutdown complete");
        Ok(())
    }

    /// Restores controller state from the configured locations.
    async fn init_controller(&self) -> Result<(Controller, mpsc::UnboundedReceiver<AssetUid>)> {
        let store: Arc<dyn HashStore> = Arc::new(JsonFileStore::open(&self.config.storage.data_dir).await?);
        let peers: Arc<dyn PeerTable> = Arc::new(FilePeerTable::new(&self.config.tunnel.peers_file));

        let deriver = deriver_for(&self.config.tunnel.pubkey_command)?;
        let (_, public_key) = load_controller_key(&self.config.tunnel.private_key_file, deriver.as_ref()).await;

        let tunnel = ControllerTunnel {
            public_key,
            controller_ip: self.config.tunnel.controller_ip,
            listen_port: self.config.tunnel.listen_port,
            endpoint: self.config.tunnel.public_endpoint.clone(),
        };

        Controller::open(ControllerSettings::from_config(&self.config), store, peers, tunnel).await
    }

    /// Spawns the periodic heartbeat task.
    fn spawn_heartbeat_task(&self, channel: Arc<ControlChannel>) -> JoinHandle<()> {
        let shutdown = Arc::clone(&self.shutdown);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = self.config.control.heartbeat_interval();

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval_at(Instant::now() + period, period);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Heartbeat task received shutdown signal");
                        break;
                    }
                    _ = interval_timer.tick() => {
                        if shutdown.load(Ordering::SeqCst) {
                            break;
                        }
                        channel.send_heartbeats().await;
                    }
                }
            }

            debug!("Heartbeat task exiting");
        })
    }

    /// Spawns the peer table refresh task.
    fn spawn_peer_refresh_task(&self, controller: Arc<Controller>) -> JoinHandle<()> {
        let shutdown = Arc::clone(&self.shutdown);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = self.config.control.peer_refresh();

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval_at(Instant::now() + period, period);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Peer refresh task received shutdown signal");
                        break;
                    }
                    _ = interval_timer.tick() => {
                        if shutdown.load(Ordering::SeqCst) {
                            break;
                        }
                        match controller.refresh_peers().await {
                            Ok(peers) => debug!(peers, "Peer table refreshed"),
                            Err(e) => warn!(error = %e, "Peer table refresh failed"),
                        }
                    }
                }
            }

            debug!("Peer refresh task exiting");
        })
    }

    /// Waits for Ctrl+C or a programmatic shutdown.
    async fn wait_for_shutdown(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("Received shutdown signal"),
                Err(e) => {
                    error!(error = %e, "Failed to listen for Ctrl+C, waiting for programmatic shutdown");
                    let _ = shutdown_rx.recv().await;
                }
            },
            _ = shutdown_rx.recv() => info!("Shutdown requested"),
        }
    }

    /// Triggers server shutdown programmatically.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("control_addr", &self.config.control_addr())
            .field("raw_auth_addr", &self.config.network.raw_auth_addr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use wisp_transport::{MockTransport, TransportError};

    use crate::management::{MemoryStore, StaticPeerTable};

    #[test]
    fn test_backoff_doubles_to_ceiling() {
        let mut backoff = RestartBackoff::new(Duration::from_millis(500), Duration::from_secs(2));
        let delays: Vec<Duration> = (0..5).map(|_| backoff.next_delay()).collect();

        let bases = [500, 1000, 2000, 2000, 2000];
        for (delay, base) in delays.iter().zip(bases) {
            let base = Duration::from_millis(base);
            assert!(*delay >= base && *delay <= base + base / 4, "{delay:?} vs {base:?}");
        }

        backoff.reset();
        assert!(backoff.next_delay() < Duration::from_millis(700));
    }

    async fn channel() -> Arc<ControlChannel> {
        let tunnel = ControllerTunnel {
            public_key: None,
            controller_ip: "10.8.0.1".parse().unwrap(),
            listen_port: 51820,
            endpoint: None,
        };
        let (controller, _ready) = Controller::open(
            ControllerSettings::default(),
            Arc::new(MemoryStore::new()) as Arc<dyn HashStore>,
            Arc::new(StaticPeerTable::default()) as Arc<dyn PeerTable>,
            tunnel,
        )
        .await
        .unwrap();
        Arc::clone(controller.channel())
    }

    #[tokio::test(start_paused = true)]
    async fn test_socket_error_rebinds_both_listeners() {
        let channel = channel().await;
        let binds = Arc::new(AtomicUsize::new(0));
        let first_control = Arc::new(MockTransport::new("10.8.0.1:7700".parse().unwrap()));
        first_control.fail_next_recv("connection reset");

        let bind = {
            let binds = Arc::clone(&binds);
            let first_control = Arc::clone(&first_control);
            move || -> Result<ListenerPair> {
                let n = binds.fetch_add(1, Ordering::SeqCst);
                let control: Arc<dyn Transport> = if n == 0 {
                    Arc::clone(&first_control) as Arc<dyn Transport>
                } else {
                    Arc::new(MockTransport::new("10.8.0.1:7700".parse().unwrap()))
                };
                let raw: Arc<dyn Transport> = Arc::new(MockTransport::new("0.0.0.0:7701".parse().unwrap()));
                Ok((control, raw))
            }
        };

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(supervise_listeners(
            Arc::clone(&channel),
            bind,
            RestartBackoff::new(Duration::from_millis(500), Duration::from_secs(30)),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(binds.load(Ordering::SeqCst), 2);
        assert!(!first_control.is_active());
        assert!(channel.is_attached());

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
        assert!(!channel.is_attached());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_failure_retries() {
        let channel = channel().await;
        let attempts = Arc::new(AtomicUsize::new(0));
        let bind = {
            let attempts = Arc::clone(&attempts);
            move || -> Result<ListenerPair> {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    return Err(TransportError::BindFailed {
                        addr: "10.8.0.1:7700".parse().unwrap(),
                        source: std::io::Error::from(std::io::ErrorKind::AddrNotAvailable),
                    }
                    .into());
                }
                let control: Arc<dyn Transport> = Arc::new(MockTransport::new("10.8.0.1:7700".parse().unwrap()));
                let raw: Arc<dyn Transport> = Arc::new(MockTransport::new("0.0.0.0:7701".parse().unwrap()));
                Ok((control, raw))
            }
        };

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(supervise_listeners(
            Arc::clone(&channel),
            bind,
            RestartBackoff::new(Duration::from_millis(100), Duration::from_secs(1)),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(channel.is_attached());

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
