// ============================================
// File: crates/wisp-server/src/services/push.rs
// ============================================
//! # Push Scheduler
//!
//! ## Creation Reason
//! Configuration changes arrive in bursts (template edit plus override
//! edit, registration plus apply). Each uid gets one debounce timer; a new
//! request replaces the pending one, so a burst yields a single push once
//! the uid has been quiet for the debounce window.
//!
//! ## Timer Lifecycle
//! ```text
//! schedule(uid) ──► abort previous timer ──► spawn sleep(debounce)
//!                                                   │
//!                                    fired ◄────────┘
//!                                      │
//!                     remove own slot, send uid on ready channel
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Replacing a timer is a single `insert`; the displaced handle is
//!   aborted, whichever caller won the race
//! - A timer only clears its slot if the slot still holds its generation;
//!   a replacement installed meanwhile must survive
//! - `cancel_all` is terminal: later `schedule` calls are no-ops
//!
//! ## Last Modified
//! v0.1.0 - Initial per-uid scheduler

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use wisp_common::AssetUid;

/// Per-uid debounced push timers.
#[derive(Debug)]
pub struct PushScheduler {
    debounce: Duration,
    timers: Arc<DashMap<AssetUid, (u64, JoinHandle<()>)>>,
    generation: AtomicU64,
    stopped: AtomicBool,
    ready_tx: mpsc::UnboundedSender<AssetUid>,
}

impl PushScheduler {
    /// Creates a scheduler and the channel fired uids are delivered on.
    #[must_use]
    pub fn new(debounce: Duration) -> (Self, mpsc::UnboundedReceiver<AssetUid>) {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            debounce,
            timers: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            ready_tx,
        };
        (scheduler, ready_rx)
    }

    /// Schedules a push for `uid`, replacing any pending one.
    ///
    /// Must be called from within a tokio runtime. Does nothing after
    /// [`PushScheduler::cancel_all`].
    pub fn schedule(&self, uid: &AssetUid) {
        if self.stopped.load(Ordering::SeqCst) {
            trace!(uid = %uid, "Push not scheduled, scheduler stopped");
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let ready_tx = self.ready_tx.clone();
        let debounce = self.debounce;
        let fired_uid = uid.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            timers.remove_if(&fired_uid, |_, (g, _)| *g == generation);
            trace!(uid = %fired_uid, "Push timer fired");
            if ready_tx.send(fired_uid).is_err() {
                debug!("Push timer fired after scheduler consumer stopped");
            }
        });

        if let Some((_, previous)) = self.timers.insert(uid.clone(), (generation, handle)) {
            previous.abort();
            trace!(uid = %uid, "Pending push replaced");
        }

        // cancel_all may have swept the map between the check above and the insert
        if self.stopped.load(Ordering::SeqCst) {
            self.cancel(uid);
        }
    }

    /// Cancels the pending push for `uid`, if any.
    pub fn cancel(&self, uid: &AssetUid) {
        if let Some((_, (_, handle))) = self.timers.remove(uid) {
            handle.abort();
            debug!(uid = %uid, "Pending push cancelled");
        }
    }

    /// Cancels every pending push and stops accepting new ones.
    pub fn cancel_all(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let uids: Vec<AssetUid> = self.timers.iter().map(|e| e.key().clone()).collect();
        for uid in &uids {
            if let Some((_, (_, handle))) = self.timers.remove(uid) {
                handle.abort();
            }
        }
        debug!(cancelled = uids.len(), "All pending pushes cancelled");
    }

    /// Returns `true` if a push for `uid` is pending.
    #[must_use]
    pub fn is_pending(&self, uid: &AssetUid) -> bool {
        self.timers.contains_key(uid)
    }

    /// Number of pending pushes.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.timers.len()
    }
}
