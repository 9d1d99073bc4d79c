// ============================================
// File: crates/wisp-common/src/time.rs
// ============================================
//! # Time Utilities
//!
//! ## Creation Reason
//! Configuration documents carry a controller-assigned `_ts` and status
//! records carry an observation stamp. Both are wall-clock milliseconds
//! since the Unix epoch so they survive persistence and restarts, which
//! rules out `Instant`.
//!
//! ## Main Functionality
//! - `Timestamp`: Unix timestamp in milliseconds
//! - `unix_timestamp_millis`: current wall-clock time
//!
//! ## Last Modified
//! v0.1.0 - Initial time utilities

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Unix timestamp in milliseconds.
///
/// # Example
/// ```
/// use wisp_common::time::Timestamp;
/// use std::time::Duration;
///
/// let now = Timestamp::now();
/// let earlier = now.saturating_sub(Duration::from_secs(31));
/// assert!(earlier.is_older_than(Duration::from_secs(30)));
/// assert!(!now.is_older_than(Duration::from_secs(30)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from Unix milliseconds.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Creates a timestamp for the current time.
    #[must_use]
    pub fn now() -> Self {
        Self(unix_timestamp_millis())
    }

    /// Returns the Unix timestamp in milliseconds.
    #[must_use]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Time elapsed since this timestamp. Future timestamps yield zero.
    #[must_use]
    pub fn age(&self) -> Duration {
        let diff = unix_timestamp_millis().saturating_sub(self.0);
        Duration::from_millis(u64::try_from(diff).unwrap_or(0))
    }

    /// Returns `true` if more than `window` has passed since this timestamp.
    #[must_use]
    pub fn is_older_than(&self, window: Duration) -> bool {
        self.age() > window
    }

    /// Returns a timestamp `duration` earlier than this one.
    #[must_use]
    pub fn saturating_sub(&self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_sub(millis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Timestamp {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

impl From<Timestamp> for i64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

/// Returns the current Unix timestamp in milliseconds.
///
/// A clock set before the epoch reads as zero.
#[must_use]
pub fn unix_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
