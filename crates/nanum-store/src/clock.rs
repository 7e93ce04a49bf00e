//! Time source for server-assigned timestamps.
//!
//! Decouples the store from wall-clock time so simulations can script exact
//! timestamps (join at t=8s, messages at t=0,5,10,15) while production uses
//! the system clock.

use std::{
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::Timestamp;

/// Source of server timestamps.
///
/// # Invariants
///
/// - `now()` never returns a value lower than a previous call on the same
///   clock (or any of its clones).
pub trait Clock: Clone + Send + Sync + 'static {
    /// Current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time, clamped so it never runs backwards.
#[derive(Clone, Default)]
pub struct SystemClock {
    last: Arc<AtomicI64>,
}

impl SystemClock {
    /// Create a system clock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        // Clocks set before 1970 read as the epoch.
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));
        let previous = self.last.fetch_max(wall, Ordering::SeqCst);
        Timestamp::from_millis(previous.max(wall))
    }
}

/// Virtual time that only moves when told to.
///
/// Clones share the same time, so a test can hold one handle while the store
/// holds another.
#[derive(Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Clock starting at `start`.
    pub fn starting_at(start: Timestamp) -> Self {
        Self { millis: Arc::new(AtomicI64::new(start.as_millis())) }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    /// Jump to `at`. Earlier instants are ignored so time never goes back.
    pub fn set(&self, at: Timestamp) {
        self.millis.fetch_max(at.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}
