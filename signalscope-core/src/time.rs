//! Millisecond Clock
//!
//! All time-to-live state in the tracker (active source label, read-chain
//! cache, flash expiry, heatmap window) is expressed in wall-clock
//! milliseconds and invalidated lazily on the next read. A small clock
//! abstraction keeps that logic testable: production code uses the system
//! clock, tests use a manually advanced one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A millisecond clock, cheap to clone and share between components.
#[derive(Clone)]
pub struct Clock {
    inner: ClockInner,
}

#[derive(Clone)]
enum ClockInner {
    System,
    Manual(Arc<AtomicU64>),
}

impl Clock {
    /// The real system clock (milliseconds since the Unix epoch).
    pub fn system() -> Self {
        Self {
            inner: ClockInner::System,
        }
    }

    /// A manually advanced clock starting at `start_ms`.
    ///
    /// Clones share the same underlying counter, so advancing any clone
    /// advances all of them.
    pub fn manual(start_ms: u64) -> Self {
        Self {
            inner: ClockInner::Manual(Arc::new(AtomicU64::new(start_ms))),
        }
    }

    /// Current time in milliseconds.
    pub fn now_ms(&self) -> u64 {
        match &self.inner {
            ClockInner::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            ClockInner::Manual(now) => now.load(Ordering::SeqCst),
        }
    }

    /// Advance a manual clock by `ms`. Has no effect on the system clock.
    pub fn advance(&self, ms: u64) {
        if let ClockInner::Manual(now) = &self.inner {
            now.fetch_add(ms, Ordering::SeqCst);
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}
