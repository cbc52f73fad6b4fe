//! Write timestamps.

use std::sync::atomic::{AtomicI64, Ordering};

use cachet_core::TimestampMs;
use chrono::Utc;

/// Wall-clock milliseconds that never repeat or go backwards.
///
/// Two writes in the same millisecond still get distinct timestamps, which
/// keeps the eviction sweep's "top N" cut exact.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next timestamp: the current time, or one past the previous timestamp
    /// if the clock has not moved on.
    pub fn now_ms(&self) -> TimestampMs {
        let wall = Utc::now().timestamp_millis();
        let mut last = self.last.load(Ordering::Acquire);
        loop {
            let next = wall.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(observed) => last = observed,
            }
        }
    }
}
