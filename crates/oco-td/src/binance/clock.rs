//! Local-to-exchange clock offset.
//!
//! Each sample brackets one `GET /api/v3/time` call with local timestamps and
//! assumes the server stamped the response halfway through the round trip.
//! The estimate is the median of the per-sample offsets after dropping the
//! lowest and highest sample (when there are at least five).

use std::sync::atomic::{AtomicI64, Ordering};

use oco_core::time_util::now_ms_i64;

/// Fewest samples a measurement will take.
pub const MIN_CLOCK_SAMPLES: usize = 3;

/// One round trip against the server time endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSample {
    pub local_before_ms: i64,
    pub server_ms: i64,
    pub local_after_ms: i64,
}

impl ClockSample {
    pub fn offset_ms(&self) -> i64 {
        let midpoint = self.local_before_ms + (self.local_after_ms - self.local_before_ms) / 2;
        self.server_ms - midpoint
    }
}

/// Median offset over outlier-trimmed samples. `None` for an empty slice.
pub fn estimate_offset(samples: &[ClockSample]) -> Option<i64> {
    let mut offsets: Vec<i64> = samples.iter().map(ClockSample::offset_ms).collect();
    if offsets.is_empty() {
        return None;
    }
    offsets.sort_unstable();
    let trimmed = if offsets.len() >= 5 { &offsets[1..offsets.len() - 1] } else { &offsets[..] };
    let mid = trimmed.len() / 2;
    Some(if trimmed.len() % 2 == 0 { (trimmed[mid - 1] + trimmed[mid]) / 2 } else { trimmed[mid] })
}

/// Clock offset owned by one client instance.
#[derive(Debug, Default)]
pub struct ClockSync {
    offset_ms: AtomicI64,
}

impl ClockSync {
    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::Relaxed)
    }

    pub fn set_offset_ms(&self, offset: i64) {
        self.offset_ms.store(offset, Ordering::Relaxed);
    }

    /// Local time corrected to the exchange clock.
    pub fn now_ms(&self) -> i64 {
        now_ms_i64() + self.offset_ms()
    }
}
