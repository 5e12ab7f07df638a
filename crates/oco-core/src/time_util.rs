//! Wall-clock helpers.
//!
//! The exchange speaks milliseconds since the Unix epoch everywhere (order
//! timestamps, `serverTime`, registry `savedAt`), so that is the unit exposed
//! here.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Current time as signed milliseconds, convenient for offset arithmetic.
#[inline]
pub fn now_ms_i64() -> i64 {
    now_ms() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_after_2020() {
        assert!(now_ms() > 1_577_836_800_000);
        assert!(now_ms_i64() > 1_577_836_800_000);
    }
}
