//! Wall-clock helpers.
//!
//! The scheduler keeps every timestamp as milliseconds since the Unix epoch so
//! records stay comparable across instances and serialize as plain integers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Convert a duration in whole seconds to milliseconds.
#[must_use]
pub const fn secs_to_ms(secs: u64) -> u128 {
    secs as u128 * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_is_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(a > 0);
        assert!(b >= a);
    }

    #[test]
    fn test_secs_to_ms() {
        assert_eq!(secs_to_ms(0), 0);
        assert_eq!(secs_to_ms(10), 10_000);
    }
}
