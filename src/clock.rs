// Wall clock and render time helpers

use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::LATENCY_BUFFER_MS;

/// Current wall time in epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// The point on an entity's sender timeline to sample at local time
/// `now_ms`.
///
/// The clock offset maps local time onto the sender's clock; the fixed
/// latency buffer keeps the sample point behind the newest received data
/// so the interpolator stays between samples rather than extrapolating.
pub fn render_time_ms(now_ms: i64, clock_offset_ms: i64) -> i64 {
    now_ms - clock_offset_ms - LATENCY_BUFFER_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_time_subtracts_offset_and_buffer() {
        assert_eq!(render_time_ms(10_000, 400), 9_500);
        assert_eq!(render_time_ms(10_000, -400), 10_300);
        assert_eq!(render_time_ms(10_000, 0), 9_900);
    }

    #[test]
    fn test_now_ms_is_recent() {
        // Sometime after 2020-01-01 and not absurdly far in the future.
        let now = now_ms();
        assert!(now > 1_577_836_800_000);
        assert!(now < 4_102_444_800_000);
    }
}
