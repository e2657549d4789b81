use std::time::{Instant, SystemTime, UNIX_EPOCH};

fn saturating_ms(millis: u128) -> u64 {
    u64::try_from(millis).unwrap_or(u64::MAX)
}

/// Wall-clock milliseconds since the Unix epoch; zero if the clock is before it.
pub fn current_unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since| saturating_ms(since.as_millis()))
        .unwrap_or(0)
}

/// Phase durations are reported in whole milliseconds.
pub fn elapsed_ms(started: Instant) -> u64 {
    saturating_ms(started.elapsed().as_millis())
}
