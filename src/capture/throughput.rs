use std::time::Duration;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Capture speed in pages per hour, floored. Zero when nothing can be said yet.
pub fn pages_per_hour(shots_since_start: i64, elapsed: Duration) -> u64 {
    let elapsed = elapsed.as_secs_f64();
    if shots_since_start <= 0 || elapsed <= 0.0 {
        return 0;
    }
    (SECONDS_PER_HOUR * shots_since_start as f64 / elapsed).floor() as u64
}
