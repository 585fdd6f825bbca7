use std::time::Duration;

pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const BASE_DELAY: Duration = Duration::from_millis(3000);
pub const MAX_DELAY: Duration = Duration::from_millis(15000);

/// Delay before the next reconnect attempt, or `None` once the attempt
/// budget is spent. `attempts` counts retries already performed.
pub fn reconnect_delay(attempts: u32) -> Option<Duration> {
    if attempts >= MAX_RECONNECT_ATTEMPTS {
        return None;
    }
    Some(BASE_DELAY.saturating_mul(attempts + 1).min(MAX_DELAY))
}
