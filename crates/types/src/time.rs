//! Small clock helpers shared by the cached domains.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current unix timestamp in whole seconds.
///
/// Clamps to zero if the system clock reports a pre-epoch time.
#[must_use]
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_unix_is_recent() {
        // 2024-01-01T00:00:00Z; any sane clock is past this.
        assert!(now_unix() > 1_704_067_200);
    }
}
