//! ---
//! phs_section: "01-core-functionality"
//! phs_subsection: "module"
//! phs_type: "source"
//! phs_scope: "code"
//! phs_description: "Shared primitives and utilities for the pharos runtime."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---
use chrono::Utc;

/// Current wall-clock time as milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Convert a heartbeat timestamp as published by the endpoint (epoch seconds)
/// into the milliseconds the liveness engine works in. Zero stays zero: it is
/// the "no heartbeat ever observed" sentinel, not a real instant.
pub fn heartbeat_to_millis(epoch_seconds: u64) -> u64 {
    epoch_seconds.saturating_mul(1000)
}

/// Human-readable age for status displays: seconds below a minute, minutes
/// below an hour, hours beyond.
pub fn format_age(age_ms: u64) -> String {
    if age_ms < 60_000 {
        format!("{}s ago", age_ms / 1000)
    } else if age_ms < 3_600_000 {
        format!("{}m ago", age_ms / 60_000)
    } else {
        format!("{}h ago", age_ms / 3_600_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_conversion_preserves_zero_sentinel() {
        assert_eq!(heartbeat_to_millis(0), 0);
        assert_eq!(heartbeat_to_millis(1_000_000), 1_000_000_000);
    }

    #[test]
    fn age_formatting_buckets() {
        assert_eq!(format_age(0), "0s ago");
        assert_eq!(format_age(42_000), "42s ago");
        assert_eq!(format_age(180_000), "3m ago");
        assert_eq!(format_age(7_200_000), "2h ago");
    }
}
