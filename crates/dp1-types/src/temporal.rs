use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use crate::error::{TypeError, TypeResult};

/// Largest epoch-millisecond value the sortable key encodings accept.
///
/// Thirteen decimal digits cover dates up to the year 2286.
pub const MAX_TIMESTAMP_MS: u64 = 9_999_999_999_999;

/// Width of a zero-padded timestamp segment in a storage key.
pub const TIMESTAMP_WIDTH: usize = 13;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Format epoch milliseconds as an ISO-8601 UTC string with millisecond
/// precision, e.g. `2024-01-01T00:00:00.000Z`.
pub fn iso_from_millis(ms: i64) -> String {
    let dt = Utc
        .timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default();
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO-8601 / RFC 3339 timestamp into epoch milliseconds.
///
/// Negative instants and instants past [`MAX_TIMESTAMP_MS`] are rejected
/// because they cannot be encoded as fixed-width sort keys.
pub fn parse_millis(iso: &str) -> TypeResult<u64> {
    let dt = DateTime::parse_from_rfc3339(iso)
        .map_err(|e| TypeError::InvalidTimestamp(format!("{iso}: {e}")))?;
    let ms = dt.timestamp_millis();
    if ms < 0 || ms as u64 > MAX_TIMESTAMP_MS {
        return Err(TypeError::InvalidTimestamp(format!(
            "{iso}: outside sortable range"
        )));
    }
    Ok(ms as u64)
}

/// Issues strictly increasing timestamps starting at a base instant.
///
/// Items created in one request would otherwise share a millisecond and
/// lose their relative order in the time-ordered index.
#[derive(Debug)]
pub struct ItemClock {
    next_ms: i64,
}

impl ItemClock {
    pub fn starting_at(base_ms: i64) -> Self {
        Self { next_ms: base_ms }
    }

    /// The next timestamp, one millisecond after the previous one.
    pub fn tick(&mut self) -> String {
        let ms = self.next_ms;
        self.next_ms += 1;
        iso_from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_format_has_millis_and_z() {
        assert_eq!(iso_from_millis(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(iso_from_millis(1_704_067_200_123), "2024-01-01T00:00:00.123Z");
    }

    #[test]
    fn parse_accepts_with_and_without_fraction() {
        assert_eq!(parse_millis("2024-01-01T00:00:00Z").unwrap(), 1_704_067_200_000);
        assert_eq!(parse_millis("2024-01-01T00:00:00.123Z").unwrap(), 1_704_067_200_123);
        assert_eq!(parse_millis("2024-01-01T01:00:00+01:00").unwrap(), 1_704_067_200_000);
    }

    #[test]
    fn parse_rejects_garbage_and_pre_epoch() {
        assert!(matches!(parse_millis("yesterday"), Err(TypeError::InvalidTimestamp(_))));
        assert!(parse_millis("1969-12-31T23:59:59Z").is_err());
    }

    #[test]
    fn item_clock_is_strictly_increasing() {
        let mut clock = ItemClock::starting_at(1_704_067_200_000);
        let a = clock.tick();
        let b = clock.tick();
        let c = clock.tick();
        assert!(a < b && b < c);
        assert_eq!(parse_millis(&c).unwrap() - parse_millis(&a).unwrap(), 2);
    }

    #[test]
    fn roundtrip_through_iso() {
        let ms = 1_700_000_000_456;
        assert_eq!(parse_millis(&iso_from_millis(ms)).unwrap(), ms as u64);
    }
}
