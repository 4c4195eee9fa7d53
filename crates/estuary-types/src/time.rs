//! Wire timestamp conversions.
//!
//! The backing store carries every timestamp as integer Unix
//! milliseconds, which is the finest unit the protocol distinguishes.

use chrono::{DateTime, TimeZone, Utc};

/// Converts a timestamp to its wire representation.
pub fn to_millis(date: DateTime<Utc>) -> i64 {
    date.timestamp_millis()
}

/// Converts a wire timestamp back to a `DateTime`.
///
/// Returns `None` for values outside the representable range (notably
/// the `i64::MAX` mute-forever sentinel).
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_millisecond_precision() {
        let date = from_millis(1_577_836_800_123).unwrap();
        assert_eq!(to_millis(date), 1_577_836_800_123);
    }

    #[test]
    fn sentinel_is_not_a_date() {
        assert!(from_millis(i64::MAX).is_none());
    }
}
