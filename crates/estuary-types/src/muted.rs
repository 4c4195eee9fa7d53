//! Mute horizons.

use chrono::{DateTime, Utc};

use crate::time;

/// How long a user or chat stays muted.
///
/// `Forever` is a sentinel that compares above every finite horizon. On
/// the wire it is stored as `i64::MAX` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutedUntil {
    /// Muted until the given instant.
    Until(DateTime<Utc>),
    /// Muted with no expiry.
    Forever,
}

impl MutedUntil {
    /// The wire value for this horizon.
    pub fn as_millis(self) -> i64 {
        match self {
            Self::Until(date) => time::to_millis(date),
            Self::Forever => i64::MAX,
        }
    }

    /// Parses a wire value; out-of-range values collapse to `Forever`.
    pub fn from_millis(millis: i64) -> Self {
        match time::from_millis(millis) {
            Some(date) => Self::Until(date),
            None => Self::Forever,
        }
    }

    /// True if this horizon is still in the future at `now`.
    pub fn is_active(self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Until(date) => date > now,
            Self::Forever => true,
        }
    }
}

impl PartialOrd for MutedUntil {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MutedUntil {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (Self::Forever, Self::Forever) => std::cmp::Ordering::Equal,
            (Self::Forever, Self::Until(_)) => std::cmp::Ordering::Greater,
            (Self::Until(_), Self::Forever) => std::cmp::Ordering::Less,
            (Self::Until(a), Self::Until(b)) => a.cmp(b),
        }
    }
}

/// One entry of the muted map: a user or chat id and its mute horizon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutedEntry {
    /// The muted user or chat id.
    pub id: String,
    pub until: MutedUntil,
}

impl MutedEntry {
    pub fn new(id: impl Into<String>, until: MutedUntil) -> Self {
        Self {
            id: id.into(),
            until,
        }
    }
}
