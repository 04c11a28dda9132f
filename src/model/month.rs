//! Calendar month arithmetic for cohort and LTV bucketing

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A calendar month (UTC), e.g. 2024-03
///
/// Ordering is chronological. Cohort months, LTV as-of months, and retention
/// period offsets are all expressed through this type so that every engine
/// buckets timestamps identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    /// 1-12
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Self {
        debug_assert!((1..=12).contains(&month), "month must be 1-12");
        Self { year, month }
    }

    /// Bucket a Unix timestamp (seconds, UTC) into its calendar month
    pub fn from_timestamp(ts: i64) -> Self {
        let dt: DateTime<Utc> = DateTime::from_timestamp(ts, 0).unwrap_or_default();
        Self {
            year: dt.year(),
            month: dt.month(),
        }
    }

    /// Months elapsed since `earlier` (0 for the same month, negative if
    /// `self` precedes `earlier`)
    pub fn offset_from(&self, earlier: MonthKey) -> i32 {
        (self.year - earlier.year) * 12 + self.month as i32 - earlier.month as i32
    }

    /// The month `offset` months after this one
    pub fn plus(&self, offset: i32) -> MonthKey {
        let idx = self.year * 12 + self.month as i32 - 1 + offset;
        MonthKey {
            year: idx.div_euclid(12),
            month: (idx.rem_euclid(12) + 1) as u32,
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_timestamp() {
        // 2024-03-15 12:00:00 UTC
        let key = MonthKey::from_timestamp(1710504000);
        assert_eq!(key, MonthKey::new(2024, 3));
        assert_eq!(key.to_string(), "2024-03");
    }

    #[test]
    fn test_offset_across_year_boundary() {
        let nov = MonthKey::new(2023, 11);
        let feb = MonthKey::new(2024, 2);
        assert_eq!(feb.offset_from(nov), 3);
        assert_eq!(nov.offset_from(feb), -3);
    }

    #[test]
    fn test_plus_wraps_years() {
        assert_eq!(MonthKey::new(2023, 11).plus(3), MonthKey::new(2024, 2));
        assert_eq!(MonthKey::new(2024, 1).plus(-1), MonthKey::new(2023, 12));
        assert_eq!(MonthKey::new(2024, 6).plus(0), MonthKey::new(2024, 6));
    }

    #[test]
    fn test_ordering_is_chronological() {
        assert!(MonthKey::new(2023, 12) < MonthKey::new(2024, 1));
        assert!(MonthKey::new(2024, 2) < MonthKey::new(2024, 3));
    }
}
