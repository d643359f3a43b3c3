use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One realm-day of issuance activity.
///
/// Daily stats are append-only from the modeling loop's perspective; they are
/// written by the issuance path as monotonic counters and read back here as
/// complete days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStat {
    /// UTC day the counters belong to.
    pub date: NaiveDate,
    pub codes_issued: u64,
    pub codes_claimed: u64,
}

impl DailyStat {
    /// Create a new daily stat sample.
    #[must_use]
    pub fn new(date: NaiveDate, codes_issued: u64, codes_claimed: u64) -> Self {
        Self {
            date,
            codes_issued,
            codes_claimed,
        }
    }
}

/// Claimed/issued ratio statistics produced by the anomaly detector.
///
/// `current` is the ratio of the most recent complete day; `mean` and
/// `stddev` describe the trailing window it is compared against. The
/// anomaly classification itself is a read-time property on the realm
/// record, not part of this type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioStats {
    pub current: f64,
    pub mean: f64,
    pub stddev: f64,
}
