use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stats::RatioStats;
use crate::types::RealmId;

fn default_limit_factor() -> f64 {
    1.0
}

/// A tenant of the verification-code issuance platform.
///
/// The record is owned by administrative surfaces outside the modeling loop;
/// the loop only ever rewrites the system-computed fields through
/// [`Realm::apply_model_outputs`], so concurrent user edits to the rest of
/// the record survive a model run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Realm {
    pub id: RealmId,
    pub name: String,

    /// Whether the modeling loop maintains this realm's issuance quota.
    #[serde(default)]
    pub abuse_prevention_enabled: bool,

    /// Last forecasted daily issuance ceiling.
    #[serde(default)]
    pub abuse_prevention_limit: u64,

    /// User-editable multiplier applied to the stored limit on the
    /// enforcement path.
    #[serde(default = "default_limit_factor")]
    pub abuse_prevention_limit_factor: f64,

    /// Claimed/issued ratio of the most recent complete day.
    #[serde(default)]
    pub last_codes_claimed_ratio: f64,

    /// Mean claimed/issued ratio over the trailing anomaly window.
    #[serde(default)]
    pub codes_claimed_ratio_mean: f64,

    /// Population standard deviation of the claimed/issued ratio.
    #[serde(default)]
    pub codes_claimed_ratio_stddev: f64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Realm {
    /// Create a new realm with modeling disabled and no recorded statistics.
    #[must_use]
    pub fn new(id: impl Into<RealmId>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            abuse_prevention_enabled: false,
            abuse_prevention_limit: 0,
            abuse_prevention_limit_factor: default_limit_factor(),
            last_codes_claimed_ratio: 0.0,
            codes_claimed_ratio_mean: 0.0,
            codes_claimed_ratio_stddev: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The quota actually enforced by the rate limiter: the stored limit
    /// scaled by the realm's factor, rounded up.
    #[must_use]
    pub fn effective_limit(&self) -> u64 {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        #[allow(clippy::cast_sign_loss)]
        {
            let scaled =
                (self.abuse_prevention_limit as f64) * self.abuse_prevention_limit_factor;
            scaled.ceil().max(0.0) as u64
        }
    }

    /// Whether the most recent complete day's claimed ratio deviates from
    /// the mean by more than `threshold` standard deviations.
    ///
    /// Returns `false` until the modeling loop has produced statistics for
    /// this realm.
    #[must_use]
    pub fn claimed_ratio_anomalous(&self, threshold: f64) -> bool {
        if self.codes_claimed_ratio_stddev <= 0.0 {
            return false;
        }
        (self.last_codes_claimed_ratio - self.codes_claimed_ratio_mean).abs()
            > threshold * self.codes_claimed_ratio_stddev
    }

    /// Overwrite the system-computed fields from a model run, leaving every
    /// user-editable field untouched.
    pub fn apply_model_outputs(&mut self, outputs: &ModelOutputs, now: DateTime<Utc>) {
        if let Some(limit) = outputs.abuse_prevention_limit {
            self.abuse_prevention_limit = limit;
        }
        if let Some(ratios) = outputs.claimed_ratios {
            self.last_codes_claimed_ratio = ratios.current;
            self.codes_claimed_ratio_mean = ratios.mean;
            self.codes_claimed_ratio_stddev = ratios.stddev;
        }
        self.updated_at = now;
    }
}

/// System-computed fields written back by a model run.
///
/// Absent fields are left at their stored values, so a run that produced a
/// forecast but skipped the anomaly statistics (or vice versa) only rewrites
/// what it computed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModelOutputs {
    pub abuse_prevention_limit: Option<u64>,
    pub claimed_ratios: Option<RatioStats>,
}

impl ModelOutputs {
    /// Returns `true` if the run produced nothing to persist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.abuse_prevention_limit.is_none() && self.claimed_ratios.is_none()
    }
}
