use tessera_core::{DailyStat, RatioStats};
use tracing::debug;

use crate::config::ModelerConfig;

/// Computes claimed-to-issued ratio statistics over a trailing window.
///
/// Feeds the per-realm anomaly signal: a day whose claim ratio sits far
/// from the window mean (relative to the window's spread) suggests abuse
/// or a broken integration.
pub struct AnomalyDetector {
    window_days: usize,
    min_history_days: usize,
}

impl AnomalyDetector {
    #[must_use]
    pub fn new(config: &ModelerConfig) -> Self {
        Self {
            window_days: config.anomaly_window_days,
            min_history_days: config.min_history_days,
        }
    }

    /// Compute ratio statistics from an ascending daily series ending at
    /// the current, incomplete day.
    ///
    /// The incomplete day is dropped; the most recent complete day is the
    /// "current" sample and is part of the window. Days with zero issuance
    /// carry no signal and are passed over, so the window stretches back
    /// until enough qualifying days are found. Returns `None` when fewer
    /// qualifying days exist than the configured minimum.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn detect(&self, series: &[DailyStat]) -> Option<RatioStats> {
        let (_, complete) = series.split_last()?;
        let (current_day, _) = complete.split_last()?;

        let mut ratios = Vec::with_capacity(self.window_days);
        for stat in complete.iter().rev() {
            if stat.codes_issued == 0 {
                continue;
            }
            ratios.push(capped_ratio(stat));
            if ratios.len() == self.window_days {
                break;
            }
        }
        if ratios.len() < self.min_history_days {
            debug!(days = ratios.len(), need = self.min_history_days, "not enough qualifying days for ratio statistics");
            return None;
        }

        let count = ratios.len() as f64;
        let mean = ratios.iter().sum::<f64>() / count;
        let variance = ratios.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / count;

        // A current day with no issuance reads as fully claimed rather
        // than anomalously unclaimed.
        let current = if current_day.codes_issued == 0 {
            1.0
        } else {
            capped_ratio(current_day)
        };

        Some(RatioStats { current, mean, stddev: variance.sqrt() })
    }
}

/// Claim ratio for one day, capped at 1.0. More claims than issued codes
/// happens when codes issued late the previous day are claimed today.
#[allow(clippy::cast_precision_loss)]
fn capped_ratio(stat: &DailyStat) -> f64 {
    let ratio = stat.codes_claimed as f64 / stat.codes_issued as f64;
    ratio.min(1.0)
}
