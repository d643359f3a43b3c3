use tracing::debug;

use crate::config::ModelerConfig;
use crate::error::ModelError;
use crate::fit::{polyfit, polyval};

/// Degree of the production fit: a straight line through recent history.
pub const DEFAULT_TREND_DEGREE: usize = 1;

/// Forecasts the next day's issuance volume from recent daily history.
pub struct TrendForecaster {
    degree: usize,
    min_value: u64,
    max_value: u64,
    min_history_days: usize,
}

impl TrendForecaster {
    #[must_use]
    pub fn new(config: &ModelerConfig) -> Self {
        Self::with_degree(config, DEFAULT_TREND_DEGREE)
    }

    /// A forecaster fitting a polynomial of the given degree instead of the
    /// default line.
    #[must_use]
    pub fn with_degree(config: &ModelerConfig, degree: usize) -> Self {
        Self {
            degree,
            min_value: config.min_value,
            max_value: config.max_value,
            min_history_days: config.min_history_days,
        }
    }

    /// Forecast tomorrow's issuance limit from ascending daily history.
    ///
    /// The final element is the still-accumulating current day and is
    /// dropped before fitting. Returns `Ok(None)` when fewer complete days
    /// remain than the configured minimum; a realm without enough history
    /// is skipped, not failed.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn forecast(&self, history: &[u64]) -> Result<Option<u64>, ModelError> {
        let Some((_, complete)) = history.split_last() else {
            return Ok(None);
        };
        if complete.len() < self.min_history_days {
            debug!(days = complete.len(), need = self.min_history_days, "not enough history to forecast");
            return Ok(None);
        }

        let y: Vec<f64> = complete.iter().map(|&v| v as f64).collect();
        let coefficients = polyfit(&y, self.degree).map_err(|e| ModelError::Fit(e.to_string()))?;
        let projected = polyval(&coefficients, y.len() as f64);

        let rounded = projected.round().max(0.0) as u64;
        Ok(Some(rounded.clamp(self.min_value, self.max_value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forecaster() -> TrendForecaster {
        TrendForecaster::new(&ModelerConfig::default())
    }

    /// The last element is the current, incomplete day; its value must not
    /// influence the fit.
    #[test]
    fn flat_history_projects_flat() {
        let mut history = vec![50_u64; 19];
        history.push(3);
        assert_eq!(forecaster().forecast(&history).unwrap(), Some(50));
    }

    #[test]
    fn upward_trend_projects_next_value() {
        let mut history: Vec<u64> = (1..=20).collect();
        history.push(7);
        let forecast = forecaster().forecast(&history).unwrap().unwrap();
        assert_eq!(forecast, 21);
        assert!(forecast > 20);
        assert!(forecast <= ModelerConfig::default().max_value);
    }

    #[test]
    fn downward_trend_clamps_to_floor() {
        let history = vec![0_u64; 21];
        assert_eq!(forecaster().forecast(&history).unwrap(), Some(10));
    }

    #[test]
    fn steep_growth_clamps_to_ceiling() {
        let history: Vec<u64> = (0..16).map(|i| i * 10_000).collect();
        assert_eq!(forecaster().forecast(&history).unwrap(), Some(20_000));
    }

    #[test]
    fn negative_projection_clamps_through_zero() {
        // Steep decline projects below zero before clamping.
        let mut history: Vec<u64> = (0..15).map(|i| (14 - i) * 100).collect();
        history.push(0);
        assert_eq!(forecaster().forecast(&history).unwrap(), Some(10));
    }

    #[test]
    fn short_history_is_skipped() {
        let history = vec![50_u64; 14];
        assert_eq!(forecaster().forecast(&history).unwrap(), None);
        assert_eq!(forecaster().forecast(&[]).unwrap(), None);
        assert_eq!(forecaster().forecast(&[50]).unwrap(), None);
    }

    #[test]
    fn custom_degree_fits_curvature() {
        let config = ModelerConfig::default();
        let quadratic = TrendForecaster::with_degree(&config, 2);
        let mut history: Vec<u64> = (0..15).map(|i| i * i).collect();
        history.push(1);
        // Next square after x = 0..=14 is 225.
        assert_eq!(quadratic.forecast(&history).unwrap(), Some(225));
    }

    #[test]
    fn impossible_degree_surfaces_fit_error() {
        let config = ModelerConfig {
            min_history_days: 2,
            ..ModelerConfig::default()
        };
        let cubic = TrendForecaster::with_degree(&config, 30);
        let err = cubic.forecast(&[1, 2, 3, 4]).unwrap_err();
        assert!(matches!(err, ModelError::Fit(_)));
    }
}
