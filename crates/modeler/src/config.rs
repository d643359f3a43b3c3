use std::time::Duration;

/// Tunables for the modeling loop.
///
/// Every component takes its settings from an explicit config value passed
/// at construction; nothing reads process-global state, so tests can
/// override any field freely.
#[derive(Debug, Clone)]
pub struct ModelerConfig {
    /// Business floor for the forecasted daily issuance limit.
    pub min_value: u64,
    /// Business ceiling for the forecasted daily issuance limit.
    pub max_value: u64,
    /// Days of issuance history fed into the trend fit.
    pub trend_window_days: u32,
    /// Maximum number of qualifying days in the claimed-ratio window.
    pub anomaly_window_days: usize,
    /// Complete days of history required before either model produces
    /// output for a realm.
    pub min_history_days: usize,
    /// Minimum wall-clock period between successful runs, enforced by the
    /// execution gate across all replicas.
    pub min_period: Duration,
    /// How far back the stats accessor scans for daily samples.
    pub history_scan_days: u32,
    /// Optional budget for a single run, checked between realms. Realms
    /// not reached before the deadline wait for the next period.
    pub run_deadline: Option<Duration>,
}

impl Default for ModelerConfig {
    fn default() -> Self {
        Self {
            min_value: 10,
            max_value: 20_000,
            trend_window_days: 21,
            anomaly_window_days: 30,
            min_history_days: 14,
            min_period: Duration::from_secs(60 * 60),
            history_scan_days: 90,
            run_deadline: None,
        }
    }
}
