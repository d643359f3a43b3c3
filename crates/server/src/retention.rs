//! Background sweeper that prunes daily stat counters past their retention.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use tessera_modeler::{ModelError, RealmRegistry};
use tracing::{error, info};

use crate::config::RetentionConfig;

/// Delete daily stat counters older than `retention_days`.
///
/// Returns the number of counters removed.
pub async fn sweep(registry: &RealmRegistry, retention_days: u32) -> Result<usize, ModelError> {
    let cutoff = Utc::now()
        .date_naive()
        .checked_sub_days(Days::new(u64::from(retention_days)))
        .unwrap_or(NaiveDate::MIN);
    registry.prune_stats_before(cutoff).await
}

/// Spawn the periodic retention sweeper.
pub fn spawn(registry: Arc<RealmRegistry>, config: &RetentionConfig) {
    let retention_days = config.stats_retention_days;
    let period = Duration::from_secs(config.sweep_interval_seconds);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately; skip it so we don't sweep at startup.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match sweep(&registry, retention_days).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "stats retention sweep complete"),
                Err(e) => error!(error = %e, "stats retention sweep failed"),
            }
        }
    });
}
