use std::time::Duration;

use async_trait::async_trait;
use tessera_core::{DailyStat, ModelOutputs, Realm, RealmId};

use crate::error::ModelError;

/// Read surface over per-realm daily statistics.
///
/// Both series are ascending by date, zero-filled for gap days, and end at
/// the current UTC day, so the last element is always the still-accumulating
/// current day.
#[async_trait]
pub trait StatsAccessor: Send + Sync {
    /// Issued-code counts for the last `window_days` days.
    async fn issuance_history(&self, realm: &RealmId, window_days: u32) -> Result<Vec<u64>, ModelError>;

    /// The full daily series for a realm, bounded by the accessor's scan
    /// horizon.
    async fn stats_series(&self, realm: &RealmId) -> Result<Vec<DailyStat>, ModelError>;
}

/// Persistence surface for realm records.
#[async_trait]
pub trait RealmStore: Send + Sync {
    /// IDs of realms with abuse prevention enabled, in stable order.
    async fn modeling_enabled_realms(&self) -> Result<Vec<RealmId>, ModelError>;

    async fn fetch(&self, realm: &RealmId) -> Result<Option<Realm>, ModelError>;

    /// Merge a run's outputs into the stored record, leaving every
    /// user-editable field untouched, and return the saved realm.
    async fn save_model_outputs(&self, realm: &RealmId, outputs: &ModelOutputs) -> Result<Realm, ModelError>;
}

/// Write surface of the rate-limiter store consulted on the issuance path.
#[async_trait]
pub trait LimitSink: Send + Sync {
    /// Overwrite the quota stored under `key`, refreshing its TTL.
    async fn set_limit(&self, key: &str, value: u64, ttl: Duration) -> Result<(), ModelError>;
}
