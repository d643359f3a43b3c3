use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use tessera_core::{DailyStat, ModelOutputs, Realm, RealmId};
use tessera_state::{CasResult, KeyKind, StateError, StateKey, StateStore};
use tracing::{debug, warn};

use crate::access::{RealmStore, StatsAccessor};
use crate::error::ModelError;

const SYSTEM_NAMESPACE: &str = "_system";
const REALMS_TENANT: &str = "_realms";
const STATS_NAMESPACE: &str = "_stats";

const ISSUED_COUNTER: &str = "issued";
const CLAIMED_COUNTER: &str = "claimed";

/// How many times a save re-reads and retries after a version conflict
/// before giving up.
const SAVE_ATTEMPTS: u32 = 2;

/// State-store-backed realm records and daily statistics.
///
/// Realm records are JSON documents in the versioned keyspace; daily
/// statistics are two plain counters per realm and UTC day, ids shaped
/// `YYYY-MM-DD:issued` and `YYYY-MM-DD:claimed`.
pub struct RealmRegistry {
    store: Arc<dyn StateStore>,
    history_scan_days: u32,
}

impl RealmRegistry {
    pub fn new(store: Arc<dyn StateStore>, history_scan_days: u32) -> Self {
        Self { store, history_scan_days }
    }

    fn realm_key(realm: &RealmId) -> StateKey {
        StateKey::new(SYSTEM_NAMESPACE, REALMS_TENANT, KeyKind::Realm, realm.as_str())
    }

    fn stat_key(realm: &RealmId, date: NaiveDate, counter: &str) -> StateKey {
        StateKey::new(STATS_NAMESPACE, realm.as_str(), KeyKind::Stat, format!("{date}:{counter}"))
    }

    /// Create or replace a realm record.
    ///
    /// Ids containing ':' are rejected; they cannot form a key segment in
    /// the colon-delimited keyspace.
    pub async fn upsert(&self, realm: &Realm) -> Result<(), ModelError> {
        if realm.id.as_str().contains(':') {
            return Err(ModelError::InvalidRealmId(realm.id.as_str().to_owned()));
        }
        let value = serde_json::to_string(realm)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        self.store.set(&Self::realm_key(&realm.id), &value, None).await?;
        Ok(())
    }

    /// Add issued codes to a realm's counter for a UTC day. Returns the
    /// day's running total.
    pub async fn record_issued(&self, realm: &RealmId, date: NaiveDate, count: u64) -> Result<u64, ModelError> {
        self.bump(Self::stat_key(realm, date, ISSUED_COUNTER), count).await
    }

    /// Add claimed codes to a realm's counter for a UTC day. Returns the
    /// day's running total.
    pub async fn record_claimed(&self, realm: &RealmId, date: NaiveDate, count: u64) -> Result<u64, ModelError> {
        self.bump(Self::stat_key(realm, date, CLAIMED_COUNTER), count).await
    }

    async fn bump(&self, key: StateKey, count: u64) -> Result<u64, ModelError> {
        let delta = i64::try_from(count).unwrap_or(i64::MAX);
        let total = self.store.increment(&key, delta, None).await?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    /// Every stored realm record, skipping entries that no longer parse.
    pub async fn list_realms(&self) -> Result<Vec<Realm>, ModelError> {
        let entries = self
            .store
            .scan_keys(SYSTEM_NAMESPACE, REALMS_TENANT, KeyKind::Realm, None)
            .await?;

        let mut realms = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match serde_json::from_str::<Realm>(&value) {
                Ok(realm) => realms.push(realm),
                Err(error) => warn!(%key, %error, "skipping unreadable realm record"),
            }
        }
        realms.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(realms)
    }

    /// Delete daily stat counters older than `cutoff` across all realms.
    /// Returns how many counters were removed.
    pub async fn prune_stats_before(&self, cutoff: NaiveDate) -> Result<usize, ModelError> {
        let mut pruned = 0;
        for realm in self.list_realms().await? {
            let entries = self
                .store
                .scan_keys(STATS_NAMESPACE, realm.id.as_str(), KeyKind::Stat, None)
                .await?;
            for (key, _) in entries {
                let Some((date, counter)) = parse_stat_id(&key) else {
                    warn!(%key, "skipping malformed stat key");
                    continue;
                };
                if date < cutoff && self.store.delete(&Self::stat_key(&realm.id, date, counter)).await? {
                    pruned += 1;
                }
            }
        }
        debug!(pruned, "pruned expired stat counters");
        Ok(pruned)
    }

    /// Daily samples for a realm from `earliest` through today, ascending,
    /// with gap days zero-filled. Empty when the realm has never recorded
    /// a counter.
    async fn load_series(&self, realm: &RealmId, earliest: NaiveDate, today: NaiveDate) -> Result<Vec<DailyStat>, ModelError> {
        let entries = self
            .store
            .scan_keys(STATS_NAMESPACE, realm.as_str(), KeyKind::Stat, None)
            .await?;

        let mut days: BTreeMap<NaiveDate, (u64, u64)> = BTreeMap::new();
        for (key, value) in entries {
            let Some((date, counter)) = parse_stat_id(&key) else {
                warn!(%key, "skipping malformed stat key");
                continue;
            };
            let count = value.parse::<i64>().unwrap_or(0);
            let count = u64::try_from(count).unwrap_or(0);
            let totals = days.entry(date).or_default();
            match counter {
                ISSUED_COUNTER => totals.0 = count,
                CLAIMED_COUNTER => totals.1 = count,
                other => warn!(%key, counter = other, "skipping unknown stat counter"),
            }
        }

        let Some((&first_recorded, _)) = days.first_key_value() else {
            return Ok(Vec::new());
        };

        let mut series = Vec::new();
        let mut day = first_recorded.max(earliest);
        while day <= today {
            let (issued, claimed) = days.get(&day).copied().unwrap_or((0, 0));
            series.push(DailyStat::new(day, issued, claimed));
            let Some(next) = day.succ_opt() else { break };
            day = next;
        }
        Ok(series)
    }
}

/// Split a canonical stat key into its date and counter name.
fn parse_stat_id(canonical: &str) -> Option<(NaiveDate, &str)> {
    let id = canonical.splitn(4, ':').nth(3)?;
    let (date, counter) = id.split_once(':')?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some((date, counter))
}

#[async_trait]
impl RealmStore for RealmRegistry {
    async fn modeling_enabled_realms(&self) -> Result<Vec<RealmId>, ModelError> {
        let realms = self.list_realms().await?;
        Ok(realms
            .into_iter()
            .filter(|r| r.abuse_prevention_enabled)
            .map(|r| r.id)
            .collect())
    }

    async fn fetch(&self, realm: &RealmId) -> Result<Option<Realm>, ModelError> {
        let Some(stored) = self.store.get(&Self::realm_key(realm)).await? else {
            return Ok(None);
        };
        let record = serde_json::from_str(&stored.value)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        Ok(Some(record))
    }

    async fn save_model_outputs(&self, realm: &RealmId, outputs: &ModelOutputs) -> Result<Realm, ModelError> {
        let key = Self::realm_key(realm);
        let mut attempts = 0;
        loop {
            let Some(stored) = self.store.get(&key).await? else {
                return Err(ModelError::RealmNotFound(realm.clone()));
            };
            let mut record: Realm = serde_json::from_str(&stored.value)
                .map_err(|e| StateError::Serialization(e.to_string()))?;
            record.apply_model_outputs(outputs, Utc::now());

            let value = serde_json::to_string(&record)
                .map_err(|e| StateError::Serialization(e.to_string()))?;
            match self.store.compare_and_swap(&key, stored.version, &value, None).await? {
                CasResult::Ok => return Ok(record),
                CasResult::Conflict { current_version, .. } => {
                    attempts += 1;
                    if attempts >= SAVE_ATTEMPTS {
                        return Err(StateError::CasConflict {
                            expected: stored.version,
                            found: current_version,
                        }
                        .into());
                    }
                    debug!(realm = %realm, attempts, "realm record changed underneath, re-reading");
                }
            }
        }
    }
}

#[async_trait]
impl StatsAccessor for RealmRegistry {
    async fn issuance_history(&self, realm: &RealmId, window_days: u32) -> Result<Vec<u64>, ModelError> {
        let today = Utc::now().date_naive();
        let earliest = window_start(today, window_days);
        let series = self.load_series(realm, earliest, today).await?;
        Ok(series.iter().map(|s| s.codes_issued).collect())
    }

    async fn stats_series(&self, realm: &RealmId) -> Result<Vec<DailyStat>, ModelError> {
        let today = Utc::now().date_naive();
        let earliest = window_start(today, self.history_scan_days);
        self.load_series(realm, earliest, today).await
    }
}

/// First day of a window of `days` entries ending today.
fn window_start(today: NaiveDate, days: u32) -> NaiveDate {
    let back = u64::from(days.saturating_sub(1));
    today.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN)
}
