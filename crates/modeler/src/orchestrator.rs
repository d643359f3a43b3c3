use std::sync::Arc;
use std::time::Instant;

use tessera_core::{ModelOutputs, RealmId};
use tracing::{error, info, instrument, warn};

use crate::access::{RealmStore, StatsAccessor};
use crate::anomaly::AnomalyDetector;
use crate::config::ModelerConfig;
use crate::error::{ModelError, RealmFailure, RunReport};
use crate::gate::ExecutionGate;
use crate::propagator::QuotaPropagator;
use crate::trend::TrendForecaster;

/// Name of the execution gate claimed by [`Modeler::rebuild_models`].
pub const MODELER_GATE: &str = "modeler";

/// The periodic quota-modeling control loop.
///
/// One run claims the execution gate, walks every modeling-enabled realm
/// in order, forecasts the next daily limit and the claimed-ratio
/// statistics from that realm's history, and propagates the outputs. A
/// realm that fails is recorded and the walk continues.
pub struct Modeler {
    config: ModelerConfig,
    gate: ExecutionGate,
    realms: Arc<dyn RealmStore>,
    stats: Arc<dyn StatsAccessor>,
    forecaster: TrendForecaster,
    detector: AnomalyDetector,
    propagator: QuotaPropagator,
}

impl Modeler {
    pub fn new(
        config: ModelerConfig,
        gate: ExecutionGate,
        realms: Arc<dyn RealmStore>,
        stats: Arc<dyn StatsAccessor>,
        propagator: QuotaPropagator,
    ) -> Self {
        let forecaster = TrendForecaster::new(&config);
        let detector = AnomalyDetector::new(&config);
        Self { config, gate, realms, stats, forecaster, detector, propagator }
    }

    /// Run one modeling cycle if the gate grants it.
    ///
    /// Returns `Ok` with a report for both completed runs and gate skips;
    /// per-realm failures are accumulated in the report rather than
    /// aborting the batch. `Err` means the run could not start at all.
    #[instrument(name = "modeler.rebuild_models", skip_all)]
    pub async fn rebuild_models(&self) -> Result<RunReport, ModelError> {
        if !self.gate.try_acquire(MODELER_GATE, self.config.min_period).await? {
            info!("models were rebuilt within the minimum period, skipping");
            return Ok(RunReport { too_early: true, ..RunReport::default() });
        }

        let started = Instant::now();
        let realm_ids = self.realms.modeling_enabled_realms().await?;
        info!(realms = realm_ids.len(), "rebuilding abuse prevention models");

        let mut report = RunReport::default();
        for (index, realm_id) in realm_ids.iter().enumerate() {
            if let Some(deadline) = self.config.run_deadline {
                if started.elapsed() >= deadline {
                    report.remaining = realm_ids.len() - index;
                    warn!(remaining = report.remaining, "run deadline reached, deferring remaining realms");
                    break;
                }
            }

            match self.rebuild_realm(realm_id).await {
                Ok(true) => report.modeled += 1,
                Ok(false) => report.skipped += 1,
                Err(err) => {
                    error!(realm = %realm_id, error = %err, "failed to rebuild model");
                    report.failures.push(RealmFailure { realm: realm_id.clone(), error: err });
                }
            }
        }

        info!(
            modeled = report.modeled,
            skipped = report.skipped,
            failed = report.failures.len(),
            remaining = report.remaining,
            "model rebuild finished",
        );
        Ok(report)
    }

    /// Model one realm. `Ok(true)` when outputs were propagated, `Ok(false)`
    /// when the realm was skipped for insufficient history.
    async fn rebuild_realm(&self, realm_id: &RealmId) -> Result<bool, ModelError> {
        let history = self.stats.issuance_history(realm_id, self.config.trend_window_days).await?;
        let forecast = self.forecaster.forecast(&history)?;

        let series = self.stats.stats_series(realm_id).await?;
        let ratios = self.detector.detect(&series);

        let outputs = ModelOutputs { abuse_prevention_limit: forecast, claimed_ratios: ratios };
        if outputs.is_empty() {
            return Ok(false);
        }
        self.propagator.propagate(realm_id, &outputs).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{Days, Utc};
    use tessera_core::{DailyStat, Realm};
    use tessera_state::{KeyKind, StateStore};
    use tessera_state_memory::MemoryStateStore;

    use crate::access::LimitSink;
    use crate::propagator::StateLimitSink;
    use crate::registry::RealmRegistry;

    use super::*;

    /// In-memory realm store with selectable save failures.
    #[derive(Default)]
    struct FakeRealms {
        records: Mutex<Vec<Realm>>,
        failing: Mutex<Vec<RealmId>>,
    }

    impl FakeRealms {
        fn insert(&self, realm: Realm) {
            self.records.lock().unwrap().push(realm);
        }

        fn fail_saves_for(&self, realm: &RealmId) {
            self.failing.lock().unwrap().push(realm.clone());
        }

        fn get(&self, realm: &RealmId) -> Option<Realm> {
            self.records.lock().unwrap().iter().find(|r| &r.id == realm).cloned()
        }
    }

    #[async_trait]
    impl RealmStore for FakeRealms {
        async fn modeling_enabled_realms(&self) -> Result<Vec<RealmId>, ModelError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.abuse_prevention_enabled)
                .map(|r| r.id.clone())
                .collect())
        }

        async fn fetch(&self, realm: &RealmId) -> Result<Option<Realm>, ModelError> {
            Ok(self.get(realm))
        }

        async fn save_model_outputs(&self, realm: &RealmId, outputs: &ModelOutputs) -> Result<Realm, ModelError> {
            if self.failing.lock().unwrap().contains(realm) {
                return Err(ModelError::Store(tessera_state::StateError::Backend(
                    "induced save failure".to_owned(),
                )));
            }
            let mut records = self.records.lock().unwrap();
            let record = records
                .iter_mut()
                .find(|r| &r.id == realm)
                .ok_or_else(|| ModelError::RealmNotFound(realm.clone()))?;
            record.apply_model_outputs(outputs, Utc::now());
            Ok(record.clone())
        }
    }

    /// Canned per-realm issuance history; the ratio series is derived from
    /// it with every code claimed.
    #[derive(Default)]
    struct FakeStats {
        history: Mutex<HashMap<RealmId, Vec<u64>>>,
    }

    impl FakeStats {
        fn set_history(&self, realm: &RealmId, counts: Vec<u64>) {
            self.history.lock().unwrap().insert(realm.clone(), counts);
        }
    }

    #[async_trait]
    impl StatsAccessor for FakeStats {
        async fn issuance_history(&self, realm: &RealmId, window_days: u32) -> Result<Vec<u64>, ModelError> {
            let history = self.history.lock().unwrap();
            let counts = history.get(realm).cloned().unwrap_or_default();
            let window = window_days as usize;
            let skip = counts.len().saturating_sub(window);
            Ok(counts.into_iter().skip(skip).collect())
        }

        async fn stats_series(&self, realm: &RealmId) -> Result<Vec<DailyStat>, ModelError> {
            let counts = self.issuance_history(realm, u32::MAX).await?;
            let today = Utc::now().date_naive();
            let first = counts.len() as u64;
            Ok(counts
                .iter()
                .enumerate()
                .map(|(i, &issued)| {
                    let date = today.checked_sub_days(Days::new(first - 1 - i as u64)).unwrap();
                    DailyStat::new(date, issued, issued)
                })
                .collect())
        }
    }

    /// Limiter sink recording every write.
    #[derive(Default)]
    struct RecordingSink {
        writes: Mutex<Vec<(String, u64, Duration)>>,
    }

    #[async_trait]
    impl LimitSink for RecordingSink {
        async fn set_limit(&self, key: &str, value: u64, ttl: Duration) -> Result<(), ModelError> {
            self.writes.lock().unwrap().push((key.to_owned(), value, ttl));
            Ok(())
        }
    }

    fn enabled_realm(id: &str) -> Realm {
        let mut realm = Realm::new(RealmId::from(id), format!("Realm {id}"));
        realm.abuse_prevention_enabled = true;
        realm
    }

    struct Harness {
        realms: Arc<FakeRealms>,
        stats: Arc<FakeStats>,
        sink: Arc<RecordingSink>,
        modeler: Modeler,
    }

    fn harness(config: ModelerConfig) -> Harness {
        let realms = Arc::new(FakeRealms::default());
        let stats = Arc::new(FakeStats::default());
        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(MemoryStateStore::new());
        let modeler = Modeler::new(
            config,
            ExecutionGate::new(store),
            Arc::clone(&realms) as Arc<dyn RealmStore>,
            Arc::clone(&stats) as Arc<dyn StatsAccessor>,
            QuotaPropagator::new(
                Arc::clone(&realms) as Arc<dyn RealmStore>,
                Arc::clone(&sink) as Arc<dyn LimitSink>,
            ),
        );
        Harness { realms, stats, sink, modeler }
    }

    #[tokio::test]
    async fn models_realms_and_pushes_limits() {
        let h = harness(ModelerConfig::default());
        let realm = enabled_realm("r-1");
        h.realms.insert(realm.clone());
        h.stats.set_history(&realm.id, vec![50; 20]);

        let report = h.modeler.rebuild_models().await.unwrap();
        assert!(!report.too_early);
        assert_eq!(report.modeled, 1);
        assert_eq!(report.skipped, 0);
        assert!(report.failures.is_empty());

        let saved = h.realms.get(&realm.id).unwrap();
        assert_eq!(saved.abuse_prevention_limit, 50);
        assert!(saved.codes_claimed_ratio_mean > 0.99);

        let writes = h.sink.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1, 50);
        assert_eq!(writes[0].2, Duration::from_secs(86_400));
    }

    #[tokio::test]
    async fn insufficient_history_skips_without_touching_anything() {
        let h = harness(ModelerConfig::default());
        let realm = enabled_realm("r-1");
        h.realms.insert(realm.clone());
        h.stats.set_history(&realm.id, vec![50; 10]);

        let report = h.modeler.rebuild_models().await.unwrap();
        assert_eq!(report.modeled, 0);
        assert_eq!(report.skipped, 1);
        assert!(report.failures.is_empty());

        let untouched = h.realms.get(&realm.id).unwrap();
        assert_eq!(untouched.abuse_prevention_limit, 0);
        assert!(h.sink.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_realm_does_not_stop_the_batch() {
        let h = harness(ModelerConfig::default());
        let broken = enabled_realm("r-broken");
        let healthy = enabled_realm("r-healthy");
        h.realms.insert(broken.clone());
        h.realms.insert(healthy.clone());
        h.realms.fail_saves_for(&broken.id);
        h.stats.set_history(&broken.id, vec![30; 20]);
        h.stats.set_history(&healthy.id, vec![70; 20]);

        let report = h.modeler.rebuild_models().await.unwrap();
        assert_eq!(report.modeled, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].realm, broken.id);
        assert!(matches!(report.failures[0].error, ModelError::RealmSave(_)));

        let saved = h.realms.get(&healthy.id).unwrap();
        assert_eq!(saved.abuse_prevention_limit, 70);
        assert_eq!(h.sink.writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn second_run_within_period_is_skipped() {
        let h = harness(ModelerConfig::default());
        let realm = enabled_realm("r-1");
        h.realms.insert(realm.clone());
        h.stats.set_history(&realm.id, vec![50; 20]);

        let first = h.modeler.rebuild_models().await.unwrap();
        assert_eq!(first.modeled, 1);

        let second = h.modeler.rebuild_models().await.unwrap();
        assert!(second.too_early);
        assert_eq!(second.modeled, 0);
        assert_eq!(h.sink.writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn expired_deadline_defers_all_realms() {
        let config = ModelerConfig {
            run_deadline: Some(Duration::ZERO),
            ..ModelerConfig::default()
        };
        let h = harness(config);
        for id in ["r-1", "r-2", "r-3"] {
            let realm = enabled_realm(id);
            h.stats.set_history(&realm.id, vec![50; 20]);
            h.realms.insert(realm);
        }

        let report = h.modeler.rebuild_models().await.unwrap();
        assert_eq!(report.modeled, 0);
        assert_eq!(report.remaining, 3);
        assert!(h.sink.writes.lock().unwrap().is_empty());
    }

    /// Full pipeline over the real registry, sink, and an in-memory store.
    #[tokio::test]
    async fn end_to_end_on_memory_store() {
        let store = Arc::new(MemoryStateStore::new());
        let registry = Arc::new(RealmRegistry::new(
            Arc::clone(&store) as Arc<dyn StateStore>,
            90,
        ));
        let sink = Arc::new(StateLimitSink::new(Arc::clone(&store) as Arc<dyn StateStore>));
        let modeler = Modeler::new(
            ModelerConfig::default(),
            ExecutionGate::new(Arc::clone(&store) as Arc<dyn StateStore>),
            Arc::clone(&registry) as Arc<dyn RealmStore>,
            Arc::clone(&registry) as Arc<dyn StatsAccessor>,
            QuotaPropagator::new(
                Arc::clone(&registry) as Arc<dyn RealmStore>,
                Arc::clone(&sink) as Arc<dyn LimitSink>,
            ),
        );

        let mut realm = enabled_realm("r-e2e");
        realm.abuse_prevention_limit_factor = 1.5;
        registry.upsert(&realm).await.unwrap();

        let today = Utc::now().date_naive();
        for back in 0..20_u64 {
            let date = today.checked_sub_days(Days::new(back)).unwrap();
            registry.record_issued(&realm.id, date, 40).await.unwrap();
            registry.record_claimed(&realm.id, date, 30).await.unwrap();
        }

        let report = modeler.rebuild_models().await.unwrap();
        assert_eq!(report.modeled, 1);
        assert!(report.failures.is_empty());

        let saved = registry.fetch(&realm.id).await.unwrap().unwrap();
        assert_eq!(saved.abuse_prevention_limit, 40);
        assert!((saved.codes_claimed_ratio_mean - 0.75).abs() < 1e-9);
        assert!((saved.last_codes_claimed_ratio - 0.75).abs() < 1e-9);
        assert!(saved.codes_claimed_ratio_stddev.abs() < 1e-9);

        let entries = store
            .scan_keys("_system", "_ratelimit", KeyKind::RateLimit, None)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        // ceil(40 * 1.5)
        assert_eq!(entries[0].1, "60");
    }
}
