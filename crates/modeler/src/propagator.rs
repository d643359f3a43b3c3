use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tessera_core::{quota_key, ModelOutputs, Realm, RealmId, REALM_QUOTA_SCOPE};
use tessera_state::{KeyKind, StateKey, StateStore};
use tracing::debug;

use crate::access::{LimitSink, RealmStore};
use crate::error::ModelError;

const LIMITER_NAMESPACE: &str = "_system";
const LIMITER_TENANT: &str = "_ratelimit";

/// TTL on rate-limiter quota entries. Fixed rather than derived from the
/// modeling period: an entry written by one run must outlive several
/// missed runs before the limiter falls back to its default.
pub const LIMITER_ENTRY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Writes one run's outputs to the realm record and the rate-limiter store.
pub struct QuotaPropagator {
    realms: Arc<dyn RealmStore>,
    sink: Arc<dyn LimitSink>,
}

impl QuotaPropagator {
    pub fn new(realms: Arc<dyn RealmStore>, sink: Arc<dyn LimitSink>) -> Self {
        Self { realms, sink }
    }

    /// Persist model outputs for one realm and push the effective limit to
    /// the rate limiter.
    ///
    /// The realm record is the source of truth. When the limiter write
    /// fails the record stays saved; the error is reported and the next
    /// period's run repairs the limiter entry. Re-running with the same
    /// outputs converges on the same stored state.
    pub async fn propagate(&self, realm: &RealmId, outputs: &ModelOutputs) -> Result<Realm, ModelError> {
        let saved = match self.realms.save_model_outputs(realm, outputs).await {
            Ok(saved) => saved,
            Err(error @ ModelError::RealmNotFound(_)) => return Err(error),
            Err(error) => return Err(ModelError::RealmSave(error.to_string())),
        };

        let key = quota_key(REALM_QUOTA_SCOPE, realm);
        let effective = saved.effective_limit();
        if let Err(error) = self.sink.set_limit(&key, effective, LIMITER_ENTRY_TTL).await {
            return Err(ModelError::LimiterWrite(error.to_string()));
        }

        debug!(
            realm = %realm,
            limit = saved.abuse_prevention_limit,
            effective,
            "propagated model outputs",
        );
        Ok(saved)
    }
}

/// [`LimitSink`] writing quotas into the shared state store's rate-limiter
/// keyspace, where the issuance path reads them.
pub struct StateLimitSink {
    store: Arc<dyn StateStore>,
}

impl StateLimitSink {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl LimitSink for StateLimitSink {
    async fn set_limit(&self, key: &str, value: u64, ttl: Duration) -> Result<(), ModelError> {
        let key = StateKey::new(LIMITER_NAMESPACE, LIMITER_TENANT, KeyKind::RateLimit, key);
        self.store.set(&key, &value.to_string(), Some(ttl)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tessera_core::RatioStats;
    use tessera_state_memory::MemoryStateStore;

    use crate::registry::RealmRegistry;

    use super::*;

    fn wiring() -> (Arc<MemoryStateStore>, Arc<RealmRegistry>, QuotaPropagator) {
        let store = Arc::new(MemoryStateStore::new());
        let registry = Arc::new(RealmRegistry::new(
            Arc::clone(&store) as Arc<dyn StateStore>,
            90,
        ));
        let sink = Arc::new(StateLimitSink::new(Arc::clone(&store) as Arc<dyn StateStore>));
        let propagator = QuotaPropagator::new(
            Arc::clone(&registry) as Arc<dyn RealmStore>,
            sink,
        );
        (store, registry, propagator)
    }

    fn sample_outputs() -> ModelOutputs {
        ModelOutputs {
            abuse_prevention_limit: Some(50),
            claimed_ratios: Some(RatioStats { current: 0.8, mean: 0.75, stddev: 0.05 }),
        }
    }

    async fn limiter_entries(store: &MemoryStateStore) -> Vec<(String, String)> {
        store
            .scan_keys(LIMITER_NAMESPACE, LIMITER_TENANT, KeyKind::RateLimit, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn writes_realm_and_limiter_entry() {
        let (store, registry, propagator) = wiring();
        let mut realm = Realm::new(RealmId::from("r-1"), "One".to_owned());
        realm.abuse_prevention_enabled = true;
        realm.abuse_prevention_limit_factor = 2.0;
        registry.upsert(&realm).await.unwrap();

        let saved = propagator.propagate(&realm.id, &sample_outputs()).await.unwrap();
        assert_eq!(saved.abuse_prevention_limit, 50);

        let entries = limiter_entries(&store).await;
        assert_eq!(entries.len(), 1);
        let digest = quota_key(REALM_QUOTA_SCOPE, &realm.id);
        assert_eq!(entries[0].0, format!("_system:_ratelimit:rate_limit:{digest}"));
        // ceil(50 * 2.0)
        assert_eq!(entries[0].1, "100");
    }

    #[tokio::test]
    async fn repeated_propagation_converges() {
        let (store, registry, propagator) = wiring();
        let mut realm = Realm::new(RealmId::from("r-1"), "One".to_owned());
        realm.abuse_prevention_enabled = true;
        registry.upsert(&realm).await.unwrap();

        let outputs = sample_outputs();
        let first = propagator.propagate(&realm.id, &outputs).await.unwrap();
        let entries_after_first = limiter_entries(&store).await;
        let second = propagator.propagate(&realm.id, &outputs).await.unwrap();
        let entries_after_second = limiter_entries(&store).await;

        assert_eq!(first.abuse_prevention_limit, second.abuse_prevention_limit);
        assert_eq!(first.last_codes_claimed_ratio.to_bits(), second.last_codes_claimed_ratio.to_bits());
        assert_eq!(entries_after_first, entries_after_second);
    }

    #[tokio::test]
    async fn missing_realm_surfaces_not_found() {
        let (_store, _registry, propagator) = wiring();
        let err = propagator
            .propagate(&RealmId::from("ghost"), &sample_outputs())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::RealmNotFound(_)));
    }

    struct RefusingSink;

    #[async_trait]
    impl LimitSink for RefusingSink {
        async fn set_limit(&self, _key: &str, _value: u64, _ttl: Duration) -> Result<(), ModelError> {
            Err(ModelError::Store(tessera_state::StateError::Connection(
                "limiter unreachable".to_owned(),
            )))
        }
    }

    #[tokio::test]
    async fn limiter_failure_keeps_realm_saved() {
        let store = Arc::new(MemoryStateStore::new());
        let registry = Arc::new(RealmRegistry::new(
            Arc::clone(&store) as Arc<dyn StateStore>,
            90,
        ));
        let propagator = QuotaPropagator::new(
            Arc::clone(&registry) as Arc<dyn RealmStore>,
            Arc::new(RefusingSink),
        );

        let mut realm = Realm::new(RealmId::from("r-1"), "One".to_owned());
        realm.abuse_prevention_enabled = true;
        registry.upsert(&realm).await.unwrap();

        let err = propagator.propagate(&realm.id, &sample_outputs()).await.unwrap_err();
        assert!(matches!(err, ModelError::LimiterWrite(_)));

        let fetched = registry.fetch(&realm.id).await.unwrap().unwrap();
        assert_eq!(fetched.abuse_prevention_limit, 50);
    }
}
