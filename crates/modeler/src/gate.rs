use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_state::{CasResult, KeyKind, StateError, StateKey, StateStore};
use tracing::debug;

use crate::error::ModelError;

const GATE_NAMESPACE: &str = "_system";
const GATE_TENANT: &str = "_locks";

/// Persistent state of one named gate.
#[derive(Debug, Serialize, Deserialize)]
struct GateRecord {
    /// Earliest instant the gate may be claimed again.
    not_before: DateTime<Utc>,
    /// Successful claims so far. Carried through every CAS so two writers
    /// racing on the same period can never both swap in their record.
    generation: u64,
}

/// Fleet-wide execution gate for periodic jobs.
///
/// At most one caller per period observes `true` from
/// [`try_acquire`](Self::try_acquire), no matter how many replicas share
/// the state store. Losing the race or arriving early is a normal skip;
/// only store I/O failures are errors.
pub struct ExecutionGate {
    store: Arc<dyn StateStore>,
}

impl ExecutionGate {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Try to claim the named gate for the next `min_period`.
    ///
    /// Returns `Ok(true)` when this caller won the period and may run,
    /// `Ok(false)` when the period has not elapsed yet or another replica
    /// claimed it first. On `Err` the gate state is unknown and the caller
    /// must not run.
    pub async fn try_acquire(&self, name: &str, min_period: Duration) -> Result<bool, ModelError> {
        let key = StateKey::new(GATE_NAMESPACE, GATE_TENANT, KeyKind::Lock, name);
        let now = Utc::now();
        let not_before = now + min_period;

        let Some(existing) = self.store.get(&key).await.map_err(ModelError::Gate)? else {
            // First claim ever: create the record already holding the period.
            let value = encode(&GateRecord { not_before, generation: 1 })?;
            let won = match self.store.compare_and_swap(&key, 0, &value, None).await.map_err(ModelError::Gate)? {
                CasResult::Ok => true,
                CasResult::Conflict { .. } => false,
            };
            return Ok(won);
        };

        let record: GateRecord = serde_json::from_str(&existing.value)
            .map_err(|e| ModelError::Gate(StateError::Serialization(e.to_string())))?;
        if record.not_before > now {
            debug!(gate = name, not_before = %record.not_before, "gate not open yet");
            return Ok(false);
        }

        let value = encode(&GateRecord { not_before, generation: record.generation + 1 })?;
        match self.store.compare_and_swap(&key, existing.version, &value, None).await.map_err(ModelError::Gate)? {
            CasResult::Ok => Ok(true),
            CasResult::Conflict { .. } => {
                debug!(gate = name, "lost gate race to another replica");
                Ok(false)
            }
        }
    }
}

fn encode(record: &GateRecord) -> Result<String, ModelError> {
    serde_json::to_string(record).map_err(|e| ModelError::Gate(StateError::Serialization(e.to_string())))
}
