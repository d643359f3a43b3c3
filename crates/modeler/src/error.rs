use std::fmt;

use tessera_core::RealmId;
use tessera_state::StateError;
use thiserror::Error;

/// Errors produced by the modeling loop.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The execution gate could not be read or claimed. The run must not
    /// proceed: gate state is unknown and another replica may hold it.
    #[error("execution gate: {0}")]
    Gate(StateError),

    /// State store I/O failed outside the gate.
    #[error("state store: {0}")]
    Store(#[from] StateError),

    /// The least-squares solve failed for a realm's history.
    #[error("trend fit failed: {0}")]
    Fit(String),

    /// The realm id cannot form a state key segment.
    #[error("invalid realm id {0:?}: ids may not contain ':'")]
    InvalidRealmId(String),

    /// The realm record disappeared between listing and propagation.
    #[error("realm not found: {0}")]
    RealmNotFound(RealmId),

    /// Persisting model outputs onto the realm record failed.
    #[error("realm save failed: {0}")]
    RealmSave(String),

    /// Writing the effective limit to the rate-limiter store failed. The
    /// realm record is already saved and is not rolled back.
    #[error("rate limiter write failed: {0}")]
    LimiterWrite(String),
}

/// A failure scoped to a single realm, captured during a run without
/// aborting the rest of the batch.
#[derive(Debug)]
pub struct RealmFailure {
    pub realm: RealmId,
    pub error: ModelError,
}

impl fmt::Display for RealmFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "realm {}: {}", self.realm, self.error)
    }
}

/// Outcome of one modeling run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// The gate was claimed within the current period; nothing ran.
    pub too_early: bool,
    /// Realms whose outputs were computed and propagated.
    pub modeled: usize,
    /// Realms skipped for insufficient history.
    pub skipped: usize,
    /// Realms left for the next period because the run deadline passed.
    pub remaining: usize,
    /// Per-realm failures accumulated over the run.
    pub failures: Vec<RealmFailure>,
}

impl RunReport {
    /// True when at least one realm failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Rendered failure messages, one per failed realm.
    #[must_use]
    pub fn failure_messages(&self) -> Vec<String> {
        self.failures.iter().map(ToString::to_string).collect()
    }
}
