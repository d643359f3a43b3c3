use std::time::Duration;

use async_trait::async_trait;

use crate::error::StateError;
use crate::key::StateKey;

/// A stored value together with its monotonically increasing version.
///
/// Versions start at 1 when an entry is first written and advance on every
/// update, so a caller can read a record, mutate it, and persist the result
/// with [`StateStore::compare_and_swap`] conditioned on the version it read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub value: String,
    pub version: u64,
}

/// Result of a compare-and-swap operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResult {
    /// The swap succeeded and the new version is stored.
    Ok,
    /// The swap failed because the current version didn't match.
    Conflict {
        current_value: Option<String>,
        current_version: u64,
    },
}

/// Trait for the shared persistent state behind realms, daily statistics,
/// execution gates, and rate-limiter entries.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get the value for a key with its version. Returns `None` if not found
    /// or expired.
    ///
    /// Counter entries created by [`increment`](Self::increment) are readable
    /// here too, versioned like any other record.
    async fn get(&self, key: &StateKey) -> Result<Option<Versioned>, StateError>;

    /// Set a value with an optional TTL, overwriting any previous value and
    /// advancing its version.
    async fn set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StateError>;

    /// Delete a key. Returns `true` if the key existed.
    async fn delete(&self, key: &StateKey) -> Result<bool, StateError>;

    /// Atomically increment a counter by `delta`. Returns the new value.
    /// Creates the counter at 0 if it doesn't exist before incrementing.
    /// Every call advances the entry's version by one, just as
    /// [`set`](Self::set) does.
    async fn increment(
        &self,
        key: &StateKey,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StateError>;

    /// Compare-and-swap: update value only if the current version matches
    /// `expected_version`.
    ///
    /// An `expected_version` of 0 means "the key must not exist"; the entry
    /// is then created at version 1. Concurrent creators race through the
    /// same path, so exactly one of them observes [`CasResult::Ok`].
    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError>;

    /// Scan keys matching a prefix pattern.
    ///
    /// Returns a list of (canonical key, value) pairs where the key matches
    /// the given namespace, tenant, and kind. The `prefix` parameter filters
    /// keys whose id starts with the given string.
    ///
    /// This operation may be expensive on some backends. Use sparingly.
    async fn scan_keys(
        &self,
        namespace: &str,
        tenant: &str,
        kind: crate::key::KeyKind,
        prefix: Option<&str>,
    ) -> Result<Vec<(String, String)>, StateError>;
}
