//! Stable rate-limiter key derivation.
//!
//! Quota entries in the external rate-limiter store are keyed by a one-way
//! digest of the scope and realm identity, so raw realm IDs never appear in
//! the limiter keyspace and the key stays stable across runs.

use sha2::{Digest, Sha256};

use crate::types::RealmId;

/// Scope prefix for per-realm issuance quotas in the rate-limiter store.
pub const REALM_QUOTA_SCOPE: &str = "realm";

/// Derive the rate-limiter store key for a realm's quota under a scope.
///
/// Returns a hex-encoded SHA-256 digest. The same `(scope, realm)` pair
/// always produces the same key, which is what makes quota propagation
/// idempotent.
#[must_use]
pub fn quota_key(scope: &str, realm: &RealmId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(scope.as_bytes());
    hasher.update(b":");
    hasher.update(realm.as_str().as_bytes());
    hex::encode(hasher.finalize())
}
