use std::time::Duration;

use crate::error::StateError;
use crate::key::{KeyKind, StateKey};
use crate::store::{CasResult, StateStore};

fn test_key(kind: KeyKind, id: &str) -> StateKey {
    StateKey::new("test-ns", "test-tenant", kind, id)
}

/// Run the full state store conformance test suite.
///
/// Call this from your backend's test module with a fresh store instance.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_store_conformance_tests(store: &dyn StateStore) -> Result<(), StateError> {
    test_get_missing(store).await?;
    test_set_and_get(store).await?;
    test_set_advances_version(store).await?;
    test_delete(store).await?;
    test_increment(store).await?;
    test_compare_and_swap(store).await?;
    test_compare_and_swap_create(store).await?;
    test_ttl_set(store).await?;
    test_scan_keys(store).await?;
    Ok(())
}

async fn test_get_missing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Realm, "missing");
    let val = store.get(&key).await?;
    assert!(val.is_none(), "get on missing key should return None");
    Ok(())
}

async fn test_set_and_get(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Realm, "set-get");
    store.set(&key, "hello", None).await?;
    let val = store.get(&key).await?.expect("value should exist after set");
    assert_eq!(val.value, "hello");
    assert_eq!(val.version, 1, "first set should store version 1");
    Ok(())
}

async fn test_set_advances_version(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Realm, "set-version");
    store.set(&key, "v1", None).await?;
    store.set(&key, "v2", None).await?;
    let val = store.get(&key).await?.expect("value should exist");
    assert_eq!(val.value, "v2");
    assert_eq!(val.version, 2, "second set should advance to version 2");
    Ok(())
}

async fn test_delete(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Realm, "to-delete");
    store.set(&key, "bye", None).await?;
    let existed = store.delete(&key).await?;
    assert!(existed, "delete should return true for existing key");
    let val = store.get(&key).await?;
    assert!(val.is_none(), "get after delete should return None");

    let existed = store.delete(&key).await?;
    assert!(!existed, "delete on missing key should return false");
    Ok(())
}

async fn test_increment(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Stat, "counter-1");
    let val = store.increment(&key, 1, None).await?;
    assert_eq!(val, 1, "first increment from zero should yield 1");

    let read = store.get(&key).await?.expect("counter should be readable");
    assert_eq!(read.version, 1, "first increment should store version 1");

    let val = store.increment(&key, 5, None).await?;
    assert_eq!(val, 6, "second increment should accumulate");

    let val = store.increment(&key, -2, None).await?;
    assert_eq!(val, 4, "negative delta should decrement");

    let read = store.get(&key).await?.expect("counter should be readable");
    assert_eq!(read.value, "4", "get should see the accumulated counter");
    assert_eq!(read.version, 3, "every increment should advance the version");
    Ok(())
}

async fn test_compare_and_swap(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Lock, "cas-version");

    store.set(&key, "initial", None).await?;

    // CAS with a stale version must fail and report the stored one.
    let result = store.compare_and_swap(&key, 999, "updated", None).await?;
    match result {
        CasResult::Conflict {
            current_value,
            current_version,
        } => {
            assert_eq!(current_value.as_deref(), Some("initial"));
            assert_eq!(current_version, 1);
        }
        CasResult::Ok => panic!("CAS with wrong version should conflict"),
    }

    let result = store.compare_and_swap(&key, 1, "updated", None).await?;
    assert_eq!(
        result,
        CasResult::Ok,
        "CAS with correct version should succeed"
    );

    let val = store.get(&key).await?.expect("value should exist");
    assert_eq!(val.value, "updated");
    assert_eq!(val.version, 2, "successful CAS should advance the version");
    Ok(())
}

async fn test_compare_and_swap_create(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Lock, "cas-create");

    // Expected version 0 on a missing key creates it at version 1.
    let result = store.compare_and_swap(&key, 0, "created", None).await?;
    assert_eq!(result, CasResult::Ok, "CAS at version 0 should create");
    let val = store.get(&key).await?.expect("value should exist");
    assert_eq!(val.value, "created");
    assert_eq!(val.version, 1);

    // Expected version 0 on an existing key must conflict.
    let result = store.compare_and_swap(&key, 0, "doubled", None).await?;
    assert!(
        matches!(result, CasResult::Conflict { .. }),
        "CAS at version 0 on an existing key should conflict"
    );
    Ok(())
}

async fn test_ttl_set(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::RateLimit, "ttl-test");
    store
        .set(&key, "ephemeral", Some(Duration::from_secs(3600)))
        .await?;
    let val = store.get(&key).await?.expect("value should exist");
    assert_eq!(val.value, "ephemeral");
    Ok(())
}

async fn test_scan_keys(store: &dyn StateStore) -> Result<(), StateError> {
    let a = test_key(KeyKind::Stat, "2026-01-01:issued");
    let b = test_key(KeyKind::Stat, "2026-01-02:issued");
    let c = test_key(KeyKind::Stat, "2026-01-02:claimed");
    store.increment(&a, 3, None).await?;
    store.increment(&b, 7, None).await?;
    store.increment(&c, 2, None).await?;
    let record = test_key(KeyKind::Realm, "scan-realm");
    store.set(&record, "{}", None).await?;

    let mut stats = store
        .scan_keys("test-ns", "test-tenant", KeyKind::Stat, None)
        .await?;
    stats.sort();
    stats.retain(|(k, _)| k.contains("2026-01-0"));
    assert_eq!(
        stats,
        vec![
            (
                "test-ns:test-tenant:stat:2026-01-01:issued".to_string(),
                "3".to_string()
            ),
            (
                "test-ns:test-tenant:stat:2026-01-02:claimed".to_string(),
                "2".to_string()
            ),
            (
                "test-ns:test-tenant:stat:2026-01-02:issued".to_string(),
                "7".to_string()
            ),
        ],
        "scan should return canonical keys with counter values"
    );

    let prefixed = store
        .scan_keys("test-ns", "test-tenant", KeyKind::Stat, Some("2026-01-02"))
        .await?;
    assert_eq!(prefixed.len(), 2, "prefix should narrow the scan");

    let records = store
        .scan_keys("test-ns", "test-tenant", KeyKind::Realm, Some("scan-"))
        .await?;
    assert_eq!(
        records,
        vec![("test-ns:test-tenant:realm:scan-realm".to_string(), "{}".to_string())],
        "scan should return versioned record entries too"
    );
    Ok(())
}
