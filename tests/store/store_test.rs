//! Tests for `src/store/mod.rs`.

use std::path::PathBuf;

use trustgate::delegation::{ConstraintSet, Envelope, PrincipalId};
use trustgate::store::{InMemoryTrustStore, PrincipalRecord, StoreError, TrustChainStore};

fn demo_store_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/trust_store.json")
}

async fn demo_store() -> InMemoryTrustStore {
    match InMemoryTrustStore::load(&demo_store_path()).await {
        Ok(store) => store,
        Err(e) => panic!("demo store should load: {e}"),
    }
}

fn record(id: &str, delegated_by: Option<&str>) -> PrincipalRecord {
    PrincipalRecord {
        id: PrincipalId::new(id),
        delegated_by: delegated_by.map(PrincipalId::new),
        envelope: Envelope::new(Vec::new(), ConstraintSet::new(), 1, true).expect("valid"),
        usage: None,
    }
}

#[tokio::test]
async fn loads_demo_document() {
    let store = demo_store().await;
    assert_eq!(store.len().await, 3);

    let env = store
        .get_envelope(&PrincipalId::new("alice"))
        .await
        .expect("alice recorded");
    assert_eq!(env.remaining_depth(), 3);
    assert_eq!(env.capabilities().len(), 2);
}

#[tokio::test]
async fn unknown_principal_is_an_error() {
    let store = demo_store().await;
    let result = store.get_envelope(&PrincipalId::new("nobody")).await;
    assert!(matches!(result, Err(StoreError::UnknownPrincipal(_))));
}

#[tokio::test]
async fn usage_snapshot_is_optional() {
    let store = demo_store().await;
    let snap = store
        .get_usage_snapshot(&PrincipalId::new("planner"))
        .await
        .expect("planner is metered");
    assert_eq!(snap.cost_to_date, 450.0);

    let missing = store.get_usage_snapshot(&PrincipalId::new("alice")).await;
    assert!(matches!(missing, Err(StoreError::NoUsage(_))));
}

#[tokio::test]
async fn chain_is_returned_root_first() {
    let store = demo_store().await;
    let links = store
        .get_chain(&PrincipalId::new("worker"))
        .await
        .expect("chain resolves");
    let ids: Vec<&str> = links.iter().map(|l| l.principal.as_str()).collect();
    assert_eq!(ids, ["alice", "planner", "worker"]);
    assert!(links[0].delegated_by.is_none());
}

#[tokio::test]
async fn cyclic_delegators_are_detected() {
    let store = InMemoryTrustStore::new();
    store.insert(record("a", Some("b"))).await;
    store.insert(record("b", Some("a"))).await;
    let result = store.get_chain(&PrincipalId::new("a")).await;
    assert!(matches!(result, Err(StoreError::ChainCycle(_))));
}

#[tokio::test]
async fn missing_delegator_is_an_error() {
    let store = InMemoryTrustStore::new();
    store.insert(record("child", Some("ghost"))).await;
    let result = store.get_chain(&PrincipalId::new("child")).await;
    match result {
        Err(StoreError::UnknownPrincipal(id)) => assert_eq!(id.as_str(), "ghost"),
        other => panic!("expected unknown delegator, got {other:?}"),
    }
}

#[tokio::test]
async fn insert_replaces_existing_record() {
    let store = InMemoryTrustStore::new();
    assert!(store.is_empty().await);
    store.insert(record("a", None)).await;
    store.insert(record("a", Some("b"))).await;
    assert_eq!(store.len().await, 1);
}

#[test]
fn invalid_document_is_a_parse_error() {
    let result = InMemoryTrustStore::from_json(r#"{"principals": [{"id": "a"}]}"#);
    assert!(matches!(result, Err(StoreError::Parse(_))));

    let terminal_violation = r#"{"principals": [{"id": "a", "envelope": {
        "remaining_depth": 0, "allow_further_delegation": true}}]}"#;
    assert!(matches!(
        InMemoryTrustStore::from_json(terminal_violation),
        Err(StoreError::Parse(_))
    ));
}

#[tokio::test]
async fn missing_file_is_an_io_error() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let result = InMemoryTrustStore::load(&tmp.path().join("absent.json")).await;
    assert!(matches!(result, Err(StoreError::Io(_))));
}
