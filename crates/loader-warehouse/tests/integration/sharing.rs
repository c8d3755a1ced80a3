use std::sync::Arc;
use std::time::Duration;

use loader_warehouse::{
    MAX_TTL, OperationId, Sanitizer, Warehouse, WarehouseConfig, WarehouseError,
};

use crate::*;

#[tokio::test]
async fn test_get_reads_own_loader() {
    let warehouse = development();
    let handle = warehouse.add(TestLoader::new("query", &["alice"]));

    assert_eq!(handle.get(|loader| loader.users.len()).unwrap(), 1);
    assert_eq!(
        handle.get(|loader| loader.auth_token.clone()).unwrap(),
        Some("token-query".to_owned())
    );
}

#[tokio::test]
async fn test_is_shared() {
    let warehouse = development();
    let handle = warehouse.add(TestLoader::default());
    assert!(!handle.is_shared());

    handle.share(None).unwrap();
    assert!(handle.is_shared());

    handle.dispose(true).unwrap();
    assert!(!handle.is_shared());
}

#[tokio::test]
async fn test_share_sanitizes_once_per_call() {
    let warehouse = development();
    let handle = warehouse.add(TestLoader::new("mutation", &[]));

    handle.share(None).unwrap();
    let (token, sanitized) = handle
        .get(|loader| (loader.auth_token.clone(), loader.sanitized))
        .unwrap();
    assert_eq!(token, None);
    assert_eq!(sanitized, 1);

    handle.share(None).unwrap();
    assert_eq!(handle.get(|loader| loader.sanitized).unwrap(), 2);
}

#[tokio::test]
async fn test_sanitize_without_sharing() {
    let warehouse = development();
    let handle = warehouse.add(TestLoader::new("mutation", &[]));

    handle.sanitize();
    assert_eq!(handle.get(|loader| loader.sanitized).unwrap(), 1);
    assert!(!handle.is_shared());

    // sanitizing a disposed loader does nothing
    handle.dispose(false).unwrap();
    handle.sanitize();
}

#[tokio::test]
async fn test_explicit_sanitizer() {
    let warehouse = development();

    let unsanitized = warehouse.add_with_sanitizer(TestLoader::new("raw", &[]), None);
    unsanitized.share(None).unwrap();
    assert_eq!(
        unsanitized.get(|loader| loader.auth_token.clone()).unwrap(),
        Some("token-raw".to_owned())
    );

    let clear_users: Sanitizer<TestLoader> =
        Arc::new(|loader: &mut TestLoader| loader.users.clear());
    let custom =
        warehouse.add_with_sanitizer(TestLoader::new("custom", &["alice"]), Some(clear_users));
    custom.share(None).unwrap();
    let (users, token) = custom
        .get(|loader| (loader.users.len(), loader.auth_token.clone()))
        .unwrap();
    assert_eq!(users, 0);
    assert_eq!(token, Some("token-custom".to_owned()));
}

#[tokio::test]
async fn test_without_on_share_hook() {
    loader_warehouse_test::setup();
    let warehouse = Warehouse::new(WarehouseConfig::new(TTL)).unwrap();

    let handle = warehouse.add(TestLoader::new("mutation", &[]));
    handle.sanitize();
    handle.share(None).unwrap();
    assert_eq!(handle.get(|loader| loader.sanitized).unwrap(), 0);
}

#[tokio::test]
async fn test_use_shared_reads_through() {
    let warehouse = development();
    let mutation = warehouse.add(TestLoader::new("mutation", &["alice"]));
    let subscription = warehouse.add(TestLoader::new("subscription", &["bob"]));

    let token = mutation.share(None).unwrap().unwrap();
    subscription.use_shared(token).unwrap();

    assert_eq!(
        subscription.get(|loader| loader.users.clone()).unwrap(),
        ["alice"]
    );
    // the shared loader has been scrubbed before anyone could read it
    assert_eq!(
        subscription.get(|loader| loader.auth_token.clone()).unwrap(),
        None
    );
    // the subscription's own loader is untouched, and not shared itself
    assert!(!subscription.is_shared());
}

#[tokio::test]
async fn test_use_shared_unshared_target() {
    for warehouse in [development(), production()] {
        let mutation = warehouse.add(TestLoader::new("mutation", &[]));
        let subscription = warehouse.add(TestLoader::new("subscription", &[]));

        assert_eq!(
            subscription.use_shared(mutation.operation_id()),
            Err(WarehouseError::UnsharedAccess(mutation.operation_id()))
        );
        // nothing was aliased
        assert_eq!(
            subscription.get(|loader| loader.origin.clone()).unwrap(),
            "subscription"
        );
    }
}

#[tokio::test]
async fn test_use_shared_missing_target() {
    let warehouse = development();
    let mutation = warehouse.add(TestLoader::new("mutation", &[]));
    let subscription = warehouse.add(TestLoader::new("subscription", &[]));

    let token = mutation.share(None).unwrap().unwrap();
    mutation.dispose(true).unwrap();

    // tolerated in development mode as well, the subscription reads its own loader
    subscription.use_shared(token).unwrap();
    assert_eq!(
        subscription.get(|loader| loader.origin.clone()).unwrap(),
        "subscription"
    );
}

#[tokio::test]
async fn test_use_shared_after_dispose() {
    let warehouse = development();
    let mutation = warehouse.add(TestLoader::new("mutation", &[]));
    let subscription = warehouse.add(TestLoader::new("subscription", &[]));

    let token = mutation.share(None).unwrap().unwrap();
    subscription.dispose(false).unwrap();

    assert_eq!(
        subscription.use_shared(token),
        Err(WarehouseError::EntryNotFound(subscription.operation_id()))
    );
    // the disposed operation does not read through to the shared loader
    assert_eq!(
        subscription.get(|_| ()),
        Err(WarehouseError::EntryNotFound(subscription.operation_id()))
    );
}

#[tokio::test]
async fn test_use_shared_overwrites_alias() {
    let warehouse = development();
    let first = warehouse.add(TestLoader::new("first", &[]));
    let second = warehouse.add(TestLoader::new("second", &[]));
    let subscription = warehouse.add(TestLoader::new("subscription", &[]));

    subscription.use_shared(first.share(None).unwrap().unwrap()).unwrap();
    subscription.use_shared(second.share(None).unwrap().unwrap()).unwrap();

    assert_eq!(
        subscription.get(|loader| loader.origin.clone()).unwrap(),
        "second"
    );
}

#[tokio::test]
async fn test_alias_is_a_single_hop() {
    let warehouse = development();
    let root = warehouse.add(TestLoader::new("root", &[]));
    let middle = warehouse.add(TestLoader::new("middle", &[]));
    let leaf = warehouse.add(TestLoader::new("leaf", &[]));

    middle.use_shared(root.share(None).unwrap().unwrap()).unwrap();
    leaf.use_shared(middle.share(None).unwrap().unwrap()).unwrap();

    // the leaf reads the middle loader, not what the middle operation reads through to
    assert_eq!(leaf.get(|loader| loader.origin.clone()).unwrap(), "middle");
    assert_eq!(middle.get(|loader| loader.origin.clone()).unwrap(), "root");
}

#[tokio::test]
async fn test_share_token_roundtrip() {
    let warehouse = development();
    let mutation = warehouse.add(TestLoader::new("mutation", &[]));
    let subscription = warehouse.add(TestLoader::new("subscription", &[]));

    let token = mutation.share(None).unwrap().unwrap();
    let serialized = serde_json::to_string(&token).unwrap();
    let token: OperationId = serde_json::from_str(&serialized).unwrap();

    subscription.use_shared(token).unwrap();
    assert_eq!(
        subscription.get(|loader| loader.origin.clone()).unwrap(),
        "mutation"
    );
}

#[tokio::test]
async fn test_share_invalid_ttl() {
    let warehouse = development();
    let handle = warehouse.add(TestLoader::default());

    for ttl in [Duration::ZERO, MAX_TTL + Duration::from_millis(1)] {
        assert_eq!(
            handle.share(Some(ttl)),
            Err(WarehouseError::InvalidTtl(ttl))
        );
    }
    assert!(!handle.is_shared());
    assert_eq!(handle.get(|loader| loader.sanitized).unwrap(), 0);
}
