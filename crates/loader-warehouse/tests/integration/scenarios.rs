use std::time::Duration;

use loader_warehouse::{OperationId, WarehouseError};

use crate::*;

/// A mutation shares its loader, a subscription triggered by it reads through to it, and the
/// shared loader expires on its own.
#[tokio::test(start_paused = true)]
async fn test_mutation_shared_with_subscription() {
    let warehouse = development();

    // a few unrelated operations run first
    for _ in 0..5 {
        warehouse
            .add(TestLoader::default())
            .dispose(false)
            .unwrap();
    }

    let mutation = warehouse.add(TestLoader::new("mutation", &["alice", "bob"]));
    let token = mutation.share(None).unwrap().unwrap();
    assert_eq!(token, OperationId::from(5));
    assert_eq!(token, mutation.operation_id());

    let subscription = warehouse.add(TestLoader::new("subscription", &["carol"]));
    subscription.use_shared(token).unwrap();

    let users = subscription.get(|loader| loader.users.clone()).unwrap();
    assert_eq!(users, ["alice", "bob"]);
    assert_eq!(subscription.get(|loader| loader.origin.clone()).unwrap(), "mutation");

    sleep(before(TTL)).await;
    assert!(mutation.get(|_| ()).is_ok());

    sleep(Duration::from_millis(2)).await;
    assert!(!warehouse.contains(token));
    assert_eq!(
        mutation.get(|_| ()),
        Err(WarehouseError::EntryNotFound(token))
    );
    // the subscription keeps pointing at the expired loader
    assert_eq!(
        subscription.get(|_| ()),
        Err(WarehouseError::EntryNotFound(token))
    );
}

/// In production, pointing at an operation that never existed leaves the dependent operation
/// with its own loader.
#[tokio::test]
async fn test_production_unknown_target() {
    let warehouse = production();

    let subscription = warehouse.add(TestLoader::new("subscription", &["carol"]));
    subscription.use_shared(OperationId::from(42)).unwrap();

    let origin = subscription.get(|loader| loader.origin.clone()).unwrap();
    assert_eq!(origin, "subscription");

    subscription.dispose(false).unwrap();
    assert_eq!(
        subscription.get(|_| ()),
        Err(WarehouseError::EntryNotFound(subscription.operation_id()))
    );
}
