mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::{phone, ProbeRepo};
use testbed_core::error::CoreError;
use testbed_core::inventory::{InventoryEntity, Lease, Resource};
use testbed_core::types::TenantId;
use testbed_db::memory::InMemoryInventory;
use testbed_db::repositories::InventoryRepository;
use testbed_leasing::{LeaseReleaser, LeasingError};
use tokio_util::sync::CancellationToken;

/// Seed `count` phones in `tenant_id`, all leased by `owner`.
async fn seed_leased(store: &Store, tenant_id: TenantId, owner: &str, count: usize) {
    let expires = Utc::now() + Duration::hours(1);
    for i in 0..count {
        let mut resource = phone(tenant_id, &format!("{owner}-{i}"));
        resource.lease = Some(Lease::new(owner, expires));
        let mut stored = store.add(&resource).await.unwrap();
        stored.lease = resource.lease;
        store.put(stored).await;
    }
}

type Store = InMemoryInventory<Resource>;

fn releaser(store: &Arc<Store>) -> LeaseReleaser<Resource, Store> {
    LeaseReleaser::new(store.clone())
}

fn held_by(resources: &[Resource], owner: &str) -> usize {
    resources
        .iter()
        .filter(|r| r.lock_owner() == Some(owner))
        .count()
}

#[tokio::test]
async fn releases_more_than_one_page() {
    let store = Arc::new(InMemoryInventory::new());
    seed_leased(&store, 1, "run-a", 25).await;

    let released = releaser(&store)
        .release("run-a", 1, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(released, 25);
    let resources = store.snapshot().await;
    assert_eq!(resources.len(), 25);
    assert!(resources.iter().all(|r| r.lease.is_none()));
}

#[tokio::test]
async fn a_page_emptied_by_a_concurrent_release_does_not_stop_the_sweep() {
    let expires = Utc::now() + Duration::hours(1);
    let leased: Vec<Resource> = (0..25)
        .map(|i| {
            let mut resource = phone(1, &format!("p{i}"));
            resource.lease = Some(Lease::new("run-a", expires));
            resource
        })
        .collect();
    let repo = Arc::new(ProbeRepo::new(leased));
    repo.release_next_page();

    let released = LeaseReleaser::<Resource, _>::new(repo.clone())
        .release("run-a", 1, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(released, 15);
    assert_eq!(held_by(&repo.inner.snapshot().await, "run-a"), 0);
}

#[tokio::test]
async fn exact_multiple_of_the_page_size_is_fully_released() {
    let store = Arc::new(InMemoryInventory::new());
    seed_leased(&store, 1, "run-a", 20).await;

    let released = releaser(&store)
        .release("run-a", 1, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(released, 20);
    assert_eq!(held_by(&store.snapshot().await, "run-a"), 0);
}

#[tokio::test]
async fn other_tenants_and_owners_are_untouched() {
    let store = Arc::new(InMemoryInventory::new());
    seed_leased(&store, 1, "run-a", 3).await;
    seed_leased(&store, 2, "run-a", 4).await;
    seed_leased(&store, 1, "run-b", 5).await;

    let released = releaser(&store)
        .release("run-a", 2, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(released, 4);
    let resources = store.snapshot().await;
    let tenant_one_run_a = resources
        .iter()
        .filter(|r| r.tenant_id == 1 && r.lock_owner() == Some("run-a"))
        .count();
    assert_eq!(tenant_one_run_a, 3);
    assert_eq!(held_by(&resources, "run-b"), 5);
}

#[tokio::test]
async fn second_release_is_a_no_op() {
    let store = Arc::new(InMemoryInventory::new());
    seed_leased(&store, 1, "run-a", 12).await;
    let sweep = releaser(&store);
    let cancel = CancellationToken::new();

    assert_eq!(sweep.release("run-a", 1, &cancel).await.unwrap(), 12);
    assert_eq!(sweep.release("run-a", 1, &cancel).await.unwrap(), 0);
}

#[tokio::test]
async fn custom_page_size_is_honoured() {
    let store = Arc::new(InMemoryInventory::new());
    seed_leased(&store, 1, "run-a", 7).await;

    let released = releaser(&store)
        .with_page_size(3)
        .release("run-a", 1, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(released, 7);
}

#[tokio::test]
async fn empty_owner_is_rejected() {
    let store: Arc<Store> = Arc::new(InMemoryInventory::new());
    let result = releaser(&store)
        .release("", 1, &CancellationToken::new())
        .await;
    assert_matches!(result, Err(LeasingError::Core(CoreError::InvalidArgument(_))));
}

#[tokio::test]
async fn cancelled_release_stops_before_touching_anything() {
    let store = Arc::new(InMemoryInventory::new());
    seed_leased(&store, 1, "run-a", 2).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = releaser(&store).release("run-a", 1, &cancel).await;

    assert_matches!(result, Err(LeasingError::Cancelled));
    assert_eq!(held_by(&store.snapshot().await, "run-a"), 2);
}
