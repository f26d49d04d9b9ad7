mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::{admin, authorizer, demand, phone, run_context, ProbeRepo, COMPETING_RUN};
use testbed_core::caller::{CallerContext, Permission};
use testbed_core::dependency::{AttributeOperator, AttributeRequirement, Dependency};
use testbed_core::error::CoreError;
use testbed_core::inventory::{Account, EntityCategory, Health, InventoryEntity, Resource};
use testbed_core::types::DbId;
use testbed_db::memory::InMemoryInventory;
use testbed_leasing::{DependencyAllocator, LeasingError};
use tokio_util::sync::CancellationToken;

fn allocator<R>(repo: Arc<R>) -> DependencyAllocator<Resource, R>
where
    R: testbed_db::repositories::InventoryRepository<Resource>,
{
    DependencyAllocator::new(repo, authorizer())
}

#[tokio::test]
async fn repeated_types_get_distinct_entities_in_id_order() {
    let store = Arc::new(InMemoryInventory::with_entities(vec![
        phone(1, "p1"),
        phone(1, "p2"),
        phone(1, "p3"),
    ]));
    let ctx = run_context(1, demand(&["phone", "phone"]));

    let bag = allocator(store.clone())
        .collect_dependencies(&admin(1), &ctx, &CancellationToken::new())
        .await
        .unwrap();

    let ids: Vec<DbId> = bag.entities().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2]);
    let indexes: Vec<usize> = bag.entries().iter().map(|e| e.index).collect();
    assert_eq!(indexes, vec![0, 1]);

    let stored = store.snapshot().await;
    for leased in &stored[..2] {
        let lease = leased.lease.as_ref().expect("leased");
        assert_eq!(lease.owner, ctx.lock_owner());
        assert_eq!(lease.expires, ctx.resource_expiry);
    }
    assert!(stored[2].lease.is_none());
}

#[tokio::test]
async fn shortfall_returns_a_partial_bag() {
    let store = Arc::new(InMemoryInventory::with_entities(vec![phone(1, "only")]));
    let ctx = run_context(1, demand(&["phone", "phone", "tablet"]));

    let bag = allocator(store)
        .collect_dependencies(&admin(1), &ctx, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(bag.len(), 1);
}

#[tokio::test]
async fn disabled_and_unhealthy_resources_are_never_allocated() {
    let store = Arc::new(InMemoryInventory::with_entities(vec![
        phone(1, "off").with_enabled(false),
        phone(1, "flaky").with_health(Health::Degraded),
        phone(1, "dead").with_health(Health::Unhealthy),
    ]));
    let ctx = run_context(1, demand(&["phone"]));

    let bag = allocator(store.clone())
        .collect_dependencies(&admin(1), &ctx, &CancellationToken::new())
        .await
        .unwrap();

    assert!(bag.is_empty());
    assert!(store.snapshot().await.iter().all(|r| !r.is_locked()));
}

#[tokio::test]
async fn locked_resources_are_skipped() {
    let store = Arc::new(InMemoryInventory::with_entities(vec![
        phone(1, "p1"),
        phone(1, "p2"),
    ]));
    let first = run_context(1, demand(&["phone"]));
    let second = run_context(1, demand(&["phone"]));
    let alloc = allocator(store);

    let a = alloc
        .collect_dependencies(&admin(1), &first, &CancellationToken::new())
        .await
        .unwrap();
    let b = alloc
        .collect_dependencies(&admin(1), &second, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(a.entities().next().unwrap().id, 1);
    assert_eq!(b.entities().next().unwrap().id, 2);
}

#[tokio::test]
async fn attribute_requirements_narrow_the_candidates() {
    let store = Arc::new(InMemoryInventory::with_entities(vec![
        phone(1, "pixel").with_variable("os", "android 14"),
        phone(1, "iphone").with_variable("os", "ios 17"),
        phone(1, "blank"),
    ]));
    let ctx = run_context(
        1,
        vec![
            Dependency::new("phone").with_attribute(AttributeRequirement::new(
                "os",
                AttributeOperator::Contains,
                "ios",
            )),
            Dependency::new("phone").with_attribute(AttributeRequirement::new(
                "os",
                AttributeOperator::NotEquals,
                "android 14",
            )),
        ],
    );

    let bag = allocator(store)
        .collect_dependencies(&admin(1), &ctx, &CancellationToken::new())
        .await
        .unwrap();

    let names: Vec<&str> = bag.entities().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["iphone", "blank"]);
}

#[tokio::test]
async fn other_tenants_inventory_is_invisible() {
    let store = Arc::new(InMemoryInventory::with_entities(vec![phone(2, "foreign")]));
    let ctx = run_context(1, demand(&["phone"]));

    let bag = allocator(store.clone())
        .collect_dependencies(&admin(1), &ctx, &CancellationToken::new())
        .await
        .unwrap();

    assert!(bag.is_empty());
    assert!(!store.snapshot().await[0].is_locked());
}

#[tokio::test]
async fn missing_write_permission_fails_before_any_store_call() {
    let repo = Arc::new(ProbeRepo::new(vec![phone(1, "p1")]));
    let reader = CallerContext::new(1, "viewer").grant(EntityCategory::Resource, Permission::Read);
    let ctx = run_context(1, demand(&["phone"]));

    let result = allocator(repo.clone())
        .collect_dependencies(&reader, &ctx, &CancellationToken::new())
        .await;

    assert_matches!(result, Err(LeasingError::Core(CoreError::Forbidden(_))));
    assert_eq!(repo.calls(), 0);
}

#[tokio::test]
async fn blank_identity_is_an_argument_error() {
    let repo = Arc::new(ProbeRepo::new(vec![phone(1, "p1")]));
    let mut caller = admin(1);
    caller.identity = "  ".into();
    let ctx = run_context(1, demand(&["phone"]));

    let result = allocator(repo.clone())
        .collect_dependencies(&caller, &ctx, &CancellationToken::new())
        .await;

    assert_matches!(result, Err(LeasingError::Core(CoreError::InvalidArgument(_))));
    assert_eq!(repo.calls(), 0);
}

#[tokio::test]
async fn empty_dependency_type_rejects_the_whole_request() {
    let repo = Arc::new(ProbeRepo::new(vec![phone(1, "p1")]));
    let ctx = run_context(1, demand(&["phone", ""]));

    let result = allocator(repo.clone())
        .collect_dependencies(&admin(1), &ctx, &CancellationToken::new())
        .await;

    assert_matches!(result, Err(LeasingError::Core(CoreError::InvalidArgument(_))));
    assert_eq!(repo.calls(), 0);
}

#[tokio::test]
async fn context_for_another_tenant_is_forbidden() {
    let repo = Arc::new(ProbeRepo::new(vec![phone(2, "p1")]));
    let ctx = run_context(2, demand(&["phone"]));

    let result = allocator(repo.clone())
        .collect_dependencies(&admin(1), &ctx, &CancellationToken::new())
        .await;

    assert_matches!(result, Err(LeasingError::Core(CoreError::Forbidden(_))));
    assert_eq!(repo.calls(), 0);
}

#[tokio::test]
async fn lost_race_fails_over_to_the_next_candidate() {
    let repo = Arc::new(ProbeRepo::new(vec![phone(1, "p1"), phone(1, "p2")]));
    repo.steal_next_acquire();
    let ctx = run_context(1, demand(&["phone"]));

    let bag = allocator(repo.clone())
        .collect_dependencies(&admin(1), &ctx, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(bag.entities().next().unwrap().id, 2);
    let stolen = repo.inner.snapshot().await.remove(0);
    assert_eq!(stolen.lock_owner(), Some(COMPETING_RUN));
}

#[tokio::test]
async fn lost_race_on_the_last_candidate_yields_nothing() {
    let repo = Arc::new(ProbeRepo::new(vec![phone(1, "p1")]));
    repo.steal_next_acquire();
    let ctx = run_context(1, demand(&["phone"]));

    let bag = allocator(repo)
        .collect_dependencies(&admin(1), &ctx, &CancellationToken::new())
        .await
        .unwrap();
    assert!(bag.is_empty());
}

#[tokio::test]
async fn cancellation_rolls_back_leases_taken_so_far() {
    let repo = Arc::new(ProbeRepo::new(vec![
        phone(1, "p1"),
        phone(1, "p2"),
        phone(1, "p3"),
    ]));
    let cancel = CancellationToken::new();
    repo.cancel_after_next_acquire(cancel.clone());
    let ctx = run_context(1, demand(&["phone", "phone", "phone"]));

    let result = allocator(repo.clone())
        .collect_dependencies(&admin(1), &ctx, &cancel)
        .await;

    assert_matches!(result, Err(LeasingError::Cancelled));
    assert!(repo.inner.snapshot().await.iter().all(|r| !r.is_locked()));
}

#[tokio::test]
async fn pre_cancelled_token_leases_nothing() {
    let repo = Arc::new(ProbeRepo::new(vec![phone(1, "p1")]));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let ctx = run_context(1, demand(&["phone"]));

    let result = allocator(repo.clone())
        .collect_dependencies(&admin(1), &ctx, &cancel)
        .await;

    assert_matches!(result, Err(LeasingError::Cancelled));
    assert!(repo.inner.snapshot().await.iter().all(|r| !r.is_locked()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_never_share_an_entity() {
    let phones = (0..5).map(|i| phone(1, &format!("p{i}"))).collect();
    let store = Arc::new(InMemoryInventory::with_entities(phones));
    let alloc = Arc::new(allocator(store.clone()));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let alloc = alloc.clone();
        handles.push(tokio::spawn(async move {
            let ctx = run_context(1, demand(&["phone"]));
            alloc
                .collect_dependencies(&admin(1), &ctx, &CancellationToken::new())
                .await
                .map(|bag| bag.into_entities())
        }));
    }

    let mut taken = BTreeSet::new();
    for handle in handles {
        for entity in handle.await.unwrap().unwrap() {
            assert!(taken.insert(entity.id), "entity {} leased twice", entity.id);
        }
    }
    assert_eq!(taken.len(), 5);
}

#[tokio::test]
async fn bag_add_persists_the_lease_and_records_the_index() {
    let store = Arc::new(InMemoryInventory::with_entities(vec![phone(1, "p1"), phone(1, "p2")]));
    let alloc = allocator(store.clone());
    let expiry = Utc::now() + Duration::minutes(30);
    let mut bag = testbed_core::bag::Bag::new();

    let first = store.snapshot().await.remove(0);
    let second = store.snapshot().await.remove(1);
    assert_eq!(alloc.add(&admin(1), &mut bag, &first, expiry, "run-7").await.unwrap(), 0);
    assert_eq!(alloc.add(&admin(1), &mut bag, &second, expiry, "run-7").await.unwrap(), 1);

    let stored = store.snapshot().await;
    assert!(stored[0].is_locked());
    assert_eq!(stored[0].lock_owner(), Some("run-7"));
    assert_eq!(stored[0].lease.as_ref().unwrap().expires, expiry);

    let again = alloc.add(&admin(1), &mut bag, &first, expiry, "run-8").await;
    assert_matches!(again, Err(LeasingError::Core(CoreError::Conflict(_))));
    assert_eq!(bag.len(), 2);
}

#[tokio::test]
async fn bag_add_refuses_another_tenants_entity() {
    let store = Arc::new(InMemoryInventory::with_entities(vec![phone(2, "foreign")]));
    let alloc = allocator(store.clone());
    let expiry = Utc::now() + Duration::minutes(30);
    let mut bag = testbed_core::bag::Bag::new();
    let target = store.snapshot().await.remove(0);

    let result = alloc.add(&admin(1), &mut bag, &target, expiry, "tenant-1-run").await;

    assert_matches!(result, Err(LeasingError::Core(CoreError::Forbidden(_))));
    assert!(bag.is_empty());
    assert!(!store.snapshot().await[0].is_locked());
}

#[tokio::test]
async fn bag_add_requires_write_permission() {
    let repo = Arc::new(ProbeRepo::new(vec![phone(1, "p1")]));
    let reader = CallerContext::new(1, "viewer").grant(EntityCategory::Resource, Permission::Read);
    let target = repo.inner.snapshot().await.remove(0);
    let mut bag = testbed_core::bag::Bag::new();

    let result = allocator(repo.clone())
        .add(&reader, &mut bag, &target, Utc::now(), "run-1")
        .await;

    assert_matches!(result, Err(LeasingError::Core(CoreError::Forbidden(_))));
    assert_eq!(repo.calls(), 0);
}

#[tokio::test]
async fn accounts_are_matched_on_account_type() {
    let store = Arc::new(InMemoryInventory::with_entities(vec![
        Account::new(1, "sso-user", "sso"),
        Account::new(1, "mailbox-a", "email").with_variable("domain", "example.com"),
        Account::new(1, "mailbox-b", "email").with_variable("domain", "example.org"),
    ]));
    let mut ctx = run_context(1, Vec::new());
    ctx.account_dependencies = vec![Dependency::new("email")
        .with_attribute(AttributeRequirement::equals("domain", "example.org"))];

    let bag = DependencyAllocator::<Account, _>::new(store, authorizer())
        .collect_dependencies(&admin(1), &ctx, &CancellationToken::new())
        .await
        .unwrap();

    let names: Vec<&str> = bag.entities().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["mailbox-b"]);
}
