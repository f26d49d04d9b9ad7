mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{admin, authorizer, demand, run_context};
use testbed_core::dependency::Dependency;
use testbed_core::inventory::{Account, Resource};
use testbed_db::memory::InMemoryInventory;
use testbed_leasing::DependencyAllocator;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn allocated_bags_render_runner_variables() {
    let resources = Arc::new(InMemoryInventory::with_entities(vec![
        Resource::new(1, "pixel", ["phone"]).with_variable("serial", "A1"),
        Resource::new(1, "galaxy", ["phone", "calculator"]).with_variable("serial", "B2"),
    ]));
    let accounts = Arc::new(InMemoryInventory::with_entities(vec![
        Account::new(1, "mailbox", "email").with_variable("password", "hunter2"),
    ]));
    let mut ctx = run_context(1, demand(&["phone", "phone"]));
    ctx.account_dependencies = vec![Dependency::new("email")];
    let caller = admin(1);
    let cancel = CancellationToken::new();

    let resource_bag = DependencyAllocator::<Resource, _>::new(resources, authorizer())
        .collect_dependencies(&caller, &ctx, &cancel)
        .await
        .unwrap();
    let account_bag = DependencyAllocator::<Account, _>::new(accounts, authorizer())
        .collect_dependencies(&caller, &ctx, &cancel)
        .await
        .unwrap();

    let mut env = resource_bag.resolve_all();
    env.extend(account_bag.resolve_all());

    let expected: BTreeMap<String, String> = [
        ("accounts__email__0__password", "hunter2"),
        ("resources__calculator__1__serial", "B2"),
        ("resources__phone__0__serial", "A1"),
        ("resources__phone__1__serial", "B2"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    assert_eq!(env, expected);
}

#[tokio::test]
async fn single_entity_rendering_uses_the_given_namespace() {
    let resources = Arc::new(InMemoryInventory::with_entities(vec![
        Resource::new(1, "pixel", ["phone"]).with_variable("udid", "0001"),
    ]));
    let ctx = run_context(1, demand(&["phone"]));

    let bag = DependencyAllocator::<Resource, _>::new(resources, authorizer())
        .collect_dependencies(&admin(1), &ctx, &CancellationToken::new())
        .await
        .unwrap();

    let mut out = BTreeMap::new();
    let pixel = bag.entities().next().unwrap().clone();
    bag.resolve_variables(&pixel, "devices", &mut out).unwrap();
    assert_eq!(out.get("devices__phone__0__udid").map(String::as_str), Some("0001"));
}
