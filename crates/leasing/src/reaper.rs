//! Background clearing of expired leases.
//!
//! Lease expiry is advisory: nothing in allocation or release looks at it.
//! Deployments that want crashed runs to give their entities back enable
//! this loop (`LEASE_REAPER_ENABLED`), which clears every lease whose expiry
//! has passed, across all tenants.

use std::sync::Arc;
use std::time::Duration;

use testbed_core::clock::Clock;
use testbed_core::inventory::{Account, InventoryEntity, Resource};
use testbed_core::specification::Specification;
use testbed_db::pagination::MAX_PAGE_SIZE;
use testbed_db::repositories::InventoryRepository;
use testbed_db::StoreError;
use tokio_util::sync::CancellationToken;

/// Clear every lease of one entity kind that expired before the clock's
/// current time. Returns the number cleared.
pub async fn reap_once<E, R>(
    repo: &R,
    clock: &dyn Clock,
    page_size: i64,
) -> Result<usize, StoreError>
where
    E: InventoryEntity,
    R: InventoryRepository<E> + ?Sized,
{
    let spec = Specification::expired_leases(clock.now());
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let mut reaped = 0usize;

    loop {
        let page = repo.search(&spec, 0, page_size).await?;
        let mut cleared_in_page = 0usize;
        for entity in &page.items {
            let Some(owner) = entity.lock_owner() else {
                continue;
            };
            if repo.clear_lease(entity.id(), owner).await?.is_some() {
                tracing::debug!(
                    category = E::CATEGORY.as_str(),
                    entity_id = entity.id(),
                    tenant_id = entity.tenant_id(),
                    lock_owner = owner,
                    "Expired lease cleared"
                );
                cleared_in_page += 1;
            }
        }
        reaped += cleared_in_page;
        // Rows cleared here or by anyone else leave the filter, so a full
        // page always means more may follow.
        if page.is_last() {
            break;
        }
    }
    Ok(reaped)
}

/// Run the expiry reaper until `cancel` is triggered.
pub async fn run(
    accounts: Arc<dyn InventoryRepository<Account>>,
    resources: Arc<dyn InventoryRepository<Resource>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    page_size: i64,
    cancel: CancellationToken,
) {
    tracing::info!(interval_secs = interval.as_secs(), page_size, "Lease reaper started");

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Lease reaper stopping");
                break;
            }
            _ = ticker.tick() => {
                sweep(
                    "account",
                    reap_once::<Account, _>(accounts.as_ref(), clock.as_ref(), page_size).await,
                );
                sweep(
                    "resource",
                    reap_once::<Resource, _>(resources.as_ref(), clock.as_ref(), page_size).await,
                );
            }
        }
    }
}

fn sweep(category: &str, result: Result<usize, StoreError>) {
    match result {
        Ok(0) => tracing::debug!(category, "Lease reaper: nothing expired"),
        Ok(reaped) => tracing::info!(category, reaped, "Lease reaper: expired leases cleared"),
        Err(e) => tracing::error!(error = %e, category, "Lease reaper: sweep failed"),
    }
}
