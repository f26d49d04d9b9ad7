//! Paged query results.

/// Default page size for inventory browsing.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Maximum page size accepted by any store.
pub const MAX_PAGE_SIZE: i64 = 500;

/// One page of a search, in stable id order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of matches across all pages.
    pub total: i64,
    pub skip: i64,
    pub take: i64,
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether this page was cut short, i.e. no further matches follow it.
    pub fn is_last(&self) -> bool {
        (self.items.len() as i64) < self.take
    }
}

/// Clamp caller-supplied paging values into the accepted range. A
/// non-positive `take` means the default page size.
pub fn clamp_paging(skip: i64, take: i64) -> (i64, i64) {
    let take = if take <= 0 { DEFAULT_PAGE_SIZE } else { take.min(MAX_PAGE_SIZE) };
    (skip.max(0), take)
}
