//! Persistence boundary: repositories, the unit of work, and the stores that open it.
//!
//! Every mutating operation runs inside one [`UnitOfWork`]. Committing makes all of
//! its writes visible at once; dropping it uncommitted discards them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{ExpectedVersion, GoodId, RequestId, UserId};
use stockroom_inventory::Good;
use stockroom_requests::{Request, RequestStatus};

use crate::error::StoreResult;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

/// Page selection for listings (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl Pagination {
    /// Out-of-range values are clamped: `page >= 1`, `per_page` in `1..=100`.
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    /// Number of matches across all pages.
    pub total: u64,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: Pagination, total: u64) -> Self {
        let has_more = pagination.offset() + (items.len() as u64) < total;
        Self {
            items,
            page: pagination.page,
            per_page: pagination.per_page,
            total,
            has_more,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            has_more: self.has_more,
        }
    }
}

/// Filter criteria for request listings. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub requester: Option<UserId>,
    /// Inclusive lower bound on submission time.
    pub submitted_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on submission time.
    pub submitted_to: Option<DateTime<Utc>>,
}

impl RequestFilter {
    pub fn matches(&self, request: &Request) -> bool {
        let submitted_at = request.submitted_at();
        self.status.is_none_or(|s| s == request.status())
            && self.requester.is_none_or(|r| request.requester() == Some(r))
            && self
                .submitted_from
                .is_none_or(|from| submitted_at.is_some_and(|at| at >= from))
            && self
                .submitted_to
                .is_none_or(|to| submitted_at.is_some_and(|at| at < to))
    }
}

/// Filter criteria for good listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodFilter {
    pub include_inactive: bool,
    /// Case-insensitive substring matched against code and name.
    pub search: Option<String>,
}

impl GoodFilter {
    /// The search term, trimmed; blank terms are ignored.
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn matches(&self, good: &Good) -> bool {
        if !self.include_inactive && !good.is_active() {
            return false;
        }
        match self.search_term() {
            None => true,
            Some(term) => {
                let term = term.to_lowercase();
                good.code().to_lowercase().contains(&term)
                    || good.name().to_lowercase().contains(&term)
            }
        }
    }
}

#[async_trait]
pub trait GoodRepository: Send {
    async fn good(&mut self, id: GoodId) -> StoreResult<Option<Good>>;

    /// Load and lock the given goods, in id order. Unknown ids are skipped.
    async fn goods_for_update(&mut self, ids: &[GoodId]) -> StoreResult<Vec<Good>>;

    async fn good_by_code(&mut self, code: &str) -> StoreResult<Option<Good>>;

    /// Active goods ordered by name.
    async fn active_goods(&mut self) -> StoreResult<Vec<Good>>;

    /// Active goods at or below their threshold, lowest stock first (ties by name).
    async fn critical_goods(&mut self) -> StoreResult<Vec<Good>>;

    /// Filtered goods ordered by name.
    async fn search_goods(&mut self, filter: &GoodFilter, page: Pagination) -> StoreResult<Page<Good>>;

    async fn insert_good(&mut self, good: &Good) -> StoreResult<()>;

    /// Overwrite a stored good, provided its stored version is still `expected`.
    async fn update_good(&mut self, good: &Good, expected: ExpectedVersion) -> StoreResult<()>;
}

#[async_trait]
pub trait RequestRepository: Send {
    async fn request(&mut self, id: RequestId) -> StoreResult<Option<Request>>;

    /// Load and lock a request with its lines.
    async fn request_for_update(&mut self, id: RequestId) -> StoreResult<Option<Request>>;

    /// Insert header and lines together.
    async fn insert_request(&mut self, request: &Request) -> StoreResult<()>;

    /// Overwrite header and line approvals, provided the stored version is still `expected`.
    async fn update_request(&mut self, request: &Request, expected: ExpectedVersion) -> StoreResult<()>;

    /// Filtered requests, newest first.
    async fn list_requests(&mut self, filter: &RequestFilter, page: Pagination) -> StoreResult<Page<Request>>;

    /// Request counts for every status that has at least one request.
    async fn count_by_status(&mut self) -> StoreResult<Vec<(RequestStatus, u64)>>;
}

/// A transaction over both repositories.
#[async_trait]
pub trait UnitOfWork: GoodRepository + RequestRepository {
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Opens units of work against a backing store.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_clamps_out_of_range_values() {
        assert_eq!(Pagination::new(None, None), Pagination { page: 1, per_page: 20 });
        assert_eq!(Pagination::new(Some(0), Some(0)), Pagination { page: 1, per_page: 1 });
        assert_eq!(Pagination::new(Some(3), Some(500)), Pagination { page: 3, per_page: 100 });
        assert_eq!(Pagination::new(Some(3), Some(10)).offset(), 20);
    }

    #[test]
    fn page_reports_whether_more_items_exist() {
        let p = Pagination::new(Some(1), Some(2));
        assert!(Page::new(vec![1, 2], p, 3).has_more);
        assert!(!Page::new(vec![1, 2], p, 2).has_more);

        let last = Pagination::new(Some(2), Some(2));
        assert!(!Page::new(vec![3], last, 3).has_more);
    }
}
