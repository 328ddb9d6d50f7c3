use std::sync::Arc;

use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, RequestId};
use stockroom_inventory::Good;
use stockroom_requests::{Request, RequestStatus};

use crate::error::ServiceResult;
use crate::store::{GoodFilter, Page, Pagination, RequestFilter, Store};

/// Count of requests per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSummary {
    pub pending: u64,
    pub approved: u64,
    pub partially_approved: u64,
    pub rejected: u64,
    pub total: u64,
}

impl RequestSummary {
    pub fn from_counts(counts: impl IntoIterator<Item = (RequestStatus, u64)>) -> Self {
        let mut summary = Self::default();
        for (status, n) in counts {
            match status {
                RequestStatus::Pending => summary.pending += n,
                RequestStatus::Approved => summary.approved += n,
                RequestStatus::PartiallyApproved => summary.partially_approved += n,
                RequestStatus::Rejected => summary.rejected += n,
            }
            summary.total += n;
        }
        summary
    }
}

/// Read-only queries. Units of work opened here are never committed.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn Store>,
}

impl QueryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn request(&self, id: RequestId) -> ServiceResult<Request> {
        let mut uow = self.store.begin().await?;
        uow.request(id).await?.ok_or_else(|| DomainError::not_found().into())
    }

    /// Filtered requests, newest first.
    pub async fn list_requests(
        &self,
        filter: &RequestFilter,
        page: Pagination,
    ) -> ServiceResult<Page<Request>> {
        let mut uow = self.store.begin().await?;
        Ok(uow.list_requests(filter, page).await?)
    }

    /// Filtered goods ordered by name.
    pub async fn list_goods(&self, filter: &GoodFilter, page: Pagination) -> ServiceResult<Page<Good>> {
        let mut uow = self.store.begin().await?;
        Ok(uow.search_goods(filter, page).await?)
    }

    pub async fn request_summary(&self) -> ServiceResult<RequestSummary> {
        let mut uow = self.store.begin().await?;
        Ok(RequestSummary::from_counts(uow.count_by_status().await?))
    }
}
