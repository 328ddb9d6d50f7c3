use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use stockroom_core::{Aggregate, GoodId, RequestId, RequestLineId, UserId};
use stockroom_events::Event;
use stockroom_requests::{NewLine, Request, RequestCommand, StockLevels, SubmitRequest};

use crate::error::{ServiceError, ServiceResult};
use crate::store::Store;

/// One requested line: a good and how many units of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItem {
    pub good_id: GoodId,
    pub quantity: i64,
}

/// Creation service: turns a staff submission into a pending request.
///
/// The stock check performed here is advisory. Nothing is reserved and the ledger
/// is never touched; verification re-checks stock under lock.
#[derive(Clone)]
pub struct CreationService {
    store: Arc<dyn Store>,
}

impl CreationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, items, note), fields(requester = %requester, lines = items.len()), err)]
    pub async fn create_request(
        &self,
        requester: UserId,
        items: Vec<RequestItem>,
        note: Option<String>,
    ) -> ServiceResult<Request> {
        let mut uow = self.store.begin().await?;

        // Plain reads: creation holds no locks on the ledger.
        let good_ids: BTreeSet<GoodId> = items.iter().map(|i| i.good_id).collect();
        let mut stock = StockLevels::new();
        for id in good_ids {
            if let Some(good) = uow.good(id).await? {
                stock.insert(id, good.quantity_on_hand(), good.is_active());
            }
        }

        let request_id = RequestId::new();
        let mut request = Request::empty(request_id);
        let events = request.execute(&RequestCommand::Submit(SubmitRequest {
            request_id,
            requester,
            lines: items
                .iter()
                .map(|item| NewLine {
                    line_id: RequestLineId::new(),
                    good_id: item.good_id,
                    quantity: item.quantity,
                })
                .collect(),
            note,
            stock,
            occurred_at: Utc::now(),
        }))
        .inspect_err(|e| {
            tracing::warn!(requester = %requester, code = e.code(), error = %e, "request rejected");
        })?;

        for event in &events {
            tracing::debug!(event_type = event.event_type(), request_id = %request_id, "event applied");
        }

        uow.insert_request(&request)
            .await
            .map_err(|e| ServiceError::from(e).normalize())?;
        uow.commit().await?;

        tracing::info!(request_id = %request_id, "request submitted");
        Ok(request)
    }
}
