//! Verification engine.
//!
//! Verifying a request is the only operation that writes to both the request and
//! the ledger. Both happen in one unit of work:
//!
//! ```text
//! 1. Lock the request
//! 2. Lock every good it references (id order)
//! 3. Decide against the locked stock levels
//! 4. Deduct approved quantities through the ledger's stock-adjust rule
//! 5. Write line approvals, status and verification metadata
//! 6. Commit
//! ```
//!
//! Concurrent verifications that compete for the same stock are serialized by the
//! locks in step 2; the loser re-reads the reduced stock and fails with
//! `InsufficientStock` instead of overdrawing.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use stockroom_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, ExpectedVersion, RequestId, UserId,
};
use stockroom_events::Event;
use stockroom_inventory::{AdjustStock, GoodCommand};
use stockroom_requests::{
    Decision, Request, RequestCommand, RequestEvent, StockLevel, StockLevels, VerifyRequest,
};

use super::execute_good;
use crate::error::{ServiceError, ServiceResult};
use crate::store::Store;

#[derive(Clone)]
pub struct VerificationEngine {
    store: Arc<dyn Store>,
}

impl VerificationEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn verify(
        &self,
        request_id: RequestId,
        verifier: UserId,
        decision: Decision,
    ) -> ServiceResult<Request> {
        self.verify_submitted(request_id, verifier, Ok(decision)).await
    }

    /// Verify with a decision that may have failed to parse.
    ///
    /// A parse failure is reported only once the request is known to exist and to
    /// be pending, so `NotFound` and `AlreadyVerified` win over a bad payload.
    #[instrument(skip(self, decision), err)]
    pub async fn verify_submitted(
        &self,
        request_id: RequestId,
        verifier: UserId,
        decision: DomainResult<Decision>,
    ) -> ServiceResult<Request> {
        let mut uow = self.store.begin().await?;

        // 1) Lock the request
        let mut request = uow
            .request_for_update(request_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        let expected = ExpectedVersion::Exact(request.version());

        let decision = request
            .ensure_verifiable(request_id)
            .and(decision)
            .inspect_err(|e| {
                tracing::warn!(request_id = %request_id, code = e.code(), error = %e, "verification rejected");
            })?;
        let kind = decision.kind;

        // 2) Lock the goods it references
        let mut goods: HashMap<_, _> = uow
            .goods_for_update(&request.good_ids())
            .await?
            .into_iter()
            .map(|g| (g.id_typed(), g))
            .collect();
        let stock: StockLevels = goods
            .values()
            .map(|g| {
                (
                    g.id_typed(),
                    StockLevel {
                        on_hand: g.quantity_on_hand(),
                        active: g.is_active(),
                    },
                )
            })
            .collect();

        // 3) Decide
        let occurred_at = Utc::now();
        let events = request.execute(&RequestCommand::Verify(VerifyRequest {
            request_id,
            verifier,
            decision,
            stock,
            occurred_at,
        }))
        .inspect_err(|e| {
            tracing::warn!(request_id = %request_id, code = e.code(), error = %e, "verification rejected");
        })?;

        // 4) Deduct stock
        for event in &events {
            tracing::debug!(event_type = event.event_type(), request_id = %request_id, "event applied");
            let RequestEvent::RequestVerified(verified) = event else {
                continue;
            };
            for deduction in &verified.deductions {
                let good = goods
                    .get_mut(&deduction.good_id)
                    .ok_or_else(DomainError::not_found)?;
                execute_good(
                    uow.as_mut(),
                    good,
                    GoodCommand::AdjustStock(AdjustStock {
                        good_id: deduction.good_id,
                        delta: -deduction.quantity,
                        occurred_at,
                    }),
                )
                .await
                .map_err(ServiceError::normalize)?;
            }
        }

        // 5) Write the request
        uow.update_request(&request, expected)
            .await
            .map_err(|e| ServiceError::from(e).normalize())?;

        // 6) Commit
        uow.commit().await?;

        tracing::info!(
            request_id = %request_id,
            verifier = %verifier,
            kind = %kind,
            status = %request.status(),
            total_approved = request.total_approved(),
            "request verified"
        );
        Ok(request)
    }
}
