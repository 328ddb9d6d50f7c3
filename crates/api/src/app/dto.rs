use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, GoodId, RequestId, RequestLineId, UserId};
use stockroom_infra::services::{GoodChanges, NewGood, RequestItem};
use stockroom_inventory::Good;
use stockroom_requests::{Decision, DecisionKind, LineApproval, Request, RequestStatus};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    #[serde(default)]
    pub items: Vec<RequestItemBody>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RequestItemBody {
    pub good_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequestBody {
    pub decision: String,
    #[serde(default)]
    pub items: Vec<LineApprovalBody>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LineApprovalBody {
    pub line_id: String,
    pub quantity_approved: i64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterGoodBody {
    pub code: String,
    pub name: String,
    pub unit: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub critical_threshold: i64,
    #[serde(default)]
    pub initial_quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockBody {
    pub delta: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateGoodBody {
    pub name: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub critical_threshold: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRequestsQuery {
    pub status: Option<String>,
    pub requester: Option<String>,
    pub submitted_from: Option<DateTime<Utc>>,
    pub submitted_to: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchGoodsQuery {
    pub q: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub type ParseResult<T> = Result<T, axum::response::Response>;

pub fn parse_good_id(raw: &str) -> ParseResult<GoodId> {
    raw.parse().map_err(errors::domain_error_to_response)
}

pub fn parse_request_id(raw: &str) -> ParseResult<RequestId> {
    raw.parse().map_err(errors::domain_error_to_response)
}

pub fn parse_user_id(raw: &str) -> ParseResult<UserId> {
    raw.parse().map_err(errors::domain_error_to_response)
}

pub fn parse_status(raw: &str) -> ParseResult<RequestStatus> {
    raw.parse().map_err(errors::domain_error_to_response)
}

impl CreateRequestBody {
    pub fn items(&self) -> ParseResult<Vec<RequestItem>> {
        self.items
            .iter()
            .map(|item| {
                Ok(RequestItem {
                    good_id: parse_good_id(&item.good_id)?,
                    quantity: item.quantity,
                })
            })
            .collect()
    }
}

impl VerifyRequestBody {
    /// Parse the payload. Errors are returned as values so the engine can rank
    /// them behind the request lookup and the pending check.
    pub fn decision(self) -> DomainResult<Decision> {
        let kind: DecisionKind = self.decision.parse()?;
        let approvals = self
            .items
            .iter()
            .map(|item| {
                let line_id: RequestLineId = item.line_id.parse().map_err(|_| {
                    DomainError::malformed_decision(format!("'{}' is not a line id", item.line_id))
                })?;
                Ok(LineApproval {
                    line_id,
                    quantity_approved: item.quantity_approved,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(Decision {
            kind,
            approvals,
            note: self.note,
        })
    }
}

impl From<RegisterGoodBody> for NewGood {
    fn from(body: RegisterGoodBody) -> Self {
        NewGood {
            code: body.code,
            name: body.name,
            unit: body.unit,
            description: body.description,
            critical_threshold: body.critical_threshold,
            initial_quantity: body.initial_quantity,
        }
    }
}

impl From<UpdateGoodBody> for GoodChanges {
    fn from(body: UpdateGoodBody) -> Self {
        GoodChanges {
            name: body.name,
            unit: body.unit,
            description: body.description,
            critical_threshold: body.critical_threshold,
        }
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct GoodResponse {
    pub id: String,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub description: String,
    pub quantity_on_hand: i64,
    pub critical_threshold: i64,
    pub active: bool,
    pub is_critical: bool,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Good> for GoodResponse {
    fn from(good: &Good) -> Self {
        let s = good.snapshot();
        GoodResponse {
            id: s.id.to_string(),
            code: s.code,
            name: s.name,
            unit: s.unit,
            description: s.description,
            quantity_on_hand: s.quantity_on_hand,
            critical_threshold: s.critical_threshold,
            active: s.active,
            is_critical: good.is_critical(),
            version: s.version,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestLineResponse {
    pub line_id: String,
    pub good_id: String,
    pub quantity_requested: i64,
    pub quantity_approved: i64,
}

#[derive(Debug, Serialize)]
pub struct RequestResponse {
    pub id: String,
    pub requester: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub status: RequestStatus,
    pub lines: Vec<RequestLineResponse>,
    pub total_requested: i64,
    pub total_approved: i64,
    pub verifier: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub decision_note: Option<String>,
    pub version: u64,
}

impl From<&Request> for RequestResponse {
    fn from(request: &Request) -> Self {
        use stockroom_core::AggregateRoot;

        let verification = request.verification();
        RequestResponse {
            id: request.id_typed().to_string(),
            requester: request.requester().map(|u| u.to_string()),
            submitted_at: request.submitted_at(),
            note: request.note().map(str::to_string),
            status: request.status(),
            lines: request
                .lines()
                .iter()
                .map(|l| RequestLineResponse {
                    line_id: l.line_id.to_string(),
                    good_id: l.good_id.to_string(),
                    quantity_requested: l.quantity_requested,
                    quantity_approved: l.quantity_approved,
                })
                .collect(),
            total_requested: request.total_requested(),
            total_approved: request.total_approved(),
            verifier: verification.map(|v| v.verifier.to_string()),
            verified_at: verification.map(|v| v.verified_at),
            decision_note: verification.and_then(|v| v.note.clone()),
            version: request.version(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_body_parses_kind_and_line_ids() {
        let line_id = RequestLineId::new();
        let body = VerifyRequestBody {
            decision: "PartialApprove".to_string(),
            items: vec![LineApprovalBody {
                line_id: line_id.to_string(),
                quantity_approved: 2,
            }],
            note: Some("half now".to_string()),
        };

        let decision = body.decision().unwrap();
        assert_eq!(decision.kind, DecisionKind::PartialApprove);
        assert_eq!(decision.approvals[0].line_id, line_id);
        assert_eq!(decision.note.as_deref(), Some("half now"));
    }

    #[test]
    fn bad_ids_and_kinds_are_bad_requests() {
        let body = VerifyRequestBody {
            decision: "Maybe".to_string(),
            items: vec![],
            note: None,
        };
        assert!(matches!(body.decision(), Err(DomainError::MalformedDecision(_))));

        let body = VerifyRequestBody {
            decision: "Reject".to_string(),
            items: vec![LineApprovalBody {
                line_id: "not-a-uuid".to_string(),
                quantity_approved: 0,
            }],
            note: None,
        };
        assert!(matches!(body.decision(), Err(DomainError::MalformedDecision(_))));

        let body = CreateRequestBody {
            items: vec![RequestItemBody {
                good_id: "not-a-uuid".to_string(),
                quantity: 1,
            }],
            note: None,
        };
        let res = body.items().unwrap_err();
        assert_eq!(res.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
