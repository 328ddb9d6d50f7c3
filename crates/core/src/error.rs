//! Domain error model.

use thiserror::Error;

use crate::id::{GoodId, RequestLineId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic business failures. Every variant is a
/// user-readable outcome of bad input or a rule violation; persistence failures
/// belong to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A requested resource was not found.
    #[error("not found")]
    NotFound,

    /// One or more referenced goods are unknown or inactive.
    #[error("invalid goods: {}", join_ids(.0))]
    InvalidGoods(Vec<GoodId>),

    /// A request was submitted without lines.
    #[error("a request needs at least one line")]
    EmptyRequest,

    /// The quantity asked for (or approved) exceeds what is on hand.
    #[error("insufficient stock for good {good_id}: requested {requested}, available {available}")]
    InsufficientStock {
        good_id: GoodId,
        requested: i64,
        available: i64,
    },

    /// An approved quantity is larger than the requested quantity of its line.
    #[error("line {line_id} (good {good_id}): approved {approved} exceeds requested {requested}")]
    ExceedsRequested {
        line_id: RequestLineId,
        good_id: GoodId,
        requested: i64,
        approved: i64,
    },

    /// A decision payload does not cover exactly the lines of the request.
    #[error("malformed decision: {0}")]
    MalformedDecision(String),

    /// The declared decision kind disagrees with the per-line values.
    #[error("decision {declared} does not match the approved quantities (they amount to {derived})")]
    DecisionMismatch { declared: String, derived: String },

    /// The request has already left the pending state.
    #[error("request has already been verified")]
    AlreadyVerified,

    /// The operation would break a ledger invariant (e.g. negative stock).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A uniqueness or version conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn malformed_decision(msg: impl Into<String>) -> Self {
        Self::MalformedDecision(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Stable machine-readable code, used by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NotFound => "not_found",
            DomainError::InvalidGoods(_) => "invalid_goods",
            DomainError::EmptyRequest => "empty_request",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::ExceedsRequested { .. } => "exceeds_requested",
            DomainError::MalformedDecision(_) => "malformed_decision",
            DomainError::DecisionMismatch { .. } => "decision_mismatch",
            DomainError::AlreadyVerified => "already_verified",
            DomainError::InvalidOperation(_) => "invalid_operation",
            DomainError::Validation(_) => "validation_error",
            DomainError::Conflict(_) => "conflict",
            DomainError::InvalidId(_) => "invalid_id",
        }
    }
}

fn join_ids(ids: &[GoodId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
