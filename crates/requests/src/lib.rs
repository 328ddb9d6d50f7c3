//! Supply request domain module (request lifecycle + verification rules).
//!
//! This crate contains the business rules for multi-line supply requests,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).
//! Stock levels come in on the commands as a [`StockLevels`] snapshot read by
//! the caller.

pub mod request;
pub mod stock;

pub use request::{
    derive_status, Decision, DecisionKind, LineApproval, NewLine, Request, RequestCommand,
    RequestEvent, RequestLine, RequestSnapshot, RequestStatus, RequestSubmitted, RequestVerified,
    StockDeduction, SubmitRequest, Verification, VerifyRequest,
};
pub use stock::{StockLevel, StockLevels};
