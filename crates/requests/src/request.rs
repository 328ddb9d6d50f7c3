use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{
    Aggregate, AggregateRoot, DomainError, Entity, GoodId, RequestId, RequestLineId, UserId,
};
use stockroom_events::Event;

use crate::stock::StockLevels;

/// Request status lifecycle.
///
/// `Pending` is the only non-terminal state; a request leaves it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    PartiallyApproved,
    Rejected,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 4] = [
        RequestStatus::Pending,
        RequestStatus::Approved,
        RequestStatus::PartiallyApproved,
        RequestStatus::Rejected,
    ];

    pub fn is_terminal(self) -> bool {
        self != RequestStatus::Pending
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::PartiallyApproved => "partially_approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown request status '{s}'")))
    }
}

/// Derive the status of a verified request from its totals.
///
/// Nothing approved is a rejection, everything approved is an approval, anything
/// in between is a partial approval.
pub fn derive_status(total_requested: i64, total_approved: i64) -> RequestStatus {
    if total_approved == 0 {
        RequestStatus::Rejected
    } else if total_approved == total_requested {
        RequestStatus::Approved
    } else {
        RequestStatus::PartiallyApproved
    }
}

/// Administrator's declared decision kind.
///
/// The kind only gates the per-line values; the stored status is always derived
/// from the values themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionKind {
    Approve,
    Reject,
    PartialApprove,
}

impl DecisionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionKind::Approve => "Approve",
            DecisionKind::Reject => "Reject",
            DecisionKind::PartialApprove => "PartialApprove",
        }
    }
}

impl core::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for DecisionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [DecisionKind::Approve, DecisionKind::Reject, DecisionKind::PartialApprove]
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| {
                DomainError::malformed_decision(format!(
                    "decision must be one of Approve, Reject, PartialApprove (got '{s}')"
                ))
            })
    }
}

/// A line of a request (owned by the request, no lifecycle of its own).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLine {
    pub line_id: RequestLineId,
    pub good_id: GoodId,
    pub quantity_requested: i64,
    pub quantity_approved: i64,
}

impl Entity for RequestLine {
    type Id = RequestLineId;

    fn id(&self) -> &Self::Id {
        &self.line_id
    }
}

/// Verification metadata, present once a request has left `Pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub verifier: UserId,
    pub verified_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// Persisted shape of a request (header + lines).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub id: RequestId,
    pub requester: UserId,
    pub submitted_at: DateTime<Utc>,
    pub note: Option<String>,
    pub status: RequestStatus,
    pub lines: Vec<RequestLine>,
    pub verification: Option<Verification>,
    pub version: u64,
}

/// Aggregate root: Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    id: RequestId,
    requester: Option<UserId>,
    submitted_at: Option<DateTime<Utc>>,
    note: Option<String>,
    status: RequestStatus,
    lines: Vec<RequestLine>,
    verification: Option<Verification>,
    version: u64,
    created: bool,
}

impl Request {
    /// Create an empty, not-yet-submitted aggregate instance.
    pub fn empty(id: RequestId) -> Self {
        Self {
            id,
            requester: None,
            submitted_at: None,
            note: None,
            status: RequestStatus::Pending,
            lines: Vec::new(),
            verification: None,
            version: 0,
            created: false,
        }
    }

    /// Rebuild a submitted request from its persisted snapshot.
    pub fn from_snapshot(s: RequestSnapshot) -> Self {
        Self {
            id: s.id,
            requester: Some(s.requester),
            submitted_at: Some(s.submitted_at),
            note: s.note,
            status: s.status,
            lines: s.lines,
            verification: s.verification,
            version: s.version,
            created: true,
        }
    }

    /// Persisted shape of this request. Returns `None` before submission.
    pub fn snapshot(&self) -> Option<RequestSnapshot> {
        Some(RequestSnapshot {
            id: self.id,
            requester: self.requester?,
            submitted_at: self.submitted_at?,
            note: self.note.clone(),
            status: self.status,
            lines: self.lines.clone(),
            verification: self.verification.clone(),
            version: self.version,
        })
    }

    pub fn id_typed(&self) -> RequestId {
        self.id
    }

    pub fn requester(&self) -> Option<UserId> {
        self.requester
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn lines(&self) -> &[RequestLine] {
        &self.lines
    }

    pub fn verification(&self) -> Option<&Verification> {
        self.verification.as_ref()
    }

    pub fn is_submitted(&self) -> bool {
        self.created
    }

    /// Saturates at `i64::MAX`; submission rejects requests whose total does not fit.
    pub fn total_requested(&self) -> i64 {
        self.lines
            .iter()
            .map(|l| l.quantity_requested)
            .fold(0, i64::saturating_add)
    }

    /// Saturates at `i64::MAX`, like [`Request::total_requested`].
    pub fn total_approved(&self) -> i64 {
        self.lines
            .iter()
            .map(|l| l.quantity_approved)
            .fold(0, i64::saturating_add)
    }

    /// The checks that precede any look at a decision payload: the request must
    /// exist under `request_id` and still be pending.
    pub fn ensure_verifiable(&self, request_id: RequestId) -> Result<(), DomainError> {
        if !self.created || self.id != request_id {
            return Err(DomainError::not_found());
        }
        if self.status.is_terminal() {
            return Err(DomainError::AlreadyVerified);
        }
        Ok(())
    }

    /// Distinct goods referenced by this request, in id order.
    pub fn good_ids(&self) -> Vec<GoodId> {
        let mut ids: Vec<GoodId> = self.lines.iter().map(|l| l.good_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

impl AggregateRoot for Request {
    type Id = RequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// A line as submitted (the line id is assigned by the caller).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLine {
    pub line_id: RequestLineId,
    pub good_id: GoodId,
    pub quantity: i64,
}

/// Command: SubmitRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub request_id: RequestId,
    pub requester: UserId,
    pub lines: Vec<NewLine>,
    pub note: Option<String>,
    /// Ledger view used for the (advisory) existence and stock checks.
    pub stock: StockLevels,
    pub occurred_at: DateTime<Utc>,
}

/// Approved quantity for a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineApproval {
    pub line_id: RequestLineId,
    pub quantity_approved: i64,
}

/// The administrator's decision payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub kind: DecisionKind,
    pub approvals: Vec<LineApproval>,
    pub note: Option<String>,
}

/// Command: VerifyRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub request_id: RequestId,
    pub verifier: UserId,
    pub decision: Decision,
    /// Ledger view read under lock; the authoritative stock check runs against it.
    pub stock: StockLevels,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestCommand {
    Submit(SubmitRequest),
    Verify(VerifyRequest),
}

/// Event: RequestSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSubmitted {
    pub request_id: RequestId,
    pub requester: UserId,
    pub lines: Vec<RequestLine>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Stock to take out of one good as a consequence of a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDeduction {
    pub good_id: GoodId,
    pub quantity: i64,
}

/// Event: RequestVerified.
///
/// Carries the applied per-line values (in line order), the derived status and
/// the per-good deductions the caller must commit together with the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVerified {
    pub request_id: RequestId,
    pub verifier: UserId,
    pub kind: DecisionKind,
    pub status: RequestStatus,
    pub approvals: Vec<LineApproval>,
    pub deductions: Vec<StockDeduction>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestEvent {
    RequestSubmitted(RequestSubmitted),
    RequestVerified(RequestVerified),
}

impl Event for RequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RequestEvent::RequestSubmitted(_) => "requests.request.submitted",
            RequestEvent::RequestVerified(_) => "requests.request.verified",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RequestEvent::RequestSubmitted(e) => e.occurred_at,
            RequestEvent::RequestVerified(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Request {
    type Command = RequestCommand;
    type Event = RequestEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RequestEvent::RequestSubmitted(e) => {
                self.id = e.request_id;
                self.requester = Some(e.requester);
                self.submitted_at = Some(e.occurred_at);
                self.note = e.note.clone();
                self.status = RequestStatus::Pending;
                self.lines = e.lines.clone();
                self.verification = None;
                self.created = true;
            }
            RequestEvent::RequestVerified(e) => {
                let approved: HashMap<RequestLineId, i64> = e
                    .approvals
                    .iter()
                    .map(|a| (a.line_id, a.quantity_approved))
                    .collect();
                for line in &mut self.lines {
                    line.quantity_approved = approved.get(&line.line_id).copied().unwrap_or(0);
                }
                self.status = e.status;
                self.verification = Some(Verification {
                    verifier: e.verifier,
                    verified_at: e.occurred_at,
                    note: e.note.clone(),
                });
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RequestCommand::Submit(cmd) => self.handle_submit(cmd),
            RequestCommand::Verify(cmd) => self.handle_verify(cmd),
        }
    }
}

/// Sum of quantities, or `None` when it leaves the `i64` range.
fn checked_sum(quantities: impl IntoIterator<Item = i64>) -> Option<i64> {
    quantities.into_iter().try_fold(0i64, i64::checked_add)
}

fn quantity_out_of_range() -> DomainError {
    DomainError::invalid_operation("total quantity is out of range")
}

fn normalize_note(note: &Option<String>) -> Option<String> {
    note.as_ref()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

impl Request {
    fn handle_submit(&self, cmd: &SubmitRequest) -> Result<Vec<RequestEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("request already exists"));
        }

        if cmd.lines.is_empty() {
            return Err(DomainError::EmptyRequest);
        }

        if let Some(line) = cmd.lines.iter().find(|l| l.quantity < 1) {
            return Err(DomainError::validation(format!(
                "quantity for good {} must be at least 1",
                line.good_id
            )));
        }

        if checked_sum(cmd.lines.iter().map(|l| l.quantity)).is_none() {
            return Err(DomainError::validation(
                "total requested quantity is out of range",
            ));
        }

        // Unknown and inactive goods are reported together; nothing is created.
        let mut seen = HashSet::new();
        let invalid: Vec<GoodId> = cmd
            .lines
            .iter()
            .map(|l| l.good_id)
            .filter(|id| !matches!(cmd.stock.get(id), Some(level) if level.active))
            .filter(|id| seen.insert(*id))
            .collect();
        if !invalid.is_empty() {
            return Err(DomainError::InvalidGoods(invalid));
        }

        // Advisory only: nothing is reserved, verification re-checks under lock.
        for line in &cmd.lines {
            let available = cmd.stock.on_hand(&line.good_id);
            if line.quantity > available {
                return Err(DomainError::InsufficientStock {
                    good_id: line.good_id,
                    requested: line.quantity,
                    available,
                });
            }
        }

        Ok(vec![RequestEvent::RequestSubmitted(RequestSubmitted {
            request_id: cmd.request_id,
            requester: cmd.requester,
            lines: cmd
                .lines
                .iter()
                .map(|l| RequestLine {
                    line_id: l.line_id,
                    good_id: l.good_id,
                    quantity_requested: l.quantity,
                    quantity_approved: 0,
                })
                .collect(),
            note: normalize_note(&cmd.note),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_verify(&self, cmd: &VerifyRequest) -> Result<Vec<RequestEvent>, DomainError> {
        self.ensure_verifiable(cmd.request_id)?;

        let approved = self.check_coverage(&cmd.decision.approvals)?;

        for line in &self.lines {
            let quantity = approved[&line.line_id];
            if quantity < 0 {
                return Err(DomainError::malformed_decision(format!(
                    "approved quantity for line {} cannot be negative",
                    line.line_id
                )));
            }
            if quantity > line.quantity_requested {
                return Err(DomainError::ExceedsRequested {
                    line_id: line.line_id,
                    good_id: line.good_id,
                    requested: line.quantity_requested,
                    approved: quantity,
                });
            }
        }

        // Cumulative per good, so two lines on the same good cannot jointly overdraw it.
        let mut per_good: BTreeMap<GoodId, i64> = BTreeMap::new();
        for line in &self.lines {
            let total = per_good.entry(line.good_id).or_insert(0);
            *total = total
                .checked_add(approved[&line.line_id])
                .ok_or_else(quantity_out_of_range)?;
            let available = cmd.stock.on_hand(&line.good_id);
            if *total > available {
                return Err(DomainError::InsufficientStock {
                    good_id: line.good_id,
                    requested: *total,
                    available,
                });
            }
        }

        let total_requested = checked_sum(self.lines.iter().map(|l| l.quantity_requested))
            .ok_or_else(quantity_out_of_range)?;
        let total_approved =
            checked_sum(per_good.values().copied()).ok_or_else(quantity_out_of_range)?;
        let status = derive_status(total_requested, total_approved);

        let kind_matches = match cmd.decision.kind {
            DecisionKind::Approve => status == RequestStatus::Approved,
            DecisionKind::Reject => status == RequestStatus::Rejected,
            DecisionKind::PartialApprove => true,
        };
        if !kind_matches {
            return Err(DomainError::DecisionMismatch {
                declared: cmd.decision.kind.to_string(),
                derived: status.to_string(),
            });
        }

        Ok(vec![RequestEvent::RequestVerified(RequestVerified {
            request_id: cmd.request_id,
            verifier: cmd.verifier,
            kind: cmd.decision.kind,
            status,
            approvals: self
                .lines
                .iter()
                .map(|l| LineApproval {
                    line_id: l.line_id,
                    quantity_approved: approved[&l.line_id],
                })
                .collect(),
            deductions: per_good
                .into_iter()
                .filter(|(_, quantity)| *quantity > 0)
                .map(|(good_id, quantity)| StockDeduction { good_id, quantity })
                .collect(),
            note: normalize_note(&cmd.decision.note),
            occurred_at: cmd.occurred_at,
        })])
    }

    /// The decision must name every line exactly once and nothing else.
    fn check_coverage(
        &self,
        approvals: &[LineApproval],
    ) -> Result<HashMap<RequestLineId, i64>, DomainError> {
        let known: HashSet<RequestLineId> = self.lines.iter().map(|l| l.line_id).collect();
        let mut approved = HashMap::with_capacity(approvals.len());

        for a in approvals {
            if !known.contains(&a.line_id) {
                return Err(DomainError::malformed_decision(format!(
                    "line {} is not part of this request",
                    a.line_id
                )));
            }
            if approved.insert(a.line_id, a.quantity_approved).is_some() {
                return Err(DomainError::malformed_decision(format!(
                    "line {} appears more than once",
                    a.line_id
                )));
            }
        }

        if let Some(missing) = self.lines.iter().find(|l| !approved.contains_key(&l.line_id)) {
            return Err(DomainError::malformed_decision(format!(
                "line {} has no approved quantity",
                missing.line_id
            )));
        }

        Ok(approved)
    }
}
