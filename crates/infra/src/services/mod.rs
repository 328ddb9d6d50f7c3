//! Application services (unit-of-work orchestration around the domain aggregates).
//!
//! Every operation follows the same pipeline:
//!
//! ```text
//! 1. Open a unit of work
//! 2. Load (and, for writes, lock) the aggregates involved
//! 3. Handle the command (pure decision logic, produces events)
//! 4. Apply events and write the new state with an optimistic version check
//! 5. Commit
//! ```
//!
//! Any failure before step 5 drops the unit of work, which discards its writes.

use stockroom_core::{Aggregate, AggregateRoot, ExpectedVersion};
use stockroom_events::Event;
use stockroom_inventory::{Good, GoodCommand, GoodEvent};

use crate::error::ServiceResult;
use crate::store::GoodRepository;

pub mod inventory;
pub mod queries;
pub mod requests;
pub mod verification;

pub use inventory::{GoodChanges, InventoryLedger, NewGood};
pub use queries::{QueryService, RequestSummary};
pub use requests::{CreationService, RequestItem};
pub use verification::VerificationEngine;

/// Run a command against a loaded good and persist the result.
///
/// A command that produces no events (an idempotent no-op) writes nothing.
pub(crate) async fn execute_good<R>(
    repo: &mut R,
    good: &mut Good,
    command: GoodCommand,
) -> ServiceResult<Vec<GoodEvent>>
where
    R: GoodRepository + ?Sized,
{
    let expected = ExpectedVersion::Exact(good.version());
    let events = good.execute(&command)?;
    if !events.is_empty() {
        repo.update_good(good, expected).await?;
    }
    for event in &events {
        tracing::debug!(event_type = event.event_type(), good_id = %good.id_typed(), "event applied");
    }
    Ok(events)
}
