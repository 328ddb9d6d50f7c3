use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{Aggregate, AggregateRoot, DomainError, GoodId};
use stockroom_events::Event;

/// Persisted shape of a good (one row of the ledger).
///
/// Repositories read and write this; the aggregate is rebuilt from it with
/// [`Good::from_snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodSnapshot {
    pub id: GoodId,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub description: String,
    pub quantity_on_hand: i64,
    pub critical_threshold: i64,
    pub active: bool,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate root: Good (one entry of the inventory ledger).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Good {
    id: GoodId,
    code: String,
    name: String,
    unit: String,
    description: String,
    quantity_on_hand: i64,
    critical_threshold: i64,
    active: bool,
    version: u64,
    created: bool,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Good {
    /// Create an empty, not-yet-registered aggregate instance.
    pub fn empty(id: GoodId) -> Self {
        Self {
            id,
            code: String::new(),
            name: String::new(),
            unit: String::new(),
            description: String::new(),
            quantity_on_hand: 0,
            critical_threshold: 0,
            active: false,
            version: 0,
            created: false,
            created_at: None,
            updated_at: None,
        }
    }

    /// Rebuild a registered good from its persisted snapshot.
    pub fn from_snapshot(s: GoodSnapshot) -> Self {
        Self {
            id: s.id,
            code: s.code,
            name: s.name,
            unit: s.unit,
            description: s.description,
            quantity_on_hand: s.quantity_on_hand,
            critical_threshold: s.critical_threshold,
            active: s.active,
            version: s.version,
            created: true,
            created_at: Some(s.created_at),
            updated_at: Some(s.updated_at),
        }
    }

    /// Persisted shape of this good.
    ///
    /// Only meaningful once the good has been registered; an empty aggregate
    /// reports the Unix epoch for its timestamps.
    pub fn snapshot(&self) -> GoodSnapshot {
        GoodSnapshot {
            id: self.id,
            code: self.code.clone(),
            name: self.name.clone(),
            unit: self.unit.clone(),
            description: self.description.clone(),
            quantity_on_hand: self.quantity_on_hand,
            critical_threshold: self.critical_threshold,
            active: self.active,
            version: self.version,
            created_at: self.created_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            updated_at: self.updated_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        }
    }

    pub fn id_typed(&self) -> GoodId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn quantity_on_hand(&self) -> i64 {
        self.quantity_on_hand
    }

    pub fn critical_threshold(&self) -> i64 {
        self.critical_threshold
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_registered(&self) -> bool {
        self.created
    }

    /// Stock has fallen to or below the critical threshold.
    pub fn is_critical(&self) -> bool {
        self.quantity_on_hand <= self.critical_threshold
    }
}

impl AggregateRoot for Good {
    type Id = GoodId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterGood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterGood {
    pub good_id: GoodId,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub description: String,
    pub critical_threshold: i64,
    pub initial_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock (positive = replenish, negative = deduct).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub good_id: GoodId,
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateGood (soft delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateGood {
    pub good_id: GoodId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReactivateGood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateGood {
    pub good_id: GoodId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateDetails. `None` leaves a field untouched; the code is immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub good_id: GoodId,
    pub name: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub critical_threshold: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoodCommand {
    RegisterGood(RegisterGood),
    AdjustStock(AdjustStock),
    Deactivate(DeactivateGood),
    Reactivate(ReactivateGood),
    UpdateDetails(UpdateDetails),
}

/// Event: GoodRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodRegistered {
    pub good_id: GoodId,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub description: String,
    pub critical_threshold: i64,
    pub initial_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub good_id: GoodId,
    pub delta: i64,
    pub quantity_after: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodDeactivated {
    pub good_id: GoodId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodReactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodReactivated {
    pub good_id: GoodId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DetailsUpdated (carries the full resulting details).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsUpdated {
    pub good_id: GoodId,
    pub name: String,
    pub unit: String,
    pub description: String,
    pub critical_threshold: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoodEvent {
    GoodRegistered(GoodRegistered),
    StockAdjusted(StockAdjusted),
    GoodDeactivated(GoodDeactivated),
    GoodReactivated(GoodReactivated),
    DetailsUpdated(DetailsUpdated),
}

impl Event for GoodEvent {
    fn event_type(&self) -> &'static str {
        match self {
            GoodEvent::GoodRegistered(_) => "inventory.good.registered",
            GoodEvent::StockAdjusted(_) => "inventory.good.stock_adjusted",
            GoodEvent::GoodDeactivated(_) => "inventory.good.deactivated",
            GoodEvent::GoodReactivated(_) => "inventory.good.reactivated",
            GoodEvent::DetailsUpdated(_) => "inventory.good.details_updated",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            GoodEvent::GoodRegistered(e) => e.occurred_at,
            GoodEvent::StockAdjusted(e) => e.occurred_at,
            GoodEvent::GoodDeactivated(e) => e.occurred_at,
            GoodEvent::GoodReactivated(e) => e.occurred_at,
            GoodEvent::DetailsUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Good {
    type Command = GoodCommand;
    type Event = GoodEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            GoodEvent::GoodRegistered(e) => {
                self.id = e.good_id;
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.unit = e.unit.clone();
                self.description = e.description.clone();
                self.critical_threshold = e.critical_threshold;
                self.quantity_on_hand = e.initial_quantity;
                self.active = true;
                self.created = true;
                self.created_at = Some(e.occurred_at);
            }
            GoodEvent::StockAdjusted(e) => {
                self.quantity_on_hand = e.quantity_after;
            }
            GoodEvent::GoodDeactivated(_) => {
                self.active = false;
            }
            GoodEvent::GoodReactivated(_) => {
                self.active = true;
            }
            GoodEvent::DetailsUpdated(e) => {
                self.name = e.name.clone();
                self.unit = e.unit.clone();
                self.description = e.description.clone();
                self.critical_threshold = e.critical_threshold;
            }
        }

        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            GoodCommand::RegisterGood(cmd) => self.handle_register(cmd),
            GoodCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            GoodCommand::Deactivate(cmd) => self.handle_deactivate(cmd),
            GoodCommand::Reactivate(cmd) => self.handle_reactivate(cmd),
            GoodCommand::UpdateDetails(cmd) => self.handle_update_details(cmd),
        }
    }
}

impl Good {
    fn ensure_registered(&self, good_id: GoodId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != good_id {
            return Err(DomainError::invalid_operation("good_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterGood) -> Result<Vec<GoodEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("good already exists"));
        }
        if cmd.code.trim().is_empty() {
            return Err(DomainError::validation("code cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.critical_threshold < 0 {
            return Err(DomainError::validation(
                "critical threshold cannot be negative",
            ));
        }
        if cmd.initial_quantity < 0 {
            return Err(DomainError::validation("initial quantity cannot be negative"));
        }

        Ok(vec![GoodEvent::GoodRegistered(GoodRegistered {
            good_id: cmd.good_id,
            code: cmd.code.trim().to_string(),
            name: cmd.name.trim().to_string(),
            unit: cmd.unit.trim().to_string(),
            description: cmd.description.clone(),
            critical_threshold: cmd.critical_threshold,
            initial_quantity: cmd.initial_quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<GoodEvent>, DomainError> {
        self.ensure_registered(cmd.good_id)?;

        if cmd.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        // Replenishment is allowed on inactive goods: admins restock before reactivating.
        let quantity_after = self
            .quantity_on_hand
            .checked_add(cmd.delta)
            .ok_or_else(|| DomainError::invalid_operation("stock adjustment overflows"))?;
        if quantity_after < 0 {
            return Err(DomainError::invalid_operation(format!(
                "stock of {} cannot go negative ({} on hand, delta {})",
                self.code, self.quantity_on_hand, cmd.delta
            )));
        }

        Ok(vec![GoodEvent::StockAdjusted(StockAdjusted {
            good_id: cmd.good_id,
            delta: cmd.delta,
            quantity_after,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateGood) -> Result<Vec<GoodEvent>, DomainError> {
        self.ensure_registered(cmd.good_id)?;

        if !self.active {
            return Ok(vec![]);
        }

        Ok(vec![GoodEvent::GoodDeactivated(GoodDeactivated {
            good_id: cmd.good_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(&self, cmd: &ReactivateGood) -> Result<Vec<GoodEvent>, DomainError> {
        self.ensure_registered(cmd.good_id)?;

        if self.active {
            return Ok(vec![]);
        }

        Ok(vec![GoodEvent::GoodReactivated(GoodReactivated {
            good_id: cmd.good_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_details(&self, cmd: &UpdateDetails) -> Result<Vec<GoodEvent>, DomainError> {
        self.ensure_registered(cmd.good_id)?;

        let name = match &cmd.name {
            Some(n) if n.trim().is_empty() => {
                return Err(DomainError::validation("name cannot be empty"));
            }
            Some(n) => n.trim().to_string(),
            None => self.name.clone(),
        };
        let critical_threshold = cmd.critical_threshold.unwrap_or(self.critical_threshold);
        if critical_threshold < 0 {
            return Err(DomainError::validation(
                "critical threshold cannot be negative",
            ));
        }

        Ok(vec![GoodEvent::DetailsUpdated(DetailsUpdated {
            good_id: cmd.good_id,
            name,
            unit: cmd
                .unit
                .as_ref()
                .map(|u| u.trim().to_string())
                .unwrap_or_else(|| self.unit.clone()),
            description: cmd
                .description
                .clone()
                .unwrap_or_else(|| self.description.clone()),
            critical_threshold,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn registered(quantity: i64, threshold: i64) -> Good {
        let good_id = GoodId::new();
        let mut good = Good::empty(good_id);
        good.execute(&GoodCommand::RegisterGood(RegisterGood {
            good_id,
            code: "PEN-01".to_string(),
            name: "Ballpoint pen".to_string(),
            unit: "box".to_string(),
            description: String::new(),
            critical_threshold: threshold,
            initial_quantity: quantity,
            occurred_at: test_time(),
        }))
        .unwrap();
        good
    }

    fn adjust(good: &Good, delta: i64) -> GoodCommand {
        GoodCommand::AdjustStock(AdjustStock {
            good_id: good.id_typed(),
            delta,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn register_sets_stock_and_activates() {
        let good = registered(10, 2);
        assert!(good.is_active());
        assert_eq!(good.quantity_on_hand(), 10);
        assert_eq!(good.code(), "PEN-01");
        assert_eq!(good.version(), 1);
    }

    #[test]
    fn register_twice_is_a_conflict() {
        let good = registered(1, 0);
        let err = good
            .handle(&GoodCommand::RegisterGood(RegisterGood {
                good_id: good.id_typed(),
                code: "X".to_string(),
                name: "X".to_string(),
                unit: "pc".to_string(),
                description: String::new(),
                critical_threshold: 0,
                initial_quantity: 0,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn register_rejects_blank_code() {
        let good_id = GoodId::new();
        let err = Good::empty(good_id)
            .handle(&GoodCommand::RegisterGood(RegisterGood {
                good_id,
                code: "  ".to_string(),
                name: "Paper".to_string(),
                unit: "ream".to_string(),
                description: String::new(),
                critical_threshold: 0,
                initial_quantity: 0,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn adjust_adds_and_deducts() {
        let mut good = registered(10, 2);
        good.execute(&adjust(&good, 5)).unwrap();
        assert_eq!(good.quantity_on_hand(), 15);
        good.execute(&adjust(&good, -15)).unwrap();
        assert_eq!(good.quantity_on_hand(), 0);
    }

    #[test]
    fn adjust_below_zero_is_invalid_operation() {
        let good = registered(3, 0);
        let err = good.handle(&adjust(&good, -4)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidOperation(_)));
    }

    #[test]
    fn adjust_zero_is_rejected() {
        let good = registered(3, 0);
        assert!(matches!(
            good.handle(&adjust(&good, 0)).unwrap_err(),
            DomainError::Validation(_)
        ));
    }

    #[test]
    fn adjust_unregistered_is_not_found() {
        let good = Good::empty(GoodId::new());
        assert_eq!(
            good.handle(&adjust(&good, 1)).unwrap_err(),
            DomainError::NotFound
        );
    }

    #[test]
    fn replenishing_an_inactive_good_is_allowed() {
        let mut good = registered(0, 0);
        good.execute(&GoodCommand::Deactivate(DeactivateGood {
            good_id: good.id_typed(),
            occurred_at: test_time(),
        }))
        .unwrap();
        good.execute(&adjust(&good, 20)).unwrap();
        assert!(!good.is_active());
        assert_eq!(good.quantity_on_hand(), 20);
    }

    #[test]
    fn deactivate_is_idempotent() {
        let mut good = registered(1, 0);
        let cmd = GoodCommand::Deactivate(DeactivateGood {
            good_id: good.id_typed(),
            occurred_at: test_time(),
        });
        assert_eq!(good.execute(&cmd).unwrap().len(), 1);
        let version = good.version();
        assert!(good.execute(&cmd).unwrap().is_empty());
        assert_eq!(good.version(), version);
        assert!(!good.is_active());
    }

    #[test]
    fn update_details_keeps_code_and_unset_fields() {
        let mut good = registered(4, 1);
        good.execute(&GoodCommand::UpdateDetails(UpdateDetails {
            good_id: good.id_typed(),
            name: Some("Gel pen".to_string()),
            unit: None,
            description: None,
            critical_threshold: Some(5),
            occurred_at: test_time(),
        }))
        .unwrap();
        assert_eq!(good.name(), "Gel pen");
        assert_eq!(good.unit(), "box");
        assert_eq!(good.code(), "PEN-01");
        assert!(good.is_critical());
    }

    #[test]
    fn critical_at_threshold() {
        assert!(registered(2, 2).is_critical());
        assert!(!registered(3, 2).is_critical());
    }

    #[test]
    fn snapshot_round_trip_preserves_state() {
        let good = registered(7, 3);
        let restored = Good::from_snapshot(good.snapshot());
        assert_eq!(restored, good);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: no sequence of adjustments ever drives stock below zero.
            #[test]
            fn stock_never_goes_negative(
                initial in 0i64..1_000,
                deltas in proptest::collection::vec(-500i64..500, 0..40)
            ) {
                let mut good = registered(initial, 0);
                let mut expected = initial;
                for delta in deltas {
                    let result = good.execute(&adjust(&good, delta));
                    if delta != 0 && expected + delta >= 0 {
                        prop_assert!(result.is_ok());
                        expected += delta;
                    } else {
                        prop_assert!(result.is_err());
                    }
                    prop_assert!(good.quantity_on_hand() >= 0);
                    prop_assert_eq!(good.quantity_on_hand(), expected);
                }
            }
        }
    }
}
