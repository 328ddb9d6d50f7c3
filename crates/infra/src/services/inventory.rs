use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use stockroom_core::{Aggregate, DomainError, GoodId};
use stockroom_inventory::{
    AdjustStock, DeactivateGood, Good, GoodCommand, ReactivateGood, RegisterGood, UpdateDetails,
};

use super::execute_good;
use crate::error::{ServiceError, ServiceResult};
use crate::store::{Store, UnitOfWork};

/// Input for registering a good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGood {
    pub code: String,
    pub name: String,
    pub unit: String,
    #[serde(default)]
    pub description: String,
    pub critical_threshold: i64,
    pub initial_quantity: i64,
}

/// Fields of a good that may be edited after registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodChanges {
    pub name: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub critical_threshold: Option<i64>,
}

/// Inventory ledger: the authoritative record of goods and their stock.
#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn Store>,
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Active goods ordered by name.
    pub async fn active_goods(&self) -> ServiceResult<Vec<Good>> {
        let mut uow = self.store.begin().await?;
        Ok(uow.active_goods().await?)
    }

    pub async fn good(&self, id: GoodId) -> ServiceResult<Good> {
        let mut uow = self.store.begin().await?;
        uow.good(id).await?.ok_or_else(|| DomainError::not_found().into())
    }

    /// Active goods at or below their critical threshold, most critical first.
    pub async fn critical_goods(&self) -> ServiceResult<Vec<Good>> {
        let mut uow = self.store.begin().await?;
        Ok(uow.critical_goods().await?)
    }

    /// Register a new good. Codes are unique.
    #[instrument(skip(self, input), fields(code = %input.code), err)]
    pub async fn register_good(&self, input: NewGood) -> ServiceResult<Good> {
        let mut uow = self.store.begin().await?;

        let code = input.code.trim().to_string();
        if !code.is_empty() && uow.good_by_code(&code).await?.is_some() {
            return Err(DomainError::conflict(format!("good code '{code}' is already in use")).into());
        }

        let good_id = GoodId::new();
        let mut good = Good::empty(good_id);
        good.execute(&GoodCommand::RegisterGood(RegisterGood {
            good_id,
            code,
            name: input.name,
            unit: input.unit,
            description: input.description,
            critical_threshold: input.critical_threshold,
            initial_quantity: input.initial_quantity,
            occurred_at: Utc::now(),
        }))?;

        uow.insert_good(&good).await.map_err(|e| ServiceError::from(e).normalize())?;
        uow.commit().await?;

        tracing::info!(good_id = %good_id, "good registered");
        Ok(good)
    }

    /// Add `delta` to the stock on hand (negative deducts).
    #[instrument(skip(self), err)]
    pub async fn adjust_stock(&self, id: GoodId, delta: i64) -> ServiceResult<Good> {
        let good = self
            .mutate(id, |good_id| {
                GoodCommand::AdjustStock(AdjustStock {
                    good_id,
                    delta,
                    occurred_at: Utc::now(),
                })
            })
            .await?;
        tracing::info!(
            good_id = %id,
            delta,
            quantity_on_hand = good.quantity_on_hand(),
            "stock adjusted"
        );
        Ok(good)
    }

    /// Soft delete. Deactivating an inactive good is a no-op.
    #[instrument(skip(self), err)]
    pub async fn deactivate(&self, id: GoodId) -> ServiceResult<Good> {
        self.mutate(id, |good_id| {
            GoodCommand::Deactivate(DeactivateGood {
                good_id,
                occurred_at: Utc::now(),
            })
        })
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn reactivate(&self, id: GoodId) -> ServiceResult<Good> {
        self.mutate(id, |good_id| {
            GoodCommand::Reactivate(ReactivateGood {
                good_id,
                occurred_at: Utc::now(),
            })
        })
        .await
    }

    #[instrument(skip(self, changes), err)]
    pub async fn update_details(&self, id: GoodId, changes: GoodChanges) -> ServiceResult<Good> {
        self.mutate(id, |good_id| {
            GoodCommand::UpdateDetails(UpdateDetails {
                good_id,
                name: changes.name,
                unit: changes.unit,
                description: changes.description,
                critical_threshold: changes.critical_threshold,
                occurred_at: Utc::now(),
            })
        })
        .await
    }

    /// Lock one good, run a command against it and commit.
    async fn mutate<F>(&self, id: GoodId, command: F) -> ServiceResult<Good>
    where
        F: FnOnce(GoodId) -> GoodCommand,
    {
        let mut uow: Box<dyn UnitOfWork> = self.store.begin().await?;
        let mut good = uow
            .goods_for_update(&[id])
            .await?
            .pop()
            .ok_or_else(DomainError::not_found)?;

        let events = execute_good(uow.as_mut(), &mut good, command(id))
            .await
            .map_err(ServiceError::normalize)?;
        if !events.is_empty() {
            uow.commit().await?;
        }
        Ok(good)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn ledger() -> InventoryLedger {
        InventoryLedger::new(Arc::new(InMemoryStore::new()))
    }

    fn new_good(code: &str, name: &str, qty: i64, threshold: i64) -> NewGood {
        NewGood {
            code: code.to_string(),
            name: name.to_string(),
            unit: "pcs".to_string(),
            description: String::new(),
            critical_threshold: threshold,
            initial_quantity: qty,
        }
    }

    #[tokio::test]
    async fn register_rejects_duplicate_codes() {
        let ledger = ledger();
        ledger.register_good(new_good("PEN-01", "Pen", 10, 2)).await.unwrap();

        let err = ledger.register_good(new_good("PEN-01", "Another pen", 1, 0)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn adjust_stock_never_goes_negative() {
        let ledger = ledger();
        let pen = ledger.register_good(new_good("PEN-01", "Pen", 3, 1)).await.unwrap();

        let err = ledger.adjust_stock(pen.id_typed(), -4).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InvalidOperation(_))));
        assert_eq!(ledger.good(pen.id_typed()).await.unwrap().quantity_on_hand(), 3);

        let pen = ledger.adjust_stock(pen.id_typed(), -3).await.unwrap();
        assert_eq!(pen.quantity_on_hand(), 0);
    }

    #[tokio::test]
    async fn unknown_good_is_not_found() {
        let ledger = ledger();
        let err = ledger.adjust_stock(GoodId::new(), 5).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::NotFound)));

        let err = ledger.good(GoodId::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::NotFound)));
    }

    #[tokio::test]
    async fn deactivation_hides_goods_and_is_idempotent() {
        let ledger = ledger();
        let pen = ledger.register_good(new_good("PEN-01", "Pen", 3, 1)).await.unwrap();
        ledger.register_good(new_good("PAP-01", "Paper", 30, 5)).await.unwrap();

        let first = ledger.deactivate(pen.id_typed()).await.unwrap();
        let second = ledger.deactivate(pen.id_typed()).await.unwrap();
        assert!(!first.is_active());
        assert_eq!(first, second);

        let names: Vec<String> = ledger
            .active_goods()
            .await
            .unwrap()
            .iter()
            .map(|g| g.name().to_string())
            .collect();
        assert_eq!(names, ["Paper"]);

        // replenishing an inactive good is allowed
        let pen = ledger.adjust_stock(pen.id_typed(), 5).await.unwrap();
        assert_eq!(pen.quantity_on_hand(), 8);

        let pen = ledger.reactivate(pen.id_typed()).await.unwrap();
        assert!(pen.is_active());
    }

    #[tokio::test]
    async fn critical_goods_lists_active_goods_at_or_below_threshold() {
        let ledger = ledger();
        let stapler = ledger.register_good(new_good("STP", "Stapler", 0, 1)).await.unwrap();
        ledger.register_good(new_good("TONER", "Toner", 2, 2)).await.unwrap();
        ledger.register_good(new_good("PAP", "Paper", 40, 5)).await.unwrap();
        let glue = ledger.register_good(new_good("GLU", "Glue", 0, 3)).await.unwrap();
        ledger.deactivate(glue.id_typed()).await.unwrap();

        let critical = ledger.critical_goods().await.unwrap();
        let names: Vec<&str> = critical.iter().map(|g| g.name()).collect();
        assert_eq!(names, ["Stapler", "Toner"]);
        assert_eq!(critical[0].id_typed(), stapler.id_typed());
    }

    #[tokio::test]
    async fn update_details_keeps_code_and_stock() {
        let ledger = ledger();
        let pen = ledger.register_good(new_good("PEN-01", "Pen", 3, 1)).await.unwrap();

        let updated = ledger
            .update_details(
                pen.id_typed(),
                GoodChanges {
                    name: Some("Gel pen".to_string()),
                    critical_threshold: Some(5),
                    ..GoodChanges::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name(), "Gel pen");
        assert_eq!(updated.code(), "PEN-01");
        assert_eq!(updated.quantity_on_hand(), 3);
        assert!(updated.is_critical());
    }
}
