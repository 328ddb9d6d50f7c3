//! Inventory ledger domain module.
//!
//! This crate contains the business rules for goods and their stock levels,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod good;

pub use good::{
    AdjustStock, DeactivateGood, DetailsUpdated, Good, GoodCommand, GoodDeactivated, GoodEvent,
    GoodReactivated, GoodRegistered, GoodSnapshot, ReactivateGood, RegisterGood, StockAdjusted,
    UpdateDetails,
};
