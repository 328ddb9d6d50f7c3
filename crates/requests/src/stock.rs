use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockroom_core::GoodId;

/// Stock level of one good as read by the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub on_hand: i64,
    pub active: bool,
}

/// Point-in-time view of the ledger for the goods a command touches.
///
/// Goods absent from the snapshot are treated as unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels(BTreeMap<GoodId, StockLevel>);

impl StockLevels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, good_id: GoodId, on_hand: i64, active: bool) {
        self.0.insert(good_id, StockLevel { on_hand, active });
    }

    pub fn get(&self, good_id: &GoodId) -> Option<StockLevel> {
        self.0.get(good_id).copied()
    }

    /// Quantity on hand, or zero for goods missing from the snapshot.
    pub fn on_hand(&self, good_id: &GoodId) -> i64 {
        self.get(good_id).map(|s| s.on_hand).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(GoodId, StockLevel)> for StockLevels {
    fn from_iter<I: IntoIterator<Item = (GoodId, StockLevel)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
