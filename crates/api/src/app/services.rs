use std::sync::Arc;

use stockroom_infra::services::{CreationService, InventoryLedger, QueryService, VerificationEngine};
use stockroom_infra::store::Store;

/// Application services shared by all routes.
#[derive(Clone)]
pub struct AppServices {
    pub ledger: InventoryLedger,
    pub creation: CreationService,
    pub verification: VerificationEngine,
    pub queries: QueryService,
}

impl AppServices {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            ledger: InventoryLedger::new(store.clone()),
            creation: CreationService::new(store.clone()),
            verification: VerificationEngine::new(store.clone()),
            queries: QueryService::new(store),
        }
    }
}
