//! Business logic services

pub mod inventory;
pub mod query;

use std::sync::Arc;

use crate::{config::EngineConfig, repository::LedgerStore};

pub use inventory::{Deadline, InventoryService};
pub use query::QueryService;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub inventory: InventoryService,
    pub query: QueryService,
}

impl Services {
    /// Create all services on top of the given store
    pub fn new(store: Arc<dyn LedgerStore>, engine_config: EngineConfig) -> Self {
        Self {
            inventory: InventoryService::new(store.clone(), engine_config),
            query: QueryService::new(store),
        }
    }
}
