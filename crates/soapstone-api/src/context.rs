use std::sync::Arc;

use soapstone_entities::{EntityStore, RequestExecutor};

use crate::{ApiError, ClientConfig, HttpExecutor};

/// A store paired with the executor that feeds it.
///
/// Every domain hook is built from a context, so hooks created from the same
/// context see each other's writes.
#[derive(Clone)]
pub struct ApiContext {
    store: Arc<EntityStore>,
    executor: Arc<dyn RequestExecutor>,
}

impl ApiContext {
    pub fn new(store: Arc<EntityStore>, executor: Arc<dyn RequestExecutor>) -> Self {
        Self { store, executor }
    }

    /// An empty store talking HTTP to the configured server.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        let executor = HttpExecutor::new(config)?;
        Ok(Self::new(EntityStore::new(), Arc::new(executor)))
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn executor(&self) -> &Arc<dyn RequestExecutor> {
        &self.executor
    }

    pub fn is_logged_in(&self) -> bool {
        self.executor.is_logged_in()
    }
}
