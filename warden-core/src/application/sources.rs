// warden-core/src/application/sources.rs

use std::collections::HashMap;
use std::sync::Arc;

use crate::application::pool::{PoolRegistry, WorkerPool};
use crate::domain::error::DomainError;
use crate::error::Result;
use crate::ports::connector::DataSourceConnector;

/// Registered data sources and their worker pools.
#[derive(Default)]
pub struct SourceRegistry {
    connectors: HashMap<String, Arc<dyn DataSourceConnector>>,
    pools: PoolRegistry,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connector: Arc<dyn DataSourceConnector>) {
        self.connectors
            .insert(connector.source_id().to_string(), connector);
    }

    pub fn connector(&self, source_id: &str) -> Result<Arc<dyn DataSourceConnector>> {
        self.connectors
            .get(source_id)
            .cloned()
            .ok_or_else(|| DomainError::SourceNotFound(source_id.to_string()).into())
    }

    pub fn pool(&self, connector: &dyn DataSourceConnector) -> Arc<WorkerPool> {
        self.pools.pool_for(connector)
    }
}
