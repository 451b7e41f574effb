// warden-core/src/application/pool.rs

// Bounded execution per data source. A unit waits for a permit, then runs under its own
// time budget; the wait does not count against the budget.

use futures::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::ports::connector::{ConnectorError, DataSourceConnector};

#[derive(Debug)]
pub struct WorkerPool {
    source_id: String,
    capacity: usize,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(source_id: &str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            source_id: source_id.to_string(),
            capacity,
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn run<F>(&self, budget: Duration, unit: F) -> Result<F::Output, ConnectorError>
    where
        F: Future,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ConnectorError::Connection {
                source_id: self.source_id.clone(),
                message: "worker pool closed".to_string(),
            })?;
        tokio::time::timeout(budget, unit)
            .await
            .map_err(|_| ConnectorError::Timeout(budget))
    }

    /// Runs `unit` once per item with at most `capacity` units in flight. Outcomes come back in
    /// completion order, each paired with its item.
    pub async fn run_all<'a, T, F, Fut>(
        &self,
        budget: Duration,
        items: &'a [T],
        unit: F,
    ) -> Vec<(&'a T, Result<Fut::Output, ConnectorError>)>
    where
        F: Fn(&'a T) -> Fut,
        Fut: Future,
    {
        debug!(
            source = %self.source_id,
            units = items.len(),
            capacity = self.capacity,
            "Dispatching batch"
        );
        let unit = &unit;
        let units: Vec<_> = items
            .iter()
            .map(|item| async move { (item, self.run(budget, unit(item)).await) })
            .collect();
        futures::stream::iter(units)
        .buffer_unordered(self.capacity)
        .collect()
        .await
    }
}

/// One pool per data source, sized from the connector on first use.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: Mutex<HashMap<String, Arc<WorkerPool>>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool_for(&self, connector: &dyn DataSourceConnector) -> Arc<WorkerPool> {
        let mut pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        pools
            .entry(connector.source_id().to_string())
            .or_insert_with(|| {
                Arc::new(WorkerPool::new(
                    connector.source_id(),
                    connector.max_connections(),
                ))
            })
            .clone()
    }
}
