// warden-core/src/domain/governance/cache.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::domain::governance::matcher::RuleSet;
use crate::error::Result;
use crate::ports::store::RuleStore;

/// Attempts before a reader gives up chasing concurrent invalidations and uses what it loaded.
const MAX_RELOADS: usize = 3;

#[derive(Debug)]
struct CacheEntry {
    rules: Arc<RuleSet>,
    cached_at: Instant,
    generation: u64,
    revision: u64,
}

/// Compiled snapshot of the PII rules, refreshed on TTL expiry, store revision change or
/// explicit invalidation. Readers get an `Arc` and never hold the lock across I/O.
pub struct PiiRuleCache {
    store: Arc<dyn RuleStore>,
    ttl: Duration,
    generation: AtomicU64,
    snapshot: RwLock<Option<Arc<CacheEntry>>>,
}

impl PiiRuleCache {
    pub fn new(store: Arc<dyn RuleStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl: ttl.min(Duration::from_secs(60)),
            generation: AtomicU64::new(0),
            snapshot: RwLock::new(None),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Drops the snapshot. Any populate that started earlier will not install its result.
    pub fn invalidate(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = None;
        debug!(generation, "PII rule cache invalidated");
    }

    pub async fn rules(&self) -> Result<Arc<RuleSet>> {
        if let Some(rules) = self.fresh() {
            return Ok(rules);
        }

        let mut loaded = None;
        for _ in 0..MAX_RELOADS {
            let generation = self.generation();
            let revision = self.store.revision();
            let rules = Arc::new(RuleSet::compile(self.store.pii_rules().await?));

            let installed = {
                let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
                let current = self.generation() == generation;
                if current {
                    *guard = Some(Arc::new(CacheEntry {
                        rules: rules.clone(),
                        cached_at: Instant::now(),
                        generation,
                        revision,
                    }));
                }
                current
            };
            if installed {
                debug!(generation, rules = rules.len(), "PII rule cache populated");
                return Ok(rules);
            }
            debug!("Discarding PII rule snapshot loaded across an invalidation");
            loaded = Some(rules);
        }

        Ok(loaded.unwrap_or_default())
    }

    fn fresh(&self) -> Option<Arc<RuleSet>> {
        let guard = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        let entry = guard.as_ref()?;
        let valid = entry.generation == self.generation()
            && entry.cached_at.elapsed() < self.ttl
            && entry.revision == self.store.revision();
        valid.then(|| entry.rules.clone())
    }
}
