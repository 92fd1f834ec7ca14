//! Per-provider module catalog cache with TTL refresh.
//!
//! At most one refresh runs at a time, enforced by `refresh_lock`, a
//! `tokio::sync::Mutex` held for the whole pass. `invalid` and
//! `last_refresh` are only updated on the statement after every concurrent
//! discover request has completed, so aborting the task running `refresh`
//! (e.g. via `JoinHandle::abort` on a timeout) leaves the cache invalid and
//! the next read simply triggers one more refresh.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hrpc_core::{ModuleId, TargetUri};
use hrpc_task::{ShutdownSignal, Task};
use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use crate::ejb::EjbClient;

pub struct DiscoveryCache {
    ttl: Duration,
    modules: RwLock<HashSet<ModuleId>>,
    last_refresh: RwLock<Option<Instant>>,
    invalid: AtomicBool,
    refresh_lock: AsyncMutex<()>,
}

impl DiscoveryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            modules: RwLock::new(HashSet::new()),
            last_refresh: RwLock::new(None),
            invalid: AtomicBool::new(true),
            refresh_lock: AsyncMutex::new(()),
        }
    }

    /// TTL from the environment override when set, the default otherwise.
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_millis(hrpc_core::discovery_ttl_ms()))
    }

    fn needs_refresh(&self) -> bool {
        if self.invalid.load(Ordering::Acquire) {
            return true;
        }
        match *self.last_refresh.read() {
            Some(last) => last.elapsed() > self.ttl,
            None => true,
        }
    }

    /// Runs one refresh pass: clears the set, issues a discover request to
    /// every target concurrently, folds in every success, and logs every
    /// failure without aborting the pass. A pass where every target failed
    /// still counts as a completed refresh over an empty catalog.
    #[tracing::instrument(skip(self, client, targets))]
    pub async fn refresh(&self, client: &EjbClient, targets: &[TargetUri]) {
        let _guard = self.refresh_lock.lock().await;

        self.modules.write().clear();

        let mut join_set = tokio::task::JoinSet::new();
        for target in targets.iter().cloned() {
            let client = client.clone();
            join_set.spawn(async move {
                let result = client.discover(&target).await;
                (target, result)
            });
        }

        while let Some(outcome) = join_set.join_next().await {
            match outcome {
                Ok((_, Ok(modules))) => {
                    self.modules.write().extend(modules);
                }
                Ok((target, Err(err))) => {
                    warn!(%target, error = %err, "discovery refresh failed for target");
                }
                Err(join_err) => {
                    warn!(error = %join_err, "discovery refresh task panicked");
                }
            }
        }

        *self.last_refresh.write() = Some(Instant::now());
        self.invalid.store(false, Ordering::Release);
    }

    /// Marks the cache invalid, typically after a caller reports a target
    /// gone missing; the next read refreshes regardless of the TTL.
    pub fn invalidate(&self) {
        self.invalid.store(true, Ordering::Release);
    }

    /// Returns every cached module id satisfying `filter`, refreshing once
    /// (and re-searching) if the first pass matches nothing.
    pub async fn search(&self, client: &EjbClient, targets: &[TargetUri], mut filter: impl FnMut(&ModuleId) -> bool) -> Vec<ModuleId> {
        if self.needs_refresh() {
            self.refresh(client, targets).await;
        }

        let matches: Vec<ModuleId> = self.modules.read().iter().filter(|m| filter(m)).cloned().collect();
        if !matches.is_empty() {
            return matches;
        }

        self.refresh(client, targets).await;
        self.modules.read().iter().filter(|m| filter(m)).cloned().collect()
    }

    pub fn snapshot(&self) -> HashSet<ModuleId> {
        self.modules.read().clone()
    }
}

/// Keeps a [`DiscoveryCache`] warm in the background, refreshing on the
/// cache's TTL cadence until shut down.
pub struct DiscoveryRefreshTask {
    cache: Arc<DiscoveryCache>,
    client: EjbClient,
    targets: Vec<TargetUri>,
}

impl DiscoveryRefreshTask {
    pub fn new(cache: Arc<DiscoveryCache>, client: EjbClient, targets: Vec<TargetUri>) -> Self {
        Self { cache, client, targets }
    }
}

#[async_trait]
impl Task for DiscoveryRefreshTask {
    const NAME: &'static str = "discovery refresh";

    async fn run(self, mut shutdown_signal: ShutdownSignal) -> anyhow::Result<()> {
        loop {
            self.cache.refresh(&self.client, &self.targets).await;
            tokio::select! {
                _ = tokio::time::sleep(self.cache.ttl) => {}
                _ = shutdown_signal.wait() => break,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_invalid_so_the_first_search_always_refreshes() {
        let cache = DiscoveryCache::with_default_ttl();
        assert!(cache.needs_refresh());
    }

    #[test]
    fn invalidate_forces_a_refresh_regardless_of_ttl() {
        let cache = DiscoveryCache::new(Duration::from_secs(3600));
        *cache.last_refresh.write() = Some(Instant::now());
        cache.invalid.store(false, Ordering::Release);
        assert!(!cache.needs_refresh());
        cache.invalidate();
        assert!(cache.needs_refresh());
    }

    #[test]
    fn elapsed_ttl_forces_a_refresh() {
        let cache = DiscoveryCache::new(Duration::ZERO);
        *cache.last_refresh.write() = Some(Instant::now() - Duration::from_millis(5));
        cache.invalid.store(false, Ordering::Release);
        assert!(cache.needs_refresh());
    }
}
