// Regime memory: best-known parameters per (asset, regime)
//
// Every read-modify-write on a key runs under that key's async lock, so an
// optimizer run and a live path racing on the same entry cannot lose an
// update. Different keys never contend.
pub mod policy;
pub mod store;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

use crate::error::EngineError;
use crate::regime::{Advisory, MarketRegime};
use crate::strategy::StrategyParams;
use crate::Result;

pub use policy::{decide_update, ReplaceReason, UpdateDecision, STALE_AFTER_MS};
pub use store::{InMemoryStore, MemoryKey, MemoryStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegimeMemoryEntry {
    pub params: StrategyParams,
    pub analysis: Advisory,
    pub score: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Exclusive access to one key until dropped
pub struct MemoryLease<'a, S: ?Sized> {
    key: MemoryKey,
    store: &'a S,
    _guard: OwnedMutexGuard<()>,
}

impl<'a, S: MemoryStore + ?Sized> MemoryLease<'a, S> {
    pub fn key(&self) -> &MemoryKey {
        &self.key
    }

    pub async fn read(&self) -> Result<Option<RegimeMemoryEntry>> {
        self.store.get(&self.key).await
    }

    pub async fn write(&self, entry: &RegimeMemoryEntry) -> Result<()> {
        self.store.put(&self.key, entry).await
    }

    pub async fn delete(&self) -> Result<bool> {
        self.store.delete(&self.key).await
    }
}

pub struct RegimeMemory<S> {
    store: S,
    locks: Mutex<HashMap<MemoryKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: MemoryStore> RegimeMemory<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn key_lock(&self, key: &MemoryKey) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| EngineError::Store(e.to_string()))?;
        Ok(locks.entry(key.clone()).or_default().clone())
    }

    /// Wait for exclusive access to (asset, regime)
    pub async fn lease(&self, asset: &str, regime: MarketRegime) -> Result<MemoryLease<'_, S>> {
        let key = MemoryKey::new(asset, regime);
        let guard = self.key_lock(&key)?.lock_owned().await;
        Ok(MemoryLease {
            key,
            store: &self.store,
            _guard: guard,
        })
    }

    /// Stored entry, or `None` when nothing has been learned yet
    pub async fn recall(
        &self,
        asset: &str,
        regime: MarketRegime,
    ) -> Result<Option<RegimeMemoryEntry>> {
        self.lease(asset, regime).await?.read().await
    }

    pub async fn remember(
        &self,
        asset: &str,
        regime: MarketRegime,
        params: StrategyParams,
        analysis: Advisory,
        score: f64,
    ) -> Result<UpdateDecision> {
        self.remember_at(asset, regime, params, analysis, score, crate::now_ms())
            .await
    }

    /// Offer a candidate and write it if the update policy accepts it
    pub async fn remember_at(
        &self,
        asset: &str,
        regime: MarketRegime,
        params: StrategyParams,
        analysis: Advisory,
        score: f64,
        now_ms: i64,
    ) -> Result<UpdateDecision> {
        let lease = self.lease(asset, regime).await?;
        let existing = lease.read().await?;
        let decision = decide_update(existing.as_ref(), score, now_ms);

        if decision.is_write() {
            let entry = RegimeMemoryEntry {
                params,
                analysis,
                score,
                timestamp: now_ms,
            };
            lease.write(&entry).await?;
            tracing::info!(
                "Regime memory {} updated ({:?}), score {:.2}",
                lease.key(),
                decision,
                score
            );
        } else {
            tracing::debug!(
                "Regime memory {} kept stored entry, candidate score {:.2}",
                lease.key(),
                score
            );
        }

        Ok(decision)
    }

    /// Administrative removal
    pub async fn forget(&self, asset: &str, regime: MarketRegime) -> Result<bool> {
        self.lease(asset, regime).await?.delete().await
    }
}
