use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::RegimeMemoryEntry;
use crate::error::EngineError;
use crate::regime::MarketRegime;
use crate::Result;

const KEY_PREFIX: &str = "regime_memory";

/// (asset, regime) address of a memory entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryKey {
    pub asset: String,
    pub regime: MarketRegime,
}

impl MemoryKey {
    pub fn new(asset: impl Into<String>, regime: MarketRegime) -> Self {
        Self {
            asset: asset.into(),
            regime,
        }
    }

    /// `regime_memory:{asset}:{regime}`
    pub fn storage_key(&self) -> String {
        format!("{}:{}:{}", KEY_PREFIX, self.asset, self.regime.as_str())
    }

    pub fn parse_storage_key(raw: &str) -> Option<Self> {
        let rest = raw.strip_prefix(KEY_PREFIX)?.strip_prefix(':')?;
        let (asset, regime) = rest.rsplit_once(':')?;
        if asset.is_empty() {
            return None;
        }
        Some(Self::new(asset, regime.parse().ok()?))
    }
}

impl fmt::Display for MemoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.asset, self.regime)
    }
}

/// Key-value backend for regime memory
///
/// Implementations do plain reads and writes; `RegimeMemory` owns the
/// per-key serialisation and the update policy.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn get(&self, key: &MemoryKey) -> Result<Option<RegimeMemoryEntry>>;

    async fn put(&self, key: &MemoryKey, entry: &RegimeMemoryEntry) -> Result<()>;

    /// Administrative removal; returns whether an entry existed
    async fn delete(&self, key: &MemoryKey) -> Result<bool>;

    async fn keys(&self) -> Result<Vec<MemoryKey>>;
}

#[async_trait]
impl<S: MemoryStore + ?Sized> MemoryStore for Arc<S> {
    async fn get(&self, key: &MemoryKey) -> Result<Option<RegimeMemoryEntry>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &MemoryKey, entry: &RegimeMemoryEntry) -> Result<()> {
        (**self).put(key, entry).await
    }

    async fn delete(&self, key: &MemoryKey) -> Result<bool> {
        (**self).delete(key).await
    }

    async fn keys(&self) -> Result<Vec<MemoryKey>> {
        (**self).keys().await
    }
}

/// Process-local store
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<RwLock<HashMap<MemoryKey, RegimeMemoryEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> EngineError {
    EngineError::Store(e.to_string())
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn get(&self, key: &MemoryKey) -> Result<Option<RegimeMemoryEntry>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &MemoryKey, entry: &RegimeMemoryEntry) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(key.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, key: &MemoryKey) -> Result<bool> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        Ok(entries.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<MemoryKey>> {
        let entries = self.entries.read().map_err(poisoned)?;
        let mut keys: Vec<MemoryKey> = entries.keys().cloned().collect();
        keys.sort_by(|a, b| a.storage_key().cmp(&b.storage_key()));
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::entry_with;

    #[test]
    fn test_storage_key_round_trip() {
        let key = MemoryKey::new("SOL/USDC", MarketRegime::TrendingDown);
        assert_eq!(key.storage_key(), "regime_memory:SOL/USDC:TRENDING_DOWN");
        assert_eq!(MemoryKey::parse_storage_key(&key.storage_key()), Some(key));
    }

    #[test]
    fn test_parse_rejects_foreign_keys() {
        assert_eq!(MemoryKey::parse_storage_key("snapshots:SOL"), None);
        assert_eq!(MemoryKey::parse_storage_key("regime_memory::RANGING"), None);
        assert_eq!(MemoryKey::parse_storage_key("regime_memory:BTC:SIDEWAYS"), None);
    }

    #[tokio::test]
    async fn test_in_memory_store_crud() {
        let store = InMemoryStore::new();
        let btc = MemoryKey::new("BTC", MarketRegime::Ranging);
        let eth = MemoryKey::new("ETH", MarketRegime::Volatile);

        assert!(store.get(&btc).await.unwrap().is_none());

        store.put(&btc, &entry_with(10.0, 1)).await.unwrap();
        store.put(&eth, &entry_with(20.0, 2)).await.unwrap();
        assert_eq!(store.get(&btc).await.unwrap().map(|e| e.score), Some(10.0));
        assert_eq!(store.keys().await.unwrap(), vec![btc.clone(), eth.clone()]);

        assert!(store.delete(&btc).await.unwrap());
        assert!(!store.delete(&btc).await.unwrap());
        assert_eq!(store.keys().await.unwrap(), vec![eth]);
    }
}
