use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

use crate::error::EngineError;
use crate::memory::{MemoryKey, MemoryStore, RegimeMemoryEntry};
use crate::Result;

/// Redis-backed regime memory
///
/// One JSON document per key: `regime_memory:{asset}:{regime}`
#[derive(Clone)]
pub struct RedisMemoryStore {
    conn: ConnectionManager,
}

impl RedisMemoryStore {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        // Add 5 second timeout to connection attempt
        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| {
                EngineError::Store("Redis connection timeout after 5 seconds".to_string())
            })??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }
}

#[async_trait]
impl MemoryStore for RedisMemoryStore {
    async fn get(&self, key: &MemoryKey) -> Result<Option<RegimeMemoryEntry>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key.storage_key()).await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &MemoryKey, entry: &RegimeMemoryEntry) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(entry)?;
        conn.set::<_, _, ()>(key.storage_key(), json).await?;

        tracing::debug!("Saved regime memory {} to Redis", key);
        Ok(())
    }

    async fn delete(&self, key: &MemoryKey) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: usize = conn.del(key.storage_key()).await?;
        Ok(removed > 0)
    }

    async fn keys(&self) -> Result<Vec<MemoryKey>> {
        let mut conn = self.conn.clone();
        let mut raw: Vec<String> = conn.keys("regime_memory:*").await?;
        raw.sort();

        Ok(raw
            .iter()
            .filter_map(|k| MemoryKey::parse_storage_key(k))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RegimeMemory;
    use crate::regime::{MarketRegime, OfflineAdvisor};
    use crate::strategy::StrategyParams;

    fn create_test_entry(score: f64) -> RegimeMemoryEntry {
        let params = StrategyParams::default();
        RegimeMemoryEntry {
            params,
            analysis: OfflineAdvisor.analyze("TEST_REDIS", &[], &params),
            score,
            timestamp: crate::now_ms(),
        }
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_connection_timeout() {
        // Try to connect to non-existent Redis
        let result = RedisMemoryStore::new("redis://192.0.2.1:6379").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_put_get_delete() {
        let store = RedisMemoryStore::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");
        let key = MemoryKey::new("TEST_REDIS", MarketRegime::Ranging);
        let _ = store.delete(&key).await;

        store.put(&key, &create_test_entry(42.0)).await.unwrap();
        let loaded = store.get(&key).await.unwrap().unwrap();
        assert_eq!(loaded.score, 42.0);
        assert_eq!(loaded.analysis.regime, MarketRegime::Unknown);
        assert!(store.keys().await.unwrap().contains(&key));

        assert!(store.delete(&key).await.unwrap());
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_regime_memory_over_redis() {
        let store = RedisMemoryStore::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");
        let memory = RegimeMemory::new(store);
        let _ = memory.forget("TEST_REDIS_MEM", MarketRegime::Volatile).await;

        let entry = create_test_entry(10.0);
        memory
            .remember(
                "TEST_REDIS_MEM",
                MarketRegime::Volatile,
                entry.params,
                entry.analysis.clone(),
                10.0,
            )
            .await
            .unwrap();
        let worse = memory
            .remember("TEST_REDIS_MEM", MarketRegime::Volatile, entry.params, entry.analysis, 5.0)
            .await
            .unwrap();

        assert!(!worse.is_write());
        let stored = memory
            .recall("TEST_REDIS_MEM", MarketRegime::Volatile)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.score, 10.0);

        let _ = memory.forget("TEST_REDIS_MEM", MarketRegime::Volatile).await;
    }
}
