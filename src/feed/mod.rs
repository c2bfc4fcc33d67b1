use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::EngineError;
use crate::models::Candle;
use crate::Result;

/// A batch starting further than this past the stored tail is a reconnection
pub const RECONNECT_GAP_MS: i64 = 60 * 60 * 1000;

/// Merge a fresh batch into an ordered series
///
/// - Gap over 60 minutes between the stored tail and the batch: the batch
///   replaces the series outright.
/// - A candle sharing the tail's timestamp replaces the tail in place.
/// - Otherwise only strictly newer candles are appended.
pub fn merge_candles(existing: &[Candle], incoming: &[Candle]) -> Vec<Candle> {
    let (Some(tail), Some(head)) = (existing.last(), incoming.first()) else {
        return if incoming.is_empty() {
            existing.to_vec()
        } else {
            incoming.to_vec()
        };
    };

    if head.time - tail.time > RECONNECT_GAP_MS {
        tracing::debug!(
            "Feed gap of {}s, replacing {} stale candles",
            (head.time - tail.time) / 1000,
            existing.len()
        );
        return incoming.to_vec();
    }

    let mut merged = existing.to_vec();
    for candle in incoming {
        match merged.last_mut() {
            Some(last) if candle.time == last.time => *last = *candle,
            Some(last) if candle.time < last.time => {}
            _ => merged.push(*candle),
        }
    }
    merged
}

/// Thread-safe per-asset candle series
///
/// Appends for one asset are serialised by the write lock, so concurrent
/// feeders cannot interleave out of order.
#[derive(Clone)]
pub struct CandleStore {
    data: Arc<RwLock<HashMap<String, Vec<Candle>>>>,
    max_history: usize,
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> EngineError {
    EngineError::Store(e.to_string())
}

impl CandleStore {
    /// # Arguments
    /// * `max_history` - Maximum number of candles to keep per asset
    pub fn new(max_history: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            max_history: max_history.max(1),
        }
    }

    /// Merge a batch for `asset`, trimming to the newest `max_history`
    /// candles; returns the resulting series length
    pub fn ingest(&self, asset: &str, batch: &[Candle]) -> Result<usize> {
        let mut data = self.data.write().map_err(poisoned)?;
        let series = data.entry(asset.to_string()).or_default();

        let mut merged = merge_candles(series, batch);
        if merged.len() > self.max_history {
            merged.drain(..merged.len() - self.max_history);
        }
        *series = merged;

        Ok(series.len())
    }

    pub fn candles(&self, asset: &str) -> Result<Vec<Candle>> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.get(asset).cloned().unwrap_or_default())
    }

    /// The `n` most recent candles, oldest first
    pub fn recent(&self, asset: &str, n: usize) -> Result<Vec<Candle>> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data
            .get(asset)
            .map(|series| series[series.len().saturating_sub(n)..].to_vec())
            .unwrap_or_default())
    }

    pub fn latest(&self, asset: &str) -> Result<Option<Candle>> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.get(asset).and_then(|series| series.last().copied()))
    }

    pub fn len(&self, asset: &str) -> Result<usize> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.get(asset).map(|s| s.len()).unwrap_or(0))
    }

    pub fn assets(&self) -> Result<Vec<String>> {
        let data = self.data.read().map_err(poisoned)?;
        let mut assets: Vec<String> = data.keys().cloned().collect();
        assets.sort();
        Ok(assets)
    }

    pub fn clear_asset(&self, asset: &str) -> Result<bool> {
        let mut data = self.data.write().map_err(poisoned)?;
        Ok(data.remove(asset).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_candle(time: i64, close: f64) -> Candle {
        Candle::new(time, close, close, close, close, 1000.0)
    }

    fn times(candles: &[Candle]) -> Vec<i64> {
        candles.iter().map(|c| c.time).collect()
    }

    #[test]
    fn test_live_update_replaces_tail() {
        let existing = vec![create_test_candle(100, 1.0), create_test_candle(200, 2.0)];
        let incoming = vec![create_test_candle(200, 5.0), create_test_candle(300, 3.0)];

        let merged = merge_candles(&existing, &incoming);

        assert_eq!(times(&merged), vec![100, 200, 300]);
        assert_eq!(merged[1].close, 5.0);
    }

    #[test]
    fn test_reconnection_gap_replaces_series() {
        let existing = vec![create_test_candle(100, 1.0)];
        let incoming = vec![create_test_candle(5_000_000, 9.0)];

        let merged = merge_candles(&existing, &incoming);

        assert_eq!(merged, incoming);
    }

    #[test]
    fn test_exact_gap_boundary_appends() {
        let existing = vec![create_test_candle(0, 1.0)];
        let incoming = vec![create_test_candle(RECONNECT_GAP_MS, 2.0)];

        assert_eq!(times(&merge_candles(&existing, &incoming)), vec![0, RECONNECT_GAP_MS]);
    }

    #[test]
    fn test_older_candles_are_dropped() {
        let existing = vec![
            create_test_candle(100, 1.0),
            create_test_candle(200, 2.0),
            create_test_candle(300, 3.0),
        ];
        let incoming = vec![create_test_candle(100, 7.0), create_test_candle(200, 7.0)];

        let merged = merge_candles(&existing, &incoming);

        assert_eq!(merged, existing);
    }

    #[test]
    fn test_empty_sides() {
        let series = vec![create_test_candle(100, 1.0)];
        assert_eq!(merge_candles(&series, &[]), series);
        assert_eq!(merge_candles(&[], &series), series);
        assert!(merge_candles(&[], &[]).is_empty());
    }

    #[test]
    fn test_store_trims_to_max_history() {
        let store = CandleStore::new(5);
        let batch: Vec<Candle> = (0..8).map(|i| create_test_candle(i * 60_000, i as f64)).collect();

        assert_eq!(store.ingest("SOL", &batch).unwrap(), 5);

        let candles = store.candles("SOL").unwrap();
        assert_eq!(candles[0].close, 3.0);
        assert_eq!(candles[4].close, 7.0);
        assert_eq!(store.recent("SOL", 2).unwrap().len(), 2);
        assert_eq!(store.recent("SOL", 50).unwrap().len(), 5);
        assert_eq!(store.latest("SOL").unwrap().map(|c| c.close), Some(7.0));
    }

    #[test]
    fn test_store_assets_and_clear() {
        let store = CandleStore::new(10);
        store.ingest("SOL", &[create_test_candle(0, 1.0)]).unwrap();
        store.ingest("BTC", &[create_test_candle(0, 1.0)]).unwrap();

        assert_eq!(store.assets().unwrap(), vec!["BTC".to_string(), "SOL".to_string()]);
        assert!(store.clear_asset("SOL").unwrap());
        assert_eq!(store.len("SOL").unwrap(), 0);
        assert!(store.candles("SOL").unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_ingest_keeps_order() {
        let store = CandleStore::new(1_000);
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let t = (i * 4 + worker) as i64 * 1_000;
                        store.ingest("ETH", &[create_test_candle(t, 1.0)]).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let candles = store.candles("ETH").unwrap();
        assert!(candles.windows(2).all(|w| w[0].time < w[1].time));
    }
}
