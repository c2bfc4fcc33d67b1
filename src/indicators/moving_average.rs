/// Simple Moving Average over the trailing `period` values
///
/// Output is aligned with `prices`; entries before the first full window are `None`.
pub fn calculate_sma(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; prices.len()];
    }

    (0..prices.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let sum: f64 = prices[i + 1 - period..=i].iter().sum();
            Some(sum / period as f64)
        })
        .collect()
}

/// Exponential Moving Average seeded with the first price
///
/// Defined from index 0, so early values lean toward the seed until enough
/// history has accumulated.
pub fn calculate_ema(prices: &[f64], period: usize) -> Vec<f64> {
    let Some(&first) = prices.first() else {
        return Vec::new();
    };

    let k = 2.0 / (period as f64 + 1.0);

    let mut ema = Vec::with_capacity(prices.len());
    ema.push(first);
    for price in &prices[1..] {
        let prev = ema[ema.len() - 1];
        ema.push(price * k + prev * (1.0 - k));
    }

    ema
}

/// Last defined SMA value, if any
pub fn last_sma(prices: &[f64], period: usize) -> Option<f64> {
    calculate_sma(prices, period).last().copied().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        let sma = calculate_sma(&prices, 5);
        assert_eq!(sma.len(), 5);
        assert_eq!(sma[4], Some(104.0));
        assert!(sma[..4].iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_sma_rolling_window() {
        let prices = vec![1.0, 2.0, 3.0, 4.0];
        let sma = calculate_sma(&prices, 2);
        assert_eq!(sma, vec![None, Some(1.5), Some(2.5), Some(3.5)]);
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![100.0, 102.0];
        assert_eq!(last_sma(&prices, 5), None);
    }

    #[test]
    fn test_ema_seeded_with_first_price() {
        let prices = vec![10.0, 20.0];
        let ema = calculate_ema(&prices, 3);
        // k = 0.5
        assert_eq!(ema, vec![10.0, 15.0]);
    }

    #[test]
    fn test_ema_tracks_rising_prices() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        let ema = calculate_ema(&prices, 5);
        assert_eq!(ema.len(), prices.len());
        assert!(ema.windows(2).all(|w| w[1] > w[0]));
        assert!(ema[5] < 110.0);
    }

    #[test]
    fn test_ema_empty() {
        assert!(calculate_ema(&[], 9).is_empty());
    }
}
