/// Relative Strength Index with Wilder smoothing
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
/// The first average gain/loss is taken over the first `period` deltas, then
/// smoothed recursively. Indices before the first full window hold a neutral
/// 50. A zero average loss yields 100.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Vec<f64> {
    let mut rsi = vec![50.0; prices.len()];

    if period == 0 || prices.len() <= period {
        return rsi;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let diff = prices[i] - prices[i - 1];
        if diff >= 0.0 {
            gains += diff;
        } else {
            losses -= diff;
        }
    }

    let p = period as f64;
    let mut avg_gain = gains / p;
    let mut avg_loss = losses / p;
    rsi[period] = rsi_value(avg_gain, avg_loss);

    for i in period + 1..prices.len() {
        let diff = prices[i] - prices[i - 1];
        let gain = if diff > 0.0 { diff } else { 0.0 };
        let loss = if diff < 0.0 { -diff } else { 0.0 };

        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;

        rsi[i] = rsi_value(avg_gain, avg_loss);
    }

    rsi
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}
