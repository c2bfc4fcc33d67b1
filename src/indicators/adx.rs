/// Average Directional Index (ADX) - Measures trend strength
///
/// ADX ranges from 0 to 100:
/// - ADX > 25: Strong trend (bull or bear)
/// - ADX 20-25: Moderate trend
/// - ADX < 20: Weak trend / choppy / ranging market
use crate::models::Candle;

/// ADX series aligned with `candles`
///
/// Needs at least `2 * period` candles, otherwise every entry is 0.
pub fn calculate_adx(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period * 2 {
        return vec![0.0; candles.len()];
    }

    // Step 1: True Range and Directional Movement; index 0 has no predecessor
    let mut true_ranges = Vec::with_capacity(candles.len());
    let mut plus_dms = Vec::with_capacity(candles.len());
    let mut minus_dms = Vec::with_capacity(candles.len());
    true_ranges.push(0.0);
    plus_dms.push(0.0);
    minus_dms.push(0.0);

    for pair in candles.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);

        let up_move = cur.high - prev.high;
        let down_move = prev.low - cur.low;

        plus_dms.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dms.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });

        // True Range = max(high - low, |high - prev_close|, |low - prev_close|)
        let tr = (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs());
        true_ranges.push(tr);
    }

    // Step 2: Wilder smoothing
    let smoothed_tr = wilder_smooth(&true_ranges, period);
    let smoothed_plus_dm = wilder_smooth(&plus_dms, period);
    let smoothed_minus_dm = wilder_smooth(&minus_dms, period);

    // Step 3: DI and DX
    let dx: Vec<f64> = (0..candles.len())
        .map(|i| {
            let tr = smoothed_tr[i];
            if tr == 0.0 {
                return 0.0;
            }
            let plus_di = 100.0 * smoothed_plus_dm[i] / tr;
            let minus_di = 100.0 * smoothed_minus_dm[i] / tr;
            let di_sum = plus_di + minus_di;
            if di_sum == 0.0 {
                0.0
            } else {
                100.0 * (plus_di - minus_di).abs() / di_sum
            }
        })
        .collect();

    // Step 4: ADX = smoothed DX
    wilder_smooth(&dx, period)
}

/// Wilder's smoothing as a series
///
/// Entries before `period - 1` are 0, entry `period - 1` is the simple
/// average of the first window, later entries follow
/// `(prev * (period - 1) + value) / period`.
fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let mut smoothed = vec![0.0; values.len()];
    let p = period as f64;
    let mut sum = 0.0;

    for (i, &value) in values.iter().enumerate() {
        if i < period {
            sum += value;
            if i == period - 1 {
                smoothed[i] = sum / p;
            }
        } else {
            smoothed[i] = (smoothed[i - 1] * (p - 1.0) + value) / p;
        }
    }

    smoothed
}
