use super::moving_average::calculate_sma;

/// One Bollinger Band sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBand {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// (upper - lower) / middle, 0 when the mean is not positive
    pub bandwidth: f64,
}

/// Bollinger Bands using the population standard deviation of the trailing window
///
/// Entries before the window fills are `None`.
pub fn calculate_bollinger(
    prices: &[f64],
    period: usize,
    std_dev_multiplier: f64,
) -> Vec<Option<BollingerBand>> {
    let sma = calculate_sma(prices, period);

    sma.iter()
        .enumerate()
        .map(|(i, mean)| {
            let mean = (*mean)?;
            let window = &prices[i + 1 - period..=i];
            let variance =
                window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
            let sd = variance.sqrt();

            let upper = mean + sd * std_dev_multiplier;
            let lower = mean - sd * std_dev_multiplier;
            let bandwidth = if mean > 0.0 {
                (upper - lower) / mean
            } else {
                0.0
            };

            Some(BollingerBand {
                upper,
                middle: mean,
                lower,
                bandwidth,
            })
        })
        .collect()
}
