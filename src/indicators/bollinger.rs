use super::moving_average::{calculate_sma, population_std_dev};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger Bands: SMA(period) ± multiplier × population stdev
pub fn calculate_bollinger(prices: &[f64], period: usize, multiplier: f64) -> Option<BollingerBands> {
    let middle = calculate_sma(prices, period)?;
    let std_dev = population_std_dev(prices, period)?;

    Some(BollingerBands {
        upper: middle + multiplier * std_dev,
        middle,
        lower: middle - multiplier * std_dev,
    })
}
