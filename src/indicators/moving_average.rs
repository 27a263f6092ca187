/// Simple Moving Average over the last `period` values
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Exponential Moving Average, seeded with the SMA of the first `period` values
///
/// Used as the EMA(200) regime filter: price above it is treated as bullish.
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed = prices[..period].iter().sum::<f64>() / period as f64;

    Some(
        prices[period..]
            .iter()
            .fold(seed, |ema, price| (price - ema) * multiplier + ema),
    )
}

/// Population standard deviation of the last `period` values
pub fn population_std_dev(prices: &[f64], period: usize) -> Option<f64> {
    let mean = calculate_sma(prices, period)?;
    let variance = prices
        .iter()
        .rev()
        .take(period)
        .map(|p| (p - mean).powi(2))
        .sum::<f64>()
        / period as f64;
    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        assert_eq!(calculate_sma(&prices, 5), Some(104.0));
        assert_eq!(calculate_sma(&prices, 2), Some(107.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![100.0, 102.0];
        assert!(calculate_sma(&prices, 5).is_none());
    }

    #[test]
    fn test_ema_tracks_uptrend() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        let ema = calculate_ema(&prices, 5).unwrap();
        // seed 104, then (110 - 104) * 1/3 + 104
        assert!((ema - 106.0).abs() < 1e-9);
    }

    #[test]
    fn test_ema_needs_full_period() {
        let prices = vec![1.0; 199];
        assert!(calculate_ema(&prices, 200).is_none());
        let prices = vec![1.0; 200];
        assert_eq!(calculate_ema(&prices, 200), Some(1.0));
    }

    #[test]
    fn test_population_std_dev() {
        let prices = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(population_std_dev(&prices, 8), Some(2.0));
    }
}
