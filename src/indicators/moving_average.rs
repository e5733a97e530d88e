use rust_decimal::prelude::*;
use std::cmp::Ordering;

/// Mean of the most recent `period` prices, in decimal arithmetic
///
/// Prices are converted from `f64` at their shortest decimal form, so windows
/// holding the same quotes in a different order average to the same value.
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<Decimal> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum = prices
        .iter()
        .rev()
        .take(period)
        .map(|p| Decimal::from_f64(*p))
        .sum::<Option<Decimal>>()?;

    sum.checked_div(Decimal::from(period))
}

/// Short and long moving averages over two adjacent windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crossover {
    pub short_ma: Decimal,
    pub long_ma: Decimal,
}

impl Crossover {
    /// Direction of the short average relative to the long one
    pub fn direction(&self) -> Ordering {
        self.short_ma.cmp(&self.long_ma)
    }
}

/// Compare the mean of the last `window` prices with the mean of the `window`
/// prices right before them.
///
/// Returns `None` until `2 * window` prices are available.
pub fn calculate_crossover(prices: &[f64], window: usize) -> Option<Crossover> {
    if window == 0 || prices.len() < window * 2 {
        return None;
    }

    let split = prices.len() - window;
    let short_ma = calculate_sma(&prices[split..], window)?;
    let long_ma = calculate_sma(&prices[..split], window)?;

    Some(Crossover { short_ma, long_ma })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_of_btc_quotes() {
        let quotes = [64_000.5, 64_010.0, 63_990.25, 64_020.0];
        assert_eq!(calculate_sma(&quotes, 4), Some(Decimal::new(640_0518_75, 4)));
    }

    #[test]
    fn test_sma_needs_full_period() {
        assert!(calculate_sma(&[1.25, 1.30], 3).is_none());
        assert!(calculate_sma(&[1.25], 0).is_none());
    }

    #[test]
    fn test_sma_uses_most_recent() {
        let prices = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(calculate_sma(&prices, 2), Some(Decimal::new(35, 1)));
    }

    #[test]
    fn test_crossover_windows() {
        let crossover = calculate_crossover(&[1.0, 2.0, 3.0, 4.0], 2).unwrap();
        assert_eq!(crossover.short_ma, Decimal::new(35, 1));
        assert_eq!(crossover.long_ma, Decimal::new(15, 1));
        assert_eq!(crossover.direction(), Ordering::Greater);
    }

    #[test]
    fn test_crossover_ignores_older_prices() {
        // Only the last 4 prices matter for window = 2
        let crossover = calculate_crossover(&[1000.0, 4.0, 3.0, 2.0, 1.0], 2).unwrap();
        assert_eq!(crossover.short_ma, Decimal::new(15, 1));
        assert_eq!(crossover.long_ma, Decimal::new(35, 1));
        assert_eq!(crossover.direction(), Ordering::Less);
    }

    #[test]
    fn test_reordered_window_is_flat() {
        // 0.1 + 0.2 + 0.3 != 0.3 + 0.2 + 0.1 in f64
        let crossover = calculate_crossover(&[0.1, 0.2, 0.3, 0.3, 0.2, 0.1], 3).unwrap();
        assert_eq!(crossover.short_ma, crossover.long_ma);
        assert_eq!(crossover.direction(), Ordering::Equal);
    }

    #[test]
    fn test_crossover_warm_up() {
        assert!(calculate_crossover(&[1.0, 2.0, 3.0], 2).is_none());
        assert!(calculate_crossover(&[1.0, 2.0], 0).is_none());
    }
}
