use super::PriceHistory;
use crate::error::ConfigError;
use crate::indicators::calculate_crossover;
use crate::models::{PriceSample, Signal};
use std::cmp::Ordering;

pub const DEFAULT_WINDOW: usize = 5;

/// Moving-average crossover signal engine for a single (venue, symbol) pair
///
/// Compares the mean of the last `window` prices (short MA) with the mean of the
/// `window` prices preceding them (long MA):
/// - short > long → Buy
/// - short < long → Sell
/// - equal, or fewer than `2 * window` prices seen → None
///
/// Without de-duplication the same signal is emitted on every observation for as
/// long as the crossover condition holds.
#[derive(Debug, Clone)]
pub struct SignalEngine {
    window: usize,
    history: PriceHistory,
    dedup: bool,
    last_emitted: Option<Signal>,
}

impl SignalEngine {
    pub fn new(window: usize) -> Result<Self, ConfigError> {
        if window == 0 {
            return Err(ConfigError::InvalidWindow(window));
        }

        Ok(Self {
            window,
            history: PriceHistory::new(window * 2),
            dedup: false,
            last_emitted: None,
        })
    }

    /// Only emit Buy/Sell when it differs from the last trade signal emitted
    pub fn with_dedup(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }

    /// Record a sample and compute the signal for the updated history
    pub fn observe(&mut self, sample: &PriceSample) -> Signal {
        self.history.push(sample.clone());

        let prices = self.history.prices();
        let signal = match calculate_crossover(&prices, self.window) {
            Some(crossover) => match crossover.direction() {
                Ordering::Greater => Signal::Buy,
                Ordering::Less => Signal::Sell,
                Ordering::Equal => Signal::None,
            },
            None => Signal::None,
        };

        if signal == Signal::None {
            return signal;
        }

        if self.dedup && self.last_emitted == Some(signal) {
            tracing::debug!(
                venue = %sample.venue,
                symbol = %sample.symbol,
                signal = ?signal,
                "Suppressing repeated signal"
            );
            return Signal::None;
        }

        self.last_emitted = Some(signal);
        signal
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn capacity(&self) -> usize {
        self.history.capacity()
    }

    /// True once enough prices are buffered to compare both averages
    pub fn is_warm(&self) -> bool {
        self.history.is_full()
    }
}

impl Default for SignalEngine {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            history: PriceHistory::new(DEFAULT_WINDOW * 2),
            dedup: false,
            last_emitted: None,
        }
    }
}
