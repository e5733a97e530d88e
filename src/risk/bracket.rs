use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;
use crate::models::{OrderIntent, Side, VenueId};

/// Stop-loss / take-profit multipliers applied to every entry
///
/// For a long entry the stop sits at `price * stop_loss_pct` and the target at
/// `price * take_profit_pct`. Short entries divide instead, which mirrors the
/// bracket above and below the entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskOverlay {
    stop_loss_pct: f64,
    take_profit_pct: f64,
}

impl RiskOverlay {
    pub fn new(stop_loss_pct: f64, take_profit_pct: f64) -> Result<Self, ConfigError> {
        if !stop_loss_pct.is_finite() || stop_loss_pct <= 0.0 || stop_loss_pct >= 1.0 {
            return Err(ConfigError::InvalidStopLoss(stop_loss_pct));
        }
        if !take_profit_pct.is_finite() || take_profit_pct <= 1.0 {
            return Err(ConfigError::InvalidTakeProfit(take_profit_pct));
        }

        Ok(Self {
            stop_loss_pct,
            take_profit_pct,
        })
    }

    pub fn stop_loss_pct(&self) -> f64 {
        self.stop_loss_pct
    }

    pub fn take_profit_pct(&self) -> f64 {
        self.take_profit_pct
    }

    /// Bracket levels (stop_loss, take_profit) around `reference_price`
    pub fn levels(&self, side: Side, reference_price: f64) -> (f64, f64) {
        match side {
            Side::Buy => (
                reference_price * self.stop_loss_pct,
                reference_price * self.take_profit_pct,
            ),
            Side::Sell => (
                reference_price / self.stop_loss_pct,
                reference_price / self.take_profit_pct,
            ),
        }
    }

    /// Turn a trade decision into a bounded order intent
    pub fn build_intent(
        &self,
        venue: VenueId,
        symbol: &str,
        side: Side,
        reference_price: f64,
        quantity: f64,
    ) -> Result<OrderIntent, ConfigError> {
        if !reference_price.is_finite() || reference_price <= 0.0 {
            return Err(ConfigError::InvalidPrice(reference_price));
        }
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(ConfigError::InvalidQuantity(quantity));
        }

        let (stop_loss, take_profit) = self.levels(side, reference_price);

        Ok(OrderIntent {
            id: Uuid::new_v4(),
            venue,
            symbol: symbol.to_string(),
            side,
            quantity,
            reference_price,
            stop_loss: Some(stop_loss),
            take_profit: Some(take_profit),
        })
    }
}

impl Default for RiskOverlay {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.98,   // -2% stop
            take_profit_pct: 1.02, // +2% target
        }
    }
}

/// Check that bracket levels sit on the correct side of an actual entry price
///
/// Long: stop below entry, target above. Short: the reverse.
pub fn brackets_hold(
    side: Side,
    entry_price: f64,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
) -> bool {
    let stop_ok = stop_loss.map_or(true, |sl| match side {
        Side::Buy => sl < entry_price,
        Side::Sell => sl > entry_price,
    });
    let target_ok = take_profit.map_or(true, |tp| match side {
        Side::Buy => tp > entry_price,
        Side::Sell => tp < entry_price,
    });

    stop_ok && target_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_buy_brackets() {
        let overlay = RiskOverlay::new(0.98, 1.02).unwrap();
        let intent = overlay
            .build_intent(VenueId::Binance, "BTCUSDT", Side::Buy, 100.0, 0.5)
            .unwrap();

        assert!((intent.stop_loss.unwrap() - 98.0).abs() < EPSILON);
        assert!((intent.take_profit.unwrap() - 102.0).abs() < EPSILON);
        assert_eq!(intent.quantity, 0.5);
        assert_eq!(intent.side, Side::Buy);
    }

    #[test]
    fn test_sell_brackets() {
        let overlay = RiskOverlay::new(0.98, 1.02).unwrap();
        let intent = overlay
            .build_intent(VenueId::Binance, "BTCUSDT", Side::Sell, 100.0, 0.5)
            .unwrap();

        // 100 / 0.98 and 100 / 1.02
        assert!((intent.stop_loss.unwrap() - 102.0408).abs() < 1e-3);
        assert!((intent.take_profit.unwrap() - 98.0392).abs() < 1e-3);
    }

    #[test]
    fn test_brackets_on_correct_side() {
        let overlay = RiskOverlay::default();
        for side in [Side::Buy, Side::Sell] {
            let intent = overlay
                .build_intent(VenueId::Bybit, "ETHUSDT", side, 2500.0, 1.0)
                .unwrap();
            assert!(brackets_hold(
                side,
                intent.reference_price,
                intent.stop_loss,
                intent.take_profit
            ));
        }
    }

    #[test]
    fn test_invalid_stop_loss_pct() {
        assert!(matches!(
            RiskOverlay::new(1.0, 1.02),
            Err(ConfigError::InvalidStopLoss(_))
        ));
        assert!(matches!(
            RiskOverlay::new(0.0, 1.02),
            Err(ConfigError::InvalidStopLoss(_))
        ));
        assert!(matches!(
            RiskOverlay::new(f64::NAN, 1.02),
            Err(ConfigError::InvalidStopLoss(_))
        ));
    }

    #[test]
    fn test_invalid_take_profit_pct() {
        assert!(matches!(
            RiskOverlay::new(0.98, 1.0),
            Err(ConfigError::InvalidTakeProfit(_))
        ));
        assert!(matches!(
            RiskOverlay::new(0.98, 0.5),
            Err(ConfigError::InvalidTakeProfit(_))
        ));
    }

    #[test]
    fn test_invalid_quantity_and_price() {
        let overlay = RiskOverlay::default();
        assert!(matches!(
            overlay.build_intent(VenueId::Binance, "BTCUSDT", Side::Buy, 100.0, 0.0),
            Err(ConfigError::InvalidQuantity(_))
        ));
        assert!(matches!(
            overlay.build_intent(VenueId::Binance, "BTCUSDT", Side::Buy, -5.0, 1.0),
            Err(ConfigError::InvalidPrice(_))
        ));
    }

    #[test]
    fn test_slippage_past_stop_detected() {
        // Long with stop at 98, filled at 97.5
        assert!(!brackets_hold(Side::Buy, 97.5, Some(98.0), Some(102.0)));
        assert!(brackets_hold(Side::Buy, 100.3, Some(98.0), Some(102.0)));
        assert!(brackets_hold(Side::Sell, 100.0, None, None));
    }
}
