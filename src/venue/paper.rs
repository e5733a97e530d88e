use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::{SharedVenue, VenueAdapter, VenueCapabilities};
use crate::error::{OrderError, QuoteError};
use crate::models::{
    OrderIntent, OrderResult, PriceSample, ProtectiveLegs, RejectionKind, VenueId,
};

/// A simulated fill recorded by `PaperVenue`
#[derive(Debug, Clone)]
pub struct PaperFill {
    pub order_id: String,
    pub intent: OrderIntent,
    pub fill_price: f64,
    pub filled_at: DateTime<Utc>,
}

/// Dry-run wrapper: live quotes from the wrapped venue, simulated fills
///
/// Orders never leave the process. Each one fills in full at the last price
/// quoted for its symbol, with brackets attached.
pub struct PaperVenue {
    inner: SharedVenue,
    last_quotes: Mutex<HashMap<String, f64>>,
    fills: Mutex<Vec<PaperFill>>,
}

impl PaperVenue {
    pub fn new(inner: SharedVenue) -> Self {
        Self {
            inner,
            last_quotes: Mutex::new(HashMap::new()),
            fills: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of every simulated fill so far
    pub fn fills(&self) -> Vec<PaperFill> {
        self.fills
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn last_quote(&self, symbol: &str) -> Option<f64> {
        self.last_quotes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .copied()
    }
}

#[async_trait]
impl VenueAdapter for PaperVenue {
    fn venue(&self) -> VenueId {
        self.inner.venue()
    }

    fn capabilities(&self) -> VenueCapabilities {
        VenueCapabilities {
            bracket_orders: true,
        }
    }

    async fn quote_price(&self, symbol: &str) -> Result<PriceSample, QuoteError> {
        let sample = self.inner.quote_price(symbol).await?;

        self.last_quotes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(symbol.to_string(), sample.price);

        Ok(sample)
    }

    async fn place_market_order(&self, intent: &OrderIntent) -> Result<OrderResult, OrderError> {
        let Some(fill_price) = self.last_quote(&intent.symbol) else {
            return Ok(OrderResult::rejected(
                RejectionKind::InvalidSymbol,
                format!("no paper quote for {}", intent.symbol),
            ));
        };

        let order_id = format!("paper-{}", intent.id);
        let fill = PaperFill {
            order_id: order_id.clone(),
            intent: intent.clone(),
            fill_price,
            filled_at: Utc::now(),
        };

        tracing::info!(
            venue = %intent.venue,
            symbol = %intent.symbol,
            side = %intent.side,
            quantity = intent.quantity,
            fill_price,
            "Paper fill"
        );

        self.fills
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fill);

        let protective_legs = if intent.has_brackets() {
            ProtectiveLegs::Attached
        } else {
            ProtectiveLegs::NotRequested
        };

        Ok(OrderResult::accepted(
            Some(fill_price),
            order_id,
            protective_legs,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;
    use crate::risk::RiskOverlay;
    use std::sync::Arc;

    /// Quotes a fixed price, panics if asked to trade
    struct FixedQuote(f64);

    #[async_trait]
    impl VenueAdapter for FixedQuote {
        fn venue(&self) -> VenueId {
            VenueId::Binance
        }

        fn capabilities(&self) -> VenueCapabilities {
            VenueCapabilities::default()
        }

        async fn quote_price(&self, symbol: &str) -> Result<PriceSample, QuoteError> {
            PriceSample::new(VenueId::Binance, symbol, self.0, Utc::now())
        }

        async fn place_market_order(&self, _: &OrderIntent) -> Result<OrderResult, OrderError> {
            panic!("paper venue must not forward orders");
        }
    }

    fn intent(symbol: &str) -> OrderIntent {
        RiskOverlay::default()
            .build_intent(VenueId::Binance, symbol, Side::Buy, 100.0, 0.1)
            .unwrap()
    }

    #[tokio::test]
    async fn test_fills_at_last_quote() {
        let paper = PaperVenue::new(Arc::new(FixedQuote(250.0)));

        let sample = paper.quote_price("BTCUSDT").await.unwrap();
        assert_eq!(sample.price, 250.0);

        let result = paper.place_market_order(&intent("BTCUSDT")).await.unwrap();
        assert!(result.accepted);
        assert_eq!(result.filled_price, Some(250.0));
        assert_eq!(result.protective_legs, ProtectiveLegs::Attached);

        let fills = paper.fills();
        assert_eq!(fills.len(), 1);
        assert_eq!(Some(fills[0].order_id.clone()), result.venue_order_id);
    }

    #[tokio::test]
    async fn test_rejects_without_quote() {
        let paper = PaperVenue::new(Arc::new(FixedQuote(250.0)));

        let result = paper.place_market_order(&intent("ETHUSDT")).await.unwrap();
        assert!(!result.accepted);
        assert_eq!(result.error_kind, Some(RejectionKind::InvalidSymbol));
        assert!(paper.fills().is_empty());
    }
}
