use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ConfigError, QuoteError};

/// Execution venues we can trade on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VenueId {
    Binance,
    Bybit,
}

impl VenueId {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueId::Binance => "binance",
            VenueId::Bybit => "bybit",
        }
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for VenueId {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "binance" => Ok(VenueId::Binance),
            "bybit" => Ok(VenueId::Bybit),
            _ => Err(ConfigError::UnknownVenue(value)),
        }
    }
}

impl From<VenueId> for String {
    fn from(venue: VenueId) -> Self {
        venue.as_str().to_string()
    }
}

/// A single price observation from a venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub venue: VenueId,
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl PriceSample {
    /// Build a sample, rejecting prices that are not positive and finite
    pub fn new(
        venue: VenueId,
        symbol: impl Into<String>,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, QuoteError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(QuoteError::InvalidPrice(price.to_string()));
        }

        Ok(Self {
            venue,
            symbol: symbol.into(),
            price,
            timestamp,
        })
    }

    /// Parse a venue's decimal string into a sample
    pub fn parse(
        venue: VenueId,
        symbol: impl Into<String>,
        raw_price: &str,
    ) -> Result<Self, QuoteError> {
        let price: f64 = raw_price
            .trim()
            .parse()
            .map_err(|_| QuoteError::InvalidPrice(raw_price.to_string()))?;
        Self::new(venue, symbol, price, Utc::now())
    }
}

/// Trading signal produced by the crossover indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Sell,
    None,
}

impl Signal {
    /// The order side this signal asks for, if any
    pub fn side(&self) -> Option<Side> {
        match self {
            Signal::Buy => Some(Side::Buy),
            Signal::Sell => Some(Side::Sell),
            Signal::None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("BUY"),
            Side::Sell => f.write_str("SELL"),
        }
    }
}

/// A bounded market order, ready to be submitted exactly once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub id: Uuid, // Client order id, echoed back by the venue
    pub venue: VenueId,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub reference_price: f64, // Price the brackets were computed from
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl OrderIntent {
    pub fn has_brackets(&self) -> bool {
        self.stop_loss.is_some() || self.take_profit.is_some()
    }
}

/// Why a venue turned an order down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionKind {
    InsufficientBalance,
    InvalidSymbol,
    InvalidQuantity,
    RateLimited,
    Other,
}

/// Whether stop-loss / take-profit legs went out with the entry order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtectiveLegs {
    Attached,
    NotSupported,
    NotRequested,
}

/// Normalized outcome of a market order submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub accepted: bool,
    pub filled_price: Option<f64>,
    pub venue_order_id: Option<String>,
    pub error_kind: Option<RejectionKind>,
    pub message: Option<String>,
    pub protective_legs: ProtectiveLegs,
}

impl OrderResult {
    pub fn accepted(
        filled_price: Option<f64>,
        venue_order_id: impl Into<String>,
        protective_legs: ProtectiveLegs,
    ) -> Self {
        Self {
            accepted: true,
            filled_price,
            venue_order_id: Some(venue_order_id.into()),
            error_kind: None,
            message: None,
            protective_legs,
        }
    }

    pub fn rejected(kind: RejectionKind, message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            filled_price: None,
            venue_order_id: None,
            error_kind: Some(kind),
            message: Some(message.into()),
            protective_legs: ProtectiveLegs::NotRequested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_sample_rejects_non_positive() {
        assert!(PriceSample::new(VenueId::Binance, "BTCUSDT", 0.0, Utc::now()).is_err());
        assert!(PriceSample::new(VenueId::Binance, "BTCUSDT", -1.0, Utc::now()).is_err());
        assert!(PriceSample::new(VenueId::Binance, "BTCUSDT", f64::NAN, Utc::now()).is_err());
        assert!(
            PriceSample::new(VenueId::Binance, "BTCUSDT", f64::INFINITY, Utc::now()).is_err()
        );
    }

    #[test]
    fn test_price_sample_parse() {
        let sample = PriceSample::parse(VenueId::Bybit, "BTCUSDT", "64123.50").unwrap();
        assert_eq!(sample.price, 64123.5);
        assert_eq!(sample.venue, VenueId::Bybit);

        let err = PriceSample::parse(VenueId::Bybit, "BTCUSDT", "not-a-number").unwrap_err();
        assert!(matches!(err, QuoteError::InvalidPrice(_)));
    }

    #[test]
    fn test_signal_side() {
        assert_eq!(Signal::Buy.side(), Some(Side::Buy));
        assert_eq!(Signal::Sell.side(), Some(Side::Sell));
        assert_eq!(Signal::None.side(), None);
    }

    #[test]
    fn test_venue_id_parsing() {
        assert_eq!(VenueId::try_from("Binance".to_string()).unwrap(), VenueId::Binance);
        assert_eq!(VenueId::try_from("BYBIT".to_string()).unwrap(), VenueId::Bybit);
        assert!(VenueId::try_from("kraken".to_string()).is_err());
    }

    #[test]
    fn test_rejected_result() {
        let result = OrderResult::rejected(RejectionKind::InsufficientBalance, "no funds");
        assert!(!result.accepted);
        assert_eq!(result.error_kind, Some(RejectionKind::InsufficientBalance));
        assert!(result.venue_order_id.is_none());
    }
}
