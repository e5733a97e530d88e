// Execution venue adapters
pub mod binance;
pub mod bybit;
pub mod http;
pub mod paper;

pub use binance::BinanceAdapter;
pub use bybit::BybitAdapter;
pub use paper::{PaperFill, PaperVenue};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{OrderError, QuoteError};
use crate::models::{OrderIntent, OrderResult, PriceSample, VenueId};

/// What a venue can do beyond plain market orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VenueCapabilities {
    /// Stop-loss and take-profit can ride on the entry order itself
    pub bracket_orders: bool,
}

/// Normalized view of an execution venue: price queries and market orders
///
/// Implementations keep no state between calls beyond connection reuse.
/// A venue turning an order down is a normal `OrderResult` with
/// `accepted = false`; `Err(OrderError)` means the adapter itself failed
/// (transport, authentication, unparseable response).
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn venue(&self) -> VenueId;

    fn capabilities(&self) -> VenueCapabilities;

    async fn quote_price(&self, symbol: &str) -> Result<PriceSample, QuoteError>;

    async fn place_market_order(&self, intent: &OrderIntent) -> Result<OrderResult, OrderError>;
}

/// Adapters are shared between the pairs trading on the same venue
pub type SharedVenue = Arc<dyn VenueAdapter>;

/// Build one adapter per venue referenced in the configuration
///
/// In dry-run mode every adapter is wrapped in a `PaperVenue`, so quotes are
/// live but no order ever leaves the process.
pub fn build_venues(cfg: &AppConfig) -> crate::Result<HashMap<VenueId, SharedVenue>> {
    let mut venues: HashMap<VenueId, SharedVenue> = HashMap::new();

    for venue in cfg.active_venues() {
        let settings = cfg.venues.get(venue);
        let adapter: SharedVenue = match venue {
            VenueId::Binance => Arc::new(BinanceAdapter::new(settings)?),
            VenueId::Bybit => Arc::new(BybitAdapter::new(settings)?),
        };

        let adapter: SharedVenue = if cfg.trading.dry_run {
            Arc::new(PaperVenue::new(adapter))
        } else {
            adapter
        };

        tracing::info!(
            venue = %venue,
            bracket_orders = adapter.capabilities().bracket_orders,
            dry_run = cfg.trading.dry_run,
            "Venue adapter ready"
        );
        venues.insert(venue, adapter);
    }

    Ok(venues)
}
