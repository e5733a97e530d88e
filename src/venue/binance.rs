use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::http::{format_decimal, sign, HttpTransport};
use super::{VenueAdapter, VenueCapabilities};
use crate::config::VenueSettings;
use crate::error::{OrderError, QuoteError};
use crate::models::{
    OrderIntent, OrderResult, PriceSample, ProtectiveLegs, RejectionKind, VenueId,
};

// Binance Spot REST API v3
// Docs: https://developers.binance.com/docs/binance-spot-api-docs/rest-api
const BINANCE_API_BASE: &str = "https://api.binance.com";

const CODE_TOO_MANY_REQUESTS: i64 = -1003;
const CODE_INVALID_SIGNATURE: i64 = -1022;
const CODE_INVALID_SYMBOL: i64 = -1121;
const CODE_BAD_PRECISION: i64 = -1111;
const CODE_ILLEGAL_PARAMS: i64 = -1100;
const CODE_FILTER_FAILURE: i64 = -1013;
const CODE_NEW_ORDER_REJECTED: i64 = -2010;
const CODE_BAD_API_KEY_FMT: i64 = -2014;
const CODE_REJECTED_MBX_KEY: i64 = -2015;

/// Binance spot market adapter
///
/// Spot market orders cannot carry attached stop-loss / take-profit legs, so the
/// adapter reports `ProtectiveLegs::NotSupported` on every fill.
#[derive(Clone)]
pub struct BinanceAdapter {
    http: HttpTransport,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    status: String,
    #[serde(default)]
    executed_qty: Option<String>,
    #[serde(default)]
    cummulative_quote_qty: Option<String>, // Binance's spelling
    #[serde(default)]
    fills: Vec<Fill>,
}

#[derive(Debug, Deserialize)]
struct Fill {
    price: String,
    qty: String,
}

impl BinanceAdapter {
    pub fn new(settings: &VenueSettings) -> crate::Result<Self> {
        Ok(Self {
            http: HttpTransport::new(settings, BINANCE_API_BASE)?,
        })
    }

    /// Signed query string for `POST /api/v3/order`
    fn order_query(&self, intent: &OrderIntent, timestamp: i64) -> String {
        format!(
            "symbol={}&side={}&type=MARKET&quantity={}&newClientOrderId={}&newOrderRespType=FULL&recvWindow={}&timestamp={}",
            intent.symbol,
            intent.side,
            format_decimal(intent.quantity),
            intent.id,
            self.http.recv_window_ms(),
            timestamp
        )
    }
}

#[async_trait]
impl VenueAdapter for BinanceAdapter {
    fn venue(&self) -> VenueId {
        VenueId::Binance
    }

    fn capabilities(&self) -> VenueCapabilities {
        VenueCapabilities {
            bracket_orders: false,
        }
    }

    async fn quote_price(&self, symbol: &str) -> Result<PriceSample, QuoteError> {
        self.http.throttle().await;

        let response = self
            .http
            .client()
            .get(self.http.url("/api/v3/ticker/price"))
            .query(&[("symbol", symbol)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ApiError>(&body) {
                if err.code == CODE_INVALID_SYMBOL {
                    return Err(QuoteError::UnknownSymbol(symbol.to_string()));
                }
            }
            return Err(QuoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let ticker: TickerPrice =
            serde_json::from_str(&body).map_err(|e| QuoteError::Malformed(e.to_string()))?;

        PriceSample::parse(VenueId::Binance, symbol, &ticker.price)
    }

    async fn place_market_order(&self, intent: &OrderIntent) -> Result<OrderResult, OrderError> {
        let (api_key, api_secret) = self.http.credentials()?;

        let timestamp = self.http.signing_timestamp().await;
        let query = self.order_query(intent, timestamp);
        let signature = sign(api_secret, &query);
        let url = format!(
            "{}?{}&signature={}",
            self.http.url("/api/v3/order"),
            query,
            signature
        );

        let response = self
            .http
            .client()
            .post(&url)
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return classify_error(status, &body);
        }

        let order: OrderResponse =
            serde_json::from_str(&body).map_err(|e| OrderError::Malformed(e.to_string()))?;

        // Market orders that find no liquidity come back EXPIRED
        if order.status == "EXPIRED" || order.status == "REJECTED" {
            return Ok(OrderResult::rejected(
                RejectionKind::Other,
                format!("order {} {}", order.order_id, order.status),
            ));
        }

        let protective_legs = if intent.has_brackets() {
            ProtectiveLegs::NotSupported
        } else {
            ProtectiveLegs::NotRequested
        };

        Ok(OrderResult::accepted(
            average_fill_price(&order),
            order.order_id.to_string(),
            protective_legs,
        ))
    }
}

/// Quantity-weighted average over the fills, or quote/base totals if no fills are listed
fn average_fill_price(order: &OrderResponse) -> Option<f64> {
    let (notional, quantity) = order
        .fills
        .iter()
        .filter_map(|f| Some((f.price.parse::<f64>().ok()?, f.qty.parse::<f64>().ok()?)))
        .fold((0.0, 0.0), |(n, q), (price, qty)| (n + price * qty, q + qty));

    if quantity > 0.0 {
        return Some(notional / quantity);
    }

    let executed: f64 = order.executed_qty.as_deref()?.parse().ok()?;
    let quote: f64 = order.cummulative_quote_qty.as_deref()?.parse().ok()?;
    (executed > 0.0).then(|| quote / executed)
}

/// Map a non-2xx order response to a rejection value or an adapter fault
fn classify_error(status: StatusCode, body: &str) -> Result<OrderResult, OrderError> {
    let api_error = serde_json::from_str::<ApiError>(body).ok();
    let code = api_error.as_ref().map(|e| e.code);
    let message = api_error
        .as_ref()
        .map(|e| e.msg.clone())
        .unwrap_or_else(|| body.to_string());

    if status == StatusCode::UNAUTHORIZED
        || matches!(
            code,
            Some(CODE_INVALID_SIGNATURE | CODE_BAD_API_KEY_FMT | CODE_REJECTED_MBX_KEY)
        )
    {
        return Err(OrderError::Auth(message));
    }

    if status.is_server_error() {
        return Err(OrderError::Transport(format!("HTTP {}: {}", status, message)));
    }

    let kind = match code {
        _ if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 => {
            RejectionKind::RateLimited
        }
        Some(CODE_TOO_MANY_REQUESTS) => RejectionKind::RateLimited,
        Some(CODE_INVALID_SYMBOL) => RejectionKind::InvalidSymbol,
        Some(CODE_FILTER_FAILURE | CODE_BAD_PRECISION | CODE_ILLEGAL_PARAMS) => {
            RejectionKind::InvalidQuantity
        }
        Some(CODE_NEW_ORDER_REJECTED) if message.to_lowercase().contains("insufficient") => {
            RejectionKind::InsufficientBalance
        }
        _ => RejectionKind::Other,
    };

    Ok(OrderResult::rejected(kind, message))
}
