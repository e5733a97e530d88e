use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::http::{format_decimal, sign, HttpTransport};
use super::{VenueAdapter, VenueCapabilities};
use crate::config::VenueSettings;
use crate::error::{OrderError, QuoteError};
use crate::models::{
    OrderIntent, OrderResult, PriceSample, ProtectiveLegs, RejectionKind, Side, VenueId,
};

// Bybit V5 unified API
// Docs: https://bybit-exchange.github.io/docs/v5/intro
const BYBIT_API_BASE: &str = "https://api.bybit.com";
const DEFAULT_CATEGORY: &str = "linear";

/// Bybit adapter (V5 API)
///
/// Stop-loss and take-profit are sent in the same `order/create` call as the
/// entry, so protective legs are attached atomically.
#[derive(Clone)]
pub struct BybitAdapter {
    http: HttpTransport,
    category: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitResponse<T> {
    ret_code: i64,
    ret_msg: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TickersResult {
    #[serde(default)]
    list: Vec<TickerInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerInfo {
    last_price: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderRequest<'a> {
    category: &'a str,
    symbol: &'a str,
    side: &'static str,
    order_type: &'static str,
    qty: String,
    order_link_id: String,
    time_in_force: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    take_profit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_loss: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderResult {
    #[serde(default)]
    order_id: String,
}

impl BybitAdapter {
    pub fn new(settings: &VenueSettings) -> crate::Result<Self> {
        Ok(Self {
            http: HttpTransport::new(settings, BYBIT_API_BASE)?,
            category: settings
                .category
                .clone()
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Spot only takes `stopLoss`/`takeProfit` on limit orders
    fn attaches_brackets(&self) -> bool {
        !self.category.eq_ignore_ascii_case("spot")
    }

    fn create_order_body(&self, intent: &OrderIntent) -> Result<String, OrderError> {
        let request = CreateOrderRequest {
            category: &self.category,
            symbol: &intent.symbol,
            side: match intent.side {
                Side::Buy => "Buy",
                Side::Sell => "Sell",
            },
            order_type: "Market",
            qty: format_decimal(intent.quantity),
            order_link_id: intent.id.to_string(),
            time_in_force: "GTC",
            take_profit: intent
                .take_profit
                .filter(|_| self.attaches_brackets())
                .map(format_decimal),
            stop_loss: intent
                .stop_loss
                .filter(|_| self.attaches_brackets())
                .map(format_decimal),
        };

        serde_json::to_string(&request).map_err(|e| OrderError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl VenueAdapter for BybitAdapter {
    fn venue(&self) -> VenueId {
        VenueId::Bybit
    }

    fn capabilities(&self) -> VenueCapabilities {
        VenueCapabilities {
            bracket_orders: self.attaches_brackets(),
        }
    }

    async fn quote_price(&self, symbol: &str) -> Result<PriceSample, QuoteError> {
        self.http.throttle().await;

        let response = self
            .http
            .client()
            .get(self.http.url("/v5/market/tickers"))
            .query(&[("category", self.category.as_str()), ("symbol", symbol)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(QuoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: BybitResponse<TickersResult> =
            serde_json::from_str(&body).map_err(|e| QuoteError::Malformed(e.to_string()))?;

        if parsed.ret_code != 0 {
            tracing::debug!(
                symbol = %symbol,
                ret_code = parsed.ret_code,
                ret_msg = %parsed.ret_msg,
                "Bybit ticker lookup failed"
            );
            return Err(QuoteError::UnknownSymbol(symbol.to_string()));
        }

        let ticker = parsed
            .result
            .and_then(|r| r.list.into_iter().next())
            .ok_or_else(|| QuoteError::UnknownSymbol(symbol.to_string()))?;

        PriceSample::parse(VenueId::Bybit, symbol, &ticker.last_price)
    }

    async fn place_market_order(&self, intent: &OrderIntent) -> Result<OrderResult, OrderError> {
        let (api_key, api_secret) = self.http.credentials()?;

        let body = self.create_order_body(intent)?;
        let timestamp = self.http.signing_timestamp().await.to_string();
        let recv_window = self.http.recv_window_ms().to_string();
        let signature = sign(
            api_secret,
            &format!("{}{}{}{}", timestamp, api_key, recv_window, body),
        );

        let response = self
            .http
            .client()
            .post(self.http.url("/v5/order/create"))
            .header("X-BAPI-API-KEY", api_key)
            .header("X-BAPI-TIMESTAMP", &timestamp)
            .header("X-BAPI-RECV-WINDOW", &recv_window)
            .header("X-BAPI-SIGN", signature)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(OrderError::Auth(text));
        }
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            // Bybit answers 403 when the IP-level rate limit is hit
            return Ok(OrderResult::rejected(RejectionKind::RateLimited, text));
        }
        if !status.is_success() {
            return Err(OrderError::Transport(format!("HTTP {}: {}", status, text)));
        }

        let parsed: BybitResponse<CreateOrderResult> =
            serde_json::from_str(&text).map_err(|e| OrderError::Malformed(e.to_string()))?;

        if parsed.ret_code != 0 {
            let kind = classify_ret_code(parsed.ret_code, &parsed.ret_msg)?;
            return Ok(OrderResult::rejected(kind, parsed.ret_msg));
        }

        let order_id = parsed
            .result
            .map(|r| r.order_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| OrderError::Malformed("missing orderId".to_string()))?;

        let protective_legs = if !intent.has_brackets() {
            ProtectiveLegs::NotRequested
        } else if self.attaches_brackets() {
            ProtectiveLegs::Attached
        } else {
            ProtectiveLegs::NotSupported
        };

        // order/create acknowledges without fill details
        Ok(OrderResult::accepted(None, order_id, protective_legs))
    }
}

/// Map a non-zero `retCode` to a rejection kind, or an auth fault
fn classify_ret_code(ret_code: i64, ret_msg: &str) -> Result<RejectionKind, OrderError> {
    let kind = match ret_code {
        10003 | 10004 | 10005 | 33004 => return Err(OrderError::Auth(ret_msg.to_string())),
        10006 => RejectionKind::RateLimited,
        110007 | 170131 | 170033 => RejectionKind::InsufficientBalance,
        10001 | 170121 if ret_msg.to_lowercase().contains("symbol") => {
            RejectionKind::InvalidSymbol
        }
        10001 | 170121 | 170136 | 170137 | 170140 => RejectionKind::InvalidQuantity,
        _ => RejectionKind::Other,
    };
    Ok(kind)
}
