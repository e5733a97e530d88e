use anyhow::Context;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::config::VenueSettings;
use crate::error::OrderError;

// Type alias for the rate limiter to simplify signatures
type VenueRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Pooled HTTP client, credentials and rate limiter shared by one venue adapter
///
/// Cloning is cheap; all clones share the connection pool and the limiter.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    recv_window_ms: u64,
    rate_limiter: Arc<VenueRateLimiter>,
}

impl HttpTransport {
    pub fn new(settings: &VenueSettings, default_base_url: &str) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        let rpm = NonZeroU32::new(settings.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        let base_url = settings
            .base_url
            .as_deref()
            .unwrap_or(default_base_url)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url,
            api_key: settings.api_key.clone(),
            api_secret: settings.api_secret.clone(),
            recv_window_ms: settings.recv_window_ms,
            rate_limiter,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn recv_window_ms(&self) -> u64 {
        self.recv_window_ms
    }

    /// Wait for a slot in the venue's request budget
    pub async fn throttle(&self) {
        self.rate_limiter.until_ready().await;
    }

    /// Wait for a request slot, then stamp the request
    ///
    /// Signed payloads must be built from this timestamp so that time spent
    /// queued behind the limiter does not eat into the venue's receive window.
    pub async fn signing_timestamp(&self) -> i64 {
        self.throttle().await;
        Utc::now().timestamp_millis()
    }

    /// API key and secret, or an auth fault if either is missing
    pub fn credentials(&self) -> Result<(&str, &str), OrderError> {
        match (self.api_key.as_deref(), self.api_secret.as_deref()) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Ok((key, secret))
            }
            _ => Err(OrderError::Auth("missing API credentials".to_string())),
        }
    }
}

/// Hex-encoded HMAC-SHA256 of `payload`
pub fn sign(secret: &str, payload: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Render a quantity or price the way venue APIs expect: no exponent, no trailing zeros
pub fn format_decimal(value: f64) -> String {
    let formatted = format!("{:.8}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_known_vector() {
        // Example from the Binance API documentation
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let payload = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            sign(secret, payload),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(0.001), "0.001");
        assert_eq!(format_decimal(1.0), "1");
        assert_eq!(format_decimal(98.0392156862745), "98.03921569");
        assert_eq!(format_decimal(0.00000001), "0.00000001");
    }

    #[tokio::test]
    async fn test_signing_timestamp_taken_after_throttle() {
        let settings = VenueSettings {
            requests_per_minute: 600,
            ..VenueSettings::default()
        };
        let transport = HttpTransport::new(&settings, "http://localhost").unwrap();

        // Drain the burst; the next slot frees up 100ms later
        while transport.rate_limiter.check().is_ok() {}

        let before = Utc::now().timestamp_millis();
        let stamp = transport.signing_timestamp().await;
        assert!(stamp - before >= 50, "stamped {}ms after the call", stamp - before);
    }

    #[test]
    fn test_missing_credentials() {
        let transport = HttpTransport::new(&VenueSettings::default(), "http://localhost").unwrap();
        assert!(matches!(transport.credentials(), Err(OrderError::Auth(_))));
    }
}
