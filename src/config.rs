use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::VenueId;
use crate::risk::RiskOverlay;
use crate::strategy::DEFAULT_WINDOW;

const DEFAULT_CONFIG_FILE: &str = "trendbot.toml";
const ENV_PREFIX: &str = "TRENDBOT";

/// Top-level configuration, built once at startup
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub pairs: Vec<PairConfig>,
    #[serde(default)]
    pub venues: VenuesConfig,
}

fn default_log_filter() -> String {
    "trendbot=info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub quantity: f64,
    pub window: usize,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub tick_interval_seconds: u64,
    pub shutdown_grace_seconds: u64,
    pub dedupe_signals: bool,
    pub dry_run: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            quantity: 0.001,
            window: DEFAULT_WINDOW,
            stop_loss_pct: 0.98,
            take_profit_pct: 1.02,
            tick_interval_seconds: 60,
            shutdown_grace_seconds: 10,
            dedupe_signals: false,
            dry_run: false,
        }
    }
}

impl TradingConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

/// One (venue, symbol) pair to trade
#[derive(Debug, Clone, Deserialize)]
pub struct PairConfig {
    pub venue: VenueId,
    pub symbol: String,
    pub quantity: Option<f64>, // Overrides trading.quantity
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VenuesConfig {
    pub binance: VenueSettings,
    pub bybit: VenueSettings,
}

impl VenuesConfig {
    pub fn get(&self, venue: VenueId) -> &VenueSettings {
        match venue {
            VenueId::Binance => &self.binance,
            VenueId::Bybit => &self.bybit,
        }
    }

    fn get_mut(&mut self, venue: VenueId) -> &mut VenueSettings {
        match venue {
            VenueId::Binance => &mut self.binance,
            VenueId::Bybit => &mut self.bybit,
        }
    }
}

/// Connection settings for one venue
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VenueSettings {
    pub base_url: Option<String>, // None = the venue's production endpoint
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub recv_window_ms: u64,
    pub timeout_seconds: u64,
    pub requests_per_minute: u32,
    pub category: Option<String>, // Bybit product category (spot, linear, inverse)
}

impl Default for VenueSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            api_secret: None,
            recv_window_ms: 5000,
            timeout_seconds: 10,
            requests_per_minute: 600,
            category: None,
        }
    }
}

impl VenueSettings {
    pub fn has_credentials(&self) -> bool {
        matches!(
            (self.api_key.as_deref(), self.api_secret.as_deref()),
            (Some(k), Some(s)) if !k.is_empty() && !s.is_empty()
        )
    }
}

impl AppConfig {
    /// Load from defaults, an optional TOML file and `TRENDBOT__*` environment variables
    ///
    /// Without an explicit path, `trendbot.toml` is read if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let builder = match path {
            Some(path) => config::Config::builder().add_source(File::from(path).required(true)),
            None => config::Config::builder()
                .add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };
        let builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let mut cfg = Self::build(builder)?;
        cfg.apply_credential_fallback(|name| std::env::var(name).ok());
        Ok(cfg)
    }

    /// Parse a TOML document, without environment overrides
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        Self::build(
            config::Config::builder().add_source(File::from_str(document, FileFormat::Toml)),
        )
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        Ok(builder.build()?.try_deserialize()?)
    }

    /// Fill missing venue credentials from `BINANCE_API_KEY`-style variables
    pub fn apply_credential_fallback<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for venue in [VenueId::Binance, VenueId::Bybit] {
            let prefix = venue.as_str().to_ascii_uppercase();
            let settings = self.venues.get_mut(venue);

            if settings.api_key.is_none() {
                settings.api_key = lookup(&format!("{}_API_KEY", prefix));
            }
            if settings.api_secret.is_none() {
                settings.api_secret = lookup(&format!("{}_API_SECRET", prefix));
            }
        }
    }

    /// Venues referenced by at least one pair, in first-seen order
    pub fn active_venues(&self) -> Vec<VenueId> {
        let mut seen = HashSet::new();
        self.pairs
            .iter()
            .map(|p| p.venue)
            .filter(|v| seen.insert(*v))
            .collect()
    }

    pub fn pair_quantity(&self, pair: &PairConfig) -> f64 {
        pair.quantity.unwrap_or(self.trading.quantity)
    }

    /// Reject configurations the trading loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trading.window == 0 {
            return Err(ConfigError::InvalidWindow(self.trading.window));
        }
        RiskOverlay::new(self.trading.stop_loss_pct, self.trading.take_profit_pct)?;

        if self.trading.tick_interval_seconds == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        if self.pairs.is_empty() {
            return Err(ConfigError::NoPairs);
        }

        for pair in &self.pairs {
            let quantity = self.pair_quantity(pair);
            if !quantity.is_finite() || quantity <= 0.0 {
                return Err(ConfigError::InvalidQuantity(quantity));
            }
        }

        // Paper trading only needs public market data
        if !self.trading.dry_run {
            for venue in self.active_venues() {
                if !self.venues.get(venue).has_credentials() {
                    return Err(ConfigError::MissingCredentials(venue.to_string()));
                }
            }
        }

        Ok(())
    }
}
