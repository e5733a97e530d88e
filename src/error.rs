use thiserror::Error;

/// Failure to obtain a usable price from a venue.
///
/// Always transient from the coordinator's point of view: the pair is skipped for the
/// current round and retried on the next tick.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("venue returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unknown symbol {0}")]
    UnknownSymbol(String),

    #[error("invalid price {0:?}")]
    InvalidPrice(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Adapter-level fault while placing an order.
///
/// Venue-side business rejections are not errors: they come back as an
/// `OrderResult` with `accepted = false`.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for OrderError {
    fn from(e: reqwest::Error) -> Self {
        OrderError::Transport(e.to_string())
    }
}

/// Invalid configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("window must be at least 1 (got {0})")]
    InvalidWindow(usize),

    #[error("stop_loss_pct must be in (0, 1) (got {0})")]
    InvalidStopLoss(f64),

    #[error("take_profit_pct must be greater than 1 (got {0})")]
    InvalidTakeProfit(f64),

    #[error("quantity must be positive and finite (got {0})")]
    InvalidQuantity(f64),

    #[error("price must be positive and finite (got {0})")]
    InvalidPrice(f64),

    #[error("tick interval must be at least one second")]
    InvalidInterval,

    #[error("no trading pairs configured")]
    NoPairs,

    #[error("missing credentials for venue {0}")]
    MissingCredentials(String),

    #[error("unknown venue {0:?}")]
    UnknownVenue(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}
