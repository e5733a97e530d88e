// Core modules
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod risk;
pub mod strategy;
pub mod venue;

// Re-export commonly used types
pub use error::{ConfigError, OrderError, QuoteError};
pub use models::*;
pub use venue::{SharedVenue, VenueAdapter};

// Error handling
pub type Result<T> = anyhow::Result<T>;
