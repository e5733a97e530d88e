// Trading signal module
pub mod crossover;
pub mod price_history;

pub use crossover::{SignalEngine, DEFAULT_WINDOW};
pub use price_history::PriceHistory;
