// Technical indicators module
// Moving averages for the trend-following crossover

pub mod moving_average;

pub use moving_average::{calculate_crossover, calculate_sma, Crossover};
