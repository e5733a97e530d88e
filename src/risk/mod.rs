// Risk management module
pub mod bracket;

pub use bracket::{brackets_hold, RiskOverlay};
