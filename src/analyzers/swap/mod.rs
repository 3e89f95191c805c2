//! Fork-based trade probing
//!
//! The probe buys the candidate token with native currency through the
//! router, then sells the full position back, recording every step.

pub mod inspection;
mod trade_probe;

pub use trade_probe::{PoolReserves, TradeProbe};
