pub mod risk;
pub mod swap;

pub use risk::{tax_pct, RiskAnalyzer, TaxMeasurement};
pub use swap::TradeProbe;
