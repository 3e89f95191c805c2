pub mod analyzers;
pub mod blockchain;
pub mod config;
pub mod contracts;
pub mod core;
pub mod models;
pub mod sandbox;
pub mod utils;

pub use analyzers::{RiskAnalyzer, TradeProbe};
pub use config::AuditConfig;
pub use crate::core::{SandboxProvider, SandboxRpc, SessionCoordinator};
pub use models::{AuditReport, Candidate, ProbeResult, RiskFactor, RiskLabel};
pub use sandbox::AnvilManager;
pub use utils::{AuditError, ErrorClass, Result};
