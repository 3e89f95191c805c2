//! Runtime parameters for the auditor
//!
//! The library never loads configuration on its own; callers build an
//! [`AuditConfig`] (the bundled binaries read an optional JSON file and
//! apply CLI overrides) and pass it in at construction time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::contracts::addresses;
use crate::utils::{AuditError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub sandbox: SandboxConfig,
    pub probe: ProbeConfig,
    pub scoring: ScoringConfig,
    pub retry: RetryConfig,
    pub session: SessionConfig,
}

impl AuditConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: AuditConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file. Used by the binaries, never by the library.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.sandbox.validate()?;
        self.probe.validate()?;
        self.scoring.validate()?;
        self.retry.validate()?;
        self.session.validate()?;
        Ok(())
    }
}

/// Forking node process parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub node_binary: PathBuf,
    /// Upstream archive RPC the sandbox forks from
    pub fork_url: String,
    pub host: String,
    /// Half-open port range handed out to sandboxes
    pub port_range_start: u16,
    pub port_range_end: u16,
    pub startup_timeout_ms: u64,
    pub health_poll_interval_ms: u64,
    pub shutdown_grace_ms: u64,
    /// Fork at the candidate's discovery block instead of the latest block
    pub fork_at_discovery_block: bool,
    pub extra_args: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            node_binary: PathBuf::from("anvil"),
            fork_url: String::new(),
            host: "127.0.0.1".to_string(),
            port_range_start: 18545,
            port_range_end: 18645,
            startup_timeout_ms: 5_000,
            health_poll_interval_ms: 100,
            shutdown_grace_ms: 2_000,
            fork_at_discovery_block: false,
            extra_args: Vec::new(),
        }
    }
}

impl SandboxConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_millis(self.health_poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.port_range_start >= self.port_range_end {
            return Err(AuditError::Config(format!(
                "empty sandbox port range {}..{}",
                self.port_range_start, self.port_range_end
            )));
        }
        if self.startup_timeout_ms == 0 || self.health_poll_interval_ms == 0 {
            return Err(AuditError::Config(
                "sandbox startup timeout and poll interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Trade probe parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub router: Address,
    pub wrapped_native: Address,
    /// Simulated trader, funded through the sandbox's balance override
    pub trader: Address,
    pub fund_amount_wei: u128,
    /// Native amount spent on the buy
    pub reference_buy_wei: u128,
    pub gas_limit: u64,
    pub step_timeout_ms: u64,
    pub receipt_poll_interval_ms: u64,
    pub approve_before_buy: bool,
    /// Sell proceeds below this fraction of the quoted output count as blocked
    pub near_zero_sell_ratio: f64,
    /// Retry a reverted full sell with a smaller slice of the position
    pub partial_sell_probe: bool,
    pub partial_sell_bps: u16,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            router: addresses::uniswap_v2_router(),
            wrapped_native: addresses::weth(),
            trader: addresses::default_trader(),
            fund_amount_wei: 100 * 10u128.pow(18),
            reference_buy_wei: 10u128.pow(17),
            gas_limit: 1_500_000,
            step_timeout_ms: 10_000,
            receipt_poll_interval_ms: 50,
            approve_before_buy: true,
            near_zero_sell_ratio: 0.01,
            partial_sell_probe: true,
            partial_sell_bps: 1_000,
        }
    }
}

impl ProbeConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    pub fn fund_amount(&self) -> U256 {
        U256::from(self.fund_amount_wei)
    }

    pub fn reference_buy(&self) -> U256 {
        U256::from(self.reference_buy_wei)
    }

    fn validate(&self) -> Result<()> {
        if self.reference_buy_wei == 0 {
            return Err(AuditError::Config("reference buy amount must be non-zero".into()));
        }
        if self.fund_amount_wei < self.reference_buy_wei {
            return Err(AuditError::Config(
                "trader funding must cover the reference buy".into(),
            ));
        }
        if self.step_timeout_ms == 0 {
            return Err(AuditError::Config("step timeout must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&self.near_zero_sell_ratio) {
            return Err(AuditError::Config(format!(
                "near_zero_sell_ratio {} outside [0, 1]",
                self.near_zero_sell_ratio
            )));
        }
        if self.partial_sell_bps == 0 || self.partial_sell_bps > 10_000 {
            return Err(AuditError::Config(format!(
                "partial_sell_bps {} outside 1..=10000",
                self.partial_sell_bps
            )));
        }
        Ok(())
    }
}

/// Point deductions from the 100 baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub honeypot: u32,
    pub high_sell_tax: u32,
    pub high_buy_tax: u32,
    pub abnormal_sell_gas: u32,
    pub sell_amount_limited: u32,
    pub ownership_not_renounced: u32,
    pub hidden_mint: u32,
    pub transfer_pausable: u32,
    pub blacklist: u32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            honeypot: 80,
            high_sell_tax: 15,
            high_buy_tax: 15,
            abnormal_sell_gas: 10,
            sell_amount_limited: 10,
            ownership_not_renounced: 5,
            hidden_mint: 10,
            transfer_pausable: 5,
            blacklist: 5,
        }
    }
}

impl ScoreWeights {
    /// Largest single deduction; anything above already zeroes the score.
    pub const MAX_WEIGHT: u32 = 100;

    fn named(&self) -> [(&'static str, u32); 9] {
        [
            ("honeypot", self.honeypot),
            ("high_sell_tax", self.high_sell_tax),
            ("high_buy_tax", self.high_buy_tax),
            ("abnormal_sell_gas", self.abnormal_sell_gas),
            ("sell_amount_limited", self.sell_amount_limited),
            ("ownership_not_renounced", self.ownership_not_renounced),
            ("hidden_mint", self.hidden_mint),
            ("transfer_pausable", self.transfer_pausable),
            ("blacklist", self.blacklist),
        ]
    }

    /// Sum of every weight except the honeypot one.
    pub fn non_honeypot_total(&self) -> u32 {
        self.named()
            .iter()
            .skip(1)
            .fold(0u32, |total, (_, weight)| total.saturating_add(*weight))
    }

    fn validate(&self) -> Result<()> {
        for (name, weight) in self.named() {
            if weight > Self::MAX_WEIGHT {
                return Err(AuditError::Config(format!(
                    "weight {} = {} exceeds {}",
                    name,
                    weight,
                    Self::MAX_WEIGHT
                )));
            }
        }
        Ok(())
    }
}

/// Upper (exclusive) score bounds of the label bands, ascending.
///
/// `score < critical_below` is Critical, `< high_below` High,
/// `< medium_below` Medium, anything else Low.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandBoundaries {
    pub critical_below: u8,
    pub high_below: u8,
    pub medium_below: u8,
}

impl Default for BandBoundaries {
    fn default() -> Self {
        Self {
            critical_below: 25,
            high_below: 50,
            medium_below: 80,
        }
    }
}

impl BandBoundaries {
    /// Highest score that still lands in the Critical band.
    pub fn critical_ceiling(&self) -> u8 {
        self.critical_below.saturating_sub(1)
    }

    fn validate(&self) -> Result<()> {
        let ordered = self.critical_below >= 1
            && self.critical_below < self.high_below
            && self.high_below < self.medium_below
            && self.medium_below <= 100;
        if !ordered {
            return Err(AuditError::Config(format!(
                "band boundaries must satisfy 1 <= critical < high < medium <= 100, got {:?}",
                self
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    pub bands: BandBoundaries,
    pub high_tax_threshold_pct: f64,
    /// Sell gas above this is suspicious regardless of the buy
    pub max_normal_sell_gas: u64,
    /// Sell gas above this multiple of buy gas is suspicious
    pub abnormal_gas_ratio: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            bands: BandBoundaries::default(),
            high_tax_threshold_pct: 10.0,
            max_normal_sell_gas: 500_000,
            abnormal_gas_ratio: 3.0,
        }
    }
}

impl ScoringConfig {
    fn validate(&self) -> Result<()> {
        self.bands.validate()?;
        self.weights.validate()?;
        if !(0.0..=100.0).contains(&self.high_tax_threshold_pct) {
            return Err(AuditError::Config(format!(
                "high_tax_threshold_pct {} outside [0, 100]",
                self.high_tax_threshold_pct
            )));
        }
        if self.abnormal_gas_ratio <= 0.0 {
            return Err(AuditError::Config("abnormal_gas_ratio must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, first one included
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 250,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(AuditError::Config("max_attempts must be at least 1".into()));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(AuditError::Config("max_delay_ms below initial_delay_ms".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_concurrent_sessions: usize,
    /// Wall-clock budget for one candidate, retries included
    pub session_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 4,
            session_timeout_ms: 120_000,
        }
    }
}

impl SessionConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrent_sessions == 0 {
            return Err(AuditError::Config("max_concurrent_sessions must be at least 1".into()));
        }
        if self.session_timeout_ms == 0 {
            return Err(AuditError::Config("session timeout must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        AuditConfig::default().validate().expect("defaults should validate");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AuditConfig::from_json(
            r#"{ "session": { "max_concurrent_sessions": 8 }, "scoring": { "high_tax_threshold_pct": 5.0 } }"#,
        )
        .unwrap();

        assert_eq!(config.session.max_concurrent_sessions, 8);
        assert_eq!(config.session.session_timeout_ms, 120_000);
        assert_eq!(config.scoring.high_tax_threshold_pct, 5.0);
        assert_eq!(config.scoring.weights, ScoreWeights::default());
        assert_eq!(config.probe.router, addresses::uniswap_v2_router());
    }

    #[test]
    fn test_rejects_unordered_bands() {
        let mut config = AuditConfig::default();
        config.scoring.bands = BandBoundaries {
            critical_below: 50,
            high_below: 40,
            medium_below: 80,
        };
        assert!(matches!(config.validate(), Err(AuditError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_attempts_and_empty_ports() {
        let mut config = AuditConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = AuditConfig::default();
        config.sandbox.port_range_end = config.sandbox.port_range_start;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_weights() {
        let result = AuditConfig::from_json(
            r#"{ "scoring": { "weights": { "high_sell_tax": 4294967295, "ownership_not_renounced": 2 } } }"#,
        );
        assert!(matches!(result, Err(AuditError::Config(_))));
    }

    #[test]
    fn test_weight_total_saturates() {
        let weights = ScoreWeights {
            high_sell_tax: u32::MAX,
            ownership_not_renounced: 2,
            ..ScoreWeights::default()
        };
        assert_eq!(weights.non_honeypot_total(), u32::MAX);
    }

    #[test]
    fn test_default_weights_keep_honeypot_dominant() {
        let weights = ScoreWeights::default();
        assert!(weights.honeypot >= weights.non_honeypot_total());
    }
}
