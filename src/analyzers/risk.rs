//! Probe interpretation and scoring
//!
//! [`RiskAnalyzer::analyze`] is a pure function of the probe result and the
//! scoring configuration. The report timestamp is the probe's completion
//! time, so analyzing the same probe twice yields the same report.

use chrono::{DateTime, Utc};
use ethers::types::{U256, U512};

use crate::blockchain::revert::is_liquidity_revert;
use crate::config::ScoringConfig;
use crate::models::{
    AuditReport, Candidate, Confidence, FailureInfo, ProbeResult, ReportStatus, RiskFactor,
    RiskLabel, SellStatus, StepOutcome, TokenMetadata,
};
use crate::utils::{AuditError, ErrorClass};

/// A measured tax and whether it had to be clamped up from a negative value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxMeasurement {
    pub pct: f64,
    pub clamped: bool,
}

/// Tax implied by receiving `received` where `expected` was quoted.
///
/// Computed in whole basis points. `None` when nothing was quoted.
pub fn tax_pct(expected: U256, received: U256) -> Option<TaxMeasurement> {
    if expected.is_zero() {
        return None;
    }

    if received >= expected {
        return Some(TaxMeasurement {
            pct: 0.0,
            clamped: received > expected,
        });
    }

    let shortfall = expected - received;
    let bps = shortfall.full_mul(U256::from(10_000u32)) / U512::from(expected);
    let bps = bps.low_u64().min(10_000);

    Some(TaxMeasurement {
        pct: bps as f64 / 100.0,
        clamped: false,
    })
}

pub struct RiskAnalyzer {
    config: ScoringConfig,
}

impl RiskAnalyzer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn analyze(&self, candidate: &Candidate, probe: &ProbeResult) -> AuditReport {
        let weights = &self.config.weights;
        let mut factors = Vec::new();
        let mut deduction: u32 = 0;

        let sell_blocked = probe.is_sell_blocked();
        let honeypot = sell_blocked || probe.unable_to_buy;

        let buy_reason = probe.buy_step().and_then(|s| s.outcome.revert_reason());
        let sell_reason = probe.sell_step().and_then(|s| s.outcome.revert_reason());

        if probe.unable_to_buy {
            factors.push(RiskFactor::UnableToBuy);
            if buy_reason.map(is_liquidity_revert).unwrap_or(false) {
                factors.push(RiskFactor::BuyLiquidityRevert);
            }
        }
        if sell_blocked {
            factors.push(RiskFactor::SellBlocked);
        }
        if honeypot {
            deduction = deduction.saturating_add(weights.honeypot);
        }

        if probe.partial_sell_succeeded == Some(true) {
            factors.push(RiskFactor::SellAmountLimited);
            deduction = deduction.saturating_add(weights.sell_amount_limited);
        }

        // Taxes
        let buy_confirmed = !probe.unable_to_buy
            && probe.buy_step().map(|s| s.outcome.is_success()).unwrap_or(false);
        let buy_tax = if buy_confirmed {
            probe.buy_quote.and_then(|quote| tax_pct(quote, probe.tokens_received))
        } else {
            None
        };
        let sell_tax = if probe.sell_status == SellStatus::Confirmed {
            probe.sell_quote.and_then(|quote| tax_pct(quote, probe.native_received))
        } else {
            None
        };

        let threshold = self.config.high_tax_threshold_pct;
        if buy_tax.map(|t| t.pct > threshold).unwrap_or(false) {
            factors.push(RiskFactor::HighBuyTax);
            deduction = deduction.saturating_add(weights.high_buy_tax);
        }
        if sell_tax.map(|t| t.pct > threshold).unwrap_or(false) {
            factors.push(RiskFactor::HighSellTax);
            deduction = deduction.saturating_add(weights.high_sell_tax);
        }
        if [buy_tax, sell_tax].iter().flatten().any(|t| t.clamped) {
            factors.push(RiskFactor::NegativeTaxClamped);
        }

        if self.is_abnormal_sell_gas(probe.buy_gas, probe.sell_gas) {
            factors.push(RiskFactor::AbnormalSellGas);
            deduction = deduction.saturating_add(weights.abnormal_sell_gas);
        }

        // Token traits. Privileged functions matter less once ownership is gone.
        let traits = &probe.traits;
        let owner_active = traits.ownership_renounced != Some(true);
        if traits.ownership_renounced == Some(false) {
            factors.push(RiskFactor::OwnershipNotRenounced);
            deduction = deduction.saturating_add(weights.ownership_not_renounced);
        }
        if traits.has_mint && owner_active {
            factors.push(RiskFactor::HiddenMint);
            deduction = deduction.saturating_add(weights.hidden_mint);
        }
        if traits.has_pause && owner_active {
            factors.push(RiskFactor::TransferPausable);
            deduction = deduction.saturating_add(weights.transfer_pausable);
        }
        if traits.has_blacklist && owner_active {
            factors.push(RiskFactor::BlacklistFunction);
            deduction = deduction.saturating_add(weights.blacklist);
        }

        let unreliable_step = probe.steps.iter().any(|s| {
            matches!(s.outcome, StepOutcome::TimedOut | StepOutcome::InfraError { .. })
        });
        if probe.any_timed_out() {
            factors.push(RiskFactor::StepTimedOut);
        }

        let mut score = 100u32.saturating_sub(deduction) as u8;
        if honeypot {
            score = score.min(self.config.bands.critical_ceiling());
        }

        let honeypot_conclusive = probe.unable_to_buy
            || matches!(probe.sell_status, SellStatus::Confirmed | SellStatus::Blocked);
        let tax_conclusive = buy_tax.is_some() && (sell_tax.is_some() || sell_blocked);
        let confidence = if honeypot_conclusive && !unreliable_step {
            Confidence::Conclusive
        } else {
            Confidence::Inconclusive
        };

        let revert_reason = if probe.unable_to_buy { buy_reason } else { sell_reason };

        AuditReport {
            candidate: candidate.clone(),
            token: probe.traits.metadata.clone(),
            status: ReportStatus::Complete,
            buy_tax_pct: buy_tax.map(|t| t.pct),
            sell_tax_pct: sell_tax.map(|t| t.pct),
            honeypot,
            unable_to_buy: probe.unable_to_buy,
            risk_score: score,
            risk_label: RiskLabel::from_score(score, &self.config.bands),
            risk_factors: factors,
            confidence,
            tax_conclusive,
            honeypot_conclusive,
            revert_reason: revert_reason.map(str::to_string),
            buy_gas: probe.buy_gas,
            sell_gas: probe.sell_gas,
            failure: None,
            timestamp: probe.completed_at,
        }
    }

    /// Report for a session that produced no usable probe.
    pub fn failed_report(
        &self,
        candidate: &Candidate,
        err: &AuditError,
        attempts: u32,
        at: DateTime<Utc>,
    ) -> AuditReport {
        let class = err.class();
        let factor = match class {
            ErrorClass::Infrastructure => RiskFactor::InfrastructureError,
            ErrorClass::CandidateNotFound => RiskFactor::CandidateNotFound,
            ErrorClass::InsufficientLiquidity => RiskFactor::InsufficientLiquidity,
            ErrorClass::Timeout => RiskFactor::SessionTimeout,
            ErrorClass::ContractLogic | ErrorClass::Invalid | ErrorClass::Cancelled => {
                RiskFactor::ProbeFailed
            }
        };

        AuditReport {
            candidate: candidate.clone(),
            token: TokenMetadata::default(),
            status: ReportStatus::Failed,
            buy_tax_pct: None,
            sell_tax_pct: None,
            honeypot: false,
            unable_to_buy: false,
            risk_score: 0,
            risk_label: RiskLabel::from_score(0, &self.config.bands),
            risk_factors: vec![factor],
            confidence: Confidence::Inconclusive,
            tax_conclusive: false,
            honeypot_conclusive: false,
            revert_reason: match err {
                AuditError::Reverted(reason) => Some(reason.clone()),
                _ => None,
            },
            buy_gas: None,
            sell_gas: None,
            failure: Some(FailureInfo {
                class,
                reason: err.to_string(),
                attempts,
            }),
            timestamp: at,
        }
    }

    fn is_abnormal_sell_gas(&self, buy_gas: Option<u64>, sell_gas: Option<u64>) -> bool {
        let Some(sell_gas) = sell_gas else {
            return false;
        };

        if sell_gas > self.config.max_normal_sell_gas {
            return true;
        }

        match buy_gas {
            Some(buy_gas) if buy_gas > 0 => {
                sell_gas as f64 > buy_gas as f64 * self.config.abnormal_gas_ratio
            }
            _ => false,
        }
    }
}
