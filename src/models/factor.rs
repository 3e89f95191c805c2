use serde::{Deserialize, Serialize};

use crate::config::BandBoundaries;

/// Categorical bucket of the numeric score. Lower scores are riskier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLabel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLabel {
    pub fn from_score(score: u8, bands: &BandBoundaries) -> Self {
        if score < bands.critical_below {
            RiskLabel::Critical
        } else if score < bands.high_below {
            RiskLabel::High
        } else if score < bands.medium_below {
            RiskLabel::Medium
        } else {
            RiskLabel::Low
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            RiskLabel::Critical => "🔴",
            RiskLabel::High => "🟠",
            RiskLabel::Medium => "🟡",
            RiskLabel::Low => "🟢",
        }
    }
}

/// Named contributor to a report's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskFactor {
    SellBlocked,
    UnableToBuy,
    /// Buy reverted with a pool-liquidity reason rather than token logic
    BuyLiquidityRevert,
    /// Full sell reverted but a smaller one went through
    SellAmountLimited,
    HighBuyTax,
    HighSellTax,
    AbnormalSellGas,
    /// A tax came out negative and was clamped to zero
    NegativeTaxClamped,
    StepTimedOut,
    OwnershipNotRenounced,
    HiddenMint,
    TransferPausable,
    BlacklistFunction,
    InfrastructureError,
    CandidateNotFound,
    InsufficientLiquidity,
    SessionTimeout,
    ProbeFailed,
}

impl RiskFactor {
    pub fn name(&self) -> &'static str {
        match self {
            RiskFactor::SellBlocked => "sell-blocked",
            RiskFactor::UnableToBuy => "unable-to-buy",
            RiskFactor::BuyLiquidityRevert => "buy-liquidity-revert",
            RiskFactor::SellAmountLimited => "sell-amount-limited",
            RiskFactor::HighBuyTax => "high-buy-tax",
            RiskFactor::HighSellTax => "high-sell-tax",
            RiskFactor::AbnormalSellGas => "abnormal-sell-gas",
            RiskFactor::NegativeTaxClamped => "negative-tax-clamped",
            RiskFactor::StepTimedOut => "step-timed-out",
            RiskFactor::OwnershipNotRenounced => "ownership-not-renounced",
            RiskFactor::HiddenMint => "hidden-mint",
            RiskFactor::TransferPausable => "transfer-pausable",
            RiskFactor::BlacklistFunction => "blacklist-function",
            RiskFactor::InfrastructureError => "infrastructure-error",
            RiskFactor::CandidateNotFound => "candidate-not-found",
            RiskFactor::InsufficientLiquidity => "insufficient-liquidity",
            RiskFactor::SessionTimeout => "session-timeout",
            RiskFactor::ProbeFailed => "probe-failed",
        }
    }
}

impl std::fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_bands_do_not_overlap() {
        let bands = BandBoundaries::default();
        assert_eq!(RiskLabel::from_score(0, &bands), RiskLabel::Critical);
        assert_eq!(RiskLabel::from_score(bands.critical_below - 1, &bands), RiskLabel::Critical);
        assert_eq!(RiskLabel::from_score(bands.critical_below, &bands), RiskLabel::High);
        assert_eq!(RiskLabel::from_score(bands.high_below, &bands), RiskLabel::Medium);
        assert_eq!(RiskLabel::from_score(bands.medium_below, &bands), RiskLabel::Low);
        assert_eq!(RiskLabel::from_score(100, &bands), RiskLabel::Low);
    }

    #[test]
    fn test_custom_bands() {
        let bands = BandBoundaries {
            critical_below: 10,
            high_below: 20,
            medium_below: 30,
        };
        assert_eq!(RiskLabel::from_score(9, &bands), RiskLabel::Critical);
        assert_eq!(RiskLabel::from_score(25, &bands), RiskLabel::Medium);
        assert_eq!(RiskLabel::from_score(30, &bands), RiskLabel::Low);
    }

    #[test]
    fn test_factor_serializes_to_its_name() {
        for factor in [RiskFactor::SellBlocked, RiskFactor::OwnershipNotRenounced, RiskFactor::HighSellTax] {
            let json = serde_json::to_string(&factor).unwrap();
            assert_eq!(json, format!("\"{}\"", factor.name()));
        }
    }
}
