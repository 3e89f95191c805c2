use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candidate::Candidate;
use super::factor::{RiskFactor, RiskLabel};
use super::trade::TokenMetadata;
use crate::utils::ErrorClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Conclusive,
    Inconclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// The probe ran and was analyzed
    Complete,
    /// No usable probe; see `failure`
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub class: ErrorClass,
    pub reason: String,
    pub attempts: u32,
}

/// Final verdict for one candidate, handed to the reporting sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub candidate: Candidate,
    /// Whatever name/symbol/decimals/supply the token answered with
    #[serde(default)]
    pub token: TokenMetadata,
    pub status: ReportStatus,
    pub buy_tax_pct: Option<f64>,
    /// `None` when the sell was blocked: blocked and zero-tax are different things
    pub sell_tax_pct: Option<f64>,
    pub honeypot: bool,
    pub unable_to_buy: bool,
    /// 0-100, 100 means nothing was deducted
    pub risk_score: u8,
    pub risk_label: RiskLabel,
    pub risk_factors: Vec<RiskFactor>,
    pub confidence: Confidence,
    pub tax_conclusive: bool,
    pub honeypot_conclusive: bool,
    pub revert_reason: Option<String>,
    pub buy_gas: Option<u64>,
    pub sell_gas: Option<u64>,
    pub failure: Option<FailureInfo>,
    pub timestamp: DateTime<Utc>,
}

impl AuditReport {
    pub fn is_failed(&self) -> bool {
        self.status == ReportStatus::Failed
    }

    pub fn has_factor(&self, factor: RiskFactor) -> bool {
        self.risk_factors.contains(&factor)
    }
}

fn fmt_pct(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}%", v)).unwrap_or_else(|| "n/a".to_string())
}

/// `SYMBOL (Name), N decimals`, skipping whatever is unknown.
fn fmt_metadata(token: &TokenMetadata) -> Option<String> {
    let mut label = match (&token.symbol, &token.name) {
        (Some(symbol), Some(name)) => format!("{} ({})", symbol, name),
        (Some(only), None) | (None, Some(only)) => only.clone(),
        (None, None) => return None,
    };
    if let Some(decimals) = token.decimals {
        label.push_str(&format!(", {} decimals", decimals));
    }
    Some(label)
}

impl std::fmt::Display for AuditReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "═══════════════════════════════════════════════════════════")?;
        writeln!(f, "                 TOKEN AUDIT REPORT")?;
        writeln!(f, "═══════════════════════════════════════════════════════════")?;
        writeln!(f)?;
        writeln!(f, "Token: {:?}", self.candidate.token_address)?;
        if let Some(label) = fmt_metadata(&self.token) {
            writeln!(f, "Name:  {}", label)?;
        }
        writeln!(f, "Pair:  {:?}", self.candidate.pair_address)?;
        writeln!(f, "Block: {}", self.candidate.discovery_block)?;
        writeln!(f)?;
        writeln!(f, "═══ VERDICT ═══")?;

        let verdict_text = match (self.status, self.honeypot) {
            (ReportStatus::Failed, _) => "⚪ INCONCLUSIVE",
            (_, true) => "🔴 HONEYPOT DETECTED",
            _ => "🟢 TRADABLE",
        };

        writeln!(f, "{}", verdict_text)?;
        writeln!(
            f,
            "Risk Score: {}/100 {} {:?}",
            self.risk_score,
            self.risk_label.emoji(),
            self.risk_label
        )?;
        writeln!(f, "Confidence: {:?}", self.confidence)?;
        writeln!(f, "Buy Tax:  {}", fmt_pct(self.buy_tax_pct))?;
        writeln!(f, "Sell Tax: {}", fmt_pct(self.sell_tax_pct))?;

        if let Some(reason) = &self.revert_reason {
            writeln!(f, "Revert:   {}", reason)?;
        }

        if let Some(failure) = &self.failure {
            writeln!(f, "Failure:  [{}] {} ({} attempts)", failure.class, failure.reason, failure.attempts)?;
        }

        if !self.risk_factors.is_empty() {
            writeln!(f)?;
            writeln!(f, "═══ FACTORS ═══")?;
            for factor in &self.risk_factors {
                writeln!(f, "• {}", factor)?;
            }
        }

        writeln!(f)?;
        writeln!(f, "═══════════════════════════════════════════════════════════")?;

        Ok(())
    }
}
