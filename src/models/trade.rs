//! Raw outcomes of a buy/sell probe

use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use super::candidate::Candidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Approve,
    Buy,
    Sell,
}

/// What happened to one submitted transaction.
///
/// `TimedOut` and `InfraError` describe the sandbox, not the token, and are
/// never read as a revert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    Reverted { reason: Option<String> },
    TimedOut,
    InfraError { message: String },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success)
    }

    pub fn is_reverted(&self) -> bool {
        matches!(self, StepOutcome::Reverted { .. })
    }

    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            StepOutcome::Reverted { reason } => reason.as_deref(),
            _ => None,
        }
    }
}

/// One attempted transaction. Balances are the trader's after the step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeStep {
    pub kind: StepKind,
    pub requested_amount: U256,
    pub gas_limit: u64,
    pub outcome: StepOutcome,
    pub gas_used: Option<u64>,
    pub token_balance: U256,
    pub native_balance: U256,
}

/// Probe state machine trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeState {
    Funded,
    ApproveSent,
    BuySent,
    BuyConfirmed,
    SellSent,
    SellConfirmed,
    SellBlocked,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellStatus {
    NotAttempted,
    Confirmed,
    Blocked,
    /// The sell timed out or hit an infrastructure error
    Inconclusive,
}

/// ERC-20 metadata. A field is `None` when the token does not answer for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    pub total_supply: Option<U256>,
}

/// Read-only facts about the token contract gathered inside the sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTraits {
    pub owner: Option<Address>,
    /// `None` when `owner()` is missing or unreadable
    pub ownership_renounced: Option<bool>,
    pub has_mint: bool,
    pub has_pause: bool,
    pub has_blacklist: bool,
    #[serde(default)]
    pub metadata: TokenMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub candidate: Candidate,
    pub steps: Vec<TradeStep>,
    pub trail: Vec<ProbeState>,
    /// Native amount offered on the buy
    pub buy_amount: U256,
    /// Router quote for the buy, before any token-level fee
    pub buy_quote: Option<U256>,
    pub tokens_received: U256,
    /// Router quote for selling `tokens_received`
    pub sell_quote: Option<U256>,
    /// Native proceeds of the sell, gas cost added back
    pub native_received: U256,
    pub buy_gas: Option<u64>,
    pub sell_gas: Option<u64>,
    pub unable_to_buy: bool,
    pub sell_status: SellStatus,
    /// Outcome of the reduced-size sell tried after a reverted full sell
    pub partial_sell_succeeded: Option<bool>,
    pub traits: TokenTraits,
    pub completed_at: DateTime<Utc>,
}

impl ProbeResult {
    pub fn step(&self, kind: StepKind) -> Option<&TradeStep> {
        self.steps.iter().find(|s| s.kind == kind)
    }

    pub fn buy_step(&self) -> Option<&TradeStep> {
        self.step(StepKind::Buy)
    }

    /// The full-size sell; a partial sell, if any, comes after it.
    pub fn sell_step(&self) -> Option<&TradeStep> {
        self.step(StepKind::Sell)
    }

    pub fn is_sell_blocked(&self) -> bool {
        self.sell_status == SellStatus::Blocked
    }

    pub fn any_timed_out(&self) -> bool {
        self.steps.iter().any(|s| s.outcome == StepOutcome::TimedOut)
    }

    /// A buy or sell that failed for infrastructure reasons says nothing about
    /// the token; the session should try again on a fresh sandbox.
    pub fn has_infra_failure(&self) -> bool {
        [self.buy_step(), self.sell_step()]
            .into_iter()
            .flatten()
            .any(|s| matches!(s.outcome, StepOutcome::InfraError { .. }))
    }
}
