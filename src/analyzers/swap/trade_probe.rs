//! Scripted buy-then-sell against one sandbox

use std::future::Future;

use chrono::Utc;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use tracing::instrument;

use super::inspection;
use crate::blockchain::revert::is_liquidity_revert;
use crate::config::ProbeConfig;
use crate::contracts::{erc20, pair, router};
use crate::core::traits::SandboxRpc;
use crate::models::{
    Candidate, ProbeResult, ProbeState, SellStatus, SnapshotId, StepKind, StepOutcome,
    TokenTraits, TradeStep,
};
use crate::utils::{AuditError, Result};

/// Pool reserves oriented as (token, wrapped native).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolReserves {
    pub token: U256,
    pub native: U256,
}

/// Trader balances at a point in the probe.
#[derive(Debug, Clone, Copy, Default)]
struct Balances {
    token: U256,
    native: U256,
}

struct Executed {
    outcome: StepOutcome,
    gas_used: Option<u64>,
    gas_cost: U256,
}

/// Accumulates steps and trail while the probe advances.
struct ProbeLog {
    steps: Vec<TradeStep>,
    trail: Vec<ProbeState>,
    balances: Balances,
}

impl ProbeLog {
    fn enter(&mut self, state: ProbeState) {
        tracing::debug!("Probe state -> {:?}", state);
        self.trail.push(state);
    }
}

pub struct TradeProbe {
    config: ProbeConfig,
}

impl TradeProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Drive the sandbox through fund, approve, buy, sell.
    ///
    /// `Err` is reserved for failures before any trade was attempted
    /// (preflight, funding) and for unreadable balances. Reverts and step
    /// timeouts during trading are recorded in the result instead.
    #[instrument(skip(self, rpc), fields(token = ?candidate.token_address, pair = ?candidate.pair_address))]
    pub async fn run(&self, rpc: &dyn SandboxRpc, candidate: &Candidate) -> Result<ProbeResult> {
        let token = candidate.token_address;
        let weth = self.config.wrapped_native;
        let trader = self.config.trader;

        let reserves = self.preflight(rpc, candidate).await?;
        tracing::debug!("Reserves: {} tokens, {} native", reserves.token, reserves.native);

        let traits = inspection::inspect_token(rpc, token, self.config.step_timeout()).await;

        self.fund(rpc).await?;
        let mut log = ProbeLog {
            steps: Vec::new(),
            trail: vec![ProbeState::Funded],
            balances: self.balances(rpc, token).await?,
        };

        if self.config.approve_before_buy {
            let data = erc20::encode_approve(self.config.router, U256::MAX)?;
            log.enter(ProbeState::ApproveSent);
            let step = self
                .step(rpc, &mut log, token, StepKind::Approve, U256::MAX, self.tx(token, data))
                .await?;
            if !step.outcome.is_success() {
                tracing::debug!("Approve did not succeed ({:?}), continuing", step.outcome);
            }
        }

        // Buy
        let buy_amount = self.config.reference_buy();
        let buy_quote = self.quote(rpc, buy_amount, vec![weth, token]).await?;
        let before = log.balances;
        let data = router::encode_buy(vec![weth, token], trader)?;
        let tx = self.tx(self.config.router, data).value(buy_amount);

        log.enter(ProbeState::BuySent);
        let buy = self.step(rpc, &mut log, token, StepKind::Buy, buy_amount, tx).await?;
        let tokens_received = log.balances.token.saturating_sub(before.token);

        let mut result = ProbeResult {
            candidate: candidate.clone(),
            steps: Vec::new(),
            trail: Vec::new(),
            buy_amount,
            buy_quote,
            tokens_received,
            sell_quote: None,
            native_received: U256::zero(),
            buy_gas: buy.gas_used,
            sell_gas: None,
            unable_to_buy: false,
            sell_status: SellStatus::NotAttempted,
            partial_sell_succeeded: None,
            traits: TokenTraits::default(),
            completed_at: Utc::now(),
        };

        match &buy.outcome {
            StepOutcome::Success if !tokens_received.is_zero() => {
                log.enter(ProbeState::BuyConfirmed);
            }
            StepOutcome::Success => {
                tracing::warn!("Buy confirmed but no tokens arrived");
                result.unable_to_buy = true;
                return Ok(self.finish(result, log, traits));
            }
            StepOutcome::Reverted { reason } => {
                let reason = reason.as_deref().unwrap_or("no reason");
                if is_liquidity_revert(reason) {
                    tracing::info!("Buy reverted on liquidity: {}", reason);
                } else {
                    tracing::warn!("🚫 Buy reverted: {}", reason);
                }
                result.unable_to_buy = true;
                return Ok(self.finish(result, log, traits));
            }
            StepOutcome::TimedOut | StepOutcome::InfraError { .. } => {
                tracing::warn!("Buy inconclusive: {:?}", buy.outcome);
                return Ok(self.finish(result, log, traits));
            }
        }

        // Sell
        let snapshot = if self.config.partial_sell_probe {
            self.try_snapshot(rpc).await
        } else {
            None
        };

        let sell_quote = self.quote(rpc, tokens_received, vec![token, weth]).await?;
        result.sell_quote = sell_quote;

        let before = log.balances;
        let data = router::encode_sell(tokens_received, vec![token, weth], trader)?;
        log.enter(ProbeState::SellSent);
        let sell = self
            .step(rpc, &mut log, token, StepKind::Sell, tokens_received, self.tx(self.config.router, data))
            .await?;

        result.sell_gas = sell.gas_used;
        result.native_received = log
            .balances
            .native
            .saturating_add(sell.gas_cost)
            .saturating_sub(before.native);

        result.sell_status = match &sell.outcome {
            StepOutcome::Success if self.is_near_zero(result.native_received, sell_quote) => {
                tracing::warn!(
                    "🚫 Sell proceeds {} below threshold of quote {:?}",
                    result.native_received,
                    sell_quote
                );
                SellStatus::Blocked
            }
            StepOutcome::Success => SellStatus::Confirmed,
            StepOutcome::Reverted { reason } => {
                tracing::warn!("🚫 Sell reverted: {}", reason.as_deref().unwrap_or("no reason"));
                SellStatus::Blocked
            }
            StepOutcome::TimedOut | StepOutcome::InfraError { .. } => SellStatus::Inconclusive,
        };

        match result.sell_status {
            SellStatus::Confirmed => log.enter(ProbeState::SellConfirmed),
            SellStatus::Blocked => log.enter(ProbeState::SellBlocked),
            _ => {}
        }

        if sell.outcome.is_reverted() {
            if let Some(snapshot) = snapshot {
                result.partial_sell_succeeded =
                    self.partial_sell(rpc, &mut log, token, tokens_received, &snapshot).await?;
            }
        }

        Ok(self.finish(result, log, traits))
    }

    /// Check that the candidate is a live token/native pool at this height.
    pub async fn preflight(&self, rpc: &dyn SandboxRpc, candidate: &Candidate) -> Result<PoolReserves> {
        let pair_address = candidate.pair_address;
        let token = candidate.token_address;
        let weth = self.config.wrapped_native;

        if self.bounded("pair code", rpc.code_at(pair_address)).await?.is_empty() {
            return Err(AuditError::CandidateNotFound(format!(
                "no pair contract at {:?}",
                pair_address
            )));
        }
        if self.bounded("token code", rpc.code_at(token)).await?.is_empty() {
            return Err(AuditError::CandidateNotFound(format!(
                "no token contract at {:?}",
                token
            )));
        }

        let token0 = pair::decode_token("token0", &self.read(rpc, pair_address, pair::encode_token0()?).await?)?;
        let token1 = pair::decode_token("token1", &self.read(rpc, pair_address, pair::encode_token1()?).await?)?;

        let token_is_first = if token0 == token && token1 == weth {
            true
        } else if token1 == token && token0 == weth {
            false
        } else {
            return Err(AuditError::UnsupportedPair(format!(
                "pair {:?} holds {:?}/{:?}, expected {:?} against {:?}",
                pair_address, token0, token1, token, weth
            )));
        };

        let output = self.read(rpc, pair_address, pair::encode_get_reserves()?).await?;
        let (reserve0, reserve1) = pair::decode_get_reserves(&output)?;
        let reserves = if token_is_first {
            PoolReserves { token: reserve0, native: reserve1 }
        } else {
            PoolReserves { token: reserve1, native: reserve0 }
        };

        if reserves.token.is_zero() || reserves.native.is_zero() {
            return Err(AuditError::InsufficientLiquidity(format!(
                "pair {:?} has empty reserves",
                pair_address
            )));
        }

        Ok(reserves)
    }

    async fn fund(&self, rpc: &dyn SandboxRpc) -> Result<()> {
        let trader = self.config.trader;
        self.bounded("set balance", rpc.set_balance(trader, self.config.fund_amount()))
            .await?;
        self.bounded("impersonate", rpc.impersonate(trader)).await?;
        tracing::debug!("Funded trader {:?} with {} wei", trader, self.config.fund_amount());
        Ok(())
    }

    /// Execute one transaction and record it. Balances are re-read only
    /// after a success; a failed step leaves them untouched.
    async fn step(
        &self,
        rpc: &dyn SandboxRpc,
        log: &mut ProbeLog,
        token: Address,
        kind: StepKind,
        requested_amount: U256,
        tx: TransactionRequest,
    ) -> Result<Executed> {
        let executed = self.execute(rpc, tx).await;

        if executed.outcome.is_success() {
            log.balances = self.balances(rpc, token).await?;
        }

        log.steps.push(TradeStep {
            kind,
            requested_amount,
            gas_limit: self.config.gas_limit,
            outcome: executed.outcome.clone(),
            gas_used: executed.gas_used,
            token_balance: log.balances.token,
            native_balance: log.balances.native,
        });

        Ok(executed)
    }

    /// Dry-run for the revert reason, then submit and wait for the receipt,
    /// all under one step timeout.
    async fn execute(&self, rpc: &dyn SandboxRpc, tx: TransactionRequest) -> Executed {
        let attempt = async {
            rpc.call(&tx).await?;
            rpc.send_transaction(tx.clone()).await
        };

        match tokio::time::timeout(self.config.step_timeout(), attempt).await {
            Err(_) => Executed {
                outcome: StepOutcome::TimedOut,
                gas_used: None,
                gas_cost: U256::zero(),
            },
            Ok(Ok(receipt)) => Executed {
                outcome: if receipt.success {
                    StepOutcome::Success
                } else {
                    StepOutcome::Reverted { reason: None }
                },
                gas_used: Some(receipt.gas_used),
                gas_cost: receipt.gas_cost(),
            },
            Ok(Err(AuditError::Reverted(reason))) => Executed {
                outcome: StepOutcome::Reverted { reason: Some(reason) },
                gas_used: None,
                gas_cost: U256::zero(),
            },
            Ok(Err(e)) => Executed {
                outcome: StepOutcome::InfraError { message: e.to_string() },
                gas_used: None,
                gas_cost: U256::zero(),
            },
        }
    }

    /// Roll back to the post-buy state and try selling a slice of the position.
    async fn partial_sell(
        &self,
        rpc: &dyn SandboxRpc,
        log: &mut ProbeLog,
        token: Address,
        tokens_received: U256,
        snapshot: &SnapshotId,
    ) -> Result<Option<bool>> {
        let bps = U256::from(self.config.partial_sell_bps);
        let amount = tokens_received
            .checked_mul(bps)
            .map(|v| v / U256::from(10_000u32))
            .unwrap_or_else(|| tokens_received / U256::from(10_000u32) * bps);
        if amount.is_zero() {
            return Ok(None);
        }

        match self.bounded("revert", rpc.revert_to(snapshot)).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Snapshot {} rejected, skipping partial sell", snapshot.0);
                return Ok(None);
            }
            Err(e) => {
                tracing::debug!("Snapshot revert failed, skipping partial sell: {}", e);
                return Ok(None);
            }
        }

        let data = router::encode_sell(amount, vec![token, self.config.wrapped_native], self.config.trader)?;
        let partial = self
            .step(rpc, log, token, StepKind::Sell, amount, self.tx(self.config.router, data))
            .await?;

        Ok(match partial.outcome {
            StepOutcome::Success => {
                tracing::warn!("⚠️  Full sell blocked but {} bps of the position sold", self.config.partial_sell_bps);
                Some(true)
            }
            StepOutcome::Reverted { .. } => Some(false),
            StepOutcome::TimedOut | StepOutcome::InfraError { .. } => None,
        })
    }

    async fn try_snapshot(&self, rpc: &dyn SandboxRpc) -> Option<SnapshotId> {
        match self.bounded("snapshot", rpc.snapshot()).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::debug!("Snapshot unavailable: {}", e);
                None
            }
        }
    }

    /// Router quote; `None` when the router reverts on the path.
    async fn quote(&self, rpc: &dyn SandboxRpc, amount: U256, path: Vec<Address>) -> Result<Option<U256>> {
        let data = router::encode_get_amounts_out(amount, path)?;
        match self.read(rpc, self.config.router, data).await {
            Ok(output) => router::decode_amount_out(&output),
            Err(AuditError::Reverted(reason)) => {
                tracing::debug!("No quote: {}", reason);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn balances(&self, rpc: &dyn SandboxRpc, token: Address) -> Result<Balances> {
        let trader = self.config.trader;
        let output = self.read(rpc, token, erc20::encode_balance_of(trader)?).await?;
        let token_balance = erc20::decode_balance_of(&output)?;
        let native = self.bounded("native balance", rpc.native_balance(trader)).await?;
        Ok(Balances {
            token: token_balance,
            native,
        })
    }

    async fn read(&self, rpc: &dyn SandboxRpc, to: Address, data: Bytes) -> Result<Bytes> {
        let request = TransactionRequest::new().from(self.config.trader).to(to).data(data);
        self.bounded("eth_call", rpc.call(&request)).await
    }

    fn tx(&self, to: Address, data: Bytes) -> TransactionRequest {
        TransactionRequest::new()
            .from(self.config.trader)
            .to(to)
            .data(data)
            .gas(self.config.gas_limit)
            .gas_price(U256::zero())
    }

    /// Non-step RPC under the step timeout. Expiry is an infrastructure
    /// failure, not a token verdict.
    async fn bounded<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.step_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(AuditError::Rpc(format!(
                "{} timed out after {:?}",
                what,
                self.config.step_timeout()
            ))),
        }
    }

    fn is_near_zero(&self, received: U256, quote: Option<U256>) -> bool {
        match quote {
            Some(quote) => {
                let ratio_bps = (self.config.near_zero_sell_ratio * 10_000.0).round() as u64;
                received < quote.saturating_mul(U256::from(ratio_bps)) / U256::from(10_000u32)
            }
            None => received.is_zero(),
        }
    }

    fn finish(&self, mut result: ProbeResult, mut log: ProbeLog, traits: TokenTraits) -> ProbeResult {
        log.enter(ProbeState::Done);
        result.steps = log.steps;
        result.trail = log.trail;
        result.traits = traits;
        result.completed_at = Utc::now();
        result
    }
}
