//! In-memory stand-ins for the forking node, shared by the integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ethers::abi::{decode, encode, ParamType, Token};
use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};
use ethers::utils::id;

use honeypot_auditor::config::AuditConfig;
use honeypot_auditor::contracts::{addresses, router};
use honeypot_auditor::core::{SandboxProvider, SandboxRpc, TxReceipt};
use honeypot_auditor::models::{Candidate, Sandbox, SandboxId, SandboxState, SnapshotId};
use honeypot_auditor::{AuditError, Result};

pub fn ether(milli: u64) -> U256 {
    U256::from(milli) * U256::exp10(15)
}

pub fn token() -> Address {
    Address::repeat_byte(0xbb)
}

pub fn pair() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn candidate() -> Candidate {
    Candidate::new(pair(), token(), 19_000_000)
}

/// Small timeouts and a 1% tax threshold so a 3% sell tax registers.
pub fn test_config() -> AuditConfig {
    let mut config = AuditConfig::default();
    config.probe.reference_buy_wei = 10u128.pow(18);
    config.probe.step_timeout_ms = 200;
    config.probe.receipt_poll_interval_ms = 1;
    config.scoring.high_tax_threshold_pct = 1.0;
    config.retry.max_attempts = 3;
    config.retry.initial_delay_ms = 2;
    config.retry.max_delay_ms = 10;
    config.session.max_concurrent_sessions = 2;
    config.session.session_timeout_ms = 5_000;
    config
}

/// How the scripted chain answers one kind of trade.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Succeed and credit this much of the output asset
    Succeed(U256),
    /// Fail the dry-run with a revert reason
    Revert(String),
    /// Pass the dry-run but mine with status 0
    RevertOnChain,
    /// Never answer
    Hang,
    /// Transport failure
    Transport,
}

#[derive(Debug, Clone)]
pub struct Script {
    pub pair_has_code: bool,
    pub token0: Address,
    pub token1: Address,
    pub reserves: (U256, U256),
    pub buy: Behavior,
    pub sell: Behavior,
    /// Used for every sell after the first
    pub partial_sell: Behavior,
    pub buy_quote: Option<U256>,
    pub sell_quote: Option<U256>,
    pub buy_gas: u64,
    pub sell_gas: u64,
    pub owner: Option<Address>,
    pub token_code: Vec<u8>,
    /// `None` makes `name()`/`symbol()` revert
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: u8,
    pub total_supply: U256,
}

impl Default for Script {
    /// Scenario A: 1 ETH buys 950 tokens, selling them returns 0.97 ETH.
    fn default() -> Self {
        Self {
            pair_has_code: true,
            token0: token(),
            token1: addresses::weth(),
            reserves: (U256::from(1_000_000u64), ether(500_000)),
            buy: Behavior::Succeed(U256::from(950u64)),
            sell: Behavior::Succeed(ether(970)),
            partial_sell: Behavior::Revert("still blocked".into()),
            buy_quote: Some(U256::from(950u64)),
            sell_quote: Some(ether(1_000)),
            buy_gas: 120_000,
            sell_gas: 140_000,
            owner: Some(Address::zero()),
            token_code: vec![0x60, 0x80, 0x60, 0x40, 0x52],
            name: Some("Scripted Token".into()),
            symbol: Some("SCR".into()),
            decimals: 18,
            total_supply: U256::from(1_000_000_000u64),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ChainState {
    native: U256,
    tokens: U256,
}

/// Scripted sandbox RPC. Dispatches on target address and selector.
pub struct ScriptedRpc {
    script: Script,
    state: Mutex<ChainState>,
    snapshots: Mutex<Vec<ChainState>>,
    sells: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRpc {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            state: Mutex::new(ChainState::default()),
            snapshots: Mutex::new(Vec::new()),
            sells: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn selector(tx: &TransactionRequest) -> [u8; 4] {
        let data = tx.data.clone().unwrap_or_default();
        let mut selector = [0u8; 4];
        if data.len() >= 4 {
            selector.copy_from_slice(&data[..4]);
        }
        selector
    }

    fn target(tx: &TransactionRequest) -> Address {
        tx.to.as_ref().and_then(|to| to.as_address().copied()).unwrap_or_default()
    }

    fn first_word(tx: &TransactionRequest) -> U256 {
        let data = tx.data.clone().unwrap_or_default();
        U256::from_big_endian(&data[4..36])
    }

    /// Behavior for the trade in `tx`, if it is one. Sells are numbered at
    /// dry-run time so the following send sees the same behavior.
    fn trade_behavior(&self, tx: &TransactionRequest, dry_run: bool) -> Option<Behavior> {
        let selector = Self::selector(tx);
        if selector == router::selectors::buy() {
            return Some(self.script.buy.clone());
        }
        if selector == router::selectors::sell() {
            let n = if dry_run {
                self.sells.fetch_add(1, Ordering::SeqCst) + 1
            } else {
                self.sells.load(Ordering::SeqCst)
            };
            return Some(if n <= 1 {
                self.script.sell.clone()
            } else {
                self.script.partial_sell.clone()
            });
        }
        None
    }

    async fn behave(behavior: &Behavior) -> Result<()> {
        match behavior {
            Behavior::Revert(reason) => Err(AuditError::Reverted(reason.clone())),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            Behavior::Transport => Err(AuditError::Rpc("connection reset".into())),
            Behavior::Succeed(_) | Behavior::RevertOnChain => Ok(()),
        }
    }
}

#[async_trait]
impl SandboxRpc for ScriptedRpc {
    async fn chain_id(&self) -> Result<u64> {
        Ok(1)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        self.log("eth_getCode");
        if address == pair() {
            return Ok(if self.script.pair_has_code {
                Bytes::from(vec![0x60, 0x80])
            } else {
                Bytes::default()
            });
        }
        if address == token() {
            return Ok(Bytes::from(self.script.token_code.clone()));
        }
        Ok(Bytes::default())
    }

    async fn native_balance(&self, _address: Address) -> Result<U256> {
        Ok(self.state.lock().unwrap().native)
    }

    async fn set_balance(&self, _address: Address, amount: U256) -> Result<()> {
        self.log("anvil_setBalance");
        self.state.lock().unwrap().native = amount;
        Ok(())
    }

    async fn impersonate(&self, _address: Address) -> Result<()> {
        Ok(())
    }

    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes> {
        let target = Self::target(tx);
        let selector = Self::selector(tx);

        if target == pair() {
            let out = if selector == id("token0()") {
                encode(&[Token::Address(self.script.token0)])
            } else if selector == id("token1()") {
                encode(&[Token::Address(self.script.token1)])
            } else {
                let (r0, r1) = self.script.reserves;
                encode(&[Token::Uint(r0), Token::Uint(r1), Token::Uint(U256::zero())])
            };
            return Ok(out.into());
        }

        if target == token() {
            if selector == id("balanceOf(address)") {
                let tokens = self.state.lock().unwrap().tokens;
                return Ok(encode(&[Token::Uint(tokens)]).into());
            }
            if selector == id("owner()") {
                return match self.script.owner {
                    Some(owner) => Ok(encode(&[Token::Address(owner)]).into()),
                    None => Err(AuditError::Reverted("no owner".into())),
                };
            }
            let text = if selector == id("name()") {
                Some(&self.script.name)
            } else if selector == id("symbol()") {
                Some(&self.script.symbol)
            } else {
                None
            };
            if let Some(text) = text {
                return match text {
                    Some(text) => Ok(encode(&[Token::String(text.clone())]).into()),
                    None => Err(AuditError::Reverted(String::new())),
                };
            }
            if selector == id("decimals()") {
                return Ok(encode(&[Token::Uint(U256::from(self.script.decimals))]).into());
            }
            if selector == id("totalSupply()") {
                return Ok(encode(&[Token::Uint(self.script.total_supply)]).into());
            }
            return Ok(encode(&[Token::Bool(true)]).into());
        }

        if selector == router::selectors::get_amounts_out() {
            let data = tx.data.clone().unwrap_or_default();
            let params = decode(
                &[ParamType::Uint(256), ParamType::Array(Box::new(ParamType::Address))],
                &data[4..],
            )
            .unwrap();
            let amount_in = params[0].clone().into_uint().unwrap();
            let path = params[1].clone().into_array().unwrap();
            let buying = path[0].clone().into_address() == Some(addresses::weth());
            let quote = if buying { self.script.buy_quote } else { self.script.sell_quote };
            return match quote {
                Some(out) => Ok(encode(&[Token::Array(vec![Token::Uint(amount_in), Token::Uint(out)])]).into()),
                None => Err(AuditError::Reverted("UniswapV2Library: INSUFFICIENT_LIQUIDITY".into())),
            };
        }

        if let Some(behavior) = self.trade_behavior(tx, true) {
            self.log(if selector == router::selectors::buy() { "dry-run buy" } else { "dry-run sell" });
            Self::behave(&behavior).await?;
        }

        Ok(Bytes::default())
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxReceipt> {
        let selector = Self::selector(&tx);
        let mut receipt = TxReceipt {
            tx_hash: H256::from_low_u64_be(self.calls.lock().unwrap().len() as u64),
            success: true,
            gas_used: 46_000,
            effective_gas_price: U256::zero(),
        };

        let Some(behavior) = self.trade_behavior(&tx, false) else {
            self.log("send approve");
            return Ok(receipt);
        };

        let is_buy = selector == router::selectors::buy();
        self.log(if is_buy { "send buy" } else { "send sell" });
        Self::behave(&behavior).await?;

        receipt.gas_used = if is_buy { self.script.buy_gas } else { self.script.sell_gas };
        match behavior {
            Behavior::Succeed(out) => {
                let mut state = self.state.lock().unwrap();
                if is_buy {
                    state.native = state.native.saturating_sub(tx.value.unwrap_or_default());
                    state.tokens += out;
                } else {
                    state.tokens = state.tokens.saturating_sub(Self::first_word(&tx));
                    state.native += out;
                }
            }
            _ => receipt.success = false,
        }

        Ok(receipt)
    }

    async fn snapshot(&self) -> Result<SnapshotId> {
        let state = self.state.lock().unwrap().clone();
        let mut snapshots = self.snapshots.lock().unwrap();
        snapshots.push(state);
        Ok(SnapshotId(format!("{:#x}", snapshots.len())))
    }

    async fn revert_to(&self, _id: &SnapshotId) -> Result<bool> {
        self.log("evm_revert");
        match self.snapshots.lock().unwrap().pop() {
            Some(state) => {
                *self.state.lock().unwrap() = state;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Counting provider handing out [`ScriptedRpc`] sandboxes.
pub struct MockProvider {
    script: Script,
    provision_delay: Duration,
    terminate_delay: Duration,
    failing_provisions: AtomicUsize,
    startup_failed: AtomicUsize,
    healthy: AtomicBool,
    live: AtomicUsize,
    pub peak_live: AtomicUsize,
    pub provisioned: Mutex<Vec<SandboxId>>,
    pub fork_heights: Mutex<Vec<Option<u64>>>,
    pub terminated: Mutex<Vec<SandboxId>>,
    rpcs: Mutex<HashMap<SandboxId, Arc<ScriptedRpc>>>,
}

impl MockProvider {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            provision_delay: Duration::from_millis(5),
            terminate_delay: Duration::ZERO,
            failing_provisions: AtomicUsize::new(0),
            startup_failed: AtomicUsize::new(0),
            healthy: AtomicBool::new(true),
            live: AtomicUsize::new(0),
            peak_live: AtomicUsize::new(0),
            provisioned: Mutex::new(Vec::new()),
            fork_heights: Mutex::new(Vec::new()),
            terminated: Mutex::new(Vec::new()),
            rpcs: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_provision_delay(mut self, delay: Duration) -> Self {
        self.provision_delay = delay;
        self
    }

    /// Make every terminate take this long before the sandbox is gone.
    pub fn with_terminate_delay(mut self, delay: Duration) -> Self {
        self.terminate_delay = delay;
        self
    }

    /// Fail the next `n` provisions with a startup timeout.
    pub fn failing_provisions(self, n: usize) -> Self {
        self.failing_provisions.store(n, Ordering::SeqCst);
        self
    }

    pub fn unhealthy(self) -> Self {
        self.healthy.store(false, Ordering::SeqCst);
        self
    }

    pub fn provision_attempts(&self) -> usize {
        self.provisioned.lock().unwrap().len() + self.startup_failures()
    }

    fn startup_failures(&self) -> usize {
        self.startup_failed.load(Ordering::SeqCst)
    }

    pub fn provision_count(&self) -> usize {
        self.provisioned.lock().unwrap().len()
    }

    pub fn terminate_count(&self) -> usize {
        self.terminated.lock().unwrap().len()
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Every provisioned sandbox terminated exactly once, nothing else terminated.
    pub fn assert_one_terminate_per_provision(&self) {
        let provisioned = self.provisioned.lock().unwrap().clone();
        let terminated = self.terminated.lock().unwrap().clone();
        assert_eq!(provisioned.len(), terminated.len(), "provisions vs terminates");
        for id in &provisioned {
            let count = terminated.iter().filter(|t| *t == id).count();
            assert_eq!(count, 1, "sandbox {} terminated {} times", id, count);
        }
    }

    /// Wait for background terminates spawned by dropped leases.
    pub async fn settle(&self) {
        for _ in 0..200 {
            if self.live() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl SandboxProvider for MockProvider {
    async fn provision(&self, fork_height: Option<u64>) -> Result<Sandbox> {
        tokio::time::sleep(self.provision_delay).await;
        self.fork_heights.lock().unwrap().push(fork_height);

        let remaining = self.failing_provisions.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_provisions.store(remaining - 1, Ordering::SeqCst);
            self.startup_failed.fetch_add(1, Ordering::SeqCst);
            return Err(AuditError::SandboxStartupFailed("no answer within 5s".into()));
        }

        let port = 20_000 + self.provision_count() as u16;
        let mut sandbox = Sandbox::new(format!("http://127.0.0.1:{}", port), port, fork_height);
        sandbox.advance(SandboxState::Ready);

        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_live.fetch_max(live, Ordering::SeqCst);
        self.provisioned.lock().unwrap().push(sandbox.id.clone());
        self.rpcs
            .lock()
            .unwrap()
            .insert(sandbox.id.clone(), Arc::new(ScriptedRpc::new(self.script.clone())));

        Ok(sandbox)
    }

    async fn health_check(&self, _sandbox: &Sandbox) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn connect(&self, sandbox: &Sandbox) -> Result<Arc<dyn SandboxRpc>> {
        self.rpcs
            .lock()
            .unwrap()
            .get(&sandbox.id)
            .map(|rpc| rpc.clone() as Arc<dyn SandboxRpc>)
            .ok_or_else(|| AuditError::Rpc(format!("sandbox {} is not running", sandbox.id)))
    }

    async fn terminate(&self, sandbox: &Sandbox) -> Result<()> {
        if !self.terminate_delay.is_zero() {
            tokio::time::sleep(self.terminate_delay).await;
        }
        let mut terminated = self.terminated.lock().unwrap();
        if !terminated.contains(&sandbox.id) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        terminated.push(sandbox.id.clone());
        Ok(())
    }
}
