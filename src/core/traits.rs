use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};

use crate::models::{Sandbox, SnapshotId};
use crate::utils::Result;

/// Mined transaction as seen by the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: H256,
    /// Receipt status 1
    pub success: bool,
    pub gas_used: u64,
    pub effective_gas_price: U256,
}

impl TxReceipt {
    pub fn gas_cost(&self) -> U256 {
        U256::from(self.gas_used) * self.effective_gas_price
    }
}

/// JSON-RPC surface of one forked sandbox.
///
/// Reverts come back as [`AuditError::Reverted`](crate::utils::AuditError),
/// everything transport-related as `AuditError::Rpc`.
#[async_trait]
pub trait SandboxRpc: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    async fn code_at(&self, address: Address) -> Result<Bytes>;

    async fn native_balance(&self, address: Address) -> Result<U256>;

    /// Privileged balance override
    async fn set_balance(&self, address: Address, amount: U256) -> Result<()>;

    /// Let the node sign for `address` without a key
    async fn impersonate(&self, address: Address) -> Result<()>;

    /// `eth_call` against the latest sandbox state
    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes>;

    /// Submit and wait for the receipt. A mined-but-failed transaction is
    /// `Ok` with `success == false`.
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxReceipt>;

    async fn snapshot(&self) -> Result<SnapshotId>;

    /// Returns whether the node accepted the snapshot id.
    async fn revert_to(&self, id: &SnapshotId) -> Result<bool>;
}

/// Owns forked sandbox processes.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Start a sandbox forked at `fork_height` (latest when `None`) and wait
    /// until it answers RPC.
    async fn provision(&self, fork_height: Option<u64>) -> Result<Sandbox>;

    async fn health_check(&self, sandbox: &Sandbox) -> bool;

    fn connect(&self, sandbox: &Sandbox) -> Result<Arc<dyn SandboxRpc>>;

    /// Idempotent. Unknown or already-terminated sandboxes are `Ok`.
    async fn terminate(&self, sandbox: &Sandbox) -> Result<()>;

    async fn snapshot(&self, sandbox: &Sandbox) -> Result<SnapshotId> {
        self.connect(sandbox)?.snapshot().await
    }

    async fn revert(&self, sandbox: &Sandbox, id: &SnapshotId) -> Result<()> {
        if self.connect(sandbox)?.revert_to(id).await? {
            Ok(())
        } else {
            Err(crate::utils::AuditError::Rpc(format!(
                "sandbox {} rejected snapshot {}",
                sandbox.id, id.0
            )))
        }
    }
}
