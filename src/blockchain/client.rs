use std::time::Duration;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;

use crate::core::traits::{SandboxRpc, TxReceipt};
use crate::models::SnapshotId;
use crate::utils::{AuditError, Result};

/// RPC client bound to one sandbox endpoint
pub struct ForkClient {
    provider: Provider<Http>,
    endpoint: String,
    receipt_poll_interval: Duration,
}

impl ForkClient {
    pub fn new(endpoint: &str, receipt_poll_interval: Duration) -> Result<Self> {
        let provider = Provider::<Http>::try_from(endpoint)
            .map_err(|e| AuditError::Rpc(format!("Invalid sandbox URL {}: {}", endpoint, e)))?
            .interval(receipt_poll_interval);

        Ok(Self {
            provider,
            endpoint: endpoint.to_string(),
            receipt_poll_interval,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SandboxRpc for ForkClient {
    async fn chain_id(&self) -> Result<u64> {
        let chain_id = self.provider.get_chainid().await?;
        Ok(chain_id.as_u64())
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        tracing::trace!("eth_getCode {:?} on {}", address, self.endpoint);
        Ok(self.provider.get_code(address, None).await?)
    }

    async fn native_balance(&self, address: Address) -> Result<U256> {
        Ok(self.provider.get_balance(address, None).await?)
    }

    async fn set_balance(&self, address: Address, amount: U256) -> Result<()> {
        let _: serde_json::Value = self
            .provider
            .request("anvil_setBalance", (address, amount))
            .await?;
        Ok(())
    }

    async fn impersonate(&self, address: Address) -> Result<()> {
        let _: serde_json::Value = self
            .provider
            .request("anvil_impersonateAccount", [address])
            .await?;
        Ok(())
    }

    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes> {
        let typed: TypedTransaction = tx.clone().into();
        Ok(self.provider.call(&typed, None).await?)
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxReceipt> {
        let pending = self.provider.send_transaction(tx, None).await?;
        let tx_hash = pending.tx_hash();

        let receipt = pending
            .interval(self.receipt_poll_interval)
            .await?
            .ok_or_else(|| AuditError::Rpc(format!("transaction {:?} dropped from pool", tx_hash)))?;

        Ok(TxReceipt {
            tx_hash,
            success: receipt.status.map(|s| s.as_u64() == 1).unwrap_or(false),
            gas_used: receipt.gas_used.map(|g| g.as_u64()).unwrap_or_default(),
            effective_gas_price: receipt.effective_gas_price.unwrap_or_default(),
        })
    }

    async fn snapshot(&self) -> Result<SnapshotId> {
        let id: U256 = self.provider.request("evm_snapshot", ()).await?;
        Ok(SnapshotId(format!("{:#x}", id)))
    }

    async fn revert_to(&self, id: &SnapshotId) -> Result<bool> {
        Ok(self.provider.request("evm_revert", [id.0.as_str()]).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_endpoint() {
        let result = ForkClient::new("not a url", Duration::from_millis(10));
        assert!(matches!(result, Err(AuditError::Rpc(_))));
    }

    #[test]
    fn test_keeps_endpoint() {
        let client = ForkClient::new("http://127.0.0.1:18545", Duration::from_millis(10)).unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:18545");
    }
}
