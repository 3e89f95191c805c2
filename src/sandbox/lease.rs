//! Scoped ownership of one provisioned sandbox
//!
//! A [`SandboxLease`] issues exactly one `terminate` for the sandbox it holds.
//! The normal path is [`SandboxLease::release`]; if the lease is dropped
//! instead (the owning future was cancelled or timed out), the drop spawns
//! the terminate on the current runtime.
//!
//! The lease also carries the session's slot. The slot goes back to the
//! pool only after `terminate` returns, whichever path ran it.

use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;

use crate::core::traits::{SandboxProvider, SandboxRpc};
use crate::models::{Sandbox, SandboxState};
use crate::utils::{AuditError, Result};

pub struct SandboxLease {
    provider: Arc<dyn SandboxProvider>,
    sandbox: Sandbox,
    slot: Arc<OwnedSemaphorePermit>,
    released: bool,
}

impl SandboxLease {
    /// Provision a sandbox and take ownership of it, holding `slot` until
    /// the sandbox is gone.
    pub async fn acquire(
        provider: Arc<dyn SandboxProvider>,
        fork_height: Option<u64>,
        slot: Arc<OwnedSemaphorePermit>,
    ) -> Result<Self> {
        let sandbox = provider.provision(fork_height).await?;
        Ok(Self {
            provider,
            sandbox,
            slot,
            released: false,
        })
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn connect(&self) -> Result<Arc<dyn SandboxRpc>> {
        self.provider.connect(&self.sandbox)
    }

    pub async fn health_check(&self) -> bool {
        self.provider.health_check(&self.sandbox).await
    }

    pub fn mark_in_use(&mut self) {
        self.sandbox.advance(SandboxState::InUse);
    }

    /// Terminate the sandbox and wait for it.
    ///
    /// The terminate runs as its own task, so cancelling this future does
    /// not interrupt it and the drop path will not issue a second one.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        self.sandbox.advance(SandboxState::Draining);

        let provider = self.provider.clone();
        let sandbox = self.sandbox.clone();
        let slot = self.slot.clone();
        let handle = tokio::spawn(async move {
            let result = provider.terminate(&sandbox).await;
            drop(slot);
            result
        });

        let result = handle
            .await
            .map_err(|e| AuditError::Rpc(format!("terminate task for {} failed: {}", self.sandbox.id, e)))?;

        self.sandbox.advance(SandboxState::Terminated);
        result
    }
}

impl Drop for SandboxLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let provider = self.provider.clone();
        let sandbox = self.sandbox.clone();
        let slot = self.slot.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::debug!("Sandbox {} dropped while live, terminating in background", sandbox.id);
                runtime.spawn(async move {
                    if let Err(e) = provider.terminate(&sandbox).await {
                        tracing::warn!("Background terminate of sandbox {} failed: {}", sandbox.id, e);
                    }
                    drop(slot);
                });
            }
            Err(_) => {
                // Outside a runtime the child's kill_on_drop is all that is left
                tracing::warn!("Sandbox {} dropped outside a runtime", sandbox.id);
            }
        }
    }
}
