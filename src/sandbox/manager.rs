//! Anvil-backed sandbox lifecycle
//!
//! Every sandbox is its own `anvil` process on its own port. Sandboxes are
//! never pooled: a terminated one is gone, and the next candidate gets a
//! fresh fork.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use super::ports::{PortAllocator, PortLease};
use crate::blockchain::ForkClient;
use crate::config::SandboxConfig;
use crate::core::traits::{SandboxProvider, SandboxRpc};
use crate::models::{Sandbox, SandboxId, SandboxState};
use crate::utils::{AuditError, Result};

struct LiveNode {
    child: Child,
    client: Arc<ForkClient>,
    // Held until the process is gone
    _port: PortLease,
}

pub struct AnvilManager {
    config: SandboxConfig,
    receipt_poll_interval: Duration,
    ports: PortAllocator,
    live: Mutex<HashMap<SandboxId, LiveNode>>,
}

impl AnvilManager {
    pub fn new(config: SandboxConfig, receipt_poll_interval: Duration) -> Self {
        let ports = PortAllocator::new(
            config.host.clone(),
            config.port_range_start,
            config.port_range_end,
        );

        Self {
            config,
            receipt_poll_interval,
            ports,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Number of sandboxes provisioned and not yet terminated.
    pub fn live_count(&self) -> usize {
        self.live.lock().map(|live| live.len()).unwrap_or(0)
    }

    /// Terminate everything still running. Used on shutdown.
    pub async fn terminate_all(&self) {
        let nodes: Vec<(SandboxId, LiveNode)> = match self.live.lock() {
            Ok(mut live) => live.drain().collect(),
            Err(_) => return,
        };

        for (id, node) in nodes {
            self.stop_node(&id, node).await;
        }
    }

    fn command(&self, port: u16, fork_height: Option<u64>) -> Command {
        let mut command = Command::new(&self.config.node_binary);
        command
            .arg("--port")
            .arg(port.to_string())
            .arg("--host")
            .arg(&self.config.host)
            .args(["--silent", "--block-base-fee-per-gas", "0", "--gas-price", "0"]);

        if !self.config.fork_url.is_empty() {
            command.arg("--fork-url").arg(&self.config.fork_url);
            if let Some(height) = fork_height {
                command.arg("--fork-block-number").arg(height.to_string());
            }
        }

        command
            .args(&self.config.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        command
    }

    /// Poll `eth_chainId` until the node answers, exits, or the startup
    /// budget runs out.
    async fn wait_until_ready(&self, child: &mut Child, client: &ForkClient) -> Result<u64> {
        let startup = self.config.startup_timeout();
        let poll = self.config.health_poll_interval();

        match tokio::time::timeout(startup, poll_until_ready(child, client, poll)).await {
            Ok(result) => result,
            Err(_) => Err(AuditError::SandboxStartupFailed(format!(
                "{} did not answer within {:?}",
                client.endpoint(),
                startup
            ))),
        }
    }

    async fn stop_node(&self, id: &SandboxId, mut node: LiveNode) {
        if let Err(e) = node.child.start_kill() {
            tracing::debug!("Sandbox {}: kill signal not delivered: {}", id, e);
        }

        match tokio::time::timeout(self.config.shutdown_grace(), node.child.wait()).await {
            Ok(Ok(status)) => tracing::debug!("Sandbox {} exited with {}", id, status),
            Ok(Err(e)) => tracing::warn!("Sandbox {}: wait failed: {}", id, e),
            Err(_) => tracing::warn!(
                "Sandbox {} still running after {:?}, dropping handle",
                id,
                self.config.shutdown_grace()
            ),
        }
    }
}

async fn poll_until_ready(child: &mut Child, client: &ForkClient, poll: Duration) -> Result<u64> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Err(AuditError::SandboxStartupFailed(format!(
                "node exited during startup with {}",
                status
            )));
        }

        if let Ok(Ok(chain_id)) = tokio::time::timeout(poll, client.chain_id()).await {
            return Ok(chain_id);
        }

        tokio::time::sleep(poll).await;
    }
}

#[async_trait]
impl SandboxProvider for AnvilManager {
    async fn provision(&self, fork_height: Option<u64>) -> Result<Sandbox> {
        let port = self.ports.allocate()?;
        let endpoint = format!("http://{}:{}", self.config.host, port.port());
        let mut sandbox = Sandbox::new(endpoint.clone(), port.port(), fork_height);
        tracing::debug!("Provisioning sandbox {} on port {}", sandbox.id, sandbox.port);

        let mut child = self.command(port.port(), fork_height).spawn().map_err(|e| {
            AuditError::SpawnFailed(format!("{}: {}", self.config.node_binary.display(), e))
        })?;

        let client = Arc::new(ForkClient::new(&endpoint, self.receipt_poll_interval)?);

        let chain_id = match self.wait_until_ready(&mut child, &client).await {
            Ok(chain_id) => chain_id,
            Err(e) => {
                sandbox.advance(SandboxState::Draining);
                let _ = child.start_kill();
                let _ = tokio::time::timeout(self.config.shutdown_grace(), child.wait()).await;
                sandbox.advance(SandboxState::Terminated);
                tracing::warn!("Sandbox {} failed to start: {}", sandbox.id, e);
                return Err(e);
            }
        };

        sandbox.advance(SandboxState::Ready);
        tracing::info!(
            "🧪 Sandbox {} ready on port {} (chain {}, fork {})",
            sandbox.id,
            sandbox.port,
            chain_id,
            fork_height.map(|h| h.to_string()).unwrap_or_else(|| "latest".into())
        );

        let mut live = self
            .live
            .lock()
            .map_err(|_| AuditError::SandboxStartupFailed("sandbox registry lock poisoned".into()))?;
        live.insert(
            sandbox.id.clone(),
            LiveNode {
                child,
                client,
                _port: port,
            },
        );

        Ok(sandbox)
    }

    async fn health_check(&self, sandbox: &Sandbox) -> bool {
        let Ok(client) = self.connect(sandbox) else {
            return false;
        };

        matches!(
            tokio::time::timeout(self.config.startup_timeout(), client.chain_id()).await,
            Ok(Ok(_))
        )
    }

    fn connect(&self, sandbox: &Sandbox) -> Result<Arc<dyn SandboxRpc>> {
        let live = self
            .live
            .lock()
            .map_err(|_| AuditError::Rpc("sandbox registry lock poisoned".into()))?;

        live.get(&sandbox.id)
            .map(|node| node.client.clone() as Arc<dyn SandboxRpc>)
            .ok_or_else(|| AuditError::Rpc(format!("sandbox {} is not running", sandbox.id)))
    }

    async fn terminate(&self, sandbox: &Sandbox) -> Result<()> {
        let node = self
            .live
            .lock()
            .map_err(|_| AuditError::Rpc("sandbox registry lock poisoned".into()))?
            .remove(&sandbox.id);

        match node {
            Some(node) => {
                self.stop_node(&sandbox.id, node).await;
                tracing::debug!("Sandbox {} terminated, port {} released", sandbox.id, sandbox.port);
            }
            None => tracing::debug!("Sandbox {} already terminated", sandbox.id),
        }

        Ok(())
    }
}
