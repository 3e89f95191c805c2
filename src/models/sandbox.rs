use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a forked sandbox. Terminated sandboxes are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    Provisioning,
    Ready,
    InUse,
    Draining,
    Terminated,
}

impl SandboxState {
    /// Forward-only transitions; any live state may drain on an error path.
    pub fn can_transition_to(self, next: SandboxState) -> bool {
        use SandboxState::*;
        matches!(
            (self, next),
            (Provisioning, Ready)
                | (Provisioning, Draining)
                | (Ready, InUse)
                | (Ready, Draining)
                | (InUse, Draining)
                | (Draining, Terminated)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SandboxId(pub String);

impl SandboxId {
    pub fn generate() -> Self {
        SandboxId(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for SandboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier returned by the node's snapshot call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotId(pub String);

/// Handle to one isolated fork of chain state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sandbox {
    pub id: SandboxId,
    pub endpoint: String,
    pub port: u16,
    /// `None` forks the latest block
    pub fork_height: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub state: SandboxState,
}

impl Sandbox {
    pub fn new(endpoint: impl Into<String>, port: u16, fork_height: Option<u64>) -> Self {
        Self {
            id: SandboxId::generate(),
            endpoint: endpoint.into(),
            port,
            fork_height,
            created_at: Utc::now(),
            state: SandboxState::Provisioning,
        }
    }

    /// Apply a lifecycle transition, ignoring illegal ones.
    pub fn advance(&mut self, next: SandboxState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            tracing::debug!("Sandbox {}: ignoring transition {:?} -> {:?}", self.id, self.state, next);
            false
        }
    }
}
