pub mod candidate;
pub mod factor;
pub mod report;
pub mod sandbox;
pub mod trade;

pub use candidate::Candidate;
pub use factor::{RiskFactor, RiskLabel};
pub use report::{AuditReport, Confidence, FailureInfo, ReportStatus};
pub use sandbox::{Sandbox, SandboxId, SandboxState, SnapshotId};
pub use trade::{
    ProbeResult, ProbeState, SellStatus, StepKind, StepOutcome, TokenMetadata, TokenTraits, TradeStep,
};
