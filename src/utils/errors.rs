use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blockchain::revert::provider_revert_reason;

/// Coarse failure taxonomy used by the session retry policy and by failed reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
    /// Process spawn, startup timeout, port exhaustion, RPC transport
    Infrastructure,
    /// The token or router reverted. This is the signal being measured.
    ContractLogic,
    CandidateNotFound,
    InsufficientLiquidity,
    /// Bad input or configuration; retrying cannot help
    Invalid,
    Timeout,
    Cancelled,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Infrastructure => "infrastructure-error",
            ErrorClass::ContractLogic => "contract-logic-failure",
            ErrorClass::CandidateNotFound => "candidate-not-found",
            ErrorClass::InsufficientLiquidity => "insufficient-liquidity",
            ErrorClass::Invalid => "invalid-input",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to spawn forking node: {0}")]
    SpawnFailed(String),

    #[error("Sandbox startup failed: {0}")]
    SandboxStartupFailed(String),

    #[error("No free sandbox port in range {start}..{end}")]
    PortExhausted { start: u16, end: u16 },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Execution reverted: {0}")]
    Reverted(String),

    #[error("Candidate not found: {0}")]
    CandidateNotFound(String),

    #[error("Insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    #[error("Unsupported pair: {0}")]
    UnsupportedPair(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Session cancelled")]
    Cancelled,

    #[error("ABI error: {0}")]
    AbiError(#[from] ethers::contract::AbiError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AuditError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AuditError::SpawnFailed(_)
            | AuditError::SandboxStartupFailed(_)
            | AuditError::PortExhausted { .. }
            | AuditError::Rpc(_)
            | AuditError::JsonError(_)
            | AuditError::IoError(_) => ErrorClass::Infrastructure,
            AuditError::Reverted(_) => ErrorClass::ContractLogic,
            AuditError::CandidateNotFound(_) => ErrorClass::CandidateNotFound,
            AuditError::InsufficientLiquidity(_) => ErrorClass::InsufficientLiquidity,
            AuditError::InvalidAddress(_)
            | AuditError::Config(_)
            | AuditError::UnsupportedPair(_)
            | AuditError::AbiError(_) => ErrorClass::Invalid,
            AuditError::Timeout(_) => ErrorClass::Timeout,
            AuditError::Cancelled => ErrorClass::Cancelled,
        }
    }

    /// Only infrastructure failures are worth another sandbox.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Infrastructure
    }
}

impl From<ethers::providers::ProviderError> for AuditError {
    fn from(err: ethers::providers::ProviderError) -> Self {
        match provider_revert_reason(&err) {
            Some(reason) => AuditError::Reverted(reason),
            None => AuditError::Rpc(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_errors_are_retryable() {
        assert!(AuditError::SandboxStartupFailed("no answer".into()).is_retryable());
        assert!(AuditError::PortExhausted { start: 1, end: 2 }.is_retryable());
        assert!(AuditError::Rpc("connection refused".into()).is_retryable());
        assert!(AuditError::SpawnFailed("anvil: not found".into()).is_retryable());
    }

    #[test]
    fn test_terminal_errors_are_not_retried() {
        assert!(!AuditError::Reverted("TRANSFER_PAUSED".into()).is_retryable());
        assert!(!AuditError::CandidateNotFound("0x0".into()).is_retryable());
        assert!(!AuditError::InsufficientLiquidity("empty".into()).is_retryable());
        assert!(!AuditError::Timeout("session".into()).is_retryable());
        assert!(!AuditError::Cancelled.is_retryable());
    }

    #[test]
    fn test_provider_errors_split_into_revert_and_transport() {
        use ethers::providers::{HttpClientError, JsonRpcError, ProviderError};

        let revert = ProviderError::from(HttpClientError::JsonRpcError(JsonRpcError {
            code: 3,
            message: "execution reverted: TRANSFER_PAUSED".to_string(),
            data: None,
        }));
        let err = AuditError::from(revert);
        assert!(matches!(&err, AuditError::Reverted(reason) if reason == "TRANSFER_PAUSED"));
        assert_eq!(err.class(), ErrorClass::ContractLogic);
        assert!(!err.is_retryable());

        let transport = ProviderError::CustomError("connection refused".to_string());
        let err = AuditError::from(transport);
        assert!(matches!(err, AuditError::Rpc(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_class_names_are_kebab_case() {
        assert_eq!(ErrorClass::Infrastructure.to_string(), "infrastructure-error");
        let json = serde_json::to_string(&ErrorClass::CandidateNotFound).unwrap();
        assert_eq!(json, "\"candidate-not-found\"");
    }
}
