use std::str::FromStr;

use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::utils::{AuditError, Result};

/// A newly discovered pair awaiting evaluation.
///
/// Reports complete out of discovery order, so this is the correlation key
/// consumers should match on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(alias = "pairAddress")]
    pub pair_address: Address,
    #[serde(alias = "tokenAddress")]
    pub token_address: Address,
    #[serde(alias = "discoveryBlockHeight", alias = "discovery_block_height")]
    pub discovery_block: u64,
}

impl Candidate {
    pub fn new(pair_address: Address, token_address: Address, discovery_block: u64) -> Self {
        Self {
            pair_address,
            token_address,
            discovery_block,
        }
    }

    /// Build from hex strings, as they arrive from a discovery feed.
    pub fn parse(pair: &str, token: &str, discovery_block: u64) -> Result<Self> {
        let pair_address = Address::from_str(pair.trim())
            .map_err(|_| AuditError::InvalidAddress(pair.to_string()))?;
        let token_address = Address::from_str(token.trim())
            .map_err(|_| AuditError::InvalidAddress(token.to_string()))?;
        Ok(Self::new(pair_address, token_address, discovery_block))
    }
}

impl std::fmt::Display for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "token {:?} (pair {:?}, block {})",
            self.token_address, self.pair_address, self.discovery_block
        )
    }
}
