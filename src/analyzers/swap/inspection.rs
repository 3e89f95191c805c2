//! Read-only token inspection: metadata, ownership and privileged functions

use std::time::Duration;

use ethers::types::{Address, Bytes, TransactionRequest};
use ethers::utils::id;

use crate::contracts::{addresses, erc20};
use crate::core::traits::SandboxRpc;
use crate::models::{TokenMetadata, TokenTraits};
use crate::utils::Result;

const PUSH4: u8 = 0x63;

fn mint_selectors() -> Vec<[u8; 4]> {
    vec![id("mint(address,uint256)")]
}

fn pause_selectors() -> Vec<[u8; 4]> {
    vec![id("pause()"), id("unpause()")]
}

// Common spellings, not just the canonical one
fn blacklist_selectors() -> Vec<[u8; 4]> {
    vec![
        id("blacklist(address)"),
        id("addBlackList(address)"),
        id("addToBlacklist(address)"),
        id("isBlacklisted(address)"),
        id("setBlacklist(address,bool)"),
    ]
}

/// Whether the dispatcher pushes any of `selectors` as a PUSH4 immediate.
pub fn dispatches_any(code: &[u8], selectors: &[[u8; 4]]) -> bool {
    code.windows(5)
        .any(|w| w[0] == PUSH4 && selectors.iter().any(|s| w[1..] == s[..]))
}

pub fn is_renounced(owner: Address) -> bool {
    owner == Address::zero() || owner == addresses::dead()
}

/// Never fails: anything unreadable is left unknown.
pub async fn inspect_token(rpc: &dyn SandboxRpc, token: Address, budget: Duration) -> TokenTraits {
    let mut traits = TokenTraits::default();

    match tokio::time::timeout(budget, rpc.code_at(token)).await {
        Ok(Ok(code)) => {
            traits.has_mint = dispatches_any(&code, &mint_selectors());
            traits.has_pause = dispatches_any(&code, &pause_selectors());
            traits.has_blacklist = dispatches_any(&code, &blacklist_selectors());
        }
        Ok(Err(e)) => tracing::debug!("Token code unreadable: {}", e),
        Err(_) => tracing::debug!("Token code read timed out"),
    }

    if let Some(owner) = view(rpc, token, budget, "owner", erc20::encode_owner(), erc20::decode_owner).await {
        traits.owner = Some(owner);
        traits.ownership_renounced = Some(is_renounced(owner));
    }

    traits.metadata = read_metadata(rpc, token, budget).await;

    if traits.has_mint {
        tracing::info!("📍 Found mint() function");
    }
    if traits.has_pause {
        tracing::info!("📍 Found pause/unpause() functions");
    }
    if traits.has_blacklist {
        tracing::info!("📍 Found blacklist functionality");
    }
    if let (Some(symbol), Some(decimals)) = (&traits.metadata.symbol, traits.metadata.decimals) {
        tracing::info!("🪙 {} with {} decimals", symbol, decimals);
    }
    match traits.ownership_renounced {
        Some(true) => tracing::info!("✅ Owner is renounced: {:?}", traits.owner),
        Some(false) => tracing::warn!("⚠️  Owner is active: {:?}", traits.owner),
        None => {}
    }

    traits
}

/// Name, symbol, decimals and supply, each read on its own so one missing
/// getter does not hide the rest.
pub async fn read_metadata(rpc: &dyn SandboxRpc, token: Address, budget: Duration) -> TokenMetadata {
    TokenMetadata {
        name: view(rpc, token, budget, "name", erc20::encode_name(), erc20::decode_text).await,
        symbol: view(rpc, token, budget, "symbol", erc20::encode_symbol(), erc20::decode_text).await,
        decimals: view(rpc, token, budget, "decimals", erc20::encode_decimals(), erc20::decode_decimals).await,
        total_supply: view(rpc, token, budget, "totalSupply", erc20::encode_total_supply(), erc20::decode_total_supply)
            .await,
    }
}

/// One view call on the token under `budget`; any failure is `None`.
async fn view<T>(
    rpc: &dyn SandboxRpc,
    token: Address,
    budget: Duration,
    getter: &str,
    data: Result<Bytes>,
    decode: fn(&[u8]) -> Result<T>,
) -> Option<T> {
    let request = TransactionRequest::new().to(token).data(data.ok()?);

    match tokio::time::timeout(budget, rpc.call(&request)).await {
        Ok(Ok(output)) => match decode(&output) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!("{}() returned undecodable data: {}", getter, e);
                None
            }
        },
        Ok(Err(e)) => {
            tracing::debug!("{}() not callable: {}", getter, e);
            None
        }
        Err(_) => {
            tracing::debug!("{}() timed out", getter);
            None
        }
    }
}
