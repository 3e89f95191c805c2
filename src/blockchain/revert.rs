//! Revert reason extraction from forking-node errors
//!
//! Nodes report reverts in two shapes: a JSON-RPC error whose `data` carries
//! the raw revert payload, or a message of the form
//! `execution reverted: REASON`. Anything else is a transport problem.

use ethers::abi::{decode, ParamType, Token};
use ethers::providers::{ProviderError, RpcError};

/// `Error(string)`
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// `Panic(uint256)`
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

const MAX_REASON_LEN: usize = 200;

/// Returns the revert reason if `err` is a revert, `None` for transport errors.
pub fn provider_revert_reason(err: &ProviderError) -> Option<String> {
    if let Some(response) = err.as_error_response() {
        let from_data = response
            .data
            .as_ref()
            .and_then(|d| d.as_str())
            .and_then(|s| hex::decode(s.trim_start_matches("0x")).ok())
            .filter(|bytes| !bytes.is_empty())
            .map(|bytes| decode_revert_data(&bytes));

        if let Some(reason) = from_data {
            return Some(reason);
        }

        // EIP-1474 code 3 is "execution reverted"
        if response.code == 3 || response.message.to_lowercase().contains("revert") {
            return Some(reason_from_message(&response.message));
        }

        return None;
    }

    let text = err.to_string();
    if text.to_lowercase().contains("execution reverted") {
        return Some(reason_from_message(&text));
    }

    None
}

/// Decode an ABI revert payload into something readable.
pub fn decode_revert_data(output: &[u8]) -> String {
    if output.len() < 4 {
        return "no reason".to_string();
    }

    let (selector, body) = output.split_at(4);

    if selector == ERROR_STRING_SELECTOR {
        if let Ok(tokens) = decode(&[ParamType::String], body) {
            if let Some(Token::String(msg)) = tokens.into_iter().next() {
                return truncate(msg.trim_end_matches('\0'));
            }
        }
    }

    if selector == PANIC_SELECTOR {
        if let Ok(tokens) = decode(&[ParamType::Uint(256)], body) {
            if let Some(Token::Uint(code)) = tokens.into_iter().next() {
                return format!("panic code {:#x}", code);
            }
        }
    }

    format!("custom error 0x{}", hex::encode(selector))
}

/// Pull the reason out of `... execution reverted: REASON ...`.
pub fn reason_from_message(message: &str) -> String {
    // ASCII lowering keeps byte offsets valid for slicing `message`
    let lower = message.to_ascii_lowercase();
    let Some(start) = lower.find("reverted") else {
        return truncate(message.trim());
    };

    let after = &message[start + "reverted".len()..];
    match after.find(':') {
        Some(colon) => {
            let reason = after[colon + 1..]
                .trim()
                .trim_matches('"')
                .trim_matches('\'')
                .trim();
            if reason.is_empty() {
                "execution reverted (no reason)".to_string()
            } else {
                truncate(reason)
            }
        }
        None => "execution reverted (no reason)".to_string(),
    }
}

/// Router reverts that point at an empty or drained pool rather than token logic.
pub fn is_liquidity_revert(reason: &str) -> bool {
    let upper = reason.to_uppercase();
    upper.contains("INSUFFICIENT_LIQUIDITY") || upper.contains("INSUFFICIENT_OUTPUT_AMOUNT")
}

fn truncate(s: &str) -> String {
    s.chars().take(MAX_REASON_LEN).collect()
}
