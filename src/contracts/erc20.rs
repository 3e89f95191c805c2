//! ERC20 token interface
use ethers::contract::BaseContract;
use ethers::types::{Address, Bytes, U256};
use once_cell::sync::Lazy;

use crate::utils::{AuditError, Result};

static IERC20: Lazy<BaseContract> = Lazy::new(|| {
    super::contract(&[
        "function balanceOf(address account) external view returns (uint256)",
        "function approve(address spender, uint256 amount) external returns (bool)",
        "function owner() external view returns (address)",
        "function name() external view returns (string)",
        "function symbol() external view returns (string)",
        "function decimals() external view returns (uint8)",
        "function totalSupply() external view returns (uint256)",
    ])
});

pub fn encode_balance_of(holder: Address) -> Result<Bytes> {
    Ok(IERC20.encode("balanceOf", (holder,))?)
}

pub fn decode_balance_of(output: &[u8]) -> Result<U256> {
    Ok(IERC20.decode_output("balanceOf", output)?)
}

pub fn encode_approve(spender: Address, amount: U256) -> Result<Bytes> {
    Ok(IERC20.encode("approve", (spender, amount))?)
}

pub fn encode_owner() -> Result<Bytes> {
    Ok(IERC20.encode("owner", ())?)
}

pub fn decode_owner(output: &[u8]) -> Result<Address> {
    Ok(IERC20.decode_output("owner", output)?)
}

pub fn encode_name() -> Result<Bytes> {
    Ok(IERC20.encode("name", ())?)
}

pub fn encode_symbol() -> Result<Bytes> {
    Ok(IERC20.encode("symbol", ())?)
}

pub fn encode_decimals() -> Result<Bytes> {
    Ok(IERC20.encode("decimals", ())?)
}

pub fn encode_total_supply() -> Result<Bytes> {
    Ok(IERC20.encode("totalSupply", ())?)
}

/// Decode a `name()` or `symbol()` answer. Older tokens return a
/// null-padded `bytes32` instead of a string.
pub fn decode_text(output: &[u8]) -> Result<String> {
    if output.len() == 32 {
        let end = output.iter().position(|b| *b == 0).unwrap_or(32);
        return String::from_utf8(output[..end].to_vec())
            .map_err(|e| AuditError::Rpc(format!("bytes32 text is not utf-8: {}", e)));
    }
    Ok(IERC20.decode_output("name", output)?)
}

pub fn decode_decimals(output: &[u8]) -> Result<u8> {
    let raw: U256 = IERC20.decode_output("decimals", output)?;
    if raw > U256::from(u8::MAX) {
        return Err(AuditError::Rpc(format!("decimals out of range: {}", raw)));
    }
    Ok(raw.low_u32() as u8)
}

pub fn decode_total_supply(output: &[u8]) -> Result<U256> {
    Ok(IERC20.decode_output("totalSupply", output)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectors() {
        let approve = encode_approve(Address::zero(), U256::MAX).unwrap();
        assert_eq!(&approve[..4], &[0x09, 0x5e, 0xa7, 0xb3]);

        let balance = encode_balance_of(Address::zero()).unwrap();
        assert_eq!(&balance[..4], &[0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(balance.len(), 36);

        assert_eq!(&encode_owner().unwrap()[..], &[0x8d, 0xa5, 0xcb, 0x5b]);
        assert_eq!(&encode_name().unwrap()[..], &[0x06, 0xfd, 0xde, 0x03]);
        assert_eq!(&encode_symbol().unwrap()[..], &[0x95, 0xd8, 0x9b, 0x41]);
        assert_eq!(&encode_decimals().unwrap()[..], &[0x31, 0x3c, 0xe5, 0x67]);
        assert_eq!(&encode_total_supply().unwrap()[..], &[0x18, 0x16, 0x0d, 0xdd]);
    }

    #[test]
    fn test_decode_text_as_string_or_bytes32() {
        let raw = ethers::abi::encode(&[ethers::abi::Token::String("Wrapped Ether".into())]);
        assert_eq!(decode_text(&raw).unwrap(), "Wrapped Ether");

        let mut word = [0u8; 32];
        word[..3].copy_from_slice(b"MKR");
        assert_eq!(decode_text(&word).unwrap(), "MKR");
    }

    #[test]
    fn test_decode_decimals() {
        let raw = ethers::abi::encode(&[ethers::abi::Token::Uint(U256::from(18u64))]);
        assert_eq!(decode_decimals(&raw).unwrap(), 18);

        let raw = ethers::abi::encode(&[ethers::abi::Token::Uint(U256::from(300u64))]);
        assert!(decode_decimals(&raw).is_err());
    }

    #[test]
    fn test_decode_balance() {
        let raw = ethers::abi::encode(&[ethers::abi::Token::Uint(U256::from(950u64))]);
        assert_eq!(decode_balance_of(&raw).unwrap(), U256::from(950u64));
    }
}
