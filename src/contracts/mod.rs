//! Uniswap V2 style contract interfaces used by the trade probe
//!
//! Calldata is built from human-readable ABIs through `BaseContract`, so the
//! probe can hand raw transaction requests to any `SandboxRpc` backend.
pub mod erc20;
pub mod pair;
pub mod router;

use ethers::abi::parse_abi;
use ethers::contract::BaseContract;
use ethers::types::Address;

/// Well-known Ethereum mainnet addresses (Chain ID: 1)
pub mod addresses {
    use super::Address;
    use std::str::FromStr;

    /// Uniswap V2 Router02
    pub const UNISWAP_V2_ROUTER: &str = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D";

    /// Wrapped Ether
    pub const WETH: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";

    /// First pre-funded anvil account, used as the simulated trader
    pub const DEFAULT_TRADER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    /// Conventional burn address for renounced ownership
    pub const DEAD: &str = "0x000000000000000000000000000000000000dEaD";

    pub fn uniswap_v2_router() -> Address {
        Address::from_str(UNISWAP_V2_ROUTER).expect("Invalid UNISWAP_V2_ROUTER address")
    }

    pub fn weth() -> Address {
        Address::from_str(WETH).expect("Invalid WETH address")
    }

    pub fn default_trader() -> Address {
        Address::from_str(DEFAULT_TRADER).expect("Invalid DEFAULT_TRADER address")
    }

    pub fn dead() -> Address {
        Address::from_str(DEAD).expect("Invalid DEAD address")
    }
}

pub(crate) fn contract(abi: &[&str]) -> BaseContract {
    BaseContract::from(parse_abi(abi).expect("Invalid human-readable ABI"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_addresses() {
        assert_eq!(
            format!("{:?}", addresses::uniswap_v2_router()),
            "0x7a250d5630b4cf539739df2c5dacb4c659f2488d"
        );
        assert_eq!(
            format!("{:?}", addresses::weth()),
            "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"
        );
        assert_eq!(
            format!("{:?}", addresses::dead()),
            "0x000000000000000000000000000000000000dead"
        );
        assert_ne!(addresses::default_trader(), Address::zero());
    }
}
