//! Uniswap V2 Router02 interface
//!
//! Swaps go through the fee-on-transfer variants: the plain ones revert on
//! taxed sells, which would hide the tax behind a false "blocked" verdict.
use ethers::contract::BaseContract;
use ethers::types::{Address, Bytes, U256};
use once_cell::sync::Lazy;

use crate::utils::Result;

static IUNISWAP_V2_ROUTER: Lazy<BaseContract> = Lazy::new(|| {
    super::contract(&[
        "function getAmountsOut(uint256 amountIn, address[] path) external view returns (uint256[] amounts)",
        "function swapExactETHForTokensSupportingFeeOnTransferTokens(uint256 amountOutMin, address[] path, address to, uint256 deadline) external payable",
        "function swapExactTokensForETHSupportingFeeOnTransferTokens(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline) external",
    ])
});

pub fn encode_get_amounts_out(amount_in: U256, path: Vec<Address>) -> Result<Bytes> {
    Ok(IUNISWAP_V2_ROUTER.encode("getAmountsOut", (amount_in, path))?)
}

/// Last element of the `amounts` array, i.e. the quoted output.
pub fn decode_amount_out(output: &[u8]) -> Result<Option<U256>> {
    let amounts: Vec<U256> = IUNISWAP_V2_ROUTER.decode_output("getAmountsOut", output)?;
    Ok(amounts.last().copied())
}

pub fn encode_buy(path: Vec<Address>, to: Address) -> Result<Bytes> {
    Ok(IUNISWAP_V2_ROUTER.encode(
        "swapExactETHForTokensSupportingFeeOnTransferTokens",
        (U256::zero(), path, to, U256::MAX),
    )?)
}

pub fn encode_sell(amount_in: U256, path: Vec<Address>, to: Address) -> Result<Bytes> {
    Ok(IUNISWAP_V2_ROUTER.encode(
        "swapExactTokensForETHSupportingFeeOnTransferTokens",
        (amount_in, U256::zero(), path, to, U256::MAX),
    )?)
}

/// Function selectors, for backends that dispatch on calldata.
pub mod selectors {
    use ethers::utils::id;

    pub fn get_amounts_out() -> [u8; 4] {
        id("getAmountsOut(uint256,address[])")
    }

    pub fn buy() -> [u8; 4] {
        id("swapExactETHForTokensSupportingFeeOnTransferTokens(uint256,address[],address,uint256)")
    }

    pub fn sell() -> [u8; 4] {
        id("swapExactTokensForETHSupportingFeeOnTransferTokens(uint256,uint256,address[],address,uint256)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode, Token};

    #[test]
    fn test_calldata_carries_expected_selectors() {
        let path = vec![Address::repeat_byte(1), Address::repeat_byte(2)];
        let buy = encode_buy(path.clone(), Address::repeat_byte(3)).unwrap();
        assert_eq!(&buy[..4], &selectors::buy());

        let sell = encode_sell(U256::from(10u64), path.clone(), Address::repeat_byte(3)).unwrap();
        assert_eq!(&sell[..4], &selectors::sell());

        let quote = encode_get_amounts_out(U256::one(), path).unwrap();
        assert_eq!(&quote[..4], &selectors::get_amounts_out());
    }

    #[test]
    fn test_decode_amount_out_takes_last_hop() {
        let raw = encode(&[Token::Array(vec![
            Token::Uint(U256::from(100u64)),
            Token::Uint(U256::from(950u64)),
        ])]);
        assert_eq!(decode_amount_out(&raw).unwrap(), Some(U256::from(950u64)));
    }
}
