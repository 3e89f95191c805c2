//! Uniswap V2 pair interface
use ethers::contract::BaseContract;
use ethers::types::{Address, Bytes, U256};
use once_cell::sync::Lazy;

use crate::utils::Result;

static IUNISWAP_V2_PAIR: Lazy<BaseContract> = Lazy::new(|| {
    super::contract(&[
        "function token0() external view returns (address)",
        "function token1() external view returns (address)",
        "function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast)",
    ])
});

pub fn encode_token0() -> Result<Bytes> {
    Ok(IUNISWAP_V2_PAIR.encode("token0", ())?)
}

pub fn encode_token1() -> Result<Bytes> {
    Ok(IUNISWAP_V2_PAIR.encode("token1", ())?)
}

pub fn decode_token(name: &str, output: &[u8]) -> Result<Address> {
    Ok(IUNISWAP_V2_PAIR.decode_output(name, output)?)
}

pub fn encode_get_reserves() -> Result<Bytes> {
    Ok(IUNISWAP_V2_PAIR.encode("getReserves", ())?)
}

/// Returns `(reserve0, reserve1)`.
pub fn decode_get_reserves(output: &[u8]) -> Result<(U256, U256)> {
    let (reserve0, reserve1, _timestamp): (U256, U256, U256) =
        IUNISWAP_V2_PAIR.decode_output("getReserves", output)?;
    Ok((reserve0, reserve1))
}
