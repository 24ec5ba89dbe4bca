//! Asset id ⇄ token address mapping.
//!
//! An ERC-20 asset id is the token address widened to 256 bits.

use alloy_primitives::{Address, U256};

/// Map an asset id to its checksummed token address.
///
/// Fails if any of the upper 96 bits are set, since such an id cannot come
/// from an ERC-20 address.
pub fn token_address(asset_id: U256) -> Result<String, String> {
    if asset_id >> 160usize != U256::ZERO {
        return Err(format!("asset id {asset_id} is not an ERC-20 address"));
    }
    let bytes = asset_id.to_be_bytes::<32>();
    Ok(Address::from_slice(&bytes[12..]).to_checksum(None))
}

/// Map a token address (any hex casing) back to its asset id.
pub fn asset_id(token_address: &str) -> Result<U256, String> {
    let address: Address = token_address
        .parse()
        .map_err(|e| format!("invalid token address '{token_address}': {e}"))?;
    Ok(U256::from_be_slice(address.as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

    #[test]
    fn mapping_is_a_bijection() {
        let id = asset_id(USDC).unwrap();
        assert_eq!(token_address(id).unwrap(), USDC);
        assert_eq!(asset_id(&USDC.to_lowercase()).unwrap(), id);
    }

    #[test]
    fn rejects_ids_wider_than_an_address() {
        let id = U256::from(1u8) << 200usize;
        assert!(token_address(id).is_err());
    }

    #[test]
    fn small_ids_map_to_padded_addresses() {
        let addr = token_address(U256::from(1u8)).unwrap();
        assert_eq!(addr.to_lowercase(), "0x0000000000000000000000000000000000000001");
    }
}
