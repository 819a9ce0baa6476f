//! ERC-20 `approve(address,uint256)` call data.
//!
//! Layout: 4-byte selector, then the spender left-padded to one 32-byte
//! word, then the amount as a big-endian 32-byte word.

use crate::config::{ABI_WORD_LENGTH, ERC20_APPROVE_SELECTOR};

/// Address length in bytes.
const ADDRESS_LENGTH: usize = 20;

/// Total length of encoded approve call data.
pub const APPROVE_CALL_DATA_LENGTH: usize = ERC20_APPROVE_SELECTOR.len() + 2 * ABI_WORD_LENGTH;

/// How much allowance to grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApproveAmount {
    /// A specific amount.
    Exact(u128),
    /// `2^256 - 1`.
    Unlimited,
}

/// Parses a `0x`-prefixed 20-byte hex address.
fn parse_address(address: &str) -> Option<[u8; ADDRESS_LENGTH]> {
    let hex_part = address.strip_prefix("0x").or_else(|| address.strip_prefix("0X"))?;
    let bytes = hex::decode(hex_part).ok()?;
    bytes.try_into().ok()
}

/// Encodes `approve(spender, amount)`. `None` if `spender` is not a valid
/// hex address.
pub fn encode_approve(spender: &str, amount: ApproveAmount) -> Option<Vec<u8>> {
    let spender = parse_address(spender)?;

    let mut data = Vec::with_capacity(APPROVE_CALL_DATA_LENGTH);
    data.extend_from_slice(&ERC20_APPROVE_SELECTOR);

    data.extend_from_slice(&[0u8; ABI_WORD_LENGTH - ADDRESS_LENGTH]);
    data.extend_from_slice(&spender);

    match amount {
        ApproveAmount::Exact(value) => {
            data.extend_from_slice(&[0u8; ABI_WORD_LENGTH - 16]);
            data.extend_from_slice(&value.to_be_bytes());
        }
        ApproveAmount::Unlimited => data.extend_from_slice(&[0xff; ABI_WORD_LENGTH]),
    }

    Some(data)
}

/// Decodes approve call data into `(spender, amount)`.
///
/// Amounts that do not fit in `u128` (including unlimited) decode as
/// `u128::MAX`.
pub fn decode_approve(data: &[u8]) -> Option<(String, u128)> {
    if data.len() != APPROVE_CALL_DATA_LENGTH || !data.starts_with(&ERC20_APPROVE_SELECTOR) {
        return None;
    }
    let words = &data[ERC20_APPROVE_SELECTOR.len()..];
    let (spender_word, amount_word) = words.split_at(ABI_WORD_LENGTH);

    if spender_word[..ABI_WORD_LENGTH - ADDRESS_LENGTH].iter().any(|b| *b != 0) {
        return None;
    }
    let spender = format!("0x{}", hex::encode(&spender_word[ABI_WORD_LENGTH - ADDRESS_LENGTH..]));

    let (high, low) = amount_word.split_at(16);
    let amount = if high.iter().any(|b| *b != 0) {
        u128::MAX
    } else {
        let mut low_bytes = [0u8; 16];
        low_bytes.copy_from_slice(low);
        u128::from_be_bytes(low_bytes)
    };

    Some((spender, amount))
}
