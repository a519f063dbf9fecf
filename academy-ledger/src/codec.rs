//! Decoders for the on-ledger account layouts this service reads.

use crate::cursor::AccountCursor;
use crate::error::{LedgerError, Result};
use crate::pubkey::Pubkey;

/// The fixed-width tail of an achievement-type account. The full account
/// also carries id/name/uri strings, reward and housekeeping fields; this
/// service only needs the collection wiring and supply counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AchievementTypeSummary {
    pub collection: Pubkey,
    pub creator: Pubkey,
    pub max_supply: u32,
    pub minted_count: u32,
}

impl AchievementTypeSummary {
    /// `max_supply == 0` means unlimited.
    pub fn sold_out(&self) -> bool {
        self.max_supply > 0 && self.minted_count >= self.max_supply
    }
}

/// Decode an achievement-type account.
///
/// The three leading strings (id, name, metadata uri) have data-dependent
/// lengths, so the tail offset is computed by walking their 4-byte
/// little-endian length prefixes rather than declared.
pub fn decode_achievement_type(data: &[u8]) -> Result<AchievementTypeSummary> {
    let mut cursor = AccountCursor::new(data);
    cursor.skip(8)?; // account discriminator
    cursor.skip_length_prefixed()?; // achievement id
    cursor.skip_length_prefixed()?; // name
    cursor.skip_length_prefixed()?; // metadata uri

    let collection = cursor.read_pubkey()?;
    let creator = cursor.read_pubkey()?;
    let max_supply = cursor.read_u32_le()?;
    let minted_count = cursor.read_u32_le()?;

    Ok(AchievementTypeSummary {
        collection,
        creator,
        max_supply,
        minted_count,
    })
}

/// One holder account of some mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccountRecord {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub raw_amount: u128,
}

/// Decode the token-account base layout: mint, owner, then a 64-bit
/// little-endian amount. Token-2022 accounts append extensions past the
/// base layout; those bytes are ignored here.
pub fn decode_token_account(data: &[u8]) -> Result<TokenAccountRecord> {
    let mut cursor = AccountCursor::new(data);
    let mint = cursor.read_pubkey()?;
    let owner = cursor.read_pubkey()?;
    let amount_bytes = cursor.read_fixed_bytes(8)?;
    Ok(TokenAccountRecord {
        mint,
        owner,
        raw_amount: decode_le_amount(amount_bytes)?,
    })
}

/// Sum an arbitrary-width little-endian byte sequence by positional
/// byte-shift. Widths beyond 128 bits with significant bytes are rejected.
pub fn decode_le_amount(bytes: &[u8]) -> Result<u128> {
    let mut value = 0u128;
    for (index, byte) in bytes.iter().enumerate() {
        if index >= 16 {
            if *byte != 0 {
                return Err(LedgerError::MalformedAccount(
                    "token amount wider than 128 bits".into(),
                ));
            }
            continue;
        }
        value |= (*byte as u128) << (8 * index as u32);
    }
    Ok(value)
}

/// Decimal precision from a mint account: a 36-byte optional authority and
/// the 64-bit supply precede the decimals byte.
pub fn decode_mint_decimals(data: &[u8]) -> Result<u8> {
    let mut cursor = AccountCursor::new(data);
    cursor.skip(36)?; // COption<Pubkey> mint authority
    cursor.skip(8)?; // supply
    cursor.read_u8()
}
