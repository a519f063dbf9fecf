//! 32-byte ledger addresses and program-derived address search.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::VerifyingKey;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{LedgerError, Result};

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// A 32-byte account address, rendered as base58 text.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey([u8; 32]);

impl Pubkey {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| LedgerError::InvalidAddress(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    /// Whether these bytes decompress to a valid ed25519 point. Addresses
    /// derived off-curve (PDAs) have no corresponding private key.
    pub fn is_on_curve(&self) -> bool {
        VerifyingKey::from_bytes(&self.0).is_ok()
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({self})")
    }
}

impl FromStr for Pubkey {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self> {
        let bytes = bs58::decode(value)
            .into_vec()
            .map_err(|err| LedgerError::InvalidAddress(format!("{value}: {err}")))?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for Pubkey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Pubkey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

/// Find the first bump (descending from 255) whose derived hash falls off
/// the ed25519 curve, making it a valid program-derived address.
pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<(Pubkey, u8)> {
    for bump in (0..=255u8).rev() {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update([bump]);
        hasher.update(program_id.as_bytes());
        hasher.update(PDA_MARKER);
        let candidate = Pubkey::new(hasher.finalize().into());
        if !candidate.is_on_curve() {
            return Ok((candidate, bump));
        }
    }
    Err(LedgerError::NoViableBump)
}

/// The deterministic associated-token-account address for an owner, token
/// program variant, and mint.
pub fn derive_associated_token_address(
    owner: &Pubkey,
    token_program: &Pubkey,
    mint: &Pubkey,
) -> Result<Pubkey> {
    let (address, _) = find_program_address(
        &[
            owner.as_bytes(),
            token_program.as_bytes(),
            mint.as_bytes(),
        ],
        &crate::program::ASSOCIATED_TOKEN_PROGRAM,
    )?;
    Ok(address)
}
