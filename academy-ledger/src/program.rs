//! Well-known program ids and the academy program's deterministic addresses.

use once_cell::sync::Lazy;

use crate::error::Result;
use crate::pubkey::{find_program_address, Pubkey};

fn known(address: &str) -> Pubkey {
    address.parse().expect("well-known program id is valid base58")
}

pub static SYSTEM_PROGRAM: Lazy<Pubkey> =
    Lazy::new(|| known("11111111111111111111111111111111"));

/// Legacy token program.
pub static TOKEN_PROGRAM: Lazy<Pubkey> =
    Lazy::new(|| known("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"));

/// Extended (Token-2022) token program.
pub static TOKEN_2022_PROGRAM: Lazy<Pubkey> =
    Lazy::new(|| known("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb"));

pub static ASSOCIATED_TOKEN_PROGRAM: Lazy<Pubkey> =
    Lazy::new(|| known("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL"));

/// Metaplex Core, which owns the credential assets.
pub static MPL_CORE_PROGRAM: Lazy<Pubkey> =
    Lazy::new(|| known("CoREENxT6tW1HoK8ypY1SxRMZTcVPm7R94rH4PZNhX7d"));

/// Default academy program id; overridable through configuration.
pub const DEFAULT_ACADEMY_PROGRAM: &str = "Acad111111111111111111111111111111111111111";

/// Global config account: `["config"]`.
pub fn config_address(program_id: &Pubkey) -> Result<Pubkey> {
    Ok(find_program_address(&[b"config"], program_id)?.0)
}

/// Achievement-type account: `["achievement", id]`.
pub fn achievement_type_address(achievement_id: &str, program_id: &Pubkey) -> Result<Pubkey> {
    Ok(find_program_address(&[b"achievement", achievement_id.as_bytes()], program_id)?.0)
}

/// Award receipt: `["achievement_receipt", id, recipient]`. Existence of
/// this account is the sole idempotency guard for an award.
pub fn achievement_receipt_address(
    achievement_id: &str,
    recipient: &Pubkey,
    program_id: &Pubkey,
) -> Result<Pubkey> {
    Ok(find_program_address(
        &[
            b"achievement_receipt",
            achievement_id.as_bytes(),
            recipient.as_bytes(),
        ],
        program_id,
    )?
    .0)
}

/// Minter-role account: `["minter", minter]`.
pub fn minter_role_address(minter: &Pubkey, program_id: &Pubkey) -> Result<Pubkey> {
    Ok(find_program_address(&[b"minter", minter.as_bytes()], program_id)?.0)
}
