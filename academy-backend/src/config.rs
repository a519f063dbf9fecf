//! Service configuration.

use std::collections::HashMap;
use std::env;

use anyhow::{Context, Result};

use academy_ledger::{program, Keypair, Pubkey};

pub const RPC_URL_ENV: &str = "ACADEMY_RPC_URL";
pub const PROGRAM_ID_ENV: &str = "ACADEMY_PROGRAM_ID";
pub const XP_MINT_ENV: &str = "ACADEMY_XP_MINT";
pub const SIGNER_KEY_ENV: &str = "ACADEMY_SIGNER_KEY";
pub const ALIASES_ENV: &str = "ACADEMY_LEADERBOARD_ALIASES";
pub const STATIC_WALLETS_ENV: &str = "ACADEMY_LEADERBOARD_WALLETS";
pub const MIRROR_DB_ENV: &str = "ACADEMY_MIRROR_DB";
pub const BIND_ADDR_ENV: &str = "ACADEMY_BIND_ADDR";

const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";
const DEFAULT_XP_MINT: &str = "5S5pSBFe968KdjAaG5yUXX1detFrE9vR4RGvT7JqRGjd";
const DEFAULT_MIRROR_DB_PATH: &str = "data/mirror.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Everything the service needs from its environment.
#[derive(Clone)]
pub struct BackendConfig {
    /// Ledger JSON-RPC endpoint.
    pub rpc_url: String,
    /// The academy program that owns achievement accounts.
    pub program_id: Pubkey,
    /// The XP token mint backing the leaderboard.
    pub xp_mint: Pubkey,
    /// The service's minter key; co-signs every award transaction.
    pub backend_signer: Keypair,
    /// wallet -> display name overrides for the leaderboard.
    pub aliases: HashMap<String, String>,
    /// Fallback holder list for environments where full-mint scans are
    /// unavailable.
    pub static_holder_wallets: Vec<Pubkey>,
    /// Mirror database path; `None` keeps everything in memory.
    pub mirror_db_path: Option<String>,
    pub bind_addr: String,
}

impl BackendConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let rpc_url = env::var(RPC_URL_ENV).unwrap_or_else(|_| DEFAULT_RPC_URL.to_string());

        let program_id = env::var(PROGRAM_ID_ENV)
            .unwrap_or_else(|_| program::DEFAULT_ACADEMY_PROGRAM.to_string())
            .parse()
            .context("invalid academy program id")?;

        let xp_mint = env::var(XP_MINT_ENV)
            .unwrap_or_else(|_| DEFAULT_XP_MINT.to_string())
            .parse()
            .context("invalid XP mint address")?;

        let signer_json =
            env::var(SIGNER_KEY_ENV).with_context(|| format!("{SIGNER_KEY_ENV} must be set"))?;
        let backend_signer = parse_signer_key(&signer_json)?;

        let aliases = parse_aliases(&env::var(ALIASES_ENV).unwrap_or_default());

        let static_holder_wallets = env::var(STATIC_WALLETS_ENV)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| item.parse().context("invalid static holder wallet"))
            .collect::<Result<Vec<_>>>()?;

        let mirror_db_path = Some(
            env::var(MIRROR_DB_ENV).unwrap_or_else(|_| DEFAULT_MIRROR_DB_PATH.to_string()),
        );

        let bind_addr = env::var(BIND_ADDR_ENV).unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        Ok(Self {
            rpc_url,
            program_id,
            xp_mint,
            backend_signer,
            aliases,
            static_holder_wallets,
            mirror_db_path,
            bind_addr,
        })
    }
}

/// The signer key is a JSON byte array (64 bytes: seed then public key),
/// the conventional ledger keypair-file format.
pub fn parse_signer_key(json: &str) -> Result<Keypair> {
    let bytes: Vec<u8> = serde_json::from_str(json).context("signer key is not a JSON byte array")?;
    Keypair::from_secret_bytes(&bytes).context("signer key bytes are invalid")
}

/// `wallet:alias,wallet:alias` pairs; malformed items are dropped.
pub fn parse_aliases(raw: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let mut parts = entry.splitn(2, ':').map(str::trim);
        if let (Some(wallet), Some(alias)) = (parts.next(), parts.next()) {
            if !wallet.is_empty() && !alias.is_empty() {
                map.insert(wallet.to_string(), alias.to_string());
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_table_parses_pairs_and_drops_garbage() {
        let map = parse_aliases("abc:Alice, def:Bob ,broken,:missing,empty:");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("abc").map(String::as_str), Some("Alice"));
        assert_eq!(map.get("def").map(String::as_str), Some("Bob"));
    }

    #[test]
    fn signer_key_round_trips_through_json() {
        let keypair = Keypair::generate();
        let json = serde_json::to_string(&keypair.to_secret_bytes().to_vec()).unwrap();
        let parsed = parse_signer_key(&json).unwrap();
        assert_eq!(parsed.pubkey(), keypair.pubkey());
    }

    #[test]
    fn signer_key_rejects_non_array_json() {
        assert!(parse_signer_key("\"not an array\"").is_err());
        assert!(parse_signer_key("[1,2,3]").is_err());
    }
}
