//! Token-program variant resolution for mints.
//!
//! A mint is governed by exactly one of two mutually exclusive token
//! programs, fixed at creation. The resolver probes the extended variant
//! first, then the legacy one, and caches the answer for the process
//! lifetime — there is nothing to invalidate.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use crate::codec::decode_mint_decimals;
use crate::error::{LedgerError, Result};
use crate::program::{TOKEN_2022_PROGRAM, TOKEN_PROGRAM};
use crate::pubkey::Pubkey;
use crate::rpc::RpcClient;

/// The two token-program implementations a mint may live under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenProgramVariant {
    /// Token-2022.
    Extended,
    /// The original token program.
    Legacy,
}

impl TokenProgramVariant {
    /// Probe order: extended first, legacy as fallback.
    pub const PROBE_ORDER: [TokenProgramVariant; 2] =
        [TokenProgramVariant::Extended, TokenProgramVariant::Legacy];

    pub fn program_id(&self) -> &'static Pubkey {
        match self {
            TokenProgramVariant::Extended => &TOKEN_2022_PROGRAM,
            TokenProgramVariant::Legacy => &TOKEN_PROGRAM,
        }
    }
}

/// Resolved runtime facts about a mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintRuntime {
    pub variant: TokenProgramVariant,
    pub decimals: u8,
}

/// Resolves and caches `MintRuntime` per mint address.
pub struct MintRuntimeResolver {
    rpc: RpcClient,
    cache: RwLock<HashMap<Pubkey, MintRuntime>>,
}

impl MintRuntimeResolver {
    pub fn new(rpc: RpcClient) -> Self {
        Self {
            rpc,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve the variant and decimals for `mint`.
    ///
    /// Transient RPC failures propagate as `Unavailable` and are never
    /// cached; only a definitive resolution enters the cache.
    pub async fn resolve(&self, mint: &Pubkey) -> Result<MintRuntime> {
        if let Some(hit) = self
            .cache
            .read()
            .expect("mint runtime cache poisoned")
            .get(mint)
            .copied()
        {
            return Ok(hit);
        }

        let account = self
            .rpc
            .get_account(mint)
            .await?
            .ok_or_else(|| LedgerError::MintNotResolved(mint.to_string()))?;

        for variant in TokenProgramVariant::PROBE_ORDER {
            if account.owner != *variant.program_id() {
                continue;
            }
            match decode_mint_decimals(&account.data) {
                Ok(decimals) => {
                    let runtime = MintRuntime { variant, decimals };
                    self.cache
                        .write()
                        .expect("mint runtime cache poisoned")
                        .insert(*mint, runtime);
                    debug!(mint = %mint, ?variant, decimals, "resolved mint runtime");
                    return Ok(runtime);
                }
                Err(err) => {
                    debug!(mint = %mint, ?variant, %err, "mint decode failed under variant");
                }
            }
        }

        Err(LedgerError::MintNotResolved(mint.to_string()))
    }
}
