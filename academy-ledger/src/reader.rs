//! High-level ledger reads for the academy program and the XP mint.

use tracing::debug;

use crate::codec::{decode_achievement_type, decode_token_account, AchievementTypeSummary, TokenAccountRecord};
use crate::error::Result;
use crate::program;
use crate::pubkey::Pubkey;
use crate::resolver::TokenProgramVariant;
use crate::rpc::RpcClient;

/// Reads academy accounts and token balances. All failures surface as
/// typed `LedgerError`s; a receipt lookup never converts an RPC failure
/// into "does not exist".
pub struct LedgerReader {
    rpc: RpcClient,
    program_id: Pubkey,
}

impl LedgerReader {
    pub fn new(rpc: RpcClient, program_id: Pubkey) -> Self {
        Self { rpc, program_id }
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    /// Whether the award receipt for `(achievement_id, recipient)` exists.
    /// Existence alone is the idempotency signal.
    pub async fn receipt_exists(&self, achievement_id: &str, recipient: &Pubkey) -> Result<bool> {
        let address =
            program::achievement_receipt_address(achievement_id, recipient, &self.program_id)?;
        Ok(self.rpc.get_account(&address).await?.is_some())
    }

    /// The deployed achievement-type account, or `None` when the
    /// achievement has not been configured on-ledger.
    pub async fn get_achievement_type(
        &self,
        achievement_id: &str,
    ) -> Result<Option<AchievementTypeSummary>> {
        let address = program::achievement_type_address(achievement_id, &self.program_id)?;
        match self.rpc.get_account(&address).await? {
            Some(account) => Ok(Some(decode_achievement_type(&account.data)?)),
            None => Ok(None),
        }
    }

    /// Receipt existence for many achievements in one round trip,
    /// order-preserving.
    pub async fn batch_receipts(
        &self,
        achievement_ids: &[&str],
        recipient: &Pubkey,
    ) -> Result<Vec<bool>> {
        let addresses = achievement_ids
            .iter()
            .map(|id| program::achievement_receipt_address(id, recipient, &self.program_id))
            .collect::<Result<Vec<_>>>()?;
        let accounts = self.rpc.get_multiple_accounts(&addresses).await?;
        Ok(accounts.iter().map(Option::is_some).collect())
    }

    /// Achievement-type accounts for many achievements in one round trip,
    /// order-preserving; absent entries are `None`.
    pub async fn batch_achievement_types(
        &self,
        achievement_ids: &[&str],
    ) -> Result<Vec<Option<AchievementTypeSummary>>> {
        let addresses = achievement_ids
            .iter()
            .map(|id| program::achievement_type_address(id, &self.program_id))
            .collect::<Result<Vec<_>>>()?;
        let accounts = self.rpc.get_multiple_accounts(&addresses).await?;
        accounts
            .iter()
            .map(|entry| match entry {
                Some(account) => decode_achievement_type(&account.data).map(Some),
                None => Ok(None),
            })
            .collect()
    }

    /// Every holder account of `mint` under its token program, found by a
    /// byte-offset match on the mint address at the head of the
    /// token-account layout. Expensive full scan; only the cached
    /// leaderboard aggregator should call this.
    pub async fn scan_holders_of_mint(
        &self,
        mint: &Pubkey,
        variant: TokenProgramVariant,
    ) -> Result<Vec<TokenAccountRecord>> {
        let accounts = self
            .rpc
            .get_program_accounts(variant.program_id(), 0, &mint.to_string())
            .await?;
        let mut records = Vec::with_capacity(accounts.len());
        for (_, account) in accounts {
            records.push(decode_token_account(&account.data)?);
        }
        debug!(mint = %mint, holders = records.len(), "scanned mint holder accounts");
        Ok(records)
    }

    /// A wallet's whole-XP balance for `mint`: raw amounts summed across
    /// its token accounts, then scaled down by the mint's decimals.
    pub async fn xp_balance_of(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
        decimals: u8,
    ) -> Result<u64> {
        let accounts = self.rpc.get_token_accounts_by_owner(owner, mint).await?;
        let mut raw_total: u128 = 0;
        for account in accounts {
            let record = decode_token_account(&account.data)?;
            raw_total = raw_total.saturating_add(record.raw_amount);
        }
        let divisor = 10u128.pow(decimals as u32);
        Ok((raw_total / divisor).min(u64::MAX as u128) as u64)
    }
}
