//! The two-phase credential mint workflow.
//!
//! Prepare walks Requested → EligibilityChecked → ReceiptChecked →
//! SupplyChecked → PreparedUnsigned and hands back a partially signed
//! transaction; the recipient's wallet countersigns and broadcasts outside
//! this service. No in-process lock guards the walk: when two concurrent
//! prepares race past the receipt check, the ledger's atomic account
//! creation lets at most one broadcast win, and the loser's failure maps
//! back to `AlreadyMinted`.

use std::sync::Arc;

use tracing::{info, warn};

use academy_common::{evaluate, AchievementDefinition, LearnerStats};
use academy_ledger::{
    derive_associated_token_address, program, AccountMeta, Instruction, Keypair, LedgerReader,
    MessageV0, MintRuntimeResolver, Pubkey, Result, Transaction,
};

use crate::mirror::MirrorStore;
use crate::progress::ProgressStore;

/// Instruction discriminator for the program's award instruction.
const AWARD_ACHIEVEMENT_DISCRIMINATOR: [u8; 8] = [75, 47, 156, 253, 124, 231, 84, 12];
/// Create-idempotent discriminator of the associated-token program.
const CREATE_ATA_IDEMPOTENT: u8 = 1;

/// Terminal outcome of a prepare call. These are typed results, not
/// errors: callers render each one distinctly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintOutcome {
    /// The partially signed transaction, base64, plus the new asset's
    /// address. Requires the recipient's signature to become valid.
    Prepared {
        transaction: String,
        asset_address: String,
    },
    NotEligible { reason: String },
    AlreadyMinted,
    SoldOut,
    NotDeployed,
}

/// Drives the prepare/confirm protocol.
pub struct MintOrchestrator {
    reader: Arc<LedgerReader>,
    resolver: Arc<MintRuntimeResolver>,
    signer: Keypair,
    xp_mint: Pubkey,
}

impl MintOrchestrator {
    pub fn new(
        reader: Arc<LedgerReader>,
        resolver: Arc<MintRuntimeResolver>,
        signer: Keypair,
        xp_mint: Pubkey,
    ) -> Self {
        Self {
            reader,
            resolver,
            signer,
            xp_mint,
        }
    }

    /// Build the unsigned award transaction, or short-circuit with a
    /// typed outcome. Ledger failures abort with `Unavailable` rather than
    /// being read as "no receipt".
    pub async fn prepare(
        &self,
        user_id: &str,
        wallet: &Pubkey,
        def: &AchievementDefinition,
        stats: &LearnerStats,
        mirror: &MirrorStore,
    ) -> Result<MintOutcome> {
        // Requested -> EligibilityChecked: always re-evaluated server-side.
        let eligibility = evaluate(stats, def);
        if !eligibility.eligible {
            return Ok(MintOutcome::NotEligible {
                reason: eligibility
                    .reason
                    .unwrap_or_else(|| "Not eligible for this achievement".to_string()),
            });
        }

        // EligibilityChecked -> ReceiptChecked: receipt existence is the
        // idempotency guard.
        if self.reader.receipt_exists(def.id, wallet).await? {
            if let Err(err) = mirror.sync_if_missing(user_id, def.id) {
                warn!(user = user_id, achievement = def.id, %err, "mirror sync after receipt hit failed");
            }
            return Ok(MintOutcome::AlreadyMinted);
        }

        // ReceiptChecked -> SupplyChecked.
        let Some(achievement) = self.reader.get_achievement_type(def.id).await? else {
            return Ok(MintOutcome::NotDeployed);
        };
        if achievement.sold_out() {
            return Ok(MintOutcome::SoldOut);
        }

        // SupplyChecked -> PreparedUnsigned.
        let runtime = self.resolver.resolve(&self.xp_mint).await?;
        let program_id = *self.reader.program_id();
        let config = program::config_address(&program_id)?;
        let achievement_type = program::achievement_type_address(def.id, &program_id)?;
        let receipt = program::achievement_receipt_address(def.id, wallet, &program_id)?;
        let minter_role = program::minter_role_address(&self.signer.pubkey(), &program_id)?;
        let recipient_token_account =
            derive_associated_token_address(wallet, runtime.variant.program_id(), &self.xp_mint)?;

        let asset = Keypair::generate();

        let create_ata = Instruction {
            program_id: *program::ASSOCIATED_TOKEN_PROGRAM,
            accounts: vec![
                AccountMeta::writable(*wallet, true),
                AccountMeta::writable(recipient_token_account, false),
                AccountMeta::readonly(*wallet, false),
                AccountMeta::readonly(self.xp_mint, false),
                AccountMeta::readonly(*program::SYSTEM_PROGRAM, false),
                AccountMeta::readonly(*runtime.variant.program_id(), false),
            ],
            data: vec![CREATE_ATA_IDEMPOTENT],
        };

        let award = Instruction {
            program_id,
            accounts: vec![
                AccountMeta::readonly(config, false),
                AccountMeta::writable(achievement_type, false),
                AccountMeta::writable(receipt, false),
                AccountMeta::writable(minter_role, false),
                AccountMeta::writable(asset.pubkey(), true),
                AccountMeta::writable(achievement.collection, false),
                AccountMeta::readonly(*wallet, false),
                AccountMeta::writable(recipient_token_account, false),
                AccountMeta::writable(self.xp_mint, false),
                AccountMeta::writable(*wallet, true),
                AccountMeta::readonly(self.signer.pubkey(), true),
                AccountMeta::readonly(*program::MPL_CORE_PROGRAM, false),
                AccountMeta::readonly(*runtime.variant.program_id(), false),
                AccountMeta::readonly(*program::SYSTEM_PROGRAM, false),
            ],
            data: AWARD_ACHIEVEMENT_DISCRIMINATOR.to_vec(),
        };

        let blockhash = self.reader.rpc().get_latest_blockhash().await?;
        let message = MessageV0::compile(wallet, &[create_ata, award], blockhash)?;
        let transaction = Transaction::partially_signed(message, &[&self.signer, &asset])?;

        info!(
            user = user_id,
            achievement = def.id,
            asset = %asset.pubkey(),
            "prepared credential mint transaction"
        );

        Ok(MintOutcome::Prepared {
            transaction: transaction.to_base64(),
            asset_address: asset.pubkey().to_string(),
        })
    }

    /// Persist a confirmed mint into the mirror and touch streak
    /// bookkeeping. Confirmations without a prior prepare are accepted:
    /// the mirror is eventually consistent, not authoritative.
    pub fn confirm(
        &self,
        user_id: &str,
        achievement_id: &str,
        asset_address: &str,
        mirror: &MirrorStore,
        progress: &ProgressStore,
        today: i64,
    ) -> std::result::Result<(), String> {
        mirror.upsert_confirmed(user_id, achievement_id, asset_address)?;
        progress.record_activity(user_id, today)?;
        info!(user = user_id, achievement = achievement_id, "mint confirmed");
        Ok(())
    }
}

/// Map a broadcast failure reported by the signing boundary onto a typed
/// outcome. Duplicate account creation is the expected loser's end of a
/// benign race between two prepares for the same pair.
pub fn classify_broadcast_error(message: &str) -> Option<MintOutcome> {
    if message.contains("AchievementAlreadyAwarded") || message.contains("already in use") {
        Some(MintOutcome::AlreadyMinted)
    } else if message.contains("MaxSupplyReached") {
        Some(MintOutcome::SoldOut)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_error_classification() {
        assert_eq!(
            classify_broadcast_error("Allocate: account Address { .. } already in use"),
            Some(MintOutcome::AlreadyMinted)
        );
        assert_eq!(
            classify_broadcast_error("custom program error: AchievementAlreadyAwarded"),
            Some(MintOutcome::AlreadyMinted)
        );
        assert_eq!(
            classify_broadcast_error("custom program error: MaxSupplyReached"),
            Some(MintOutcome::SoldOut)
        );
        assert_eq!(classify_broadcast_error("blockhash not found"), None);
    }
}
