//! Ledger wire formats, RPC access, and transaction assembly.
//!
//! This crate is the service's only road to the ledger: it decodes raw
//! account bytes without a high-level SDK, resolves which token-program
//! variant governs a mint, reads academy accounts individually and in
//! batches, scans the full holder set of a mint, and assembles the
//! partially signed award transaction a recipient countersigns. Broadcast
//! is deliberately out of scope.

pub mod codec;
pub mod cursor;
pub mod error;
pub mod program;
pub mod pubkey;
pub mod reader;
pub mod resolver;
pub mod rpc;
pub mod transaction;

pub use codec::{
    decode_achievement_type, decode_le_amount, decode_mint_decimals, decode_token_account,
    AchievementTypeSummary, TokenAccountRecord,
};
pub use cursor::AccountCursor;
pub use error::{LedgerError, Result};
pub use pubkey::{derive_associated_token_address, find_program_address, Pubkey};
pub use reader::LedgerReader;
pub use resolver::{MintRuntime, MintRuntimeResolver, TokenProgramVariant};
pub use rpc::{AccountData, HttpTransport, RpcClient, RpcTransport};
pub use transaction::{
    AccountMeta, CompiledInstruction, Instruction, Keypair, MessageHeader, MessageV0, Transaction,
};
