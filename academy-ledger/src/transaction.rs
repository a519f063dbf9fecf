//! Versioned-transaction assembly and partial signing.
//!
//! The service builds a v0 message with the recipient as fee payer, signs
//! it with its own backend key and the freshly generated asset key, and
//! hands the serialized bytes to the caller; the recipient's signature slot
//! stays zeroed until their wallet countersigns. Broadcast never happens
//! here.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::{Signer, SigningKey};

use crate::error::{LedgerError, Result};
use crate::pubkey::Pubkey;

/// How one account participates in an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// One instruction before compilation.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// An ed25519 keypair in the ledger's address space.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Fresh random keypair, used for each new credential asset.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing: SigningKey::generate(&mut csprng),
        }
    }

    /// Accepts either a bare 32-byte seed or the conventional 64-byte
    /// secret (seed followed by the public key, which must match).
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            32 => {
                let seed: [u8; 32] = bytes.try_into().expect("length checked");
                Ok(Self {
                    signing: SigningKey::from_bytes(&seed),
                })
            }
            64 => {
                let seed: [u8; 32] = bytes[..32].try_into().expect("length checked");
                let signing = SigningKey::from_bytes(&seed);
                if signing.verifying_key().as_bytes() != &bytes[32..] {
                    return Err(LedgerError::InvalidKey(
                        "public half does not match the secret seed".into(),
                    ));
                }
                Ok(Self { signing })
            }
            other => Err(LedgerError::InvalidKey(format!(
                "expected 32 or 64 secret bytes, got {other}"
            ))),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        Pubkey::new(self.signing.verifying_key().to_bytes())
    }

    /// The conventional 64-byte secret form: seed followed by the public
    /// key. This is the keypair-file layout `from_secret_bytes` accepts.
    pub fn to_secret_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(self.signing.as_bytes());
        out[32..].copy_from_slice(self.pubkey().as_bytes());
        out
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indexes: Vec<u8>,
    pub data: Vec<u8>,
}

/// A compiled v0 message: deduplicated account table plus index-compiled
/// instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageV0 {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
}

impl MessageV0 {
    /// Compile instructions against a fee payer. Metas for the same account
    /// merge (signer and writable flags are sticky), the payer is pinned
    /// first, and the remaining accounts group as signer+writable,
    /// signer+readonly, writable, readonly — the order the wire format
    /// derives its header counts from.
    pub fn compile(
        payer: &Pubkey,
        instructions: &[Instruction],
        recent_blockhash: [u8; 32],
    ) -> Result<Self> {
        let mut metas: Vec<AccountMeta> = vec![AccountMeta::writable(*payer, true)];

        let mut merge = |meta: AccountMeta| {
            if let Some(existing) = metas.iter_mut().find(|m| m.pubkey == meta.pubkey) {
                existing.is_signer |= meta.is_signer;
                existing.is_writable |= meta.is_writable;
            } else {
                metas.push(meta);
            }
        };

        for instruction in instructions {
            for meta in &instruction.accounts {
                merge(*meta);
            }
            merge(AccountMeta::readonly(instruction.program_id, false));
        }

        let group = |meta: &AccountMeta| match (meta.is_signer, meta.is_writable) {
            (true, true) => 0u8,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        };

        // Stable sort keeps the payer at the head of group 0 and preserves
        // first-appearance order within each group.
        let mut ordered = metas;
        ordered.sort_by_key(|meta| group(meta));

        if ordered.len() > u8::MAX as usize + 1 {
            return Err(LedgerError::InvalidAddress(format!(
                "too many distinct accounts in one transaction: {}",
                ordered.len()
            )));
        }

        let header = MessageHeader {
            num_required_signatures: ordered.iter().filter(|m| m.is_signer).count() as u8,
            num_readonly_signed: ordered
                .iter()
                .filter(|m| m.is_signer && !m.is_writable)
                .count() as u8,
            num_readonly_unsigned: ordered
                .iter()
                .filter(|m| !m.is_signer && !m.is_writable)
                .count() as u8,
        };

        let account_keys: Vec<Pubkey> = ordered.iter().map(|m| m.pubkey).collect();
        let index_of = |pubkey: &Pubkey| -> u8 {
            account_keys
                .iter()
                .position(|k| k == pubkey)
                .expect("compiled account table contains every referenced key") as u8
        };

        let compiled = instructions
            .iter()
            .map(|instruction| CompiledInstruction {
                program_id_index: index_of(&instruction.program_id),
                account_indexes: instruction
                    .accounts
                    .iter()
                    .map(|meta| index_of(&meta.pubkey))
                    .collect(),
                data: instruction.data.clone(),
            })
            .collect();

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions: compiled,
        })
    }

    /// Wire encoding: version prefix, header, compact account table,
    /// blockhash, compact instructions, empty address-table section.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        out.push(0x80); // version 0
        out.push(self.header.num_required_signatures);
        out.push(self.header.num_readonly_signed);
        out.push(self.header.num_readonly_unsigned);

        append_compact_u16(&mut out, self.account_keys.len() as u16);
        for key in &self.account_keys {
            out.extend_from_slice(key.as_bytes());
        }

        out.extend_from_slice(&self.recent_blockhash);

        append_compact_u16(&mut out, self.instructions.len() as u16);
        for instruction in &self.instructions {
            out.push(instruction.program_id_index);
            append_compact_u16(&mut out, instruction.account_indexes.len() as u16);
            out.extend_from_slice(&instruction.account_indexes);
            append_compact_u16(&mut out, instruction.data.len() as u16);
            out.extend_from_slice(&instruction.data);
        }

        append_compact_u16(&mut out, 0); // address table lookups
        out
    }
}

/// A message plus its signature table. Slots for signers that have not
/// signed yet hold zeroes.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub signatures: Vec<[u8; 64]>,
    pub message: MessageV0,
}

impl Transaction {
    /// Sign with the given keys, leaving every other required slot zeroed
    /// for the counterparty. A key that is not a required signer is a
    /// caller bug and fails loudly.
    pub fn partially_signed(message: MessageV0, signers: &[&Keypair]) -> Result<Self> {
        let required = message.header.num_required_signatures as usize;
        let message_bytes = message.serialize();
        let mut signatures = vec![[0u8; 64]; required];

        for signer in signers {
            let pubkey = signer.pubkey();
            let slot = message.account_keys[..required]
                .iter()
                .position(|key| *key == pubkey)
                .ok_or_else(|| {
                    LedgerError::InvalidKey(format!("{pubkey} is not a required signer"))
                })?;
            signatures[slot] = signer.sign(&message_bytes);
        }

        Ok(Self {
            signatures,
            message,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 * self.signatures.len() + 256);
        append_compact_u16(&mut out, self.signatures.len() as u16);
        for signature in &self.signatures {
            out.extend_from_slice(signature);
        }
        out.extend_from_slice(&self.message.serialize());
        out
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.serialize())
    }
}

/// Shortvec length encoding: 7 bits per byte, high bit marks continuation.
pub fn append_compact_u16(out: &mut Vec<u8>, mut value: u16) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}
