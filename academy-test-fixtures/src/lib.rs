//! Test fixtures: an in-process fake ledger plus account-data builders.
//!
//! `FakeLedger` implements the RPC transport over a programmable account
//! map, emulating the five JSON-RPC methods the service uses. Every call is
//! logged by method name so tests can assert round-trip counts, and any
//! method can be toggled into failure to exercise degrade policies.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};

use academy_ledger::{LedgerError, Pubkey, RpcTransport};

const DEFAULT_BLOCKHASH_BYTE: u8 = 0x42;

#[derive(Clone)]
struct FakeAccount {
    owner: String,
    data: Vec<u8>,
}

/// A programmable stand-in for the remote ledger RPC endpoint.
pub struct FakeLedger {
    accounts: Mutex<HashMap<String, FakeAccount>>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl Default for FakeLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeLedger {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Create or replace an account.
    pub fn set_account(&self, address: &str, owner: &str, data: Vec<u8>) {
        self.accounts.lock().expect("accounts poisoned").insert(
            address.to_string(),
            FakeAccount {
                owner: owner.to_string(),
                data,
            },
        );
    }

    pub fn remove_account(&self, address: &str) {
        self.accounts
            .lock()
            .expect("accounts poisoned")
            .remove(address);
    }

    pub fn has_account(&self, address: &str) -> bool {
        self.accounts
            .lock()
            .expect("accounts poisoned")
            .contains_key(address)
    }

    /// Toggle failure injection for one RPC method.
    pub fn set_fail(&self, method: &str, fail: bool) {
        let mut failing = self.failing.lock().expect("failing poisoned");
        if fail {
            failing.insert(method.to_string());
        } else {
            failing.remove(method);
        }
    }

    /// How many times a method has been called.
    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .expect("calls poisoned")
            .iter()
            .filter(|m| m.as_str() == method)
            .count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls poisoned").clone()
    }

    fn account_json(account: &FakeAccount) -> Value {
        json!({
            "data": [BASE64.encode(&account.data), "base64"],
            "owner": account.owner,
            "lamports": 1_000_000u64,
            "executable": false,
            "rentEpoch": 0u64,
        })
    }

    fn lookup(&self, address: &str) -> Value {
        match self
            .accounts
            .lock()
            .expect("accounts poisoned")
            .get(address)
        {
            Some(account) => Self::account_json(account),
            None => Value::Null,
        }
    }
}

#[async_trait]
impl RpcTransport for FakeLedger {
    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        self.calls
            .lock()
            .expect("calls poisoned")
            .push(method.to_string());

        if self
            .failing
            .lock()
            .expect("failing poisoned")
            .contains(method)
        {
            return Err(LedgerError::Unavailable(format!(
                "injected failure for {method}"
            )));
        }

        match method {
            "getAccountInfo" => {
                let address = params[0].as_str().unwrap_or_default();
                Ok(json!({"context": {"slot": 1}, "value": self.lookup(address)}))
            }
            "getMultipleAccounts" => {
                let addresses = params[0].as_array().cloned().unwrap_or_default();
                let values: Vec<Value> = addresses
                    .iter()
                    .map(|address| self.lookup(address.as_str().unwrap_or_default()))
                    .collect();
                Ok(json!({"context": {"slot": 1}, "value": values}))
            }
            "getProgramAccounts" => {
                let program = params[0].as_str().unwrap_or_default();
                let memcmp = &params[1]["filters"][0]["memcmp"];
                let offset = memcmp["offset"].as_u64().unwrap_or(0) as usize;
                let needle = bs58_decode(memcmp["bytes"].as_str().unwrap_or_default());

                let accounts = self.accounts.lock().expect("accounts poisoned");
                let mut entries: Vec<(String, FakeAccount)> = accounts
                    .iter()
                    .filter(|(_, account)| account.owner == program)
                    .filter(|(_, account)| {
                        account.data.len() >= offset + needle.len()
                            && account.data[offset..offset + needle.len()] == needle[..]
                    })
                    .map(|(address, account)| (address.clone(), account.clone()))
                    .collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));

                let result: Vec<Value> = entries
                    .iter()
                    .map(|(address, account)| {
                        json!({"pubkey": address, "account": Self::account_json(account)})
                    })
                    .collect();
                Ok(json!(result))
            }
            "getTokenAccountsByOwner" => {
                let owner: Pubkey = params[0]
                    .as_str()
                    .unwrap_or_default()
                    .parse()
                    .map_err(|_| LedgerError::Unavailable("bad owner param".into()))?;
                let mint: Pubkey = params[1]["mint"]
                    .as_str()
                    .unwrap_or_default()
                    .parse()
                    .map_err(|_| LedgerError::Unavailable("bad mint param".into()))?;

                let accounts = self.accounts.lock().expect("accounts poisoned");
                let mut entries: Vec<(String, FakeAccount)> = accounts
                    .iter()
                    .filter(|(_, account)| {
                        account.data.len() >= 72
                            && account.data[..32] == mint.as_bytes()[..]
                            && account.data[32..64] == owner.as_bytes()[..]
                    })
                    .map(|(address, account)| (address.clone(), account.clone()))
                    .collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));

                let values: Vec<Value> = entries
                    .iter()
                    .map(|(address, account)| {
                        json!({"pubkey": address, "account": Self::account_json(account)})
                    })
                    .collect();
                Ok(json!({"context": {"slot": 1}, "value": values}))
            }
            "getLatestBlockhash" => {
                let blockhash =
                    Pubkey::new([DEFAULT_BLOCKHASH_BYTE; 32]).to_string();
                Ok(json!({
                    "context": {"slot": 1},
                    "value": {"blockhash": blockhash, "lastValidBlockHeight": 1u64}
                }))
            }
            other => Err(LedgerError::Unavailable(format!(
                "fake ledger does not implement {other}"
            ))),
        }
    }
}

fn bs58_decode(text: &str) -> Vec<u8> {
    text.parse::<Pubkey>()
        .map(|key| key.as_bytes().to_vec())
        .unwrap_or_default()
}

fn string_field(value: &str) -> Vec<u8> {
    let mut out = (value.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(value.as_bytes());
    out
}

/// Raw bytes of an achievement-type account.
pub fn achievement_type_data(
    id: &str,
    name: &str,
    uri: &str,
    collection: &Pubkey,
    creator: &Pubkey,
    max_supply: u32,
    minted_count: u32,
) -> Vec<u8> {
    let mut data = vec![0xA1u8; 8]; // discriminator
    data.extend(string_field(id));
    data.extend(string_field(name));
    data.extend(string_field(uri));
    data.extend_from_slice(collection.as_bytes());
    data.extend_from_slice(creator.as_bytes());
    data.extend_from_slice(&max_supply.to_le_bytes());
    data.extend_from_slice(&minted_count.to_le_bytes());
    // trailing reward/housekeeping fields the decoders never reach
    data.extend_from_slice(&[0u8; 22]);
    data
}

/// Raw bytes of a token account holding `amount` of `mint` for `owner`.
pub fn token_account_data(mint: &Pubkey, owner: &Pubkey, amount: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(165);
    data.extend_from_slice(mint.as_bytes());
    data.extend_from_slice(owner.as_bytes());
    data.extend_from_slice(&amount.to_le_bytes());
    data.extend_from_slice(&[0u8; 36]); // delegate COption
    data.push(1); // state: initialized
    data.resize(165, 0);
    data
}

/// Raw bytes of a mint account with the given decimal precision.
pub fn mint_account_data(decimals: u8) -> Vec<u8> {
    let mut data = vec![0u8; 82];
    data[44] = decimals;
    data[45] = 1; // is_initialized
    data
}
