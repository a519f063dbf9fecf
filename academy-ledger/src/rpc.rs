//! JSON-RPC access to the ledger.
//!
//! The transport is a trait so tests can substitute an in-process fake; the
//! production transport posts JSON-RPC 2.0 envelopes over HTTP. Every
//! transport or protocol failure maps to `LedgerError::Unavailable` —
//! transient by definition, and never to be read as "account absent".

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::pubkey::Pubkey;

const COMMITMENT: &str = "confirmed";

/// One JSON-RPC round trip.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value>;
}

/// Production transport over HTTP.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| LedgerError::Unavailable(format!("{method}: {err}")))?;

        let payload: Value = response
            .json()
            .await
            .map_err(|err| LedgerError::Unavailable(format!("{method}: invalid response: {err}")))?;

        if let Some(error) = payload.get("error") {
            if !error.is_null() {
                return Err(LedgerError::Unavailable(format!("{method}: {error}")));
            }
        }

        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }
}

/// A fetched account: its owning program and raw data bytes.
#[derive(Debug, Clone)]
pub struct AccountData {
    pub owner: Pubkey,
    pub data: Vec<u8>,
}

/// Typed wrappers over the raw transport.
#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn RpcTransport>,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }

    pub fn http(endpoint: impl Into<String>) -> Self {
        Self::new(Arc::new(HttpTransport::new(endpoint)))
    }

    /// Fetch a single account; `None` means the account does not exist.
    pub async fn get_account(&self, address: &Pubkey) -> Result<Option<AccountData>> {
        let result = self
            .transport
            .call(
                "getAccountInfo",
                json!([address.to_string(), {"encoding": "base64", "commitment": COMMITMENT}]),
            )
            .await?;
        decode_account_value(result.get("value").unwrap_or(&Value::Null))
    }

    /// Fetch a batch of accounts, preserving order; absent accounts are
    /// `None`. Batching bounds round trips when listing many candidates.
    pub async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<AccountData>>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        let encoded: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();
        let result = self
            .transport
            .call(
                "getMultipleAccounts",
                json!([encoded, {"encoding": "base64", "commitment": COMMITMENT}]),
            )
            .await?;

        let values = result
            .get("value")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                LedgerError::Unavailable("getMultipleAccounts: missing value array".into())
            })?;
        values.iter().map(decode_account_value).collect()
    }

    /// Scan every account of a program whose data matches `bytes` (base58)
    /// at `offset`. Expensive; callers are expected to cache.
    pub async fn get_program_accounts(
        &self,
        program: &Pubkey,
        memcmp_offset: usize,
        memcmp_bytes: &str,
    ) -> Result<Vec<(Pubkey, AccountData)>> {
        let result = self
            .transport
            .call(
                "getProgramAccounts",
                json!([
                    program.to_string(),
                    {
                        "encoding": "base64",
                        "commitment": COMMITMENT,
                        "filters": [
                            {"memcmp": {"offset": memcmp_offset, "bytes": memcmp_bytes}}
                        ]
                    }
                ]),
            )
            .await?;

        let entries = result.as_array().ok_or_else(|| {
            LedgerError::Unavailable("getProgramAccounts: expected array result".into())
        })?;
        debug!(program = %program, accounts = entries.len(), "program account scan complete");
        entries.iter().map(decode_keyed_account).collect()
    }

    /// All token accounts a wallet holds for one mint.
    pub async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
    ) -> Result<Vec<AccountData>> {
        let result = self
            .transport
            .call(
                "getTokenAccountsByOwner",
                json!([
                    owner.to_string(),
                    {"mint": mint.to_string()},
                    {"encoding": "base64", "commitment": COMMITMENT}
                ]),
            )
            .await?;

        let values = result
            .get("value")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                LedgerError::Unavailable("getTokenAccountsByOwner: missing value array".into())
            })?;
        values
            .iter()
            .map(|entry| {
                decode_keyed_account(entry).map(|(_, account)| account)
            })
            .collect()
    }

    /// A recent blockhash for transaction assembly.
    pub async fn get_latest_blockhash(&self) -> Result<[u8; 32]> {
        let result = self
            .transport
            .call("getLatestBlockhash", json!([{"commitment": COMMITMENT}]))
            .await?;
        let text = result
            .get("value")
            .and_then(|value| value.get("blockhash"))
            .and_then(Value::as_str)
            .ok_or_else(|| LedgerError::Unavailable("getLatestBlockhash: missing blockhash".into()))?;
        let bytes = bs58::decode(text)
            .into_vec()
            .map_err(|err| LedgerError::Unavailable(format!("invalid blockhash: {err}")))?;
        bytes
            .try_into()
            .map_err(|_| LedgerError::Unavailable("blockhash is not 32 bytes".into()))
    }
}

fn decode_account_value(value: &Value) -> Result<Option<AccountData>> {
    if value.is_null() {
        return Ok(None);
    }

    let owner = value
        .get("owner")
        .and_then(Value::as_str)
        .ok_or_else(|| LedgerError::Unavailable("account value missing owner".into()))?
        .parse()?;

    let encoded = value
        .get("data")
        .and_then(Value::as_array)
        .and_then(|pair| pair.first())
        .and_then(Value::as_str)
        .ok_or_else(|| LedgerError::Unavailable("account value missing base64 data".into()))?;
    let data = BASE64
        .decode(encoded)
        .map_err(|err| LedgerError::Unavailable(format!("account data is not base64: {err}")))?;

    Ok(Some(AccountData { owner, data }))
}

fn decode_keyed_account(entry: &Value) -> Result<(Pubkey, AccountData)> {
    let pubkey = entry
        .get("pubkey")
        .and_then(Value::as_str)
        .ok_or_else(|| LedgerError::Unavailable("keyed account missing pubkey".into()))?
        .parse()?;
    let account = decode_account_value(
        entry
            .get("account")
            .ok_or_else(|| LedgerError::Unavailable("keyed account missing account".into()))?,
    )?
    .ok_or_else(|| LedgerError::Unavailable("keyed account value is null".into()))?;
    Ok((pubkey, account))
}
