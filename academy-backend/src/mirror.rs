//! The off-ledger mirror of award facts.
//!
//! The ledger is the source of truth; this store is the fast, sometimes
//! stale view the UI reads. Records are keyed by `(user_id,
//! achievement_id)`, written on confirmation, and opportunistically
//! upserted whenever a receipt is discovered on-ledger with no mirror
//! record. Ledger-confirmed records are never deleted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Minimum length at which an asset address is plausibly a real account
/// address rather than a legacy sentinel such as "synced".
const PLAUSIBLE_ASSET_LEN: usize = 11;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorRecord {
    pub user_id: String,
    pub achievement_id: String,
    /// Unix seconds when the award was first seen.
    pub earned_at: u64,
    /// Populated only once a mint is confirmed with a real asset address.
    pub asset_address: Option<String>,
}

impl MirrorRecord {
    /// Only a plausibly real asset address counts as proof of an
    /// on-ledger asset; absence or a sentinel value does not.
    pub fn has_plausible_asset(&self) -> bool {
        self.asset_address
            .as_deref()
            .map(|address| address.len() >= PLAUSIBLE_ASSET_LEN)
            .unwrap_or(false)
    }
}

enum MirrorBackend {
    InMemory(Mutex<HashMap<Vec<u8>, MirrorRecord>>),
    Persistent(sled::Tree),
}

/// Upsert-only store of mirror records.
#[derive(Clone)]
pub struct MirrorStore {
    backend: Arc<MirrorBackend>,
}

impl MirrorStore {
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(MirrorBackend::InMemory(Mutex::new(HashMap::new()))),
        }
    }

    /// Back the store with a tree of the shared service database.
    pub fn persistent(tree: sled::Tree) -> Self {
        Self {
            backend: Arc::new(MirrorBackend::Persistent(tree)),
        }
    }

    fn storage_key(user_id: &str, achievement_id: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(user_id.len() + achievement_id.len() + 1);
        key.extend_from_slice(user_id.as_bytes());
        key.push(0);
        key.extend_from_slice(achievement_id.as_bytes());
        key
    }

    pub fn get(
        &self,
        user_id: &str,
        achievement_id: &str,
    ) -> Result<Option<MirrorRecord>, String> {
        let key = Self::storage_key(user_id, achievement_id);
        match &*self.backend {
            MirrorBackend::InMemory(store) => Ok(store
                .lock()
                .expect("mirror store poisoned")
                .get(&key)
                .cloned()),
            MirrorBackend::Persistent(tree) => tree
                .get(&key)
                .map_err(|err| format!("mirror db get error: {err}"))?
                .map(|bytes| {
                    serde_json::from_slice(&bytes)
                        .map_err(|err| format!("mirror record decode error: {err}"))
                })
                .transpose(),
        }
    }

    /// Record a confirmed mint. The earliest `earned_at` wins; the asset
    /// address always updates to the confirmed value.
    pub fn upsert_confirmed(
        &self,
        user_id: &str,
        achievement_id: &str,
        asset_address: &str,
    ) -> Result<(), String> {
        let existing = self.get(user_id, achievement_id)?;
        let record = MirrorRecord {
            user_id: user_id.to_string(),
            achievement_id: achievement_id.to_string(),
            earned_at: existing.as_ref().map(|r| r.earned_at).unwrap_or_else(now_secs),
            asset_address: Some(asset_address.to_string()),
        };
        self.put(record)
    }

    /// Self-healing sync: insert a record when the ledger shows a receipt
    /// the mirror has never seen. Existing records — and in particular any
    /// existing asset address — are left untouched.
    pub fn sync_if_missing(&self, user_id: &str, achievement_id: &str) -> Result<(), String> {
        if self.get(user_id, achievement_id)?.is_some() {
            return Ok(());
        }
        self.put(MirrorRecord {
            user_id: user_id.to_string(),
            achievement_id: achievement_id.to_string(),
            earned_at: now_secs(),
            asset_address: None,
        })
    }

    pub fn records_for_user(&self, user_id: &str) -> Result<Vec<MirrorRecord>, String> {
        match &*self.backend {
            MirrorBackend::InMemory(store) => Ok(store
                .lock()
                .expect("mirror store poisoned")
                .values()
                .filter(|record| record.user_id == user_id)
                .cloned()
                .collect()),
            MirrorBackend::Persistent(tree) => {
                let mut prefix = user_id.as_bytes().to_vec();
                prefix.push(0);
                let mut records = Vec::new();
                for entry in tree.scan_prefix(&prefix) {
                    let (_, bytes) = entry.map_err(|err| format!("mirror db scan error: {err}"))?;
                    records.push(
                        serde_json::from_slice(&bytes)
                            .map_err(|err| format!("mirror record decode error: {err}"))?,
                    );
                }
                Ok(records)
            }
        }
    }

    fn put(&self, record: MirrorRecord) -> Result<(), String> {
        let key = Self::storage_key(&record.user_id, &record.achievement_id);
        match &*self.backend {
            MirrorBackend::InMemory(store) => {
                store
                    .lock()
                    .expect("mirror store poisoned")
                    .insert(key, record);
                Ok(())
            }
            MirrorBackend::Persistent(tree) => {
                let bytes = serde_json::to_vec(&record)
                    .map_err(|err| format!("mirror record encode error: {err}"))?;
                tree.insert(key, bytes)
                    .map_err(|err| format!("mirror db insert error: {err}"))?;
                Ok(())
            }
        }
    }
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_if_missing_never_clears_an_asset() {
        let store = MirrorStore::in_memory();
        store.upsert_confirmed("user-1", "first-steps", "As5etAddre55WithPlausibleLength").unwrap();

        store.sync_if_missing("user-1", "first-steps").unwrap();
        let record = store.get("user-1", "first-steps").unwrap().unwrap();
        assert!(record.has_plausible_asset());
    }

    #[test]
    fn sync_if_missing_creates_assetless_records() {
        let store = MirrorStore::in_memory();
        store.sync_if_missing("user-1", "week-warrior").unwrap();
        let record = store.get("user-1", "week-warrior").unwrap().unwrap();
        assert!(record.asset_address.is_none());
        assert!(!record.has_plausible_asset());
    }

    #[test]
    fn sentinel_asset_addresses_are_not_plausible() {
        let record = MirrorRecord {
            user_id: "u".into(),
            achievement_id: "a".into(),
            earned_at: 0,
            asset_address: Some("synced".into()),
        };
        assert!(!record.has_plausible_asset());
    }

    #[test]
    fn confirmed_upsert_keeps_earliest_earned_at() {
        let store = MirrorStore::in_memory();
        store.sync_if_missing("user-1", "first-steps").unwrap();
        let first = store.get("user-1", "first-steps").unwrap().unwrap();

        store.upsert_confirmed("user-1", "first-steps", "As5etAddre55WithPlausibleLength").unwrap();
        let second = store.get("user-1", "first-steps").unwrap().unwrap();
        assert_eq!(second.earned_at, first.earned_at);
    }

    #[test]
    fn records_for_user_filters_by_user() {
        let store = MirrorStore::in_memory();
        store.sync_if_missing("user-1", "first-steps").unwrap();
        store.sync_if_missing("user-1", "week-warrior").unwrap();
        store.sync_if_missing("user-2", "first-steps").unwrap();

        let records = store.records_for_user("user-1").unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.user_id == "user-1"));
    }
}
