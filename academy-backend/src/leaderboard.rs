//! Leaderboard aggregation over the XP mint's holder set.
//!
//! The full-mint scan is expensive, so results are cached per timeframe
//! with a 60-second TTL. The cache and the clock are injected components
//! rather than module statics: tests control time and isolate cache state
//! per run. A scan in flight never blocks readers of a still-fresh slot,
//! and concurrent miss-scans are safe (last writer wins with equivalent
//! data).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use academy_common::{
    compact_address, level_from_xp, timeframe_xp, LeaderboardEntry, Timeframe,
};
use academy_ledger::{LedgerReader, MintRuntimeResolver, Pubkey, Result};

pub const LEADERBOARD_CACHE_TTL_MILLIS: u64 = 60_000;

/// Millisecond clock; `fixed` variants let tests advance time by hand.
#[derive(Clone)]
pub enum Clock {
    System,
    Fixed(Arc<AtomicU64>),
}

impl Clock {
    pub fn system() -> Self {
        Clock::System
    }

    pub fn fixed(millis: u64) -> Self {
        Clock::Fixed(Arc::new(AtomicU64::new(millis)))
    }

    pub fn now_millis(&self) -> u64 {
        match self {
            Clock::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            Clock::Fixed(millis) => millis.load(Ordering::SeqCst),
        }
    }

    /// Advance a fixed clock; a no-op on the system clock.
    pub fn advance(&self, millis: u64) {
        if let Clock::Fixed(current) = self {
            current.fetch_add(millis, Ordering::SeqCst);
        }
    }
}

struct CacheSlot {
    expires_at_millis: u64,
    entries: Vec<LeaderboardEntry>,
}

/// Per-timeframe cache of computed leaderboards.
#[derive(Clone, Default)]
pub struct LeaderboardCache {
    slots: Arc<RwLock<HashMap<Timeframe, CacheSlot>>>,
}

impl LeaderboardCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_fresh(&self, timeframe: Timeframe, now_millis: u64) -> Option<Vec<LeaderboardEntry>> {
        self.slots
            .read()
            .expect("leaderboard cache poisoned")
            .get(&timeframe)
            .filter(|slot| slot.expires_at_millis > now_millis)
            .map(|slot| slot.entries.clone())
    }

    fn put(&self, timeframe: Timeframe, expires_at_millis: u64, entries: Vec<LeaderboardEntry>) {
        self.slots
            .write()
            .expect("leaderboard cache poisoned")
            .insert(
                timeframe,
                CacheSlot {
                    expires_at_millis,
                    entries,
                },
            );
    }
}

/// Computes and caches the XP leaderboard.
#[derive(Clone)]
pub struct LeaderboardService {
    reader: Arc<LedgerReader>,
    resolver: Arc<MintRuntimeResolver>,
    xp_mint: Pubkey,
    cache: LeaderboardCache,
    clock: Clock,
    aliases: Arc<HashMap<String, String>>,
    static_wallets: Arc<Vec<Pubkey>>,
}

impl LeaderboardService {
    pub fn new(
        reader: Arc<LedgerReader>,
        resolver: Arc<MintRuntimeResolver>,
        xp_mint: Pubkey,
        cache: LeaderboardCache,
        clock: Clock,
        aliases: HashMap<String, String>,
        static_wallets: Vec<Pubkey>,
    ) -> Self {
        Self {
            reader,
            resolver,
            xp_mint,
            cache,
            clock,
            aliases: Arc::new(aliases),
            static_wallets: Arc::new(static_wallets),
        }
    }

    /// The leaderboard for one timeframe: cache hit, full scan, or the
    /// static holder-list fallback when scanning degrades.
    pub async fn leaderboard(&self, timeframe: Timeframe) -> Result<Vec<LeaderboardEntry>> {
        let now = self.clock.now_millis();
        if let Some(entries) = self.cache.get_fresh(timeframe, now) {
            debug!(timeframe = timeframe.as_str(), "leaderboard cache hit");
            return Ok(entries);
        }

        match self.scan(timeframe).await {
            Ok(entries) => {
                self.cache
                    .put(timeframe, now + LEADERBOARD_CACHE_TTL_MILLIS, entries.clone());
                Ok(entries)
            }
            Err(err) if !self.static_wallets.is_empty() => {
                warn!(
                    timeframe = timeframe.as_str(),
                    %err,
                    "full-mint scan failed; degrading to the static holder list"
                );
                self.static_fallback(timeframe).await
            }
            Err(err) => Err(err),
        }
    }

    async fn scan(&self, timeframe: Timeframe) -> Result<Vec<LeaderboardEntry>> {
        let runtime = self.resolver.resolve(&self.xp_mint).await?;
        let records = self
            .reader
            .scan_holders_of_mint(&self.xp_mint, runtime.variant)
            .await?;

        // One owner may hold several token accounts: sum raw amounts per
        // owner first, then scale once, so partial units across accounts
        // still count.
        let mut raw_by_owner: HashMap<Pubkey, u128> = HashMap::new();
        for record in records {
            if record.raw_amount == 0 {
                continue;
            }
            *raw_by_owner.entry(record.owner).or_insert(0) += record.raw_amount;
        }

        let divisor = 10u128.pow(runtime.decimals as u32);
        let holders = raw_by_owner
            .into_iter()
            .map(|(owner, raw)| (owner.to_string(), (raw / divisor).min(u64::MAX as u128) as u64))
            .filter(|(_, xp)| *xp > 0);

        Ok(self.rank(holders, timeframe))
    }

    async fn static_fallback(&self, timeframe: Timeframe) -> Result<Vec<LeaderboardEntry>> {
        let runtime = self.resolver.resolve(&self.xp_mint).await?;
        let mut holders = Vec::with_capacity(self.static_wallets.len());
        for wallet in self.static_wallets.iter() {
            match self
                .reader
                .xp_balance_of(wallet, &self.xp_mint, runtime.decimals)
                .await
            {
                Ok(xp) => holders.push((wallet.to_string(), xp)),
                Err(err) => {
                    warn!(wallet = %wallet, %err, "balance lookup failed for static holder");
                }
            }
        }
        Ok(self.rank(holders.into_iter(), timeframe))
    }

    fn rank(
        &self,
        holders: impl Iterator<Item = (String, u64)>,
        timeframe: Timeframe,
    ) -> Vec<LeaderboardEntry> {
        let mut rows: Vec<(String, u64)> = holders
            .map(|(wallet, base_xp)| (wallet, timeframe_xp(base_xp, timeframe)))
            .filter(|(_, xp)| *xp > 0)
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        rows.into_iter()
            .enumerate()
            .map(|(index, (wallet, xp))| LeaderboardEntry {
                rank: index as u32 + 1,
                display_name: self
                    .aliases
                    .get(&wallet)
                    .cloned()
                    .unwrap_or_else(|| compact_address(&wallet)),
                level: level_from_xp(xp),
                streak: 0,
                wallet,
                xp,
            })
            .collect()
    }
}
