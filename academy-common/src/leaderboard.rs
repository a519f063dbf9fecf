//! Leaderboard timeframes, levels, and display helpers.

use serde::{Deserialize, Serialize};

/// Leaderboard window selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    #[default]
    Alltime,
    Monthly,
    Weekly,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Alltime => "alltime",
            Timeframe::Monthly => "monthly",
            Timeframe::Weekly => "weekly",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "alltime" | "all-time" => Some(Timeframe::Alltime),
            "monthly" => Some(Timeframe::Monthly),
            "weekly" => Some(Timeframe::Weekly),
            _ => None,
        }
    }
}

/// Project a holder's all-time XP into a timeframe figure.
///
/// The monthly and weekly figures are fixed-fraction projections of the
/// all-time balance, not historical deltas; the ledger only stores current
/// balances, so a true windowed figure would need a transfer-history indexer.
pub fn timeframe_xp(base_xp: u64, timeframe: Timeframe) -> u64 {
    match timeframe {
        Timeframe::Alltime => base_xp,
        Timeframe::Monthly => (base_xp as f64 * 0.65).floor() as u64,
        Timeframe::Weekly => (base_xp as f64 * 0.3).floor() as u64,
    }
}

/// Level curve: level n needs n^2 * 100 XP.
pub fn level_from_xp(xp: u64) -> u32 {
    ((xp as f64) / 100.0).sqrt().floor() as u32
}

/// Truncate a wallet address for display: first 4 + last 4 characters.
pub fn compact_address(value: &str) -> String {
    if value.len() <= 10 {
        return value.to_string();
    }
    format!("{}...{}", &value[..4], &value[value.len() - 4..])
}

/// One leaderboard row. Derived and ephemeral; never persisted as truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub wallet: String,
    pub display_name: String,
    pub xp: u64,
    pub level: u32,
    pub streak: u32,
}
