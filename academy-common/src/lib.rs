//! Shared domain types for the academy reconciliation service.
//!
//! Everything in this crate is pure: the achievement catalog, the eligibility
//! evaluator, and the leaderboard math have no I/O and no clock, so they are
//! used identically for progress display and for server-side re-validation
//! before a mint transaction is built.

pub mod achievements;
pub mod eligibility;
pub mod leaderboard;

pub use achievements::{catalog, definition, AchievementDefinition, Requirement};
pub use eligibility::{evaluate, progress_percent, Eligibility, LearnerStats};
pub use leaderboard::{
    compact_address, level_from_xp, timeframe_xp, LeaderboardEntry, Timeframe,
};
