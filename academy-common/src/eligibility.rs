//! Achievement eligibility evaluation.
//!
//! `evaluate` is a pure function over already-aggregated learner counters.
//! The same function backs the progress-bar listing and the server-side
//! re-check that runs immediately before a mint transaction is built; a
//! client-supplied eligibility claim is never trusted.

use serde::{Deserialize, Serialize};

use crate::achievements::{AchievementDefinition, Requirement};
use crate::leaderboard::level_from_xp;

/// Aggregated per-learner counters, sourced from the mirror store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerStats {
    pub lessons_completed: u32,
    pub courses_completed: u32,
    pub challenges_completed: u32,
    pub total_xp: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Ordinal position among all signups, 1-based. Zero means unknown.
    pub signup_rank: u32,
}

impl LearnerStats {
    /// Level derived from lifetime XP.
    pub fn level(&self) -> u32 {
        level_from_xp(self.total_xp)
    }
}

/// Outcome of an eligibility check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub eligible: bool,
    /// Rejection reason, suitable for rendering to the learner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Eligibility {
    fn ok() -> Self {
        Self {
            eligible: true,
            reason: None,
        }
    }

    fn rejected(reason: String) -> Self {
        Self {
            eligible: false,
            reason: Some(reason),
        }
    }
}

/// Evaluate one achievement definition against a learner's stats.
pub fn evaluate(stats: &LearnerStats, def: &AchievementDefinition) -> Eligibility {
    let met = match def.requirement {
        Requirement::LessonsCompleted(n) => stats.lessons_completed >= n,
        Requirement::CoursesCompleted(n) => stats.courses_completed >= n,
        Requirement::ChallengesCompleted(n) => stats.challenges_completed >= n,
        Requirement::XpEarned(n) => stats.total_xp >= n,
        Requirement::LevelReached(n) => stats.level() >= n,
        Requirement::StreakDays(n) => stats.longest_streak >= n,
        Requirement::SignupRank(n) => stats.signup_rank > 0 && stats.signup_rank <= n,
        Requirement::AdminGranted => false,
    };

    if met {
        Eligibility::ok()
    } else {
        Eligibility::rejected(def.requirement.describe())
    }
}

/// Progress toward an achievement as a capped percentage, for progress bars.
pub fn progress_percent(stats: &LearnerStats, def: &AchievementDefinition) -> u8 {
    let (current, target): (u64, u64) = match def.requirement {
        Requirement::LessonsCompleted(n) => (stats.lessons_completed as u64, n as u64),
        Requirement::CoursesCompleted(n) => (stats.courses_completed as u64, n as u64),
        Requirement::ChallengesCompleted(n) => (stats.challenges_completed as u64, n as u64),
        Requirement::XpEarned(n) => (stats.total_xp, n),
        Requirement::LevelReached(n) => (stats.level() as u64, n as u64),
        Requirement::StreakDays(n) => (stats.longest_streak as u64, n as u64),
        Requirement::SignupRank(n) => {
            // Rank requirements are all-or-nothing.
            let met = stats.signup_rank > 0 && stats.signup_rank <= n;
            (if met { 1 } else { 0 }, 1)
        }
        Requirement::AdminGranted => (0, 1),
    };

    if target == 0 {
        return 100;
    }
    ((current.saturating_mul(100) / target).min(100)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::achievements::definition;

    fn stats_with_lessons(lessons: u32) -> LearnerStats {
        LearnerStats {
            lessons_completed: lessons,
            ..LearnerStats::default()
        }
    }

    #[test]
    fn first_steps_requires_one_lesson() {
        let def = definition("first-steps").unwrap();

        let before = evaluate(&stats_with_lessons(0), def);
        assert!(!before.eligible);
        assert!(before.reason.is_some());

        let after = evaluate(&stats_with_lessons(1), def);
        assert!(after.eligible);
        assert!(after.reason.is_none());
    }

    #[test]
    fn evaluation_is_pure() {
        let def = definition("week-warrior").unwrap();
        let stats = LearnerStats {
            longest_streak: 9,
            ..LearnerStats::default()
        };

        let first = evaluate(&stats, def);
        for _ in 0..10 {
            assert_eq!(evaluate(&stats, def), first);
        }
        assert!(first.eligible);
    }

    #[test]
    fn streak_requirement_uses_longest_streak() {
        let def = definition("monthly-master").unwrap();
        let stats = LearnerStats {
            current_streak: 2,
            longest_streak: 31,
            ..LearnerStats::default()
        };
        assert!(evaluate(&stats, def).eligible);
    }

    #[test]
    fn level_requirement_derives_from_xp() {
        let def = definition("level-five").unwrap();
        // level 5 needs 2500 XP: floor(sqrt(2500 / 100)) == 5.
        let below = LearnerStats {
            total_xp: 2_499,
            ..LearnerStats::default()
        };
        let at = LearnerStats {
            total_xp: 2_500,
            ..LearnerStats::default()
        };
        assert!(!evaluate(&below, def).eligible);
        assert!(evaluate(&at, def).eligible);
    }

    #[test]
    fn signup_rank_zero_is_never_eligible() {
        let def = definition("early-adopter").unwrap();
        assert!(!evaluate(&LearnerStats::default(), def).eligible);

        let ranked = LearnerStats {
            signup_rank: 100,
            ..LearnerStats::default()
        };
        assert!(evaluate(&ranked, def).eligible);

        let late = LearnerStats {
            signup_rank: 101,
            ..LearnerStats::default()
        };
        assert!(!evaluate(&late, def).eligible);
    }

    #[test]
    fn admin_granted_is_never_auto_eligible() {
        let def = definition("bug-hunter").unwrap();
        let maxed = LearnerStats {
            lessons_completed: u32::MAX,
            courses_completed: u32::MAX,
            challenges_completed: u32::MAX,
            total_xp: u64::MAX,
            current_streak: u32::MAX,
            longest_streak: u32::MAX,
            signup_rank: 1,
        };
        assert!(!evaluate(&maxed, def).eligible);
    }

    #[test]
    fn progress_is_capped_at_one_hundred() {
        let def = definition("dedicated-learner").unwrap();
        assert_eq!(progress_percent(&stats_with_lessons(5), def), 20);
        assert_eq!(progress_percent(&stats_with_lessons(25), def), 100);
        assert_eq!(progress_percent(&stats_with_lessons(500), def), 100);
    }
}
