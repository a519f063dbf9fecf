//! The immutable achievement catalog.
//!
//! Definitions live in code, not in a datastore: the on-ledger
//! achievement-type account is the runtime source of truth for supply and
//! collection wiring, while this catalog carries the requirement each
//! achievement is gated on.

use serde::{Deserialize, Serialize};

/// What a learner must have done before an achievement can be awarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Requirement {
    /// At least this many lessons completed.
    LessonsCompleted(u32),
    /// At least this many courses completed.
    CoursesCompleted(u32),
    /// At least this many coding challenges completed.
    ChallengesCompleted(u32),
    /// At least this much lifetime XP.
    XpEarned(u64),
    /// Computed level at or above this value.
    LevelReached(u32),
    /// Longest streak at or above this many days.
    StreakDays(u32),
    /// Signed up among the first N learners.
    SignupRank(u32),
    /// Granted manually by an operator; never auto-eligible.
    AdminGranted,
}

impl Requirement {
    /// Human-readable description used in listings and rejection reasons.
    pub fn describe(&self) -> String {
        match self {
            Requirement::LessonsCompleted(1) => "Complete any lesson in any course".to_string(),
            Requirement::LessonsCompleted(n) => format!("Complete {n} lessons"),
            Requirement::CoursesCompleted(1) => "Complete all lessons in any course".to_string(),
            Requirement::CoursesCompleted(n) => format!("Complete {n} courses"),
            Requirement::ChallengesCompleted(n) => format!("Complete {n} coding challenges"),
            Requirement::XpEarned(n) => format!("Earn {n} XP"),
            Requirement::LevelReached(n) => format!("Reach level {n}"),
            Requirement::StreakDays(n) => format!("{n}-day learning streak"),
            Requirement::SignupRank(n) => format!("Be among the first {n} learners"),
            Requirement::AdminGranted => "Granted by the academy team".to_string(),
        }
    }
}

/// Immutable catalog entry. The on-ledger achievement-type account adds
/// supply and collection data; this struct is everything the service itself
/// decides with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AchievementDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub icon_url: &'static str,
    pub xp_reward: u32,
    pub requirement: Requirement,
}

const CATALOG: &[AchievementDefinition] = &[
    AchievementDefinition {
        id: "first-steps",
        name: "First Steps",
        icon_url: "/achievements/first-steps.png",
        xp_reward: 10,
        requirement: Requirement::LessonsCompleted(1),
    },
    AchievementDefinition {
        id: "dedicated-learner",
        name: "Dedicated Learner",
        icon_url: "/achievements/dedicated-learner.png",
        xp_reward: 100,
        requirement: Requirement::LessonsCompleted(25),
    },
    AchievementDefinition {
        id: "course-completer",
        name: "Course Completer",
        icon_url: "/achievements/course-completer.png",
        xp_reward: 50,
        requirement: Requirement::CoursesCompleted(1),
    },
    AchievementDefinition {
        id: "curriculum-conqueror",
        name: "Curriculum Conqueror",
        icon_url: "/achievements/curriculum-conqueror.png",
        xp_reward: 300,
        requirement: Requirement::CoursesCompleted(12),
    },
    AchievementDefinition {
        id: "challenge-champion",
        name: "Challenge Champion",
        icon_url: "/achievements/challenge-champion.png",
        xp_reward: 75,
        requirement: Requirement::ChallengesCompleted(10),
    },
    AchievementDefinition {
        id: "xp-collector",
        name: "XP Collector",
        icon_url: "/achievements/xp-collector.png",
        xp_reward: 100,
        requirement: Requirement::XpEarned(1_000),
    },
    AchievementDefinition {
        id: "level-five",
        name: "Level Five",
        icon_url: "/achievements/level-five.png",
        xp_reward: 150,
        requirement: Requirement::LevelReached(5),
    },
    AchievementDefinition {
        id: "week-warrior",
        name: "Week Warrior",
        icon_url: "/achievements/week-warrior.png",
        xp_reward: 30,
        requirement: Requirement::StreakDays(7),
    },
    AchievementDefinition {
        id: "monthly-master",
        name: "Monthly Master",
        icon_url: "/achievements/monthly-master.png",
        xp_reward: 100,
        requirement: Requirement::StreakDays(30),
    },
    AchievementDefinition {
        id: "consistency-king",
        name: "Consistency King",
        icon_url: "/achievements/consistency-king.png",
        xp_reward: 250,
        requirement: Requirement::StreakDays(100),
    },
    AchievementDefinition {
        id: "early-adopter",
        name: "Early Adopter",
        icon_url: "/achievements/early-adopter.png",
        xp_reward: 100,
        requirement: Requirement::SignupRank(100),
    },
    AchievementDefinition {
        id: "bug-hunter",
        name: "Bug Hunter",
        icon_url: "/achievements/bug-hunter.png",
        xp_reward: 150,
        requirement: Requirement::AdminGranted,
    },
];

/// The full catalog, in display order.
pub fn catalog() -> &'static [AchievementDefinition] {
    CATALOG
}

/// Look up a definition by id.
pub fn definition(id: &str) -> Option<&'static AchievementDefinition> {
    CATALOG.iter().find(|def| def.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_ids_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for def in catalog() {
            assert!(seen.insert(def.id), "duplicate achievement id {}", def.id);
        }
    }

    #[test]
    fn definition_lookup_finds_known_ids() {
        assert_eq!(definition("first-steps").unwrap().name, "First Steps");
        assert!(definition("no-such-achievement").is_none());
    }
}
