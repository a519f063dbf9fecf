//! Per-learner progress counters and streak bookkeeping.
//!
//! These are the mirrored, already-aggregated statistics the eligibility
//! evaluator consumes. Lesson completions arrive through the ingest
//! endpoint; the confirm path touches the streak as well. Day arithmetic is
//! passed in by callers so tests control time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use academy_common::LearnerStats;

use crate::mirror::now_secs;

const SECONDS_PER_DAY: u64 = 86_400;

/// Stored per-learner counters plus streak state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct ProgressRecord {
    lessons_completed: u32,
    courses_completed: u32,
    challenges_completed: u32,
    total_xp: u64,
    current_streak: u32,
    longest_streak: u32,
    /// Unix day of the last recorded activity; 0 = never active.
    last_active_day: i64,
    signup_rank: u32,
}

enum ProgressBackend {
    InMemory(Mutex<HashMap<String, ProgressRecord>>),
    Persistent(sled::Tree),
}

/// Store of learner progress records. Mutations serialize through one lock
/// so the ordinal signup rank stays consistent.
#[derive(Clone)]
pub struct ProgressStore {
    backend: Arc<ProgressBackend>,
    write_guard: Arc<Mutex<()>>,
}

impl ProgressStore {
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(ProgressBackend::InMemory(Mutex::new(HashMap::new()))),
            write_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Back the store with a tree of the shared service database.
    pub fn persistent(tree: sled::Tree) -> Self {
        Self {
            backend: Arc::new(ProgressBackend::Persistent(tree)),
            write_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Current unix day.
    pub fn today() -> i64 {
        (now_secs() / SECONDS_PER_DAY) as i64
    }

    /// Materialize stats for the evaluator. Unknown learners get zeros.
    pub fn stats(&self, user_id: &str) -> Result<LearnerStats, String> {
        let record = self.read(user_id)?.unwrap_or_default();
        Ok(LearnerStats {
            lessons_completed: record.lessons_completed,
            courses_completed: record.courses_completed,
            challenges_completed: record.challenges_completed,
            total_xp: record.total_xp,
            current_streak: record.current_streak,
            longest_streak: record.longest_streak,
            signup_rank: record.signup_rank,
        })
    }

    /// Ingest one lesson completion.
    pub fn record_lesson(
        &self,
        user_id: &str,
        xp: u64,
        course_completed: bool,
        challenge: bool,
        today: i64,
    ) -> Result<LearnerStats, String> {
        self.mutate(user_id, |record| {
            record.lessons_completed += 1;
            record.total_xp = record.total_xp.saturating_add(xp);
            if course_completed {
                record.courses_completed += 1;
            }
            if challenge {
                record.challenges_completed += 1;
            }
            advance_streak(record, today);
        })?;
        self.stats(user_id)
    }

    /// Streak-only touch, used when a mint is confirmed.
    pub fn record_activity(&self, user_id: &str, today: i64) -> Result<(), String> {
        self.mutate(user_id, |record| advance_streak(record, today))
    }

    /// Replace a learner's counters wholesale. The signup rank keeps its
    /// first-touch assignment.
    pub fn set_stats(&self, user_id: &str, stats: LearnerStats) -> Result<(), String> {
        self.mutate(user_id, |record| {
            record.lessons_completed = stats.lessons_completed;
            record.courses_completed = stats.courses_completed;
            record.challenges_completed = stats.challenges_completed;
            record.total_xp = stats.total_xp;
            record.current_streak = stats.current_streak;
            record.longest_streak = stats.longest_streak;
        })
    }

    fn mutate(
        &self,
        user_id: &str,
        apply: impl FnOnce(&mut ProgressRecord),
    ) -> Result<(), String> {
        let _guard = self.write_guard.lock().expect("progress write guard poisoned");
        let mut record = match self.read(user_id)? {
            Some(record) => record,
            None => ProgressRecord {
                signup_rank: self.count()? as u32 + 1,
                ..ProgressRecord::default()
            },
        };
        apply(&mut record);
        self.write(user_id, record)
    }

    fn read(&self, user_id: &str) -> Result<Option<ProgressRecord>, String> {
        match &*self.backend {
            ProgressBackend::InMemory(store) => Ok(store
                .lock()
                .expect("progress store poisoned")
                .get(user_id)
                .copied()),
            ProgressBackend::Persistent(tree) => tree
                .get(user_id.as_bytes())
                .map_err(|err| format!("progress db get error: {err}"))?
                .map(|bytes| {
                    serde_json::from_slice(&bytes)
                        .map_err(|err| format!("progress record decode error: {err}"))
                })
                .transpose(),
        }
    }

    fn write(&self, user_id: &str, record: ProgressRecord) -> Result<(), String> {
        match &*self.backend {
            ProgressBackend::InMemory(store) => {
                store
                    .lock()
                    .expect("progress store poisoned")
                    .insert(user_id.to_string(), record);
                Ok(())
            }
            ProgressBackend::Persistent(tree) => {
                let bytes = serde_json::to_vec(&record)
                    .map_err(|err| format!("progress record encode error: {err}"))?;
                tree.insert(user_id.as_bytes(), bytes)
                    .map_err(|err| format!("progress db insert error: {err}"))?;
                Ok(())
            }
        }
    }

    fn count(&self) -> Result<usize, String> {
        match &*self.backend {
            ProgressBackend::InMemory(store) => {
                Ok(store.lock().expect("progress store poisoned").len())
            }
            ProgressBackend::Persistent(tree) => Ok(tree.len()),
        }
    }
}

fn advance_streak(record: &mut ProgressRecord, today: i64) {
    if record.last_active_day == today {
        return;
    }
    if record.last_active_day == today - 1 {
        record.current_streak += 1;
    } else {
        record.current_streak = 1;
    }
    record.longest_streak = record.longest_streak.max(record.current_streak);
    record.last_active_day = today;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lesson_ingest_updates_counters_and_streak() {
        let store = ProgressStore::in_memory();
        let stats = store.record_lesson("user-1", 50, false, false, 100).unwrap();
        assert_eq!(stats.lessons_completed, 1);
        assert_eq!(stats.total_xp, 50);
        assert_eq!(stats.current_streak, 1);

        let stats = store.record_lesson("user-1", 25, true, true, 101).unwrap();
        assert_eq!(stats.lessons_completed, 2);
        assert_eq!(stats.courses_completed, 1);
        assert_eq!(stats.challenges_completed, 1);
        assert_eq!(stats.total_xp, 75);
        assert_eq!(stats.current_streak, 2);
    }

    #[test]
    fn same_day_activity_does_not_double_count_streak() {
        let store = ProgressStore::in_memory();
        store.record_activity("user-1", 10).unwrap();
        store.record_activity("user-1", 10).unwrap();
        assert_eq!(store.stats("user-1").unwrap().current_streak, 1);
    }

    #[test]
    fn gap_resets_streak_but_keeps_longest() {
        let store = ProgressStore::in_memory();
        for day in 10..17 {
            store.record_activity("user-1", day).unwrap();
        }
        let stats = store.stats("user-1").unwrap();
        assert_eq!(stats.current_streak, 7);
        assert_eq!(stats.longest_streak, 7);

        store.record_activity("user-1", 30).unwrap();
        let stats = store.stats("user-1").unwrap();
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.longest_streak, 7);
    }

    #[test]
    fn signup_rank_is_ordinal_by_first_touch() {
        let store = ProgressStore::in_memory();
        store.record_activity("alice", 1).unwrap();
        store.record_activity("bob", 1).unwrap();
        store.record_activity("alice", 2).unwrap();
        store.record_activity("carol", 2).unwrap();

        assert_eq!(store.stats("alice").unwrap().signup_rank, 1);
        assert_eq!(store.stats("bob").unwrap().signup_rank, 2);
        assert_eq!(store.stats("carol").unwrap().signup_rank, 3);
    }

    #[test]
    fn set_stats_replaces_counters_but_keeps_rank() {
        let store = ProgressStore::in_memory();
        store.record_activity("alice", 1).unwrap();
        store
            .set_stats(
                "alice",
                LearnerStats {
                    lessons_completed: 9,
                    ..LearnerStats::default()
                },
            )
            .unwrap();

        let stats = store.stats("alice").unwrap();
        assert_eq!(stats.lessons_completed, 9);
        assert_eq!(stats.signup_rank, 1);
    }

    #[test]
    fn unknown_learners_read_as_zeros() {
        let store = ProgressStore::in_memory();
        let stats = store.stats("nobody").unwrap();
        assert_eq!(stats, LearnerStats::default());
    }
}
