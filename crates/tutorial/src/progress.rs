//! Persisted tutorial progress.

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Progress through one lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
    pub lesson_id: String,
    /// Completed steps in first-completion order.
    pub completed_step_ids: IndexSet<String>,
    pub current_step_index: usize,
    pub is_completed: bool,
    pub time_spent_s: u64,
    /// Quiz step id to score (0..=100).
    pub quiz_scores: IndexMap<String, u8>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LessonProgress {
    pub fn new(lesson_id: impl Into<String>) -> Self {
        Self {
            lesson_id: lesson_id.into(),
            completed_step_ids: IndexSet::new(),
            current_step_index: 0,
            is_completed: false,
            time_spent_s: 0,
            quiz_scores: IndexMap::new(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Progress through one tutorial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutorialProgress {
    pub tutorial_id: String,
    pub completed_lesson_ids: IndexSet<String>,
    pub current_lesson_id: Option<String>,
    pub lessons: IndexMap<String, LessonProgress>,
    /// Share of the tutorial's lessons completed, 0..=100.
    pub total_progress_pct: u8,
    pub last_accessed: DateTime<Utc>,
    pub total_time_spent_s: u64,
}

impl TutorialProgress {
    pub fn new(tutorial_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            tutorial_id: tutorial_id.into(),
            completed_lesson_ids: IndexSet::new(),
            current_lesson_id: None,
            lessons: IndexMap::new(),
            total_progress_pct: 0,
            last_accessed: now,
            total_time_spent_s: 0,
        }
    }

    /// Recompute `total_progress_pct` against a tutorial of `lesson_count` lessons.
    pub fn recompute_pct(&mut self, lesson_count: usize) {
        self.total_progress_pct = progress_pct(self.completed_lesson_ids.len(), lesson_count);
    }
}

/// Rounded completion percentage, capped at 100.
pub fn progress_pct(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (completed as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Where a rider should pick a tutorial back up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePoint {
    pub lesson_id: String,
    pub step_index: usize,
    /// `None` when every step of the lesson has been passed.
    pub step_id: Option<String>,
}
