//! Achievements derived from tutorial progress.

use serde::{Deserialize, Serialize};

use crate::progress::TutorialProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Achievement {
    FirstSteps,
    OnFire,
    HalfWay,
    Master,
}

impl Achievement {
    pub fn title(&self) -> &'static str {
        match self {
            Achievement::FirstSteps => "First Steps",
            Achievement::OnFire => "On Fire",
            Achievement::HalfWay => "Half Way",
            Achievement::Master => "Master",
        }
    }
}

/// Achievements earned in `progress`.
pub fn achievements(progress: &TutorialProgress) -> Vec<Achievement> {
    let completed = progress.completed_lesson_ids.len();
    let pct = progress.total_progress_pct;

    [
        (Achievement::FirstSteps, completed >= 1),
        (Achievement::OnFire, completed >= 3),
        (Achievement::HalfWay, pct >= 50),
        (Achievement::Master, pct >= 100),
    ]
    .into_iter()
    .filter_map(|(achievement, earned)| earned.then_some(achievement))
    .collect()
}
