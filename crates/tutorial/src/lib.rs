//! Tutorial progression for riders.
//!
//! Lessons are sequences of steps (text, video, quiz, checklist, interactive).
//! [`TutorialEngine`] records step and lesson completion per user in the local
//! store, enforces pro-only gating and derives [`Achievement`]s.

pub mod achievements;
pub mod content;
pub mod engine;
pub mod gates;
pub mod progress;

pub use achievements::{achievements, Achievement};
pub use content::{Catalog, Lesson, LessonStep, StepKind, Tutorial};
pub use engine::TutorialEngine;
pub use gates::{evaluate_step, StepResponse, QUIZ_PASS_SCORE};
pub use progress::{progress_pct, LessonProgress, ResumePoint, TutorialProgress};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
