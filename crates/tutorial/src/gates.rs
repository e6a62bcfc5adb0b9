//! Step completion gates.

use rider_core::{CoreError, Result};
use serde::{Deserialize, Serialize};

use crate::content::{LessonStep, StepKind};

/// Score recorded for a correct quiz answer.
pub const QUIZ_PASS_SCORE: u8 = 100;

/// What the rider did on a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepResponse {
    /// Pressed "next" on a text, video or interactive step.
    Next,
    /// Picked an option and possibly submitted it.
    Quiz {
        selected: Option<usize>,
        submitted: bool,
    },
    /// Indices of the checklist items that are marked.
    Checklist { checked: Vec<usize> },
}

/// Check `response` against the gate of `step`.
///
/// Returns the quiz score for quiz steps and `None` for every other kind.
pub fn evaluate_step(step: &LessonStep, response: &StepResponse) -> Result<Option<u8>> {
    match (&step.kind, response) {
        (StepKind::Text | StepKind::Video | StepKind::Interactive, StepResponse::Next) => Ok(None),
        (
            StepKind::Quiz {
                options,
                correct_index,
                ..
            },
            StepResponse::Quiz {
                selected,
                submitted,
            },
        ) => {
            let selected = selected.ok_or_else(|| CoreError::validation("select an answer first"))?;
            if selected >= options.len() {
                return Err(CoreError::validation(format!(
                    "answer {} is not one of the {} options",
                    selected,
                    options.len()
                )));
            }
            if !submitted {
                return Err(CoreError::validation("submit the answer to continue"));
            }
            Ok(Some(if selected == *correct_index {
                QUIZ_PASS_SCORE
            } else {
                0
            }))
        }
        (StepKind::Checklist { items }, StepResponse::Checklist { checked }) => {
            let missing = (0..items.len()).filter(|i| !checked.contains(i)).count();
            if missing > 0 {
                return Err(CoreError::validation(format!(
                    "checklist incomplete: {} of {} items unmarked",
                    missing,
                    items.len()
                )));
            }
            Ok(None)
        }
        (kind, response) => Err(CoreError::validation(format!(
            "{:?} does not complete a {} step",
            response,
            kind_name(kind)
        ))),
    }
}

fn kind_name(kind: &StepKind) -> &'static str {
    match kind {
        StepKind::Text => "text",
        StepKind::Video => "video",
        StepKind::Quiz { .. } => "quiz",
        StepKind::Checklist { .. } => "checklist",
        StepKind::Interactive => "interactive",
    }
}
