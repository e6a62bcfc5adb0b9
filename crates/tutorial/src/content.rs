//! Static tutorial content.

use indexmap::IndexMap;
use rider_core::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// Kind-specific payload of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    Text,
    Video,
    Quiz {
        question: String,
        options: Vec<String>,
        correct_index: usize,
        #[serde(default)]
        explanation: Option<String>,
    },
    Checklist {
        items: Vec<String>,
    },
    Interactive,
}

/// One step of a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonStep {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub media: Option<String>,
    #[serde(flatten)]
    pub kind: StepKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub pro_only: bool,
    pub steps: Vec<LessonStep>,
}

impl Lesson {
    pub fn step(&self, step_id: &str) -> Option<&LessonStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Zero-based position of a step.
    pub fn position(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tutorial {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub pro_only: bool,
    pub lessons: Vec<Lesson>,
}

impl Tutorial {
    pub fn lesson(&self, lesson_id: &str) -> Option<&Lesson> {
        self.lessons.iter().find(|l| l.id == lesson_id)
    }
}

/// All tutorials known to the engine, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    tutorials: IndexMap<String, Tutorial>,
}

impl Catalog {
    /// Build a catalog, checking ids and quiz answers.
    pub fn new(tutorials: Vec<Tutorial>) -> Result<Self> {
        let mut map = IndexMap::with_capacity(tutorials.len());
        for tutorial in tutorials {
            validate(&tutorial)?;
            if map.contains_key(&tutorial.id) {
                return Err(CoreError::validation(format!(
                    "duplicate tutorial id {}",
                    tutorial.id
                )));
            }
            map.insert(tutorial.id.clone(), tutorial);
        }
        Ok(Self { tutorials: map })
    }

    /// Parse a JSON array of tutorials.
    pub fn from_json(raw: &str) -> Result<Self> {
        let tutorials: Vec<Tutorial> = serde_json::from_str(raw)
            .map_err(|e| CoreError::validation(format!("invalid tutorial catalog: {}", e)))?;
        Self::new(tutorials)
    }

    pub fn tutorial(&self, tutorial_id: &str) -> Option<&Tutorial> {
        self.tutorials.get(tutorial_id)
    }

    pub fn tutorials(&self) -> impl Iterator<Item = &Tutorial> {
        self.tutorials.values()
    }

    /// Look up a tutorial and one of its lessons, or fail with a validation error.
    pub fn resolve(&self, tutorial_id: &str, lesson_id: &str) -> Result<(&Tutorial, &Lesson)> {
        let tutorial = self
            .tutorial(tutorial_id)
            .ok_or_else(|| CoreError::validation(format!("unknown tutorial {}", tutorial_id)))?;
        let lesson = tutorial.lesson(lesson_id).ok_or_else(|| {
            CoreError::validation(format!(
                "unknown lesson {} in tutorial {}",
                lesson_id, tutorial_id
            ))
        })?;
        Ok((tutorial, lesson))
    }
}

fn validate(tutorial: &Tutorial) -> Result<()> {
    let mut lesson_ids = std::collections::HashSet::new();
    for lesson in &tutorial.lessons {
        if !lesson_ids.insert(lesson.id.as_str()) {
            return Err(CoreError::validation(format!(
                "duplicate lesson id {} in tutorial {}",
                lesson.id, tutorial.id
            )));
        }

        let mut step_ids = std::collections::HashSet::new();
        for step in &lesson.steps {
            if !step_ids.insert(step.id.as_str()) {
                return Err(CoreError::validation(format!(
                    "duplicate step id {} in lesson {}",
                    step.id, lesson.id
                )));
            }
            if let StepKind::Quiz {
                options,
                correct_index,
                ..
            } = &step.kind
            {
                if *correct_index >= options.len() {
                    return Err(CoreError::validation(format!(
                        "quiz step {} has no option {}",
                        step.id, correct_index
                    )));
                }
            }
        }
    }
    Ok(())
}
