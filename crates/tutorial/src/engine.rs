//! Tutorial progress engine.
//!
//! All progress of a user is one JSON map under `tutorial_progress_<userId>`;
//! writes hold the engine's lock across the whole read-modify-write.

use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use rider_core::{CoreError, ErrorKind, IdentityGateway, LocalStore, Result, StoreKey};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::achievements::{achievements, Achievement};
use crate::content::{Catalog, Lesson, StepKind};
use crate::gates::{evaluate_step, StepResponse, QUIZ_PASS_SCORE};
use crate::progress::{LessonProgress, ResumePoint, TutorialProgress};

type ProgressMap = IndexMap<String, TutorialProgress>;

/// Drives lesson and step progress for the signed-in user.
pub struct TutorialEngine {
    identity: Arc<IdentityGateway>,
    store: LocalStore,
    catalog: Arc<Catalog>,
    write_lock: Mutex<()>,
}

impl TutorialEngine {
    pub fn new(identity: Arc<IdentityGateway>, store: LocalStore, catalog: Arc<Catalog>) -> Self {
        Self {
            identity,
            store,
            catalog,
            write_lock: Mutex::new(()),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Open a lesson, creating progress entries as needed.
    ///
    /// Existing progress for the lesson is kept. Pro-only content requires a
    /// pro member.
    pub async fn start_lesson(
        &self,
        user_id: &str,
        tutorial_id: &str,
        lesson_id: &str,
    ) -> Result<LessonProgress> {
        self.identity.require_self(user_id).await?;
        let (tutorial, lesson) = self.catalog.resolve(tutorial_id, lesson_id)?;
        if (tutorial.pro_only || lesson.pro_only) && !self.is_pro_member(user_id).await? {
            info!(user_id, tutorial_id, lesson_id, "Pro-only lesson refused");
            return Err(CoreError::ProRequired(lesson.title.clone()));
        }

        self.update(user_id, |map| {
            let now = Utc::now();
            let progress = map
                .entry(tutorial_id.to_string())
                .or_insert_with(|| TutorialProgress::new(tutorial_id, now));
            progress.current_lesson_id = Some(lesson_id.to_string());
            progress.last_accessed = now;

            let lesson_progress = progress
                .lessons
                .entry(lesson_id.to_string())
                .or_insert_with(|| LessonProgress::new(lesson_id));
            lesson_progress.started_at.get_or_insert(now);
            Ok(lesson_progress.clone())
        })
        .await
    }

    /// Mark a step complete. Repeating a step only updates its quiz score.
    ///
    /// Quiz steps need a score; other kinds must not carry one.
    pub async fn complete_step(
        &self,
        user_id: &str,
        tutorial_id: &str,
        lesson_id: &str,
        step_id: &str,
        quiz_score: Option<u8>,
    ) -> Result<LessonProgress> {
        self.identity.require_self(user_id).await?;
        let (_, lesson) = self.catalog.resolve(tutorial_id, lesson_id)?;
        let position = lesson
            .position(step_id)
            .ok_or_else(|| CoreError::validation(format!("unknown step {}", step_id)))?;
        check_score(lesson, position, quiz_score)?;

        self.update(user_id, |map| {
            let progress = started(map, tutorial_id, lesson_id)?;
            progress.last_accessed = Utc::now();
            let lesson_progress = progress
                .lessons
                .get_mut(lesson_id)
                .ok_or_else(|| not_started(lesson_id))?;

            let first_time = lesson_progress.completed_step_ids.insert(step_id.to_string());
            if let Some(score) = quiz_score {
                lesson_progress.quiz_scores.insert(step_id.to_string(), score);
            }
            lesson_progress.current_step_index = lesson_progress
                .current_step_index
                .max(position + 1)
                .min(lesson.steps.len());

            debug!(user_id, lesson_id, step_id, first_time, "Step completed");
            Ok(lesson_progress.clone())
        })
        .await
    }

    /// Evaluate the step's gate against `response`, then complete it.
    pub async fn submit_step(
        &self,
        user_id: &str,
        tutorial_id: &str,
        lesson_id: &str,
        step_id: &str,
        response: &StepResponse,
    ) -> Result<LessonProgress> {
        let (_, lesson) = self.catalog.resolve(tutorial_id, lesson_id)?;
        let step = lesson
            .step(step_id)
            .ok_or_else(|| CoreError::validation(format!("unknown step {}", step_id)))?;
        let score = evaluate_step(step, response)?;
        self.complete_step(user_id, tutorial_id, lesson_id, step_id, score)
            .await
    }

    /// Finish a lesson whose steps are all complete.
    pub async fn complete_lesson(
        &self,
        user_id: &str,
        tutorial_id: &str,
        lesson_id: &str,
        time_spent_s: u64,
    ) -> Result<TutorialProgress> {
        self.identity.require_self(user_id).await?;
        let (tutorial, lesson) = self.catalog.resolve(tutorial_id, lesson_id)?;
        let lesson_count = tutorial.lessons.len();

        self.update(user_id, |map| {
            let now = Utc::now();
            let progress = started(map, tutorial_id, lesson_id)?;
            let lesson_progress = progress
                .lessons
                .get_mut(lesson_id)
                .ok_or_else(|| not_started(lesson_id))?;

            let remaining = lesson
                .steps
                .iter()
                .filter(|s| !lesson_progress.completed_step_ids.contains(&s.id))
                .count();
            if remaining > 0 {
                return Err(CoreError::validation(format!(
                    "{} step(s) of {} are not complete",
                    remaining, lesson_id
                )));
            }

            lesson_progress.is_completed = true;
            lesson_progress.completed_at.get_or_insert(now);
            lesson_progress.current_step_index = lesson.steps.len();
            lesson_progress.time_spent_s += time_spent_s;

            progress.completed_lesson_ids.insert(lesson_id.to_string());
            progress.total_time_spent_s += time_spent_s;
            progress.last_accessed = now;
            progress.recompute_pct(lesson_count);

            info!(
                user_id,
                tutorial_id,
                lesson_id,
                pct = progress.total_progress_pct,
                "Lesson completed"
            );
            Ok(progress.clone())
        })
        .await
    }

    pub async fn get_lesson_progress(
        &self,
        user_id: &str,
        tutorial_id: &str,
        lesson_id: &str,
    ) -> Result<Option<LessonProgress>> {
        Ok(self
            .get_tutorial_progress(user_id, tutorial_id)
            .await?
            .and_then(|mut p| p.lessons.swap_remove(lesson_id)))
    }

    pub async fn get_tutorial_progress(
        &self,
        user_id: &str,
        tutorial_id: &str,
    ) -> Result<Option<TutorialProgress>> {
        Ok(self.load(user_id).await?.swap_remove(tutorial_id))
    }

    /// Progress of every tutorial the user has started.
    pub async fn all_progress(&self, user_id: &str) -> Result<Vec<TutorialProgress>> {
        Ok(self.load(user_id).await?.into_values().collect())
    }

    /// Drop all progress for one tutorial. Returns true if there was any.
    pub async fn reset(&self, user_id: &str, tutorial_id: &str) -> Result<bool> {
        self.identity.require_self(user_id).await?;
        let removed = self
            .update(user_id, |map| Ok(map.shift_remove(tutorial_id).is_some()))
            .await?;
        if removed {
            info!(user_id, tutorial_id, "Tutorial progress reset");
        }
        Ok(removed)
    }

    /// The lesson and step the user was last on.
    pub async fn resume_point(&self, user_id: &str, tutorial_id: &str) -> Result<Option<ResumePoint>> {
        let Some(progress) = self.get_tutorial_progress(user_id, tutorial_id).await? else {
            return Ok(None);
        };
        let Some(lesson_id) = progress.current_lesson_id else {
            return Ok(None);
        };

        let step_index = progress
            .lessons
            .get(&lesson_id)
            .map_or(0, |l| l.current_step_index);
        let step_id = self
            .catalog
            .tutorial(tutorial_id)
            .and_then(|t| t.lesson(&lesson_id))
            .and_then(|l| l.steps.get(step_index))
            .map(|s| s.id.clone());

        Ok(Some(ResumePoint {
            lesson_id,
            step_index,
            step_id,
        }))
    }

    /// Achievements earned in one tutorial.
    pub async fn achievements(&self, user_id: &str, tutorial_id: &str) -> Result<Vec<Achievement>> {
        Ok(self
            .get_tutorial_progress(user_id, tutorial_id)
            .await?
            .map(|p| achievements(&p))
            .unwrap_or_default())
    }

    /// Pro status from the profile, or from the stored subscription when the
    /// remote store is unreachable.
    pub async fn is_pro_member(&self, user_id: &str) -> Result<bool> {
        match self.identity.get_profile(user_id).await {
            Ok(profile) => Ok(profile.is_some_and(|p| p.is_pro_member)),
            Err(err) if matches!(err.kind(), ErrorKind::Network | ErrorKind::Timeout) => {
                warn!(user_id, error = %err, "Profile unavailable, using subscription snapshot");
                Ok(self
                    .store
                    .subscription(user_id)
                    .await?
                    .is_some_and(|s| s.grants_pro_at(Utc::now())))
            }
            Err(err) => Err(err),
        }
    }

    async fn load(&self, user_id: &str) -> Result<ProgressMap> {
        Ok(self
            .store
            .get(&StoreKey::TutorialProgress(user_id.to_string()))
            .await?
            .unwrap_or_default())
    }

    async fn update<T>(
        &self,
        user_id: &str,
        apply: impl FnOnce(&mut ProgressMap) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load(user_id).await?;
        let value = apply(&mut map)?;
        self.store
            .put(&StoreKey::TutorialProgress(user_id.to_string()), &map)
            .await?;
        Ok(value)
    }
}

fn check_score(lesson: &Lesson, position: usize, quiz_score: Option<u8>) -> Result<()> {
    let is_quiz = matches!(lesson.steps[position].kind, StepKind::Quiz { .. });
    match (is_quiz, quiz_score) {
        (true, None) => Err(CoreError::validation("quiz answer missing")),
        (true, Some(score)) if score > QUIZ_PASS_SCORE => Err(CoreError::validation(format!(
            "quiz score {} is out of range",
            score
        ))),
        (false, Some(_)) => Err(CoreError::validation("only quiz steps take a score")),
        _ => Ok(()),
    }
}

fn started<'a>(
    map: &'a mut ProgressMap,
    tutorial_id: &str,
    lesson_id: &str,
) -> Result<&'a mut TutorialProgress> {
    map.get_mut(tutorial_id).ok_or_else(|| not_started(lesson_id))
}

fn not_started(lesson_id: &str) -> CoreError {
    CoreError::validation(format!("lesson {} has not been started", lesson_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use database::Database;
    use rider_core::{AuthPrincipal, SubscriptionSnapshot};

    use crate::content::{LessonStep, Tutorial};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn step(id: &str, kind: StepKind) -> LessonStep {
        LessonStep {
            id: id.to_string(),
            title: id.to_string(),
            body: String::new(),
            media: None,
            kind,
        }
    }

    fn catalog() -> Catalog {
        let quiz = StepKind::Quiz {
            question: "Which option?".to_string(),
            options: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            correct_index: 1,
            explanation: Some("B is the near side".to_string()),
        };
        let basics = Tutorial {
            id: "basics".to_string(),
            title: "Riding Basics".to_string(),
            pro_only: false,
            lessons: vec![
                Lesson {
                    id: "mounting".to_string(),
                    title: "Mounting".to_string(),
                    pro_only: false,
                    steps: vec![
                        step("intro", StepKind::Text),
                        step("quiz", quiz),
                        step(
                            "tack",
                            StepKind::Checklist {
                                items: vec!["Girth".to_string(), "Stirrups".to_string()],
                            },
                        ),
                    ],
                },
                Lesson {
                    id: "walking".to_string(),
                    title: "Walking".to_string(),
                    pro_only: false,
                    steps: vec![step("video", StepKind::Video)],
                },
                Lesson {
                    id: "flying-changes".to_string(),
                    title: "Flying Changes".to_string(),
                    pro_only: true,
                    steps: vec![step("demo", StepKind::Interactive)],
                },
            ],
        };
        Catalog::new(vec![basics]).unwrap()
    }

    async fn engine_with(db: Database) -> (Arc<IdentityGateway>, TutorialEngine) {
        let identity = Arc::new(IdentityGateway::new(db.clone(), TIMEOUT));
        let engine = TutorialEngine::new(
            identity.clone(),
            LocalStore::new(db, TIMEOUT),
            Arc::new(catalog()),
        );
        identity
            .sign_in(AuthPrincipal {
                user_id: "alex".to_string(),
                display_name: Some("Alex".to_string()),
            })
            .await
            .unwrap();
        (identity, engine)
    }

    async fn engine() -> TutorialEngine {
        engine_with(Database::in_memory().await.unwrap()).await.1
    }

    #[tokio::test]
    async fn test_start_lesson_keeps_existing_progress() {
        let engine = engine().await;
        engine.start_lesson("alex", "basics", "mounting").await.unwrap();
        engine
            .complete_step("alex", "basics", "mounting", "intro", None)
            .await
            .unwrap();

        let again = engine.start_lesson("alex", "basics", "mounting").await.unwrap();
        assert_eq!(again.completed_step_ids.len(), 1);
        assert!(again.started_at.is_some());

        let progress = engine.get_tutorial_progress("alex", "basics").await.unwrap().unwrap();
        assert_eq!(progress.current_lesson_id.as_deref(), Some("mounting"));
    }

    #[tokio::test]
    async fn test_quiz_step_completion() {
        let engine = engine().await;
        engine.start_lesson("alex", "basics", "mounting").await.unwrap();

        let err = engine
            .complete_step("alex", "basics", "mounting", "quiz", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let wrong = StepResponse::Quiz {
            selected: Some(0),
            submitted: true,
        };
        let progress = engine
            .submit_step("alex", "basics", "mounting", "quiz", &wrong)
            .await
            .unwrap();
        assert_eq!(progress.quiz_scores["quiz"], 0);
        assert!(progress.completed_step_ids.contains("quiz"));

        let right = StepResponse::Quiz {
            selected: Some(1),
            submitted: true,
        };
        let progress = engine
            .submit_step("alex", "basics", "mounting", "quiz", &right)
            .await
            .unwrap();
        assert_eq!(progress.quiz_scores["quiz"], 100);
        assert_eq!(progress.completed_step_ids.len(), 1);
        assert_eq!(progress.current_step_index, 2);
    }

    #[tokio::test]
    async fn test_step_index_never_moves_back() {
        let engine = engine().await;
        engine.start_lesson("alex", "basics", "mounting").await.unwrap();
        engine
            .submit_step(
                "alex",
                "basics",
                "mounting",
                "tack",
                &StepResponse::Checklist { checked: vec![0, 1] },
            )
            .await
            .unwrap();
        let progress = engine
            .complete_step("alex", "basics", "mounting", "intro", None)
            .await
            .unwrap();
        assert_eq!(progress.current_step_index, 3);
        let order: Vec<_> = progress.completed_step_ids.iter().map(String::as_str).collect();
        assert_eq!(order, vec!["tack", "intro"]);
    }

    #[tokio::test]
    async fn test_complete_lesson_requires_all_steps() {
        let engine = engine().await;
        engine.start_lesson("alex", "basics", "walking").await.unwrap();

        let err = engine
            .complete_lesson("alex", "basics", "walking", 60)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        engine
            .submit_step("alex", "basics", "walking", "video", &StepResponse::Next)
            .await
            .unwrap();
        let progress = engine
            .complete_lesson("alex", "basics", "walking", 60)
            .await
            .unwrap();
        assert_eq!(progress.total_progress_pct, 33);
        assert_eq!(progress.total_time_spent_s, 60);

        let lesson = &progress.lessons["walking"];
        assert!(lesson.is_completed);
        assert!(lesson.completed_at.is_some());

        assert_eq!(
            engine.achievements("alex", "basics").await.unwrap(),
            vec![Achievement::FirstSteps]
        );
    }

    #[tokio::test]
    async fn test_step_before_start_is_rejected() {
        let engine = engine().await;
        let err = engine
            .complete_step("alex", "basics", "walking", "video", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_writes_need_matching_user() {
        let engine = engine().await;
        let err = engine
            .start_lesson("bea", "basics", "mounting")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn test_pro_gating() {
        let (identity, engine) = engine_with(Database::in_memory().await.unwrap()).await;

        let err = engine
            .start_lesson("alex", "basics", "flying-changes")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProRequired);

        // Six years of experience derives pro membership.
        identity
            .update_profile(
                "alex",
                &rider_core::ProfilePatch {
                    experience: Some(6),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(engine
            .start_lesson("alex", "basics", "flying-changes")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_pro_falls_back_to_subscription_offline() {
        let remote = Database::in_memory().await.unwrap();
        let local = Database::in_memory().await.unwrap();
        let identity = Arc::new(IdentityGateway::new(remote.clone(), TIMEOUT));
        let store = LocalStore::new(local, TIMEOUT);
        let engine = TutorialEngine::new(identity.clone(), store.clone(), Arc::new(catalog()));
        identity
            .sign_in(AuthPrincipal {
                user_id: "alex".to_string(),
                display_name: None,
            })
            .await
            .unwrap();

        store
            .save_subscription(
                "alex",
                &SubscriptionSnapshot {
                    plan: "pro_monthly".to_string(),
                    active: true,
                    is_trial: false,
                    expires_at: None,
                },
            )
            .await
            .unwrap();

        // Online, the profile wins.
        assert!(!engine.is_pro_member("alex").await.unwrap());

        remote.close().await;
        assert!(engine.is_pro_member("alex").await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_and_resume_point() {
        let engine = engine().await;
        assert!(engine.resume_point("alex", "basics").await.unwrap().is_none());

        engine.start_lesson("alex", "basics", "mounting").await.unwrap();
        engine
            .complete_step("alex", "basics", "mounting", "intro", None)
            .await
            .unwrap();
        let resume = engine.resume_point("alex", "basics").await.unwrap().unwrap();
        assert_eq!(resume.lesson_id, "mounting");
        assert_eq!(resume.step_index, 1);
        assert_eq!(resume.step_id.as_deref(), Some("quiz"));

        assert!(engine.reset("alex", "basics").await.unwrap());
        assert!(!engine.reset("alex", "basics").await.unwrap());
        assert!(engine
            .get_lesson_progress("alex", "basics", "mounting")
            .await
            .unwrap()
            .is_none());
    }
}
