use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use time::macros::datetime;
use time::OffsetDateTime;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};

use crate::core::config::EngineSettings;
use crate::core::time::ManualClock;
use crate::db::types::{AssessmentKind, SubmissionStatus};
use crate::repositories::memory::InMemoryStore;
use crate::repositories::{StoreError, SubmissionStore};
use crate::schemas::assessment::{AnswerOption, Assessment, Question, QuestionKind};
use crate::schemas::submission::Submission;
use crate::services::engine::GradingEngine;
use crate::services::manual_grading::ManualScoreRequest;
use crate::services::notifications::GradedNotifier;

pub(crate) const MIXED_ASSESSMENT_ID: &str = "quiz-mixed";
pub(crate) const MCQ1_ID: &str = "mcq-1";
pub(crate) const MCQ1_CORRECT: &str = "mcq-1-b";
pub(crate) const MCQ2_ID: &str = "mcq-2";
pub(crate) const MCQ2_WRONG: &str = "mcq-2-a";
pub(crate) const ESSAY_ID: &str = "essay-1";

pub(crate) const OBJECTIVE_ASSESSMENT_ID: &str = "quiz-objective";

pub(crate) const REVIEW_ASSESSMENT_ID: &str = "quiz-review";
pub(crate) const OPEN_SHORT_ID: &str = "short-open";

const ENGINE_ENV_VARS: &[&str] = &[
    "DATABASE_URL",
    "DATABASE_MAX_CONNECTIONS",
    "DATABASE_ACQUIRE_TIMEOUT_SECONDS",
    "POSTGRES_SERVER",
    "POSTGRES_PORT",
    "POSTGRES_USER",
    "POSTGRES_PASSWORD",
    "POSTGRES_DB",
    "SWEEP_INTERVAL_SECONDS",
    "RECOVERY_INTERVAL_SECONDS",
    "MAX_CONFLICT_RETRIES",
    "LABEL_PROVISIONAL_SCORES",
    "MAX_FEEDBACK_LENGTH",
    "ASSESSMENT_LOG_LEVEL",
    "ASSESSMENT_LOG_JSON",
    "METRICS_PORT",
];

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    dotenvy::dotenv().ok();

    std::env::set_var("ASSESSMENT_ENV", "test");
    std::env::set_var("ASSESSMENT_STRICT_CONFIG", "0");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::remove_var("ENVIRONMENT");
    for key in ENGINE_ENV_VARS {
        std::env::remove_var(key);
    }
}

pub(crate) fn t0() -> OffsetDateTime {
    datetime!(2025-03-10 09:00 UTC)
}

pub(crate) struct Fixture {
    pub(crate) assessment: Assessment,
    pub(crate) questions: Vec<Question>,
}

fn assessment(id: &str, title: &str, total_points: f64, passing_points: f64) -> Assessment {
    Assessment {
        id: id.to_string(),
        title: title.to_string(),
        kind: AssessmentKind::Quiz,
        duration_minutes: None,
        total_points,
        passing_points,
        start_time: None,
        end_time: None,
        max_attempts: None,
        show_results_immediately: true,
    }
}

fn question(assessment_id: &str, id: &str, order_index: i32, points: f64, kind: QuestionKind) -> Question {
    Question {
        id: id.to_string(),
        assessment_id: assessment_id.to_string(),
        prompt: format!("Question {order_index}"),
        points,
        order_index,
        kind,
    }
}

fn options(question_id: &str, labels: &[&str], correct: usize) -> Vec<AnswerOption> {
    labels
        .iter()
        .enumerate()
        .map(|(index, label)| AnswerOption {
            id: format!("{question_id}-{}", (b'a' + index as u8) as char),
            label: label.to_string(),
            is_correct: index == correct,
        })
        .collect()
}

/// Two 5-point multiple-choice questions and a 10-point essay; passing at 10.
pub(crate) fn mixed_assessment() -> Fixture {
    let id = MIXED_ASSESSMENT_ID;
    Fixture {
        assessment: assessment(id, "Ownership basics", 20.0, 10.0),
        questions: vec![
            question(id, MCQ1_ID, 1, 5.0, QuestionKind::MultipleChoice {
                options: options(MCQ1_ID, &["Copy", "Move", "Clone"], 1),
            }),
            question(id, MCQ2_ID, 2, 5.0, QuestionKind::MultipleChoice {
                options: options(MCQ2_ID, &["Stack", "Heap"], 1),
            }),
            question(id, ESSAY_ID, 3, 10.0, QuestionKind::Essay),
        ],
    }
}

/// Only auto-gradable questions: 3-point MCQ, 2-point true/false, 3-point keyed short answer.
pub(crate) fn objective_assessment() -> Fixture {
    let id = OBJECTIVE_ASSESSMENT_ID;
    let true_false = vec![
        AnswerOption { id: "tf-1-true".into(), label: "True".into(), is_correct: true },
        AnswerOption { id: "tf-1-false".into(), label: "False".into(), is_correct: false },
    ];
    Fixture {
        assessment: assessment(id, "Borrowing drill", 8.0, 4.0),
        questions: vec![
            question(id, "mcq-o", 1, 3.0, QuestionKind::MultipleChoice {
                options: options("mcq-o", &["Rc", "Arc"], 1),
            }),
            question(id, "tf-1", 2, 2.0, QuestionKind::TrueFalse { options: true_false }),
            question(id, "short-1", 3, 3.0, QuestionKind::ShortAnswer {
                model_answer: Some("borrow checker".into()),
            }),
        ],
    }
}

/// Two answers need a human: the 10-point essay and a 6-point short answer without a key.
/// A 4-point MCQ is auto-graded; passing at 12.
pub(crate) fn review_assessment() -> Fixture {
    let id = REVIEW_ASSESSMENT_ID;
    Fixture {
        assessment: assessment(id, "Lifetimes in practice", 20.0, 12.0),
        questions: vec![
            question(id, MCQ1_ID, 1, 4.0, QuestionKind::MultipleChoice {
                options: options(MCQ1_ID, &["'static", "'a", "'_"], 1),
            }),
            question(id, OPEN_SHORT_ID, 2, 6.0, QuestionKind::ShortAnswer { model_answer: None }),
            question(id, ESSAY_ID, 3, 10.0, QuestionKind::Essay),
        ],
    }
}

pub(crate) fn essay_score(submission_id: &str, points: f64) -> ManualScoreRequest {
    ManualScoreRequest {
        submission_id: submission_id.to_string(),
        question_id: ESSAY_ID.to_string(),
        points,
        feedback: Some("Well argued".to_string()),
        grader_id: "instructor-1".to_string(),
    }
}

/// Reads through to the in-memory store but loses every versioned write, as if another
/// writer always got there first.
pub(crate) struct ContendedSubmissions {
    inner: Arc<InMemoryStore>,
    update_calls: AtomicU32,
}

impl ContendedSubmissions {
    pub(crate) fn update_calls(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubmissionStore for ContendedSubmissions {
    async fn create(&self, submission: &Submission) -> Result<Submission, StoreError> {
        self.inner.create(submission).await
    }

    async fn get(&self, id: &str) -> Result<Submission, StoreError> {
        SubmissionStore::get(self.inner.as_ref(), id).await
    }

    async fn update(&self, _submission: &Submission, _expected_version: i64) -> Result<Submission, StoreError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Conflict)
    }

    async fn list_by_student_and_assessment(
        &self,
        student_id: &str,
        assessment_id: &str,
    ) -> Result<Vec<Submission>, StoreError> {
        self.inner.list_by_student_and_assessment(student_id, assessment_id).await
    }

    async fn list_by_assessment(&self, assessment_id: &str) -> Result<Vec<Submission>, StoreError> {
        SubmissionStore::list_by_assessment(self.inner.as_ref(), assessment_id).await
    }

    async fn list_by_status(
        &self,
        status: SubmissionStatus,
        limit: i64,
    ) -> Result<Vec<Submission>, StoreError> {
        self.inner.list_by_status(status, limit).await
    }

    async fn list_expired_in_progress(
        &self,
        now: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Submission>, StoreError> {
        self.inner.list_expired_in_progress(now, limit).await
    }
}

/// Forwards every graded submission to the test.
struct RecordingNotifier {
    sender: mpsc::UnboundedSender<Submission>,
}

#[async_trait]
impl GradedNotifier for RecordingNotifier {
    async fn on_submission_graded(&self, submission: &Submission) -> anyhow::Result<()> {
        self.sender.send(submission.clone())?;
        Ok(())
    }
}

pub(crate) struct TestEngine {
    pub(crate) engine: GradingEngine,
    pub(crate) store: Arc<InMemoryStore>,
    pub(crate) clock: Arc<ManualClock>,
    notifier: Arc<dyn GradedNotifier>,
    notifications: mpsc::UnboundedReceiver<Submission>,
    settings: EngineSettings,
    contended: Option<Arc<ContendedSubmissions>>,
}

impl TestEngine {
    fn rebuild(mut self) -> Self {
        let submissions: Arc<dyn SubmissionStore> = match &self.contended {
            Some(contended) => contended.clone() as Arc<dyn SubmissionStore>,
            None => self.store.clone() as Arc<dyn SubmissionStore>,
        };
        self.engine = GradingEngine::builder(self.store.clone(), self.store.clone(), submissions)
            .clock(self.clock.clone())
            .notifier(self.notifier.clone())
            .settings(self.settings.clone())
            .build();
        self
    }

    pub(crate) fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self.rebuild()
    }

    pub(crate) fn with_notifier(mut self, notifier: Arc<dyn GradedNotifier>) -> Self {
        self.notifier = notifier;
        self.rebuild()
    }

    /// Every submission update from now on fails with a version conflict.
    pub(crate) fn with_contended_updates(mut self) -> Self {
        self.contended = Some(Arc::new(ContendedSubmissions {
            inner: self.store.clone(),
            update_calls: AtomicU32::new(0),
        }));
        self.rebuild()
    }

    pub(crate) fn contended_update_calls(&self) -> u32 {
        self.contended.as_ref().map_or(0, |contended| contended.update_calls())
    }

    pub(crate) async fn next_notification(&mut self) -> Submission {
        tokio::time::timeout(Duration::from_secs(1), self.notifications.recv())
            .await
            .expect("graded notification timed out")
            .expect("notifier channel closed")
    }

    /// Gives spawned notifier tasks a chance to run, then checks none fired.
    pub(crate) async fn assert_no_notification(&mut self) {
        let received = tokio::time::timeout(Duration::from_millis(50), self.notifications.recv()).await;
        if let Ok(Some(submission)) = received {
            panic!("unexpected graded notification for {} ({:?})", submission.id, submission.status);
        }
    }
}

/// Engine over an in-memory store holding `fixture`, with the clock frozen at [`t0`].
pub(crate) async fn engine_with(fixture: Fixture) -> TestEngine {
    let store = Arc::new(InMemoryStore::new());
    store
        .put_assessment(fixture.assessment, fixture.questions)
        .await
        .expect("fixture questions are well-formed");

    let (sender, notifications) = mpsc::unbounded_channel();
    let test_engine = TestEngine {
        engine: GradingEngine::with_store(store.clone()).build(),
        store,
        clock: Arc::new(ManualClock::new(t0())),
        notifier: Arc::new(RecordingNotifier { sender }),
        notifications,
        settings: EngineSettings::default(),
        contended: None,
    };
    test_engine.rebuild()
}
