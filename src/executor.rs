//! Boundaries to the outside world: the step executor that actually touches
//! the target surface, and the optional screening-question responder.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::error::ExecutorError;
use crate::workflow::{Case, StepKind, WorkflowStep};

/// Answer given when the responder cannot produce one.
pub const FALLBACK_ANSWER: &str = "I would be happy to discuss this further in an interview.";

/// Performs one atomic step against the target surface.
///
/// Implementations must be safe to call again for the same step: the
/// replayer retries failed attempts. Return `Ok(false)` for an ordinary
/// failure and reserve `Err` for attempts that could not be judged.
pub trait StepExecutor: Send + Sync {
    fn execute(
        &self,
        step: &WorkflowStep,
        case: &Case,
    ) -> impl Future<Output = Result<bool, ExecutorError>> + Send;
}

/// Produces answer text for screening questions.
pub trait ScreeningResponder: Send + Sync {
    fn answer(
        &self,
        question: &str,
        case: &Case,
    ) -> impl Future<Output = Result<String, ExecutorError>> + Send;
}

/// Placeholder responder for replayers configured without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResponder;

impl ScreeningResponder for NoResponder {
    async fn answer(&self, _question: &str, _case: &Case) -> Result<String, ExecutorError> {
        Err(ExecutorError::StepFailed("no screening responder configured".into()))
    }
}

/// Broad category of a screening question, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    YearsExperience,
    SalaryExpectation,
    Availability,
    WorkAuthorization,
    Relocation,
    RemoteWork,
    General,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::YearsExperience => "years_experience",
            QuestionKind::SalaryExpectation => "salary_expectation",
            QuestionKind::Availability => "availability",
            QuestionKind::WorkAuthorization => "work_authorization",
            QuestionKind::Relocation => "relocation",
            QuestionKind::RemoteWork => "remote_work",
            QuestionKind::General => "general",
        }
    }
}

/// Keyword-based question classification. First matching group wins.
pub fn classify_question(question: &str) -> QuestionKind {
    let lower = question.to_lowercase();

    let groups: &[(&[&str], QuestionKind)] = &[
        (&["years", "experience", "long"], QuestionKind::YearsExperience),
        (&["salary", "compensation", "pay"], QuestionKind::SalaryExpectation),
        (&["start", "available", "when"], QuestionKind::Availability),
        (&["authorized", "eligible", "visa"], QuestionKind::WorkAuthorization),
        (&["relocate", "move", "location"], QuestionKind::Relocation),
        (&["remote", "work from home"], QuestionKind::RemoteWork),
    ];

    groups
        .iter()
        .find(|(words, _)| words.iter().any(|w| lower.contains(w)))
        .map(|(_, kind)| *kind)
        .unwrap_or(QuestionKind::General)
}

/// Memoizes answers by question text and substitutes [`FALLBACK_ANSWER`]
/// when the inner responder fails. Fallbacks are not cached.
pub struct CachedResponder<R> {
    inner: R,
    cache: Mutex<HashMap<String, String>>,
}

impl<R> CachedResponder<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn key(question: &str) -> String {
        hex::encode(Sha256::digest(question.as_bytes()))
    }
}

impl<R: ScreeningResponder> ScreeningResponder for CachedResponder<R> {
    async fn answer(&self, question: &str, case: &Case) -> Result<String, ExecutorError> {
        let key = Self::key(question);
        if let Some(hit) = self.cache.lock().ok().and_then(|c| c.get(&key).cloned()) {
            return Ok(hit);
        }

        match self.inner.answer(question, case).await {
            Ok(answer) => {
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(key, answer.clone());
                }
                Ok(answer)
            }
            Err(e) => {
                tracing::error!(error = %e, "Error generating screening response");
                Ok(FALLBACK_ANSWER.to_string())
            }
        }
    }
}

/// Executor that only logs what it would do. Used by the CLI, which has no
/// real target surface to drive.
#[derive(Debug, Clone, Default)]
pub struct SimulatedExecutor {
    failing_selectors: HashSet<String>,
}

impl SimulatedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every step targeting `selector` report failure.
    pub fn with_failing_selector(mut self, selector: impl Into<String>) -> Self {
        self.failing_selectors.insert(selector.into());
        self
    }
}

impl StepExecutor for SimulatedExecutor {
    async fn execute(&self, step: &WorkflowStep, case: &Case) -> Result<bool, ExecutorError> {
        if self.failing_selectors.contains(&step.selector) {
            tracing::debug!(selector = %step.selector, "Simulated failure");
            return Ok(false);
        }
        match step.kind {
            StepKind::Click => tracing::info!(selector = %step.selector, "Clicking element"),
            StepKind::FillForm => tracing::info!(
                selector = %step.selector,
                value = %step.value,
                "Filling field"
            ),
            StepKind::ScreeningQuestion => tracing::info!(
                question = %step.label(),
                organization = %case.organization,
                "Handling screening question"
            ),
            kind => tracing::info!(%kind, "Simulated execution"),
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingResponder {
        calls: AtomicU32,
        fail: bool,
    }

    impl ScreeningResponder for CountingResponder {
        async fn answer(&self, question: &str, _case: &Case) -> Result<String, ExecutorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ExecutorError::Unrecoverable("model offline".into()))
            } else {
                Ok(format!("answer to {question}"))
            }
        }
    }

    #[test]
    fn classify_known_questions() {
        assert_eq!(
            classify_question("How many years of experience do you have with Rust?"),
            QuestionKind::YearsExperience
        );
        assert_eq!(
            classify_question("What are your salary expectations?"),
            QuestionKind::SalaryExpectation
        );
        assert_eq!(classify_question("When can you start?"), QuestionKind::Availability);
        assert_eq!(
            classify_question("Are you authorized to work in Canada?"),
            QuestionKind::WorkAuthorization
        );
        assert_eq!(classify_question("Are you willing to relocate?"), QuestionKind::Relocation);
        assert_eq!(classify_question("Open to remote work?"), QuestionKind::RemoteWork);
        assert_eq!(classify_question("Why this role?"), QuestionKind::General);
    }

    #[tokio::test]
    async fn cached_responder_calls_inner_once() {
        let responder = CachedResponder::new(CountingResponder {
            calls: AtomicU32::new(0),
            fail: false,
        });
        let case = Case::new("Engineer", "Acme");

        let first = responder.answer("Why us?", &case).await.unwrap();
        let second = responder.answer("Why us?", &case).await.unwrap();

        assert_eq!(first, "answer to Why us?");
        assert_eq!(first, second);
        assert_eq!(responder.inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(responder.cached_len(), 1);
    }

    #[tokio::test]
    async fn cached_responder_falls_back_without_caching() {
        let responder = CachedResponder::new(CountingResponder {
            calls: AtomicU32::new(0),
            fail: true,
        });
        let case = Case::new("Engineer", "Acme");

        let answer = responder.answer("Why us?", &case).await.unwrap();
        assert_eq!(answer, FALLBACK_ANSWER);
        responder.answer("Why us?", &case).await.unwrap();
        assert_eq!(responder.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(responder.cached_len(), 0);
    }

    #[tokio::test]
    async fn simulated_executor_fails_configured_selectors() {
        let executor = SimulatedExecutor::new().with_failing_selector("#broken");
        let case = Case::new("Engineer", "Acme");
        let ok = WorkflowStep::new(StepKind::Click, "#apply", "Apply");
        let bad = WorkflowStep::new(StepKind::Click, "#broken", "Broken");

        assert!(executor.execute(&ok, &case).await.unwrap());
        assert!(!executor.execute(&bad, &case).await.unwrap());
    }
}
