use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use super::state::{ReplayMachine, ReplayReport, ReplayState, Transition};
use crate::clock::Clock;
use crate::error::{EngineError, ExecutorError};
use crate::executor::{NoResponder, ScreeningResponder, StepExecutor, classify_question};
use crate::store::TemplateStore;
use crate::workflow::{Case, StepKind, WorkflowStep};

/// Knobs for how a replay talks to the executor.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Upper bound for a single executor call.
    pub step_timeout: Duration,
    /// Base delay between attempts of the same step. Zero retries immediately;
    /// otherwise attempt `n` waits `retry_backoff * 2^(n-1)`.
    pub retry_backoff: Duration,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(30),
            retry_backoff: Duration::ZERO,
        }
    }
}

impl ReplayOptions {
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Executes stored templates against cases.
///
/// The replayer never edits a template directly; statistics go through
/// [`TemplateStore::record_replay_outcome`].
pub struct Replayer<E, R = NoResponder> {
    store: Arc<TemplateStore>,
    executor: E,
    responder: Option<R>,
    clock: Arc<dyn Clock>,
    options: ReplayOptions,
}

impl<E: StepExecutor> Replayer<E, NoResponder> {
    pub fn new(store: Arc<TemplateStore>, executor: E, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            executor,
            responder: None,
            clock,
            options: ReplayOptions::default(),
        }
    }
}

impl<E: StepExecutor, R: ScreeningResponder> Replayer<E, R> {
    /// Route screening-question steps through `responder`.
    pub fn with_responder<R2: ScreeningResponder>(self, responder: R2) -> Replayer<E, R2> {
        Replayer {
            store: self.store,
            executor: self.executor,
            responder: Some(responder),
            clock: self.clock,
            options: self.options,
        }
    }

    pub fn with_options(mut self, options: ReplayOptions) -> Self {
        self.options = options;
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Replay the template `template_id` against `case`.
    ///
    /// Fails with [`EngineError::TemplateNotFound`] before touching anything
    /// if the template does not exist. Otherwise runs every step in order,
    /// then folds the outcome into the template's statistics. A failed
    /// statistics write is returned as an error even though the steps ran.
    pub async fn replay(&self, template_id: &str, case: &Case) -> Result<ReplayReport, EngineError> {
        let template = self
            .store
            .get(template_id)?
            .ok_or_else(|| EngineError::TemplateNotFound(template_id.to_string()))?;

        tracing::info!(template = %template.name, case = %case.title, "Replaying workflow");
        let started_at = self.clock.now();
        let mut machine = ReplayMachine::new(template.steps.len());
        let mut transition = machine.start();

        while let Transition::Next(index) = transition {
            let step = &template.steps[index];
            let (attempts, error) = self.run_step(step, case).await;
            transition = machine.step_finished(step, attempts, error);

            if machine.state() == ReplayState::Failed {
                tracing::warn!(step = %step.label(), attempts, "Required step failed, aborting replay");
                break;
            }
            if !step.delay_after.is_zero() {
                sleep(step.delay_after).await;
            }
        }

        let state = machine.state();
        let succeeded = state == ReplayState::Succeeded;
        let finished_at = self.clock.now();
        let updated = self
            .store
            .record_replay_outcome(&template.id, succeeded, finished_at)?;

        tracing::info!(
            template = %template.name,
            %state,
            usage_count = updated.usage_count,
            success_rate = updated.success_rate,
            "Replay finished"
        );

        let aborted_at = if succeeded {
            None
        } else {
            machine.reports().last().map(|r| r.step_id.clone())
        };

        Ok(ReplayReport {
            template_id: template.id,
            template_name: template.name,
            case_id: case.id.clone(),
            state,
            steps: machine.reports().to_vec(),
            aborted_at,
            started_at,
            finished_at,
        })
    }

    // Returns the number of attempts made and the last error if the step
    // never succeeded.
    async fn run_step(&self, step: &WorkflowStep, case: &Case) -> (u32, Option<String>) {
        let max_attempts = step.max_attempts();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            tracing::debug!(step = %step.label(), attempt, max_attempts, "Executing step");
            match self.attempt(step, case).await {
                Ok(true) => return (attempt, None),
                Ok(false) => {
                    last_error = Some("executor reported failure".to_string());
                }
                Err(e) if !e.is_recoverable() => {
                    tracing::warn!(step = %step.label(), error = %e, "Unrecoverable step error");
                    return (attempt, Some(e.to_string()));
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                }
            }

            if attempt < max_attempts {
                let backoff = self.options.backoff_for_attempt(attempt);
                tracing::debug!(
                    step = %step.label(),
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "Retrying step"
                );
                if !backoff.is_zero() {
                    sleep(backoff).await;
                }
            }
        }

        (max_attempts, last_error)
    }

    async fn attempt(&self, step: &WorkflowStep, case: &Case) -> Result<bool, ExecutorError> {
        let answered;
        let step = if step.kind == StepKind::ScreeningQuestion {
            match self.answer_screening(step, case).await? {
                Some(with_answer) => {
                    answered = with_answer;
                    &answered
                }
                None => step,
            }
        } else {
            step
        };

        match timeout(self.options.step_timeout, self.executor.execute(step, case)).await {
            Ok(result) => result,
            Err(_) => Err(ExecutorError::Timeout),
        }
    }

    // Fill in the step value from the responder, if one is configured.
    async fn answer_screening(
        &self,
        step: &WorkflowStep,
        case: &Case,
    ) -> Result<Option<WorkflowStep>, ExecutorError> {
        let Some(responder) = &self.responder else {
            return Ok(None);
        };
        let question = if step.action.is_empty() {
            step.description.as_str()
        } else {
            step.action.as_str()
        };
        tracing::debug!(kind = classify_question(question).as_str(), "Answering screening question");

        let answer = match timeout(self.options.step_timeout, responder.answer(question, case)).await {
            Ok(answer) => answer?,
            Err(_) => return Err(ExecutorError::Timeout),
        };
        Ok(Some(step.clone().with_value(answer)))
    }
}
