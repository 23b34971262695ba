use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::EngineError;
use crate::events::{AutomationEvent, EventBus, EventKind};
use crate::executor::{NoResponder, ScreeningResponder, StepExecutor};
use crate::feed::OpportunityFeed;
use crate::governor::{ApplicationRecord, ApplicationSummary, Eligibility, RateGovernor, SkipReason};
use crate::recorder::{ManualSession, Recorder, TemplateHints};
use crate::replay::{ReplayReport, Replayer};
use crate::store::TemplateStore;
use crate::workflow::{Case, WorkflowTemplate};

/// Lifecycle of the scan loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    Idle,
    Running,
    Stopped,
}

/// Timing of the scan loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Sleep between polls.
    pub poll_interval: Duration,
    /// Sleep after a poll that hit an error.
    pub error_backoff: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            error_backoff: Duration::from_secs(10),
        }
    }
}

/// What happened to one case.
#[derive(Debug, Clone)]
pub enum CaseOutcome {
    /// The governor declined the run; nothing was touched.
    Skipped(SkipReason),
    /// A stored template was replayed. `record` is set only on success.
    Replayed {
        report: ReplayReport,
        record: Option<ApplicationRecord>,
    },
    /// No template fit, so a manual run was recorded as a new one.
    Recorded {
        template: WorkflowTemplate,
        record: ApplicationRecord,
    },
}

/// Counters for one call to [`Orchestrator::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub polls: u32,
    pub skipped: u32,
    pub submitted: u32,
    pub recorded: u32,
    pub failed: u32,
    pub errors: u32,
}

impl RunStats {
    fn absorb(&mut self, outcome: &CaseOutcome) {
        match outcome {
            CaseOutcome::Skipped(_) => self.skipped += 1,
            CaseOutcome::Replayed { record: Some(_), .. } => self.submitted += 1,
            CaseOutcome::Replayed { record: None, .. } => self.failed += 1,
            CaseOutcome::Recorded { .. } => self.recorded += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSummary {
    pub total_templates: usize,
    pub average_success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutomationSummary {
    pub applications: ApplicationSummary,
    pub workflows: WorkflowSummary,
    pub state: LifecycleState,
}

/// Drives cases through eligibility → match → replay-or-record → outcome.
pub struct Orchestrator<E, S, R = NoResponder> {
    store: Arc<TemplateStore>,
    governor: Arc<RateGovernor>,
    recorder: Recorder,
    replayer: Replayer<E, R>,
    // Source of steps when no template fits and the user applies by hand.
    session: S,
    events: EventBus,
    loop_config: LoopConfig,
    // Only `run` moves this out of Idle.
    state: Mutex<LifecycleState>,
}

impl<E, S, R> Orchestrator<E, S, R>
where
    E: StepExecutor,
    S: ManualSession,
    R: ScreeningResponder,
{
    pub fn new(
        store: Arc<TemplateStore>,
        governor: Arc<RateGovernor>,
        replayer: Replayer<E, R>,
        session: S,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            recorder: Recorder::new(store.clone(), clock),
            store,
            governor,
            replayer,
            session,
            events: EventBus::new(),
            loop_config: LoopConfig::default(),
            state: Mutex::new(LifecycleState::Idle),
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_loop_config(mut self, loop_config: LoopConfig) -> Self {
        self.loop_config = loop_config;
        self
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn replayer(&self) -> &Replayer<E, R> {
        &self.replayer
    }

    pub fn state(&self) -> LifecycleState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(LifecycleState::Stopped)
    }

    fn set_state(&self, next: LifecycleState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    /// Handle one detected case end to end.
    pub async fn process_case(&self, case: &Case) -> Result<CaseOutcome, EngineError> {
        if let Eligibility::Skip(reason) = self.governor.check(case)? {
            tracing::info!(title = %case.title, organization = %case.organization, %reason, "Skipping case");
            return Ok(CaseOutcome::Skipped(reason));
        }

        tracing::info!(title = %case.title, organization = %case.organization, "Applying");
        let matches = self.store.find_matching(case)?;
        let Some(best) = matches.into_iter().next() else {
            tracing::info!("No matching workflow found, manual application required");
            return self.record_manual_run(case).await;
        };

        tracing::info!(template = %best.template.name, rule = ?best.rule, "Using workflow template");
        let report = self.replayer.replay(&best.template.id, case).await?;

        let record = if report.succeeded() {
            let record = self.governor.record_outcome(case, Some(&best.template.id))?;
            self.notify(EventKind::ApplicationSubmitted, case, true, Some(&best.template.id));
            Some(record)
        } else {
            self.notify(EventKind::ReplayFailed, case, false, Some(&best.template.id));
            None
        };

        Ok(CaseOutcome::Replayed { report, record })
    }

    // The user applies by hand while every step is recorded; the finished
    // run both becomes a template and counts as a submitted application.
    async fn record_manual_run(&self, case: &Case) -> Result<CaseOutcome, EngineError> {
        let name = format!("{}_{}_application", case.organization, case.category);
        let handle = self.recorder.begin_recording(&name)?;

        let steps = match self.session.collect_steps(case).await {
            Ok(steps) => steps,
            Err(e) => {
                self.recorder.cancel_recording(&handle)?;
                return Err(EngineError::ManualSessionFailed(e));
            }
        };
        for step in steps {
            self.recorder.record_step(&handle, step)?;
        }

        let description = format!("Workflow for {} {} positions", case.organization, case.category);
        let template = self.recorder.finish_recording_with_hints(
            &handle,
            &name,
            &description,
            TemplateHints::from_case(case),
        )?;
        let record = self.governor.record_outcome(case, Some(&template.id))?;
        self.notify(EventKind::WorkflowRecorded, case, true, Some(&template.id));

        Ok(CaseOutcome::Recorded { template, record })
    }

    fn notify(&self, kind: EventKind, case: &Case, success: bool, template_id: Option<&str>) {
        let event = AutomationEvent {
            kind,
            case: case.clone(),
            success,
            template_id: template_id.map(str::to_string),
        };
        if let Err(e) = self.events.emit(&event) {
            tracing::warn!(error = %e, "Some listeners failed");
        }
    }

    /// Finish whatever recording is open, if any.
    pub fn save_current_workflow(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Option<WorkflowTemplate>, EngineError> {
        let Some(handle) = self.recorder.active_handle() else {
            tracing::error!("No active workflow recording");
            return Ok(None);
        };
        let template = self.recorder.finish_recording(&handle, name, description)?;
        Ok(Some(template))
    }

    /// Poll `feed` and process cases until `cancel` fires or the feed runs dry.
    ///
    /// Cancellation is only observed between polls, so a replay in flight
    /// always runs to completion and its statistics are written. Cases the
    /// governor turns away for pacing or the daily cap go back to the feed
    /// and are offered again on a later poll.
    pub async fn run<F: OpportunityFeed>(&self, feed: &mut F, cancel: CancellationToken) -> RunStats {
        tracing::info!("Starting automation");
        self.set_state(LifecycleState::Running);
        let mut stats = RunStats::default();

        while !cancel.is_cancelled() {
            let delay = if self.scan(feed, &mut stats).await {
                self.loop_config.poll_interval
            } else {
                self.loop_config.error_backoff
            };

            if feed.is_exhausted() {
                tracing::info!("Opportunity feed exhausted");
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        self.set_state(LifecycleState::Stopped);
        tracing::info!(
            polls = stats.polls,
            submitted = stats.submitted,
            recorded = stats.recorded,
            skipped = stats.skipped,
            failed = stats.failed,
            errors = stats.errors,
            "Stopping automation"
        );
        stats
    }

    // One poll. Returns false if anything went wrong.
    async fn scan<F: OpportunityFeed>(&self, feed: &mut F, stats: &mut RunStats) -> bool {
        stats.polls += 1;
        let cases = match feed.poll().await {
            Ok(cases) => cases,
            Err(e) => {
                tracing::error!(error = %e, "Error in automation loop");
                stats.errors += 1;
                return false;
            }
        };

        let mut clean = true;
        for case in cases {
            match self.process_case(&case).await {
                Ok(outcome) => {
                    stats.absorb(&outcome);
                    if let CaseOutcome::Skipped(reason) = outcome
                        && reason.is_transient()
                    {
                        feed.requeue(case);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, title = %case.title, "Failed to process case");
                    stats.errors += 1;
                    clean = false;
                }
            }
        }
        clean
    }

    pub fn summary(&self) -> Result<AutomationSummary, EngineError> {
        Ok(AutomationSummary {
            applications: self.governor.summary()?,
            workflows: WorkflowSummary {
                total_templates: self.store.len()?,
                average_success_rate: self.store.average_success_rate()?,
            },
            state: self.state(),
        })
    }
}
