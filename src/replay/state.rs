use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::WorkflowStep;

/// Lifecycle of one replay: NotStarted → Running → Succeeded | Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl ReplayState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReplayState::Succeeded | ReplayState::Failed)
    }
}

impl fmt::Display for ReplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayState::NotStarted => write!(f, "NOT_STARTED"),
            ReplayState::Running => write!(f, "RUNNING"),
            ReplayState::Succeeded => write!(f, "SUCCEEDED"),
            ReplayState::Failed => write!(f, "FAILED"),
        }
    }
}

/// How a single step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Succeeded,
    /// Optional step that exhausted its attempts; the replay moved on.
    Skipped,
    /// Required step that exhausted its attempts; the replay stopped here.
    Aborted,
}

/// Diagnostics for one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step_id: String,
    pub description: String,
    pub attempts: u32,
    pub status: StepStatus,
    /// Error text of the last failed attempt, if any attempt failed.
    pub last_error: Option<String>,
}

/// What the machine does after a step finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Run the step at this index next.
    Next(usize),
    /// The replay reached a terminal state.
    Complete(ReplayState),
}

/// Drives one replay through its states and collects step reports.
#[derive(Debug, Clone)]
pub struct ReplayMachine {
    state: ReplayState,
    total_steps: usize,
    cursor: usize,
    reports: Vec<StepReport>,
}

impl ReplayMachine {
    pub fn new(total_steps: usize) -> Self {
        Self {
            state: ReplayState::NotStarted,
            total_steps,
            cursor: 0,
            reports: Vec::with_capacity(total_steps),
        }
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    pub fn reports(&self) -> &[StepReport] {
        &self.reports
    }

    /// Leave `NotStarted`. A template with no steps succeeds immediately.
    pub fn start(&mut self) -> Transition {
        if self.state != ReplayState::NotStarted {
            return self.current();
        }
        self.state = ReplayState::Running;
        if self.total_steps == 0 {
            self.state = ReplayState::Succeeded;
            return Transition::Complete(self.state);
        }
        Transition::Next(0)
    }

    /// Fold in the result of the step at the cursor.
    ///
    /// A failed required step ends the replay as `Failed`. A failed optional
    /// step is recorded as skipped and the cursor moves on. Passing the last
    /// step ends the replay as `Succeeded`.
    pub fn step_finished(&mut self, step: &WorkflowStep, attempts: u32, error: Option<String>) -> Transition {
        if self.state != ReplayState::Running {
            return self.current();
        }

        let status = match (&error, step.required) {
            (None, _) => StepStatus::Succeeded,
            (Some(_), true) => StepStatus::Aborted,
            (Some(_), false) => StepStatus::Skipped,
        };
        let failed = error.is_some();
        self.reports.push(StepReport {
            step_id: step.id.clone(),
            description: step.label(),
            attempts,
            status,
            last_error: error,
        });

        if status == StepStatus::Aborted {
            self.state = ReplayState::Failed;
            return Transition::Complete(self.state);
        }
        if failed {
            tracing::warn!(step = %step.label(), attempts, "Optional step failed, continuing");
        }

        self.cursor += 1;
        if self.cursor >= self.total_steps {
            self.state = ReplayState::Succeeded;
            Transition::Complete(self.state)
        } else {
            Transition::Next(self.cursor)
        }
    }

    fn current(&self) -> Transition {
        if self.state.is_terminal() {
            Transition::Complete(self.state)
        } else {
            Transition::Next(self.cursor)
        }
    }
}

/// Result of one replay, returned to the caller and shown by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub template_id: String,
    pub template_name: String,
    pub case_id: String,
    pub state: ReplayState,
    pub steps: Vec<StepReport>,
    /// Id of the required step that aborted the replay.
    pub aborted_at: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ReplayReport {
    pub fn succeeded(&self) -> bool {
        self.state == ReplayState::Succeeded
    }

    pub fn total_attempts(&self) -> u32 {
        self.steps.iter().map(|s| s.attempts).sum()
    }

    pub fn skipped_steps(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.status == StepStatus::Skipped)
    }
}
