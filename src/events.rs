//! Outcome notifications for host applications.
//!
//! Listeners run in registration order. A listener that fails (or panics)
//! does not stop the rest; every failure is collected and returned once the
//! whole fan-out is done.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use thiserror::Error;

use crate::workflow::Case;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A replay succeeded and the application was recorded.
    ApplicationSubmitted,
    /// A replay ran to a `Failed` state.
    ReplayFailed,
    /// A manual run was recorded as a new template.
    WorkflowRecorded,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ApplicationSubmitted => "application_submitted",
            EventKind::ReplayFailed => "replay_failed",
            EventKind::WorkflowRecorded => "workflow_recorded",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct AutomationEvent {
    pub kind: EventKind,
    pub case: Case,
    pub success: bool,
    pub template_id: Option<String>,
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

/// Failures collected from one fan-out.
#[derive(Debug, Error)]
#[error("{} listener(s) failed for {event}", failures.len())]
pub struct FanoutError {
    pub event: EventKind,
    pub failures: Vec<(String, ListenerError)>,
}

pub trait OutcomeListener: Send + Sync {
    fn on_event(&self, event: &AutomationEvent) -> Result<(), ListenerError>;
}

impl<F> OutcomeListener for F
where
    F: Fn(&AutomationEvent) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_event(&self, event: &AutomationEvent) -> Result<(), ListenerError> {
        self(event)
    }
}

#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(String, Box<dyn OutcomeListener>)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, listener: impl OutcomeListener + 'static) {
        self.listeners.push((name.into(), Box::new(listener)));
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver `event` to every listener.
    pub fn emit(&self, event: &AutomationEvent) -> Result<(), FanoutError> {
        let mut failures = Vec::new();

        for (name, listener) in &self.listeners {
            let result = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)))
                .unwrap_or_else(|_| Err(ListenerError("listener panicked".into())));
            if let Err(e) = result {
                tracing::warn!(listener = %name, event = %event.kind, error = %e, "Listener failed");
                failures.push((name.clone(), e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(FanoutError {
                event: event.kind,
                failures,
            })
        }
    }
}
