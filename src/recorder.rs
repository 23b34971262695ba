//! Capturing a manual run as a new template.
//!
//! A [`Recorder`] holds at most one open draft. [`Recorder::begin_recording`]
//! hands back a [`RecordingHandle`] and every later call must present it.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{EngineError, ExecutorError};
use crate::store::TemplateStore;
use crate::workflow::{Case, StepKind, WorkflowStep, WorkflowTemplate};

/// Token for an open recording.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordingHandle(String);

impl RecordingHandle {
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Matching hints attached to a template when the recording is frozen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateHints {
    pub company_pattern: String,
    pub job_type_pattern: String,
    pub tags: Vec<String>,
}

impl TemplateHints {
    /// Hints that make a template recorded for `case` match similar cases:
    /// patterns copied from the case, tags lowercased.
    pub fn from_case(case: &Case) -> Self {
        let tags = [&case.category, &case.organization]
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase())
            .collect();
        Self {
            company_pattern: case.organization.clone(),
            job_type_pattern: case.category.clone(),
            tags,
        }
    }
}

#[derive(Debug)]
struct Draft {
    handle: RecordingHandle,
    name: String,
    steps: Vec<WorkflowStep>,
    started_at: DateTime<Utc>,
}

pub struct Recorder {
    store: Arc<TemplateStore>,
    clock: Arc<dyn Clock>,
    draft: Mutex<Option<Draft>>,
}

impl Recorder {
    pub fn new(store: Arc<TemplateStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            draft: Mutex::new(None),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Draft>>, EngineError> {
        self.draft
            .lock()
            .map_err(|_| EngineError::LockPoisoned("recorder"))
    }

    /// Open a new draft. Fails if one is already open.
    pub fn begin_recording(&self, name: &str) -> Result<RecordingHandle, EngineError> {
        let mut draft = self.lock()?;
        if let Some(open) = &*draft {
            return Err(EngineError::AlreadyRecording {
                handle: open.handle.to_string(),
            });
        }

        let handle = RecordingHandle(Uuid::new_v4().to_string());
        *draft = Some(Draft {
            handle: handle.clone(),
            name: name.to_string(),
            steps: Vec::new(),
            started_at: self.clock.now(),
        });
        tracing::info!(workflow = name, handle = %handle, "Started recording workflow");
        Ok(handle)
    }

    /// Append `step` to the open draft.
    pub fn record_step(&self, handle: &RecordingHandle, step: WorkflowStep) -> Result<(), EngineError> {
        if step.id.trim().is_empty() {
            return Err(EngineError::InvalidStep("step id must not be empty".into()));
        }
        let mut guard = self.lock()?;
        let draft = open_draft(&mut guard, handle)?;
        tracing::info!(step = %step.label(), position = draft.steps.len(), "Recorded step");
        draft.steps.push(step);
        Ok(())
    }

    /// Freeze the draft into a new template and store it.
    pub fn finish_recording(
        &self,
        handle: &RecordingHandle,
        name: &str,
        description: &str,
    ) -> Result<WorkflowTemplate, EngineError> {
        self.finish_recording_with_hints(handle, name, description, TemplateHints::default())
    }

    /// Like [`finish_recording`](Self::finish_recording), with matching hints
    /// written in the same store update.
    ///
    /// If the store write fails the draft stays open so the caller can retry.
    pub fn finish_recording_with_hints(
        &self,
        handle: &RecordingHandle,
        name: &str,
        description: &str,
        hints: TemplateHints,
    ) -> Result<WorkflowTemplate, EngineError> {
        let mut guard = self.lock()?;
        open_draft(&mut guard, handle)?;
        let Some(draft) = guard.take() else {
            return Err(EngineError::UnknownRecording(handle.to_string()));
        };

        let mut template =
            WorkflowTemplate::new(name, description, draft.steps.clone(), self.clock.now());
        template.company_pattern = hints.company_pattern;
        template.job_type_pattern = hints.job_type_pattern;
        template.tags = hints.tags;

        if let Err(e) = self.store.insert(template.clone()) {
            *guard = Some(draft);
            return Err(e);
        }

        tracing::info!(
            template = %template.name,
            draft = %draft.name,
            steps = template.steps.len(),
            recording_secs = (template.created_at - draft.started_at).num_seconds(),
            "Finished recording"
        );
        Ok(template)
    }

    /// Drop the draft without creating a template.
    pub fn cancel_recording(&self, handle: &RecordingHandle) -> Result<(), EngineError> {
        let mut guard = self.lock()?;
        open_draft(&mut guard, handle)?;
        *guard = None;
        tracing::info!(handle = %handle, "Recording cancelled");
        Ok(())
    }

    pub fn active_handle(&self) -> Option<RecordingHandle> {
        let guard = self.lock().ok()?;
        match &*guard {
            Some(draft) => Some(draft.handle.clone()),
            None => None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active_handle().is_some()
    }

    /// Number of steps captured so far in the open draft.
    pub fn draft_len(&self, handle: &RecordingHandle) -> Result<usize, EngineError> {
        let mut guard = self.lock()?;
        Ok(open_draft(&mut guard, handle)?.steps.len())
    }
}

fn open_draft<'a>(
    slot: &'a mut Option<Draft>,
    handle: &RecordingHandle,
) -> Result<&'a mut Draft, EngineError> {
    match slot {
        Some(draft) if draft.handle == *handle => Ok(draft),
        _ => Err(EngineError::UnknownRecording(handle.to_string())),
    }
}

/// Source of steps for a manual run the user performs while being recorded.
pub trait ManualSession: Send + Sync {
    fn collect_steps(
        &self,
        case: &Case,
    ) -> impl Future<Output = Result<Vec<WorkflowStep>, ExecutorError>> + Send;
}

/// Manual session that always yields the same basic Easy Apply sequence.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSession {
    resume_path: String,
}

impl ScriptedSession {
    pub fn new(resume_path: impl Into<String>) -> Self {
        Self {
            resume_path: resume_path.into(),
        }
    }
}

impl ManualSession for ScriptedSession {
    async fn collect_steps(&self, _case: &Case) -> Result<Vec<WorkflowStep>, ExecutorError> {
        let resume = if self.resume_path.is_empty() {
            "default_resume.pdf"
        } else {
            self.resume_path.as_str()
        };
        Ok(vec![
            WorkflowStep::new(StepKind::Click, ".jobs-apply-button", "Click Easy Apply button"),
            WorkflowStep::new(StepKind::UploadFile, "#resume-upload", "Upload resume").with_value(resume),
            WorkflowStep::new(StepKind::ScreeningQuestion, "", "Answer screening questions").optional(),
        ])
    }
}
