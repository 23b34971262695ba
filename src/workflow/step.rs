use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of atomic action a step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Click,
    FillForm,
    SelectOption,
    UploadFile,
    Wait,
    Verify,
    ScreeningQuestion,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Click => write!(f, "click"),
            StepKind::FillForm => write!(f, "fill_form"),
            StepKind::SelectOption => write!(f, "select_option"),
            StepKind::UploadFile => write!(f, "upload_file"),
            StepKind::Wait => write!(f, "wait"),
            StepKind::Verify => write!(f, "verify"),
            StepKind::ScreeningQuestion => write!(f, "screening_question"),
        }
    }
}

/// One atomic action inside a workflow template.
///
/// `selector`, `action` and `value` are opaque to the engine; their meaning is
/// owned by whatever [`StepExecutor`](crate::executor::StepExecutor) runs them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub id: String,
    pub kind: StepKind,
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pacing delay applied after the step, stored as fractional seconds.
    #[serde(default = "default_delay_after", with = "duration_secs")]
    pub delay_after: Duration,
}

fn default_required() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_delay_after() -> Duration {
    Duration::from_secs(1)
}

impl WorkflowStep {
    pub fn new(kind: StepKind, selector: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            selector: selector.into(),
            action: String::new(),
            value: String::new(),
            description: description.into(),
            required: default_required(),
            max_retries: default_max_retries(),
            delay_after: default_delay_after(),
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delay_after(mut self, delay: Duration) -> Self {
        self.delay_after = delay;
        self
    }

    /// Total number of attempts the replayer may make for this step.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Human-facing label used in logs: the description, or the kind when
    /// the recorder left the description empty.
    pub fn label(&self) -> String {
        if self.description.is_empty() {
            format!("{} {}", self.kind, self.selector).trim_end().to_string()
        } else {
            self.description.clone()
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_step_defaults() {
        let step = WorkflowStep::new(StepKind::Click, ".jobs-apply-button", "Click Easy Apply");
        assert!(step.required);
        assert_eq!(step.max_retries, 3);
        assert_eq!(step.max_attempts(), 4);
        assert_eq!(step.delay_after, Duration::from_secs(1));
        assert!(!step.id.is_empty());
    }

    #[test]
    fn step_json_uses_wire_names() {
        let step = WorkflowStep::new(StepKind::FillForm, "#email", "Fill email")
            .with_value("me@example.com")
            .with_delay_after(Duration::from_millis(500));
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["kind"], "fill_form");
        assert_eq!(json["maxRetries"], 3);
        assert_eq!(json["delayAfter"], 0.5);
        assert_eq!(json["value"], "me@example.com");
    }

    #[test]
    fn negative_delay_is_rejected() {
        let json = r#"{"id":"s1","kind":"wait","delayAfter":-1.0}"#;
        let result: Result<WorkflowStep, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let json = r#"{"id":"s1","kind":"verify"}"#;
        let step: WorkflowStep = serde_json::from_str(json).unwrap();
        assert!(step.required);
        assert_eq!(step.max_retries, 3);
        assert_eq!(step.delay_after, Duration::from_secs(1));
        assert_eq!(step.label(), "verify");
    }
}
