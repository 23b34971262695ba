use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::step::WorkflowStep;

/// A named, ordered, reusable sequence of steps with matching hints and
/// running statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub company_pattern: String,
    #[serde(default)]
    pub job_type_pattern: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl WorkflowTemplate {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        steps: Vec<WorkflowStep>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            company_pattern: String::new(),
            job_type_pattern: String::new(),
            tags: Vec::new(),
            steps,
            success_rate: 0.0,
            usage_count: 0,
            created_at: now,
            last_updated_at: now,
        }
    }

    /// Fold one replay outcome into the running statistics.
    pub fn record_outcome(&mut self, succeeded: bool, now: DateTime<Utc>) {
        self.usage_count += 1;
        self.success_rate = incremental_mean(self.success_rate, self.usage_count, succeeded);
        self.last_updated_at = now;
    }
}

/// Exact running average after the `count`-th observation.
///
/// `count` already includes the new observation, so `count == 1` yields the
/// outcome bit itself.
pub fn incremental_mean(previous: f64, count: u64, succeeded: bool) -> f64 {
    if count == 0 {
        return previous;
    }
    let bit = if succeeded { 1.0 } else { 0.0 };
    let n = count as f64;
    (previous * (n - 1.0) + bit) / n
}
