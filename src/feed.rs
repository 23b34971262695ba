use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result};

use crate::workflow::Case;

/// Source of newly discovered cases. Detection itself happens elsewhere.
pub trait OpportunityFeed: Send {
    /// Cases found since the last poll. An empty batch is normal.
    fn poll(&mut self) -> impl Future<Output = Result<Vec<Case>>> + Send;

    /// Hand back a case that could not be processed yet. Live feeds keep
    /// offering open cases on their own, so the default drops it.
    fn requeue(&mut self, _case: Case) {}

    /// True when the feed will never yield anything again.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Feed that hands out pre-loaded batches, one per poll. Requeued cases are
/// offered again, in order, before the next pre-loaded batch.
#[derive(Debug, Default)]
pub struct StaticFeed {
    batches: VecDeque<Vec<Case>>,
    requeued: Vec<Case>,
}

impl StaticFeed {
    pub fn new(batches: Vec<Vec<Case>>) -> Self {
        Self {
            batches: batches.into(),
            requeued: Vec::new(),
        }
    }

    /// Every case in a single batch.
    pub fn from_cases(cases: Vec<Case>) -> Self {
        Self::new(vec![cases])
    }

    /// Load a JSON array of cases.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read cases from {}", path.display()))?;
        let cases: Vec<Case> = serde_json::from_str(&contents)
            .with_context(|| format!("invalid cases file {}", path.display()))?;
        Ok(Self::from_cases(cases))
    }
}

impl OpportunityFeed for StaticFeed {
    async fn poll(&mut self) -> Result<Vec<Case>> {
        if !self.requeued.is_empty() {
            return Ok(std::mem::take(&mut self.requeued));
        }
        Ok(self.batches.pop_front().unwrap_or_default())
    }

    fn requeue(&mut self, case: Case) {
        self.requeued.push(case);
    }

    fn is_exhausted(&self) -> bool {
        self.batches.is_empty() && self.requeued.is_empty()
    }
}
