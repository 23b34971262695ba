//! Application rate governor.
//!
//! Decides whether a new automated run may start (daily cap, minimum spacing,
//! duplicate suppression) and keeps the permanent, append-only history of
//! application records. A negative decision is an [`Eligibility::Skip`],
//! never an error.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::EngineError;
use crate::persistence::DocumentStore;
use crate::workflow::Case;

/// Lifecycle status of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    InProgress,
    Submitted,
    Rejected,
    Interview,
    Offer,
    Withdrawn,
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::InProgress => "in_progress",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Interview => "interview",
            ApplicationStatus::Offer => "offer",
            ApplicationStatus::Withdrawn => "withdrawn",
        };
        write!(f, "{s}")
    }
}

/// Outcome of one run against a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRecord {
    pub id: String,
    pub case: Case,
    pub status: ApplicationStatus,
    pub applied_at: DateTime<Utc>,
    /// Id of the template that produced the outcome.
    #[serde(default)]
    pub workflow_used: Option<String>,
    #[serde(default)]
    pub notes: String,
}

/// Configured limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimits {
    pub max_per_day: u32,
    pub min_delay_between_runs: Duration,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            max_per_day: 50,
            min_delay_between_runs: Duration::seconds(30),
        }
    }
}

/// Why the governor declined a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    DailyLimitReached,
    TooSoon,
    Duplicate,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DailyLimitReached => write!(f, "daily application limit reached"),
            SkipReason::TooSoon => write!(f, "waiting before next application"),
            SkipReason::Duplicate => write!(f, "already applied"),
        }
    }
}

impl SkipReason {
    /// True when the same case may become eligible later without any change
    /// to the record log. Duplicates never do.
    pub fn is_transient(&self) -> bool {
        matches!(self, SkipReason::DailyLimitReached | SkipReason::TooSoon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Skip(SkipReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// Read-side aggregate over the record log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationSummary {
    pub total: usize,
    pub by_status: BTreeMap<ApplicationStatus, usize>,
    pub today: usize,
    pub remaining_today: u32,
}

pub struct RateGovernor {
    records: Mutex<Vec<ApplicationRecord>>,
    persistence: Box<dyn DocumentStore<ApplicationRecord>>,
    limits: RateLimits,
    clock: Arc<dyn Clock>,
}

impl RateGovernor {
    /// Load the record history from `persistence`.
    pub fn open(
        persistence: Box<dyn DocumentStore<ApplicationRecord>>,
        limits: RateLimits,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let records = persistence.load()?;
        tracing::info!(
            count = records.len(),
            max_per_day = limits.max_per_day,
            min_delay_secs = limits.min_delay_between_runs.num_seconds(),
            "Loaded application records"
        );
        Ok(Self {
            records: Mutex::new(records),
            persistence,
            limits,
            clock,
        })
    }

    pub fn limits(&self) -> RateLimits {
        self.limits
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<ApplicationRecord>>, EngineError> {
        self.records
            .lock()
            .map_err(|_| EngineError::LockPoisoned("rate governor"))
    }

    fn count_today(records: &[ApplicationRecord], now: DateTime<Utc>) -> usize {
        let today = now.date_naive();
        records
            .iter()
            .filter(|r| r.applied_at.date_naive() == today)
            .count()
    }

    fn latest(records: &[ApplicationRecord]) -> Option<DateTime<Utc>> {
        records.iter().map(|r| r.applied_at).max()
    }

    /// True while today's record count is below the daily cap.
    pub fn can_run_today(&self) -> Result<bool, EngineError> {
        let records = self.lock()?;
        let today = Self::count_today(&records, self.clock.now());
        Ok(today < self.limits.max_per_day as usize)
    }

    /// True if the most recent record is younger than the minimum spacing.
    pub fn should_wait(&self) -> Result<bool, EngineError> {
        Ok(self.time_until_next_run()?.is_some())
    }

    /// Remaining spacing delay before another run may start, if any.
    pub fn time_until_next_run(&self) -> Result<Option<Duration>, EngineError> {
        let records = self.lock()?;
        let Some(last) = Self::latest(&records) else {
            return Ok(None);
        };
        let elapsed = self.clock.now() - last;
        if elapsed < self.limits.min_delay_between_runs {
            Ok(Some(self.limits.min_delay_between_runs - elapsed))
        } else {
            Ok(None)
        }
    }

    pub fn last_run_at(&self) -> Result<Option<DateTime<Utc>>, EngineError> {
        Ok(Self::latest(&self.lock()?))
    }

    /// True if a record already exists for the same organization and title.
    pub fn is_duplicate(&self, case: &Case) -> Result<bool, EngineError> {
        let hash = case.case_hash();
        Ok(self.lock()?.iter().any(|r| r.case.case_hash() == hash))
    }

    /// All three gates, checked in order: daily cap, spacing, duplicates.
    pub fn check(&self, case: &Case) -> Result<Eligibility, EngineError> {
        if !self.can_run_today()? {
            return Ok(Eligibility::Skip(SkipReason::DailyLimitReached));
        }
        if self.should_wait()? {
            return Ok(Eligibility::Skip(SkipReason::TooSoon));
        }
        if self.is_duplicate(case)? {
            return Ok(Eligibility::Skip(SkipReason::Duplicate));
        }
        Ok(Eligibility::Eligible)
    }

    /// Append a `Submitted` record for `case` and persist the full log.
    ///
    /// Call at most once per successful run; every call counts against the
    /// daily cap.
    pub fn record_outcome(
        &self,
        case: &Case,
        template_id: Option<&str>,
    ) -> Result<ApplicationRecord, EngineError> {
        let record = ApplicationRecord {
            id: Uuid::new_v4().to_string(),
            case: case.clone(),
            status: ApplicationStatus::Submitted,
            applied_at: self.clock.now(),
            workflow_used: template_id.map(str::to_string),
            notes: String::new(),
        };

        let mut records = self.lock()?;
        records.push(record.clone());
        if let Err(e) = self.persistence.save(&records) {
            records.pop();
            tracing::error!(error = %e, "Failed to persist application records");
            return Err(e);
        }

        tracing::info!(
            title = %case.title,
            organization = %case.organization,
            "Recorded application"
        );
        Ok(record)
    }

    /// Set a new status on an existing record, appending a timestamped note.
    pub fn update_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
        notes: &str,
    ) -> Result<ApplicationRecord, EngineError> {
        let now = self.clock.now();
        let mut records = self.lock()?;
        let mut next = records.clone();
        let record = next
            .iter_mut()
            .find(|r| r.id == application_id)
            .ok_or_else(|| EngineError::ApplicationNotFound(application_id.to_string()))?;

        record.status = status;
        if !notes.is_empty() {
            record.notes.push_str(&format!("\n{}: {notes}", now.to_rfc3339()));
        }
        let updated = record.clone();

        self.persistence.save(&next)?;
        *records = next;
        tracing::info!(application = application_id, %status, "Application status updated");
        Ok(updated)
    }

    /// Copy of the full record log, oldest first.
    pub fn records(&self) -> Result<Vec<ApplicationRecord>, EngineError> {
        Ok(self.lock()?.clone())
    }

    /// Totals per status plus today's count against the daily cap.
    pub fn summary(&self) -> Result<ApplicationSummary, EngineError> {
        let records = self.lock()?;
        let mut by_status = BTreeMap::new();
        for record in records.iter() {
            *by_status.entry(record.status).or_insert(0) += 1;
        }
        let today = Self::count_today(&records, self.clock.now());
        Ok(ApplicationSummary {
            total: records.len(),
            by_status,
            today,
            remaining_today: self.limits.max_per_day.saturating_sub(today as u32),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persistence::{JsonFileStore, MemoryStore};
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap()
    }

    fn governor(limits: RateLimits) -> (ManualClock, RateGovernor) {
        let clock = ManualClock::new(start());
        let governor =
            RateGovernor::open(Box::new(MemoryStore::new()), limits, Arc::new(clock.clone())).unwrap();
        (clock, governor)
    }

    fn case(n: usize) -> Case {
        Case::new(format!("Engineer {n}"), "Acme")
    }

    #[test]
    fn daily_cap_boundary() {
        let limits = RateLimits {
            max_per_day: 3,
            min_delay_between_runs: Duration::zero(),
        };
        let (_, governor) = governor(limits);

        for n in 0..2 {
            governor.record_outcome(&case(n), None).unwrap();
        }
        assert!(governor.can_run_today().unwrap());

        governor.record_outcome(&case(2), None).unwrap();
        assert!(!governor.can_run_today().unwrap());
        assert_eq!(
            governor.check(&case(9)).unwrap(),
            Eligibility::Skip(SkipReason::DailyLimitReached)
        );
    }

    #[test]
    fn cap_resets_on_next_day() {
        let limits = RateLimits {
            max_per_day: 1,
            min_delay_between_runs: Duration::zero(),
        };
        let (clock, governor) = governor(limits);
        governor.record_outcome(&case(0), None).unwrap();
        assert!(!governor.can_run_today().unwrap());

        clock.advance(Duration::days(1));
        assert!(governor.can_run_today().unwrap());
    }

    #[test]
    fn spacing_delay() {
        let (clock, governor) = governor(RateLimits::default());
        assert!(!governor.should_wait().unwrap());

        governor.record_outcome(&case(0), Some("t1")).unwrap();
        assert!(governor.should_wait().unwrap());
        assert_eq!(
            governor.time_until_next_run().unwrap(),
            Some(Duration::seconds(30))
        );
        assert_eq!(
            governor.check(&case(1)).unwrap(),
            Eligibility::Skip(SkipReason::TooSoon)
        );

        clock.advance(Duration::seconds(29));
        assert!(governor.should_wait().unwrap());

        clock.advance(Duration::seconds(1));
        assert!(!governor.should_wait().unwrap());
        assert_eq!(governor.check(&case(1)).unwrap(), Eligibility::Eligible);
    }

    #[test]
    fn zero_delay_never_waits() {
        let limits = RateLimits {
            max_per_day: 10,
            min_delay_between_runs: Duration::zero(),
        };
        let (_, governor) = governor(limits);
        governor.record_outcome(&case(0), None).unwrap();
        assert!(!governor.should_wait().unwrap());
    }

    #[test]
    fn duplicate_suppression_ignores_description() {
        let (clock, governor) = governor(RateLimits::default());
        let original = Case::new("Senior Engineer", "Acme Corp").with_description("v1");
        governor.record_outcome(&original, None).unwrap();
        clock.advance(Duration::minutes(5));

        let repost = Case::new("Senior Engineer", "Acme Corp").with_description("v2, now remote");
        assert!(governor.is_duplicate(&repost).unwrap());
        assert_eq!(
            governor.check(&repost).unwrap(),
            Eligibility::Skip(SkipReason::Duplicate)
        );
        assert!(!governor.is_duplicate(&Case::new("Staff Engineer", "Acme Corp")).unwrap());
    }

    #[test]
    fn record_outcome_writes_submitted() {
        let (_, governor) = governor(RateLimits::default());
        let record = governor.record_outcome(&case(0), Some("tmpl-1")).unwrap();
        assert_eq!(record.status, ApplicationStatus::Submitted);
        assert_eq!(record.workflow_used.as_deref(), Some("tmpl-1"));
        assert_eq!(record.applied_at, start());
        assert_eq!(governor.last_run_at().unwrap(), Some(start()));
    }

    #[test]
    fn failed_write_is_surfaced_and_not_counted() {
        let clock = ManualClock::new(start());
        let governor = RateGovernor::open(
            Box::new(MemoryStore::failing()),
            RateLimits::default(),
            Arc::new(clock),
        )
        .unwrap();

        let err = governor.record_outcome(&case(0), None).unwrap_err();
        assert!(matches!(err, EngineError::PersistenceWriteFailed { .. }));
        assert_eq!(governor.summary().unwrap().total, 0);
    }

    #[test]
    fn update_status_appends_note() {
        let (_, governor) = governor(RateLimits::default());
        let record = governor.record_outcome(&case(0), None).unwrap();

        let updated = governor
            .update_status(&record.id, ApplicationStatus::Interview, "Recruiter called")
            .unwrap();
        assert_eq!(updated.status, ApplicationStatus::Interview);
        assert!(updated.notes.ends_with(": Recruiter called"));
        assert!(updated.notes.starts_with('\n'));

        let err = governor
            .update_status("missing", ApplicationStatus::Offer, "")
            .unwrap_err();
        assert!(matches!(err, EngineError::ApplicationNotFound(_)));
    }

    #[test]
    fn summary_counts() {
        let limits = RateLimits {
            max_per_day: 5,
            min_delay_between_runs: Duration::zero(),
        };
        let (clock, governor) = governor(limits);
        let first = governor.record_outcome(&case(0), None).unwrap();
        clock.advance(Duration::days(1));
        governor.record_outcome(&case(1), None).unwrap();
        governor.record_outcome(&case(2), None).unwrap();
        governor
            .update_status(&first.id, ApplicationStatus::Rejected, "")
            .unwrap();

        let summary = governor.summary().unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.today, 2);
        assert_eq!(summary.remaining_today, 3);
        assert_eq!(summary.by_status[&ApplicationStatus::Submitted], 2);
        assert_eq!(summary.by_status[&ApplicationStatus::Rejected], 1);
    }

    #[test]
    fn history_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("applications.json");
        let clock = Arc::new(ManualClock::new(start()));

        let governor =
            RateGovernor::open(Box::new(JsonFileStore::new(&path)), RateLimits::default(), clock.clone())
                .unwrap();
        let original = Case::new("Senior Engineer", "Acme Corp");
        governor.record_outcome(&original, Some("t")).unwrap();

        let reloaded =
            RateGovernor::open(Box::new(JsonFileStore::new(&path)), RateLimits::default(), clock)
                .unwrap();
        assert_eq!(reloaded.records().unwrap(), governor.records().unwrap());
        assert!(reloaded.is_duplicate(&original).unwrap());
        assert!(reloaded.should_wait().unwrap());
    }

    #[test]
    fn only_pacing_skips_are_transient() {
        assert!(SkipReason::TooSoon.is_transient());
        assert!(SkipReason::DailyLimitReached.is_transient());
        assert!(!SkipReason::Duplicate.is_transient());
    }
}
