//! Terminal output: spinners from `indicatif`, colors from `console`.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use applyflow::events::{AutomationEvent, EventKind, ListenerError};
use applyflow::orchestrator::{AutomationSummary, CaseOutcome, RunStats};
use applyflow::replay::StepStatus;
use applyflow::workflow::{Case, WorkflowTemplate};

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Spinner shown while the scan loop runs. Events print above it.
pub struct RunProgress {
    // Shared with the listener so event lines do not tear the spinner.
    pb: ProgressBar,
}

impl RunProgress {
    pub fn start(source: &str) -> Self {
        Self {
            pb: spinner(format!("Scanning {source}")),
        }
    }

    /// Listener that prints each automation event above the spinner.
    pub fn listener(&self) -> impl Fn(&AutomationEvent) -> Result<(), ListenerError> + Send + Sync + 'static {
        let pb = self.pb.clone();
        let green = Style::new().green().bold();
        let red = Style::new().red().bold();
        let cyan = Style::new().cyan();
        move |event: &AutomationEvent| -> Result<(), ListenerError> {
            let line = match event.kind {
                EventKind::ApplicationSubmitted => format!("  {} Applied", green.apply_to("✓")),
                EventKind::WorkflowRecorded => format!("  {} Recorded new workflow", cyan.apply_to("●")),
                EventKind::ReplayFailed => format!("  {} Replay failed", red.apply_to("✗")),
            };
            pb.println(format!(
                "{line}: {} at {}",
                event.case.title, event.case.organization
            ));
            Ok(())
        }
    }

    pub fn finish(&self, stats: &RunStats) {
        self.pb.finish_and_clear();
        let bold = Style::new().bold();
        println!(
            "{} {} polls, {} applied, {} recorded, {} skipped, {} failed, {} errors",
            bold.apply_to("Done:"),
            stats.polls,
            stats.submitted,
            stats.recorded,
            stats.skipped,
            stats.failed,
            stats.errors
        );
    }
}

/// Spinner for a single case, used by the demo.
pub struct CaseProgress {
    // Spinner for the case being processed.
    pb: ProgressBar,
    // Applied and recorded outcomes.
    green: Style,
    // Failed replays and errors.
    red: Style,
    // Skips and skipped steps.
    yellow: Style,
}

impl CaseProgress {
    pub fn start(case: &Case) -> Self {
        Self {
            pb: spinner(format!("{} at {}", case.title, case.organization)),
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    pub fn complete(&self, outcome: &CaseOutcome) {
        self.pb.finish_and_clear();
        match outcome {
            CaseOutcome::Skipped(reason) => {
                println!("  {} Skipped: {reason}", self.yellow.apply_to("-"));
            }
            CaseOutcome::Recorded { template, .. } => {
                println!(
                    "  {} Recorded '{}' ({} steps)",
                    self.green.apply_to("●"),
                    template.name,
                    template.steps.len()
                );
            }
            CaseOutcome::Replayed { report, record } => {
                let mark = if record.is_some() {
                    self.green.apply_to("✓")
                } else {
                    self.red.apply_to("✗")
                };
                println!("  {mark} Replayed '{}': {}", report.template_name, report.state);
                for step in &report.steps {
                    let status = match step.status {
                        StepStatus::Succeeded => self.green.apply_to("ok"),
                        StepStatus::Skipped => self.yellow.apply_to("skipped"),
                        StepStatus::Aborted => self.red.apply_to("aborted"),
                    };
                    println!("      {status} {} ({} attempts)", step.description, step.attempts);
                }
            }
        }
    }

    pub fn fail(&self, error: &dyn std::fmt::Display) {
        self.pb.finish_and_clear();
        println!("  {} {error}", self.red.apply_to("✗"));
    }
}

/// One line per template with its usage statistics.
pub fn print_templates(templates: &[WorkflowTemplate]) {
    if templates.is_empty() {
        println!("No workflow templates recorded yet.");
        return;
    }
    let bold = Style::new().bold();
    for t in templates {
        println!(
            "{}  {}  steps={} used={} success={:.0}%",
            bold.apply_to(&t.name),
            t.id,
            t.steps.len(),
            t.usage_count,
            t.success_rate * 100.0
        );
    }
}

/// Pretty-printed JSON of the automation summary.
pub fn print_summary(summary: &AutomationSummary) {
    let header = Style::new().cyan().bold();
    println!("{}", header.apply_to("─── Automation Summary ───"));
    println!(
        "{}",
        serde_json::to_string_pretty(summary).unwrap_or_default()
    );
}
