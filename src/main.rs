mod cli;
mod ui;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use applyflow::clock::{Clock, SystemClock};
use applyflow::config::AppConfig;
use applyflow::executor::{CachedResponder, NoResponder, SimulatedExecutor};
use applyflow::feed::StaticFeed;
use applyflow::governor::RateGovernor;
use applyflow::orchestrator::Orchestrator;
use applyflow::persistence::JsonFileStore;
use applyflow::recorder::ScriptedSession;
use applyflow::replay::Replayer;
use applyflow::store::TemplateStore;
use applyflow::workflow::Case;
use cli::{Cli, Command};

type CliOrchestrator = Orchestrator<SimulatedExecutor, ScriptedSession, CachedResponder<NoResponder>>;

fn init_tracing(verbose: bool) {
    let default = if verbose { "applyflow=debug" } else { "applyflow=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn open_store(config: &AppConfig) -> Result<Arc<TemplateStore>> {
    let store = TemplateStore::open(Box::new(JsonFileStore::new(config.templates_path())))
        .context("failed to open template store")?;
    Ok(Arc::new(store))
}

fn open_governor(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<Arc<RateGovernor>> {
    let governor = RateGovernor::open(
        Box::new(JsonFileStore::new(config.applications_path())),
        config.rate_limits()?,
        clock,
    )
    .context("failed to open application records")?;
    Ok(Arc::new(governor))
}

fn build_orchestrator(config: &AppConfig) -> Result<CliOrchestrator> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(config)?;
    let governor = open_governor(config, clock.clone())?;
    let replayer = Replayer::new(store.clone(), SimulatedExecutor::new(), clock.clone())
        .with_responder(CachedResponder::new(NoResponder))
        .with_options(config.replay_options());

    Ok(Orchestrator::new(store, governor, replayer, ScriptedSession::default(), clock)
        .with_loop_config(config.loop_config()))
}

async fn run(config: &AppConfig, cases: &Path) -> Result<()> {
    let mut feed = StaticFeed::from_json_file(cases)?;
    let mut orchestrator = build_orchestrator(config)?;

    let progress = ui::RunProgress::start(&cases.display().to_string());
    orchestrator.events_mut().register("terminal", progress.listener());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, finishing current case");
            on_signal.cancel();
        }
    });

    let stats = orchestrator.run(&mut feed, cancel).await;
    progress.finish(&stats);
    ui::print_summary(&orchestrator.summary()?);
    Ok(())
}

fn demo_cases() -> Vec<Case> {
    vec![
        Case::new("Senior Software Engineer", "Tech Innovators Inc.")
            .with_category("Full-time")
            .with_location("Remote"),
        Case::new("Staff Engineer", "Tech Innovators Inc.").with_category("Full-time"),
        Case::new("Senior Software Engineer", "Tech Innovators Inc.").with_category("Full-time"),
        Case::new("Platform Engineer", "Globex").with_category("Full-time"),
        Case::new("Data Analyst", "Initech").with_category("Contract"),
    ]
}

async fn demo(mut config: AppConfig) -> Result<()> {
    let scratch = tempfile::tempdir().context("failed to create scratch directory")?;
    config.storage_dir = scratch.path().to_path_buf();
    config.min_delay_secs = 0;

    let orchestrator = build_orchestrator(&config)?;
    for case in demo_cases() {
        let progress = ui::CaseProgress::start(&case);
        match orchestrator.process_case(&case).await {
            Ok(outcome) => progress.complete(&outcome),
            Err(e) => progress.fail(&e),
        }
    }

    println!();
    ui::print_templates(&orchestrator.store().list()?);
    ui::print_summary(&orchestrator.summary()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = AppConfig::load()?;
    if let Some(dir) = cli.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(max) = cli.max_per_day {
        config.max_per_day = max;
    }
    config.validate()?;

    match cli.command {
        Command::Run { cases } => run(&config, &cases).await,
        Command::Templates => {
            ui::print_templates(&open_store(&config)?.list()?);
            Ok(())
        }
        Command::Summary => {
            ui::print_summary(&build_orchestrator(&config)?.summary()?);
            Ok(())
        }
        Command::SetStatus { id, status, notes } => {
            let governor = open_governor(&config, Arc::new(SystemClock))?;
            let record = governor.update_status(&id, status.into(), &notes)?;
            println!(
                "{}: {} at {} is now {}",
                record.id, record.case.title, record.case.organization, record.status
            );
            Ok(())
        }
        Command::Demo => demo(config).await,
    }
}
