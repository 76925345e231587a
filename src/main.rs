//! orchestratord - multi-agent task orchestrator
//!
//! CLI entry point: loads configuration, wires Conductor/Executor/Router/
//! Retrieval together, and dispatches to the requested subcommand.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result, eyre};
use tracing::{error, info, warn};

use orchestrator::cli::{Cli, Command, OutputFormat};
use orchestrator::config::Config;
use orchestrator::domain::{Expert, ExpertSeed, Filter, IndexValue};
use orchestrator::llm::create_client;
use orchestrator::state::{StateManager, sweep_stuck_tasks};
use orchestrator::{Conductor, ConductorConfig, Executor, Retrieval, Router};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("orchestratord")
        .join("logs");
    fs::create_dir_all(&log_dir).context("failed to create log directory")?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("logging initialized, writing under {}", log_dir.display());
    Ok(())
}

/// Build the Router from `config.llm`: one `LlmClient` per family, a static
/// category->model priority list pulled from the configured model names.
fn build_router(config: &Config) -> Result<Arc<Router>> {
    let fast = create_client(&config.llm.fast).context("failed to construct the fast-family LLM client")?;
    let heavy = create_client(&config.llm.heavy).context("failed to construct the heavy-family LLM client")?;

    let mut priority = std::collections::HashMap::new();
    priority.insert("direct".to_string(), vec![config.llm.fast.model.clone()]);
    priority.insert("light_executor".to_string(), vec![config.llm.fast.model.clone()]);
    priority.insert("board_consult".to_string(), vec![config.llm.heavy.model.clone()]);
    priority.insert("escalation".to_string(), vec![config.llm.heavy.model.clone()]);

    Ok(Arc::new(Router::new(config.router.clone(), fast, heavy, priority)))
}

/// Background loop: stuck-sweep, assign, pull-and-execute, repeating every
/// `adaptive_interval_sec` per SPEC_FULL's Executor worker-pool cadence.
async fn run_executor_loop(state: StateManager, executor: Arc<Executor>, router: Arc<Router>) {
    let interval = Duration::from_secs(executor.config().adaptive_interval_sec.max(1));
    loop {
        router.refresh_catalog().await;
        match sweep_stuck_tasks(&state, executor.config().stuck_minutes).await {
            Ok(stats) if stats.tasks_reclaimed > 0 => info!(reclaimed = stats.tasks_reclaimed, "executor loop: stuck sweep reclaimed tasks"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "executor loop: stuck sweep failed"),
        }
        if let Err(e) = executor.assign(&state).await {
            warn!(error = %e, "executor loop: assignment pass failed");
        }
        match executor.run_cycle(&state, &router).await {
            Ok(n) if n > 0 => info!(tasks_run = n, "executor loop: pull cycle completed"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "executor loop: pull cycle failed"),
        }
        tokio::time::sleep(interval).await;
    }
}

async fn serve(config: Config, bind: String) -> Result<()> {
    let data_dir = PathBuf::from(&config.storage.taskstore_dir);
    let state = StateManager::spawn(&data_dir).context("failed to open the task store")?;

    let router = build_router(&config)?;
    router.refresh_catalog().await;
    let executor = Arc::new(Executor::new(config.executor.clone()));
    let retrieval = Arc::new(Retrieval::new(config.retrieval.clone()));
    let conductor = Arc::new(Conductor::new(
        config.conductor.clone(),
        state.clone(),
        router.clone(),
        executor.clone(),
        retrieval,
    ));

    tokio::spawn(run_executor_loop(state, executor, router));

    let app = orchestrator::conductor::http::router(conductor);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(%bind, "orchestratord: listening");
    axum::serve(listener, app).await.context("HTTP server exited with an error")?;
    Ok(())
}

async fn print_status(config: Config, format: OutputFormat) -> Result<()> {
    let data_dir = PathBuf::from(&config.storage.taskstore_dir);
    let state = StateManager::spawn(&data_dir).context("failed to open the task store")?;
    let pending = state.list_tasks(vec![Filter::eq("status", IndexValue::String("pending".to_string()))]).await?.len();
    let in_progress = state
        .list_tasks(vec![Filter::eq("status", IndexValue::String("in_progress".to_string()))])
        .await?
        .len();
    let deferred = state
        .list_tasks(vec![Filter::eq("status", IndexValue::String("deferred_to_human".to_string()))])
        .await?
        .len();

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "tasks_pending": pending,
                    "tasks_in_progress": in_progress,
                    "tasks_deferred_to_human": deferred,
                })
            );
        }
        OutputFormat::Text => {
            println!("orchestratord v{}", env!("CARGO_PKG_VERSION"));
            println!("  tasks pending:           {pending}");
            println!("  tasks in progress:       {in_progress}");
            println!("  tasks deferred to human: {deferred}");
        }
    }
    Ok(())
}

async fn board_consult(config: Config, question: String) -> Result<()> {
    let data_dir = PathBuf::from(&config.storage.taskstore_dir);
    let state = StateManager::spawn(&data_dir).context("failed to open the task store")?;
    let router = build_router(&config)?;
    router.refresh_catalog().await;
    let executor = Arc::new(Executor::new(config.executor.clone()));
    let retrieval = Arc::new(Retrieval::new(config.retrieval.clone()));
    let conductor = Conductor::new(config.conductor.clone(), state, router, executor, retrieval);

    let decision = conductor.consult_board(&question).await;
    println!("decision: {}", decision.decision);
    println!("rationale: {}", decision.rationale);
    if !decision.risks.is_empty() {
        println!("risks:");
        for risk in &decision.risks {
            println!("  - {risk}");
        }
    }
    println!("confidence: {:.2}", decision.confidence);
    println!("recommend human review: {}", decision.recommend_human_review);
    Ok(())
}

/// Parse the newline-delimited expert seed file (one JSON object per line)
/// and UPSERT each row into the experts table.
async fn migrate_experts(config: Config, seed_path: PathBuf) -> Result<()> {
    let data_dir = PathBuf::from(&config.storage.taskstore_dir);
    let state = StateManager::spawn(&data_dir).context("failed to open the task store")?;

    let content = fs::read_to_string(&seed_path).with_context(|| format!("failed to read {}", seed_path.display()))?;
    let mut synced = 0usize;
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let seed: ExpertSeed =
            serde_json::from_str(line).with_context(|| format!("{}:{}: malformed expert seed line", seed_path.display(), line_no + 1))?;

        let existing = state.get_expert(&seed.name).await?;
        let department_id = seed.department_id.clone().unwrap_or_else(|| seed.department.clone());
        let system_prompt = seed
            .system_prompt
            .clone()
            .unwrap_or_else(|| format!("You are {}, a {} in the {} department.", seed.name, seed.role, seed.department));

        match existing {
            Some(mut expert) => {
                expert.role = seed.role;
                expert.department = seed.department;
                expert.department_id = department_id;
                expert.system_prompt = system_prompt;
                state.update_expert(expert).await?;
            }
            None => {
                let expert = Expert::new(seed.name, seed.role, seed.department, department_id, system_prompt);
                state.create_expert(expert).await?;
            }
        }
        synced += 1;
    }

    info!(synced, path = %seed_path.display(), "migrate: synchronized expert seeds");
    println!("synchronized {synced} expert(s) from {}", seed_path.display());
    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("failed to set up logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("failed to load configuration")?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start the async runtime")?;
    runtime.block_on(async move {
        match cli.command {
            Some(Command::Serve { bind }) => serve(config, bind).await,
            Some(Command::Status { format }) => print_status(config, format).await,
            Some(Command::BoardConsult { question }) => board_consult(config, question).await,
            Some(Command::Migrate { experts }) => migrate_experts(config, experts).await,
            None => Err(eyre!("no subcommand given; run `orchestratord --help`")),
        }
    })
}
