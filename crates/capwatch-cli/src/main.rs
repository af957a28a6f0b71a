use anyhow::{Context, Result};
use capwatch_cli::{init_tracing, load_catalog, output, validate_catalog, wiring};
use capwatch_core::MonitorConfig;
use capwatch_engine::{CycleOutcome, QuotaMonitor};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "capwatch")]
#[command(about = "Monitor service quota utilization and alert before limits are hit")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one monitoring cycle
    Run {
        /// Re-discover resources even when the cache is fresh
        #[arg(long)]
        force_refresh: bool,

        /// Keep results in memory and do not publish alerts
        #[arg(long)]
        dry_run: bool,

        /// Override MAX_WORKERS
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
    },
    /// Run cycles on an interval until interrupted
    Watch {
        #[arg(long, default_value_t = 900)]
        interval_secs: u64,

        /// Override MAX_WORKERS
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
    },
    /// Check connectivity of every collaborator and print it as JSON
    Health,
    /// Validate a quota catalog file (the built-in catalog when omitted)
    ValidateCatalog {
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = MonitorConfig::from_env();
    init_tracing(config.log_format);

    match cli.command {
        Command::Run {
            force_refresh,
            dry_run,
            workers,
        } => {
            if let Some(workers) = workers {
                config.max_workers = workers;
            }
            if dry_run {
                config.alert_topic_arn = None;
            }
            run(config, force_refresh, dry_run).await
        }
        Command::Watch {
            interval_secs,
            workers,
        } => {
            if let Some(workers) = workers {
                config.max_workers = workers;
            }
            watch(config, Duration::from_secs(interval_secs.max(1))).await
        }
        Command::Health => health(config).await,
        Command::ValidateCatalog { path } => {
            let path = path.or_else(|| config.quota_catalog_path.clone());
            Ok(validate(path))
        }
    }
}

async fn prepare(config: MonitorConfig, dry_run: bool) -> Result<QuotaMonitor> {
    config.validate().context("Invalid configuration")?;
    let catalog = load_catalog(&config)?;
    let monitor = wiring::build_monitor(config, catalog, dry_run).await?;

    let startup = monitor.startup().await;
    if !startup.all_succeeded() {
        for error in &startup.errors {
            tracing::warn!(error = %error, "Storage backend not ready");
        }
    }
    Ok(monitor)
}

fn report(outcome: &CycleOutcome, account_alias: &str) -> Result<()> {
    print!(
        "{}",
        output::render_results_table(&outcome.results, account_alias)
    );
    println!("{}", output::summary_json(&outcome.summary)?);
    Ok(())
}

async fn run(config: MonitorConfig, force_refresh: bool, dry_run: bool) -> Result<ExitCode> {
    let monitor = prepare(config, dry_run).await?;
    let ctx = monitor.new_context().with_force_refresh(force_refresh);
    let outcome = monitor.run_cycle(&ctx).await;
    report(&outcome, &monitor.config().account_alias)?;

    if outcome.summary.is_aborted() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn watch(config: MonitorConfig, interval: Duration) -> Result<ExitCode> {
    let monitor = prepare(config, false).await?;
    let mut ticker = tokio::time::interval(interval);
    tracing::info!(interval_secs = interval.as_secs(), "Watching quotas");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                return Ok(ExitCode::SUCCESS);
            }
            _ = ticker.tick() => {
                let outcome = monitor.run_cycle(&monitor.new_context()).await;
                report(&outcome, &monitor.config().account_alias)?;
            }
        }
    }
}

async fn health(config: MonitorConfig) -> Result<ExitCode> {
    let sdk = wiring::sdk_config(&config).await;
    let registry = wiring::connect_registry(&sdk).await?;
    registry.health_check_all().await;
    let snapshot = registry.health_snapshot().await;
    println!("{}", output::health_json(&snapshot)?);

    if registry.unhealthy_required().await.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn validate(path: Option<PathBuf>) -> ExitCode {
    let source = path
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in catalog".to_string());
    match validate_catalog(path.as_deref()) {
        Ok(catalog) => {
            println!(
                "{}: {} quotas ({} account, {} resource)",
                source,
                catalog.len(),
                catalog.account_quotas().count(),
                catalog.resource_quotas().count()
            );
            ExitCode::SUCCESS
        }
        Err(errors) => {
            eprintln!("{}: {} error(s)", source, errors.len());
            for error in errors {
                eprintln!("  - {}", error);
            }
            ExitCode::FAILURE
        }
    }
}
