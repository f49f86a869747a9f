use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mirrorgate::config::{AppConfig, DEFAULT_CONFIG_PATH};
use mirrorgate::core::{Orchestrator, read_status};
use mirrorgate::logging::{self, LogConfig};
use mirrorgate::service::ServiceManager;
use mirrorgate::context;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mirrorgate")]
#[command(about = "Network-aware rsync backup mirroring", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Print the latest transfer status and exit
    #[arg(long)]
    status: bool,

    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[arg(long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the gates and mirror every job (default)
    Run,
    /// Install the systemd service and hourly timer
    Install,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.status {
        return match run_status(&cli.config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{:#}", e);
                ExitCode::FAILURE
            }
        };
    }

    logging::init(LogConfig {
        json: cli.json_logs,
        verbose: cli.verbose,
    });

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_backup(&cli.config).await,
        Commands::Install => run_install(&cli.config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = format!("{:#}", e), "mirrorgate failed");
            ExitCode::FAILURE
        }
    }
}

async fn run_status(config_path: &Path) -> Result<()> {
    let log_file = AppConfig::load_log_file(config_path)?;
    let status = read_status(&log_file).await?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(status.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

async fn run_backup(config_path: &Path) -> Result<()> {
    let config = AppConfig::load(config_path).context("Failed to load configuration")?;
    let ctx = context::AppContext::new(config);
    let notifier = ctx.notifier.clone();

    match Orchestrator::new(ctx).run().await {
        Ok(outcome) => {
            info!(?outcome, "Run finished");
            Ok(())
        }
        Err(e) => {
            notifier
                .critical("Backup run aborted", Some(format!("{:#}", e)))
                .await;
            Err(e)
        }
    }
}

fn run_install(config_path: &Path) -> Result<()> {
    let config = AppConfig::load(config_path).context("Failed to load configuration")?;
    let manager = ServiceManager::new();
    if manager.is_installed() {
        info!("Existing installation found, updating units");
    }
    manager
        .install(&config, config_path)
        .context("Failed to install systemd timer")
}
