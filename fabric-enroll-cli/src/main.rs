use anyhow::{anyhow, Context, Result};
use clap::Parser;
use fabric_enroll_core::config::Config;
use fabric_enroll_core::gateway::ProfileGateway;
use fabric_enroll_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use fabric_enroll_core::wallet::FileSystemWallet;
use fabric_enroll_core::{BootstrapOutcome, BootstrapRequest, Bootstrapper};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "register-user")]
#[command(author, version, about = "Register and enroll an application user", long_about = None)]
struct Args {
    /// Configuration file (TOML). Without it, defaults and FABRIC_ENROLL_* variables apply
    #[arg(short, long)]
    config: Option<String>,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let path = expand(Path::new(path));
            Config::from_file(&path)
                .with_context(|| format!("loading configuration from {}", path.display()))?
        }
        None => Config::from_env().context("loading configuration from environment")?,
    };

    if let Some(level) = &args.log_level {
        config.logging.level = level.to_lowercase();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    config.validate()?;

    Ok(config)
}

fn init_logging(config: &Config) -> Result<()> {
    let level: LogLevel = config.logging.level.parse()?;
    let log_config = LogConfig::new(level)
        .with_timestamp(config.logging.with_timestamp)
        .with_target(config.logging.with_target)
        .json_format(config.logging.json_format);

    init_logging_with_config(log_config)?;
    Ok(())
}

async fn run(config: &Config) -> Result<BootstrapOutcome> {
    let profile_path = expand(&config.resolve_profile_path()?);
    let gateway = ProfileGateway::from_file(&profile_path, config.network.request_timeout);

    let wallet_path = expand(&config.resolve_wallet_path()?);
    let wallet = FileSystemWallet::open(&wallet_path)
        .await
        .map_err(|e| anyhow!("opening wallet at {}: {}", wallet_path.display(), e))?;

    let bootstrapper = Bootstrapper::new(Arc::new(wallet), Arc::new(gateway))
        .with_discovery(config.network.discovery);

    let request = BootstrapRequest::from(&config.enrollment);
    Ok(bootstrapper.bootstrap_user(&request).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config) {
        eprintln!("Error: failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(&config).await {
        Ok(outcome) => {
            info!(?outcome, "register-user finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(
                "Failed to register user {}: {}",
                config.enrollment.user_label, e
            );
            ExitCode::FAILURE
        }
    }
}
