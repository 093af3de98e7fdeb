//! Harvester CLI
//!
//! Runs one report export, checks that the machine is ready for one, or
//! prints the effective configuration.
//!
//! Usage:
//!   harvester run --config harvester.yaml      # Export once
//!   harvester run --headed --archive-dir ./out # Watch the browser work
//!   harvester health                           # Preflight checks as JSON
//!   harvester show-config                      # Effective settings
//!
//! Credentials come from `HARVESTER_USERNAME` / `HARVESTER_PASSWORD`, read
//! from the environment or a `.env` file in the working directory.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use harvester::{Credential, HealthStatus, PipelineConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

mod logging;

#[derive(Parser)]
#[command(name = "harvester")]
#[command(about = "Export reports from a JavaScript-heavy web portal, unattended")]
struct Cli {
    /// YAML configuration file; defaults apply to anything it leaves out
    #[clap(long, short = 'c', global = true, env = "HARVESTER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for the daily rolling log file
    #[clap(long, global = true, env = "HARVESTER_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug, Default)]
struct Overrides {
    /// Run the browser without a window (default)
    #[clap(long, conflicts_with = "headed")]
    headless: bool,

    /// Show the browser window
    #[clap(long)]
    headed: bool,

    /// Where the browser saves downloads
    #[clap(long)]
    download_dir: Option<PathBuf>,

    /// Where archived reports are moved to
    #[clap(long)]
    archive_dir: Option<PathBuf>,

    /// WebDriver endpoint to fall back to when no chromedriver can be launched
    #[clap(long, env = "HARVESTER_WEBDRIVER_URL")]
    webdriver_url: Option<String>,

    /// Save the login page markup before looking for the form
    #[clap(long)]
    dump_login_page: bool,
}

impl Overrides {
    fn apply(&self, config: &mut PipelineConfig) {
        if self.headless {
            config.browser.headless = true;
        }
        if self.headed {
            config.browser.headless = false;
        }
        if let Some(dir) = &self.download_dir {
            config.browser.download_dir = dir.clone();
        }
        if let Some(dir) = &self.archive_dir {
            config.archive.dest_dir = dir.clone();
        }
        if let Some(url) = &self.webdriver_url {
            config.browser.webdriver_url = url.clone();
        }
        if self.dump_login_page {
            config.diagnostics.dump_login_page = true;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Log in, export the report and archive the file
    Run(Overrides),
    /// Check driver availability and directories, print JSON
    Health(Overrides),
    /// Print the effective configuration (credentials redacted)
    ShowConfig(Overrides),
}

fn load_config(path: Option<&PathBuf>, overrides: &Overrides) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::from_yaml_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate().context("validating configuration")?;
    Ok(config)
}

fn credential_from_env() -> Result<Credential> {
    let identifier = std::env::var("HARVESTER_USERNAME")
        .context("HARVESTER_USERNAME is not set (environment or .env)")?;
    let secret = std::env::var("HARVESTER_PASSWORD")
        .context("HARVESTER_PASSWORD is not set (environment or .env)")?;
    if identifier.trim().is_empty() || secret.is_empty() {
        bail!("HARVESTER_USERNAME and HARVESTER_PASSWORD must not be empty");
    }
    Ok(Credential::new(identifier, secret))
}

async fn run(config: PipelineConfig) -> Result<()> {
    let credential = credential_from_env()?;
    info!(user = %credential.identifier, "Starting export run");
    let report = harvester::run_export(config, credential)
        .await
        .context("export run failed")?;
    println!("{}", report.path.display());
    Ok(())
}

async fn health(config: PipelineConfig) -> Result<ExitCode> {
    let result = harvester::check_health(&config).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(match result.status {
        HealthStatus::Unhealthy => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

fn show_config(config: &PipelineConfig) -> Result<()> {
    print!("{}", config.to_yaml()?);
    let user = std::env::var("HARVESTER_USERNAME").unwrap_or_else(|_| "<unset>".to_string());
    let password = match std::env::var("HARVESTER_PASSWORD") {
        Ok(_) => "[REDACTED]",
        Err(_) => "<unset>",
    };
    println!("credential:\n  identifier: {user}\n  secret: {password}");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init_logging(cli.log_dir.as_deref());

    let outcome = match &cli.command {
        Commands::Run(overrides) => match load_config(cli.config.as_ref(), overrides) {
            Ok(config) => run(config).await.map(|_| ExitCode::SUCCESS),
            Err(e) => Err(e),
        },
        Commands::Health(overrides) => match load_config(cli.config.as_ref(), overrides) {
            Ok(config) => health(config).await,
            Err(e) => Err(e),
        },
        Commands::ShowConfig(overrides) => load_config(cli.config.as_ref(), overrides)
            .and_then(|config| show_config(&config))
            .map(|_| ExitCode::SUCCESS),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
