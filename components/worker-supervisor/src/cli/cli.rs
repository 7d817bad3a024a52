// Local crates
use crate::{
    helpers::load_config::Config,
    instrumentation::{self, LogRetention},
    output::OutputGate,
    runtime::{ExitStatus, Supervisor, Termination, announce_orphaned},
    services::{ServiceCatalog, parse_service_list},
    shutdown::{ExitGuard, ShutdownHookRegistry},
    supervision::{ProcessRole, role::ENV_SERVICE_TYPE},
};

// External crates
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "worker-supervisor",
    long_about = "Runs a cluster worker process: boots its services, watches the supervising agent and shuts everything down in order when asked.",
    about = "Supervision core for cluster worker processes",
    version,
    term_width = 100,
    after_help = "\
    EXAMPLES:
        worker-supervisor run --config /etc/worker.toml
        worker-supervisor run --services GSC,GSM --agent-id 7 --service-id gsa
        worker-supervisor validate --config ./worker.toml"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the worker until stopped
    Run(RunArgs),

    /// Validate the configuration and print the effective settings
    Validate {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `general.work_dir`
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Services to start, e.g. `GSC,GSM` or `services="GSC GSM"`
    #[arg(short, long)]
    services: Option<String>,

    /// Agent id of the supervising parent; overrides the environment
    #[arg(long, requires = "service_id")]
    agent_id: Option<String>,

    /// Service id of the supervising parent
    #[arg(long, requires = "agent_id")]
    service_id: Option<String>,
}

/// Entry function for CLI
pub async fn run() -> ExitStatus {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_worker(args).await,
        Commands::Validate { config } => match validate_config(config) {
            Ok(()) => ExitStatus::Graceful,
            Err(e) => {
                eprintln!("Configuration invalid: {e:#}");
                ExitStatus::BootFailure
            }
        },
        Commands::Version => {
            show_version();
            ExitStatus::Graceful
        }
    }
}

//
// ------------------------ Command Implementations ------------------------------
//

/// Boot and supervise the worker, then map how it ended to an exit status.
async fn run_worker(args: RunArgs) -> ExitStatus {
    let (config, role) = match prepare(&args) {
        Ok(prepared) => prepared,
        Err(e) => {
            eprintln!("Failed to start worker: {e:#}");
            return ExitStatus::BootFailure;
        }
    };

    let gate = OutputGate::stdio();
    let service_type = std::env::var(ENV_SERVICE_TYPE).ok();
    let log_name = role.log_name(service_type.as_deref(), &config.general.services);
    let _log_guard = match instrumentation::tracing::init_tracing(&config.general, &log_name, &gate) {
        Ok(guard) => guard,
        Err(e) => {
            let _ = gate.eprintln(&format!("Failed to initialise logging: {e:#}"));
            return ExitStatus::BootFailure;
        }
    };
    instrumentation::tracing::init_panic_handler();

    let registry = Arc::new(ShutdownHookRegistry::new());
    let orphan_grace = config.shutdown.orphan_grace();
    let retention = LogRetention::new(&config.general.log_dir, &log_name, config.general.log_retention());
    let supervisor = Supervisor::new(config, role, Arc::clone(&registry), Arc::clone(&gate))
        .with_catalog(ServiceCatalog::new())
        .with_housekeeping(Box::new(retention));
    let exit_guard = ExitGuard::new(registry, supervisor.coordinator());

    match supervisor.run().await {
        Ok(Termination::Stopped { .. }) => {
            drop(exit_guard);
            ExitStatus::Graceful
        }
        Ok(Termination::Orphaned) => {
            exit_guard.disarm();
            announce_orphaned(&gate, orphan_grace);
            ExitStatus::Orphaned
        }
        Err(e) => {
            tracing::error!(error = %e, "Worker failed to boot");
            // Services that did start still get closed.
            exit_guard.fire();
            ExitStatus::BootFailure
        }
    }
}

/// Load configuration, apply flag overrides and decide the process role.
fn prepare(args: &RunArgs) -> Result<(Config, ProcessRole)> {
    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(work_dir) = &args.work_dir {
        config.general.work_dir = work_dir.clone();
    }
    if let Some(services) = &args.services {
        config.general.services = parse_service_list(services);
    }

    let role = match (&args.agent_id, &args.service_id) {
        (Some(agent_id), Some(service_id)) => ProcessRole::supervised(agent_id, service_id),
        _ => ProcessRole::from_env().context("Failed to determine process role")?,
    };

    Ok((config, role))
}

/// Validate configuration file
fn validate_config(config: Option<PathBuf>) -> Result<()> {
    match &config {
        Some(path) => println!("Validating configuration file: {}", path.display()),
        None => println!("No configuration file given, validating defaults and environment"),
    }
    let cfg = Config::load(config.as_deref())?;
    println!("Configuration valid:\n{}", cfg.to_toml()?);
    Ok(())
}

/// Show version information
fn show_version() {
    println!("Worker Supervisor {}", env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags_override_config() {
        let cli = Cli::try_parse_from([
            "worker-supervisor",
            "run",
            "--work-dir",
            "/tmp/worker",
            "--services",
            "services=\"GSC GSM\"",
            "--agent-id",
            "7",
            "--service-id",
            "gsa",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };

        let (config, role) = prepare(&args).unwrap();

        assert_eq!(config.general.work_dir, PathBuf::from("/tmp/worker"));
        assert_eq!(config.general.services, ["GSC", "GSM"]);
        assert_eq!(role, ProcessRole::supervised("7", "gsa"));
    }

    #[test]
    fn test_agent_id_requires_service_id() {
        let err = Cli::try_parse_from(["worker-supervisor", "run", "--agent-id", "7"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
