//! airpods CLI entrypoint.
//!
//! This is the main entrypoint for the airpods command-line tool.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use airpods::accelerator::NvidiaSmiProbe;
use airpods::cli::{Cli, Commands, ConfigCommands, OutputFormatter, StdinConfirmer};
use airpods::config::{ConfigEnv, ConfigLoader, ResolvedConfig};
use airpods::engine::{select_gateway, HealthProber};
use airpods::error::{Result, EXIT_FATAL, EXIT_SUCCESS};
use airpods::orchestrator::{CleanTargets, Orchestrator};
use airpods::planner::{InvocationContext, ServicePlan};
use airpods::state::StatePaths;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Layer, Registry};
use uuid::Uuid;

/// Environment variable overriding the log filter.
const LOG_ENV: &str = "AIRPODS_LOG";

/// Time limit for a single engine command (pulls are exempt).
const ENGINE_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Main entrypoint.
fn main() -> ExitCode {
    if let Ok(cwd) = std::env::current_dir() {
        ConfigLoader::load_dotenv(&cwd);
    }
    let cli = Cli::parse();

    let log_filter = init_logging(cli.verbose, cli.log_json);
    let formatter = OutputFormatter::new(cli.output);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let run_id = Uuid::new_v4();
    let result = runtime.block_on(async {
        let watcher = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing up");
                watcher.cancel();
            }
        });

        run(cli, &formatter, cancel, log_filter)
            .instrument(info_span!("run", id = %run_id))
            .await
    });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprint!("{}", formatter.error(&e.to_string(), e.remediation().as_deref()));
            ExitCode::from(e.exit_code())
        }
    }
}

/// Initializes the logging system.
///
/// `AIRPODS_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool, json: bool) -> Option<FilterHandle> {
    let overridden = std::env::var(LOG_ENV).is_ok();
    let filter = if overridden {
        EnvFilter::from_env(LOG_ENV)
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    let (filter, handle) = reload::Layer::new(filter);

    let output = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_target(false).with_writer(std::io::stderr).boxed()
    };

    tracing_subscriber::registry().with(filter).with(output).init();
    (!overridden && !verbose).then_some(handle)
}

/// Main async entry point.
async fn run(
    cli: Cli,
    formatter: &OutputFormatter,
    cancel: CancellationToken,
    log_filter: Option<FilterHandle>,
) -> Result<u8> {
    let ctx = InvocationContext {
        env: ConfigEnv::from_process(),
        config_path: cli.config.clone(),
        force_cpu: matches!(cli.command, Commands::Start { cpu: true, .. }),
    };

    match cli.command {
        Commands::Config { command } => return cmd_config(&ctx, command, formatter),
        Commands::Start { init: true, .. } => cmd_init(&ctx, formatter)?,
        _ => {}
    }

    let probe = NvidiaSmiProbe::new();
    let plan = ServicePlan::build(&ctx, &probe).await?;
    let settings = &plan.config.config;

    if settings.cli.debug {
        if let Some(handle) = log_filter {
            if handle.reload(EnvFilter::new("debug")).is_ok() {
                debug!("Debug logging enabled by configuration");
            }
        }
    }

    let gateway = select_gateway(settings.runtime.prefer, ENGINE_COMMAND_TIMEOUT)?;
    let prober = HealthProber::new(
        settings.cli.startup_check_interval(),
        settings.cli.ping_timeout(),
    )?;
    let confirmer = Arc::new(StdinConfirmer::new(settings.cli.auto_confirm));
    let orchestrator = Orchestrator::new(gateway, prober, confirmer, cancel);

    match cli.command {
        Commands::Start {
            services,
            force,
            sequential,
            pull,
            ..
        } => {
            let options = Commands::start_options(force, pull, sequential);
            let report = orchestrator.start(&plan, &services, options).await?;
            print!("{}", formatter.format_start(&report));
            Ok(report.exit_code())
        }
        Commands::Stop {
            services,
            remove,
            force,
            timeout,
        } => {
            let options = Commands::stop_options(remove, force, timeout);
            let report = orchestrator.stop(&plan, &services, options).await?;
            print!("{}", formatter.format_stop(&report));
            Ok(report.exit_code())
        }
        Commands::Status { services } => {
            let report = orchestrator.status(&plan, &services).await?;
            print!("{}", formatter.format_status(&report));
            Ok(report.exit_code())
        }
        Commands::Clean {
            all,
            pods,
            volumes,
            images,
            network,
            configs,
            force,
            dry_run,
            no_backup_config,
        } => {
            let targets = CleanTargets {
                pods,
                volumes,
                images,
                network,
                configs,
            };
            let options = Commands::clean_options(all, targets, force, dry_run, no_backup_config)?;
            let report = orchestrator.clean(&plan, options).await?;
            print!("{}", formatter.format_clean(&report));
            Ok(report.exit_code())
        }
        Commands::Logs { service, tail } => {
            let output = orchestrator.logs(&plan, &service, tail).await?;
            print!("{output}");
            Ok(EXIT_SUCCESS)
        }
        Commands::Doctor => {
            let report = orchestrator.doctor(&plan).await;
            print!("{}", formatter.format_doctor(&report));
            Ok(if report.is_healthy() { EXIT_SUCCESS } else { EXIT_FATAL })
        }
        Commands::Config { .. } => Ok(EXIT_SUCCESS),
    }
}

/// Writes the default configuration if none exists yet.
fn cmd_init(ctx: &InvocationContext, formatter: &OutputFormatter) -> Result<()> {
    let loader = ctx.loader();
    if let Some(existing) = loader.discover() {
        debug!("Configuration already present at {}", existing.path.display());
        return Ok(());
    }

    let target = ctx.config_path.clone().map_or_else(
        || StatePaths::discover(&ctx.env, None).map(|paths| paths.config_file()),
        Ok,
    )?;
    if ConfigLoader::bootstrap_default(&target)? {
        info!("Initialized {}", target.display());
        eprint!("{}", formatter.success(&format!("Wrote default configuration to {}", target.display())));
    }
    Ok(())
}

/// Prints the resolved configuration or its location.
fn cmd_config(ctx: &InvocationContext, command: ConfigCommands, formatter: &OutputFormatter) -> Result<u8> {
    let loader = ctx.loader();
    match command {
        ConfigCommands::Path => {
            let path: Option<PathBuf> = loader.discover().map(|source| source.path);
            match (path, formatter.is_json()) {
                (Some(path), false) => println!("{}", path.display()),
                (None, false) => println!("(built-in defaults)"),
                (path, true) => println!("{}", serde_json::json!({ "path": path })),
            }
        }
        ConfigCommands::Show => {
            let config = ResolvedConfig::from_document(&loader.load()?)?;
            print!("{}", formatter.format_config(&config)?);
        }
    }
    Ok(EXIT_SUCCESS)
}
