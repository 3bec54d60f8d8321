//! slbctl CLI entrypoint.
//!
//! This is the main entrypoint for the slbctl command-line tool.

use std::path::Path;
use std::process::ExitCode;

use slb_reconcile::cli::{Cli, Commands, OutputFormatter};
use slb_reconcile::config::{AppConfig, ConfigParser, ConfigValidator};
use slb_reconcile::error::{ConfigError, Result, SlbError};
use slb_reconcile::harness::{ScenarioFile, ScenarioRunner};
use slb_reconcile::lease::LeaseTable;
use slb_reconcile::planner::DeclaredState;
use slb_reconcile::reconciler::Reconciler;
use slb_reconcile::slb::{ClusterLookup, MemorySlb, NetworkOracle, SlbApi, SlbClient};
use slb_reconcile::sweep::{PrefixNetworkOracle, SweepEngine, SweeperRegistry, SLB_SWEEPER};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose, cli.log_json);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. Logs go to stderr so that stdout only
/// carries command output.
fn init_logging(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Control plane the commands run against.
enum Backend {
    Remote {
        client: SlbClient,
        network: PrefixNetworkOracle,
    },
    Simulated(MemorySlb),
}

impl Backend {
    fn connect(config: &AppConfig, region: &str, simulate: bool) -> Result<Self> {
        if simulate {
            info!("Using in-process control plane for {region}");
            return Ok(Self::Simulated(MemorySlb::new(region)));
        }

        let token = ConfigParser::access_token()?;
        let client = SlbClient::with_timeout(
            &config.provider.endpoint,
            region,
            &token,
            config.provider.timeout_secs,
        )?;
        let network = PrefixNetworkOracle::new(client.clone(), config.sweep.prefixes.clone());
        Ok(Self::Remote { client, network })
    }

    fn api(&self) -> &dyn SlbApi {
        match self {
            Self::Remote { client, .. } => client,
            Self::Simulated(memory) => memory,
        }
    }

    fn network(&self) -> &dyn NetworkOracle {
        match self {
            Self::Remote { network, .. } => network,
            Self::Simulated(memory) => memory,
        }
    }

    fn clusters(&self) -> &dyn ClusterLookup {
        match self {
            Self::Remote { client, .. } => client,
            Self::Simulated(memory) => memory,
        }
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    let base = cli
        .config
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("."));
    let parser = ConfigParser::new().with_base_path(base);
    parser.load_dotenv()?;
    let config = parser.load_with_env(cli.config.as_deref())?;

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping at the next call boundary");
            signal.cancel();
        }
    });

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(&config, warnings, &formatter),
        Commands::Sweep { region, dry_run } => {
            cmd_sweep(&config, region, dry_run, cli.simulate, &cancel, &formatter).await
        }
        Commands::Sweepers => cmd_sweepers(&formatter),
        Commands::Apply { file, id } => {
            cmd_apply(&config, &file, id.as_deref(), cli.simulate, &cancel, &formatter).await
        }
        Commands::Show { id } => cmd_show(&config, &id, cli.simulate, &formatter).await,
        Commands::Destroy { id, force } => {
            cmd_destroy(&config, &id, force, cli.simulate, &cancel, &formatter).await
        }
        Commands::Scenario { file } => {
            cmd_scenario(&config, &file, cli.simulate, &cancel, &formatter).await
        }
    }
}

/// Builds a reconciler from configuration.
fn reconciler<'a>(
    config: &AppConfig,
    api: &'a dyn SlbApi,
    cancel: &CancellationToken,
) -> Reconciler<'a> {
    Reconciler::new(api)
        .with_retry(config.retry.policy(config.provider.timeout()))
        .with_cancellation(cancel.clone())
        .with_confirmation(config.retry.confirm_attempts, config.retry.confirm_delay())
}

/// Validate configuration.
fn cmd_validate(config: &AppConfig, show_warnings: bool, formatter: &OutputFormatter) -> Result<()> {
    let validator = ConfigValidator::new();
    let result = validator.check(config);
    println!("{}", formatter.format_validation(&result, show_warnings));

    validator.validate(config).map(|_| ())
}

/// Sweep orphaned load balancers.
async fn cmd_sweep(
    config: &AppConfig,
    region: Option<String>,
    dry_run: bool,
    simulate: bool,
    cancel: &CancellationToken,
    formatter: &OutputFormatter,
) -> Result<()> {
    ConfigValidator::new().validate(config)?;

    let regions = region.map_or_else(
        || config.sweep.regions_or(&config.provider.region),
        |r| vec![r],
    );
    let order = SweeperRegistry::builtin().resolve()?;
    let leases = LeaseTable::new();
    let mut failed = 0;

    for sweeper in &order {
        if sweeper.external {
            info!("Sweeper {} runs externally, assuming it has completed", sweeper.name);
            continue;
        }
        if sweeper.name != SLB_SWEEPER {
            debug!("No runner for sweeper {}", sweeper.name);
            continue;
        }

        for region in &regions {
            let backend = Backend::connect(config, region, simulate)?;
            let engine = SweepEngine::new(backend.api(), backend.network(), backend.clusters())
                .with_options(config.sweep.options(dry_run))
                .with_retry(config.retry.policy(config.provider.timeout()))
                .with_leases(leases.clone())
                .with_cancellation(cancel.clone());

            let report = engine.sweep(region).await?;
            failed += report.failed;
            println!("{}", formatter.format_sweep(&report));
        }
    }

    if failed > 0 {
        return Err(SlbError::Internal(format!("{failed} delete(s) failed during sweep")));
    }
    Ok(())
}

/// List sweepers in execution order.
fn cmd_sweepers(formatter: &OutputFormatter) -> Result<()> {
    let order = SweeperRegistry::builtin().resolve()?;
    println!("{}", formatter.format_sweepers(&order));
    Ok(())
}

/// Converge a load balancer to a declared-state file.
async fn cmd_apply(
    config: &AppConfig,
    file: &Path,
    id: Option<&str>,
    simulate: bool,
    cancel: &CancellationToken,
    formatter: &OutputFormatter,
) -> Result<()> {
    let declared = load_declared(file)?;
    let backend = Backend::connect(config, &config.provider.region, simulate)?;

    let outcome = reconciler(config, backend.api(), cancel)
        .converge(id, &declared)
        .await?;
    println!("{}", formatter.format_apply(&outcome));
    Ok(())
}

/// Show the live attributes of a load balancer.
async fn cmd_show(
    config: &AppConfig,
    id: &str,
    simulate: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let backend = Backend::connect(config, &config.provider.region, simulate)?;
    let record = reconciler(config, backend.api(), &CancellationToken::new())
        .read(id)
        .await?;
    println!("{}", formatter.format_record(&record));
    Ok(())
}

/// Delete a load balancer.
async fn cmd_destroy(
    config: &AppConfig,
    id: &str,
    force: bool,
    simulate: bool,
    cancel: &CancellationToken,
    formatter: &OutputFormatter,
) -> Result<()> {
    let backend = Backend::connect(config, &config.provider.region, simulate)?;
    let reconciler = reconciler(config, backend.api(), cancel);

    if force {
        reconciler.force_delete(id).await?;
    } else {
        reconciler.delete(id).await?;
    }

    println!("{}", formatter.success(&format!("Deleted {id}")));
    Ok(())
}

/// Run a verification scenario.
async fn cmd_scenario(
    config: &AppConfig,
    file: &Path,
    simulate: bool,
    cancel: &CancellationToken,
    formatter: &OutputFormatter,
) -> Result<()> {
    let scenario = ScenarioFile::load(file)?;
    info!("Running scenario '{}' ({} steps)", scenario.name, scenario.steps.len());

    let backend = Backend::connect(config, &config.provider.region, simulate)?;
    let result = ScenarioRunner::new(backend.api())
        .with_retry(config.retry.policy(config.provider.timeout()))
        .with_confirmation(config.retry.confirm_attempts, config.retry.confirm_delay())
        .with_cancellation(cancel.clone())
        .run_scenario(&scenario.steps)
        .await;

    println!("{}", formatter.format_scenario(&scenario.name, &result));

    if result.passed {
        Ok(())
    } else {
        Err(SlbError::Internal(format!("scenario '{}' failed", scenario.name)))
    }
}

/// Loads a declared-state file.
fn load_declared(path: &Path) -> Result<DeclaredState> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }

    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|e| {
        ConfigError::ParseError {
            message: format!("Invalid declaration: {e}"),
            location: Some(path.display().to_string()),
        }
        .into()
    })
}
