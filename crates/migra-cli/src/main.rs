mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{state::StateSubcommand, tenants::TenantsSubcommand, Context};
use migra_core::config::{Config, LoggingConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "migra",
    about = "Orchestrate database migrations across services and tenants",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file
    #[arg(long, short = 'c', global = true, env = "MIGRA_CONFIG", default_value = "migra.yaml")]
    config: PathBuf,

    /// Directory holding .migra/ state (default: auto-detect from .migra/ or migra.yaml)
    #[arg(long, global = true, env = "MIGRA_ROOT")]
    root: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Errors only
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Output as JSON
    #[arg(long, short = 'j', global = true)]
    json: bool,

    /// Cancel the run after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations for every configured service
    Deploy {
        /// Only this service
        #[arg(long, short = 's')]
        service: Option<String>,

        /// Report what would run without invoking any framework
        #[arg(long)]
        dry_run: bool,

        /// Use the parallel strategy regardless of config
        #[arg(long)]
        parallel: bool,
    },

    /// Roll back migrations for one service
    Rollback {
        #[arg(long, short = 's')]
        service: String,

        /// Number of migrations to undo
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        steps: u32,

        /// Roll back a single tenant instead of the shared database
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Show recorded execution history per service
    Status {
        /// Query each framework for applied/pending migrations instead
        #[arg(long)]
        live: bool,
    },

    /// Validate the configuration file
    Validate,

    /// Run operations across all tenants
    Tenants {
        #[command(subcommand)]
        subcommand: TenantsSubcommand,
    },

    /// Inspect or clear the execution state file
    State {
        #[command(subcommand)]
        subcommand: StateSubcommand,
    },
}

fn init_logging(logging: Option<&LoggingConfig>, verbose: bool, quiet: bool) {
    let defaults = LoggingConfig::default();
    let logging = logging.unwrap_or(&defaults);

    let level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        logging.level.as_str()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() {
    let cli = Cli::parse();

    let root = root::resolve_root(cli.root.as_deref());
    let config_path = root::resolve_config(&root, &cli.config);
    let config = Config::load(&config_path);

    init_logging(config.as_ref().ok().map(|c| &c.logging), cli.verbose, cli.quiet);

    let ctx = Context {
        root,
        config_path,
        config,
        json: cli.json,
        timeout: cli.timeout.map(Duration::from_secs),
    };

    let result = match cli.command {
        Commands::Deploy {
            service,
            dry_run,
            parallel,
        } => cmd::deploy::run(&ctx, service.as_deref(), dry_run, parallel),
        Commands::Rollback {
            service,
            steps,
            tenant,
        } => cmd::rollback::run(&ctx, &service, steps, tenant.as_deref()),
        Commands::Status { live } => cmd::status::run(&ctx, live),
        Commands::Validate => cmd::validate::run(&ctx),
        Commands::Tenants { subcommand } => cmd::tenants::run(&ctx, subcommand),
        Commands::State { subcommand } => cmd::state::run(&ctx, subcommand),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
