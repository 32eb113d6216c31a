mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, tenant::TenantSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "fleet",
    about = "Multi-tenant signal broadcaster: register tenants and run their channels",
    version,
    propagate_version = true
)]
struct Cli {
    /// Fleet root (default: auto-detect from .fleet/)
    #[arg(long, global = true, env = "FLEET_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .fleet/ with a default config and an empty registry
    Init,

    /// Manage registered tenants
    Tenant {
        #[command(subcommand)]
        subcommand: TenantSubcommand,
    },

    /// Inspect and validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Run all active channel tenants (console transport) until Ctrl-C
    Run {
        /// Perform a single reconcile pass and exit
        #[arg(long)]
        once: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Tenant { subcommand } => cmd::tenant::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Run { once } => cmd::run::run(&root, once, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
