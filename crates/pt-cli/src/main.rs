//! podtunnel CLI
//!
//! - `forward`: open one tunnel to a service or pod
//! - `up`: open every tunnel listed in the config file
//! - `config`: inspect or create the config file

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use podtunnel::commands::{self, ForwardArgs};
use podtunnel::output::print_error;
use pt_core::{LogLevel, PortMapping};

#[derive(Parser)]
#[command(name = "podtunnel")]
#[command(author, version, about = "Forward local ports to Kubernetes services and pods")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forward a local port to a service or pod
    Forward {
        /// Namespace of the target
        namespace: String,
        /// Service or pod name (services are tried first)
        target: String,
        /// LOCAL:REMOTE, :REMOTE (any free local port) or PORT
        ports: PortMapping,
        /// Kubeconfig to read (overrides config)
        #[arg(long)]
        kubeconfig: Option<PathBuf>,
        /// Kubeconfig context to use (overrides config)
        #[arg(long)]
        context: Option<String>,
        /// Session log level: debug, info, warn, error, off or 0-4
        #[arg(long)]
        log_level: Option<LogLevel>,
    },

    /// Open every tunnel listed in the config file
    Up,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_ref();

    if let Commands::Config { action } = &cli.command {
        return match action {
            ConfigAction::Show => commands::config_show(config_path),
            ConfigAction::Init { force } => commands::config_init(config_path, *force),
            ConfigAction::Path => commands::config_path(config_path),
        };
    }

    let settings = commands::load_settings(config_path)?;

    let session_level = match &cli.command {
        Commands::Forward {
            log_level: Some(level),
            ..
        } => *level,
        _ => settings.log_level,
    };
    init_logging(cli.quiet, cli.verbose, session_level);

    match cli.command {
        Commands::Forward {
            namespace,
            target,
            ports,
            kubeconfig,
            context,
            log_level,
        } => {
            let args = ForwardArgs {
                namespace,
                target,
                ports,
                kubeconfig,
                context,
                log_level,
            };
            commands::forward_command(&settings, args).await
        }
        Commands::Up => commands::up_command(&settings).await,
        Commands::Config { .. } => Ok(()),
    }
}

/// `RUST_LOG` wins; otherwise `-q`/`-v`, then the session log level
fn init_logging(quiet: bool, verbose: u8, session_level: LogLevel) {
    let level = match (quiet, verbose) {
        (true, _) => "error".to_string(),
        (false, 0) => session_level.as_level_filter().to_string(),
        (false, 1) => "info".to_string(),
        (false, 2) => "debug".to_string(),
        (false, _) => "trace".to_string(),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or(level),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
