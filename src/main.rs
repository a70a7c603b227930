use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "drain")]
#[command(about = "Telemetry sink writing events to rolling batch files", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept events and write them to every destination (default)
    Run,
    /// Run one compaction pass over every file destination and exit
    Compact,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a starter config to ~/.config/drain/config.yml
    Init {
        #[arg(long)]
        stdout: bool,
    },
    /// Load and validate the config without starting anything
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drain=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config_path = drain::config::resolve_config_path(cli.config.as_deref());

    match cli.command {
        Some(Commands::Run) | None => {
            drain::cli::run::run(config_path).await?;
        }
        Some(Commands::Compact) => {
            drain::cli::compact::compact(config_path).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                drain::cli::config::init(stdout)?;
            }
            ConfigAction::Validate => {
                drain::cli::config::validate(config_path)?;
            }
        },
    }

    Ok(())
}
