use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "atmon")]
#[command(about = "Playback telemetry intake", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the report API and ship batches
    Run,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print the records of a batch file as JSON lines
    Inspect { path: PathBuf },
    /// Re-ship spilled batch files through the configured sink
    Replay { dir: PathBuf },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atmon=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config_path = atmon::config::resolve_config_path(cli.config.as_deref());

    match cli.command {
        Some(Commands::Run) | None => {
            atmon::cli::run::run(config_path).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                atmon::cli::config::init(stdout)?;
            }
            ConfigAction::Validate => {
                atmon::cli::config::validate(config_path)?;
            }
        },
        Some(Commands::Inspect { path }) => {
            atmon::cli::inspect::inspect(&path)?;
        }
        Some(Commands::Replay { dir }) => {
            atmon::cli::replay::replay(config_path, &dir).await?;
        }
    }

    Ok(())
}
