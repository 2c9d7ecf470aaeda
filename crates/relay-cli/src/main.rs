//! relay CLI tool.

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "CI event dispatcher", long_about = None)]
struct Cli {
    /// Pipeline descriptor
    #[arg(long, global = true, env = "RELAY_CONFIG")]
    config: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Args)]
pub struct ProjectArgs {
    /// Repository name (e.g. org/repo)
    #[arg(long, env = "RELAY_REPO_NAME")]
    pub repo: String,

    /// Source-control access token
    #[arg(long, env = "RELAY_REPO_TOKEN", hide_env_values = true)]
    pub token: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle one event
    Dispatch {
        /// Event JSON file, or - for stdin
        #[arg(long, default_value = "-")]
        event: String,

        #[command(flatten)]
        project: ProjectArgs,

        /// Host checkout copied into unit-test containers (mounted read-only)
        #[arg(long, env = "RELAY_SOURCE_DIR")]
        source: Option<String>,

        /// Record jobs instead of running containers
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the jobs an event would run
    Render {
        /// Event JSON file, or - for stdin
        #[arg(long, default_value = "-")]
        event: String,

        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Validate a pipeline descriptor
    Validate {
        /// Path to the descriptor
        #[arg(default_value = "relay.kdl")]
        path: String,
    },
    /// List event subscriptions
    Handlers,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Dispatch {
            event,
            project,
            source,
            dry_run,
        } => {
            commands::dispatch::run(cli.config.as_deref(), &event, project, source, dry_run)
                .await?;
        }
        Commands::Render { event, project } => {
            commands::render(cli.config.as_deref(), &event, project)?;
        }
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
        Commands::Handlers => {
            commands::handlers();
        }
    }

    Ok(())
}
