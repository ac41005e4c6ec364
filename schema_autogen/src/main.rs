//! schema_autogen CLI
//!
//! Compares the configured models against a database (or a saved snapshot of one) and prints
//! the detected changes or the rendered apply/revert blocks.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use schema_autogen::autogen::{self, AutogenOptions};
use schema_autogen::config::{self, Config};
use schema_autogen::utils::logging;
use schema_autogen::{AutogenClient, ModelRegistry, ReflectedSchema};

/// Schema diff engine and migration renderer.
#[derive(Parser)]
#[command(name = "schema_autogen")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file.
    #[arg(short, long, env = "SCHEMA_AUTOGEN_CONFIG", default_value = "schema_autogen.toml")]
    config: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the detected changes as JSON.
    Diff {
        /// Compare against a saved snapshot instead of the database.
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },

    /// Print the rendered apply and revert blocks.
    Render {
        /// Compare against a saved snapshot instead of the database.
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },

    /// Capture the live schema as JSON.
    Snapshot {
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    if config.logging.is_some() {
        logging::init_logging(&config.logging)?;
    } else {
        let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(logging::env_filter(level)?)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    match cli.command {
        Commands::Diff { snapshot } => {
            let changes = match snapshot {
                Some(path) => {
                    let (options, live) = offline(&config, &path)?;
                    autogen::compare_metadata(&options, &live)?
                }
                None => connect(config).await?.compare().await?,
            };
            println!("{}", serde_json::to_string_pretty(&changes)?);
        }

        Commands::Render { snapshot } => {
            let diffs = match snapshot {
                Some(path) => {
                    let (options, live) = offline(&config, &path)?;
                    autogen::produce_migration_diffs(&options, &live)?
                }
                None => connect(config).await?.produce_migration_diffs().await?,
            };
            let imports = diffs.imports_text();
            if !imports.is_empty() {
                println!("{}\n", imports);
            }
            println!("def upgrade():\n    {}\n", diffs.upgrades);
            println!("def downgrade():\n    {}", diffs.downgrades);
        }

        Commands::Snapshot { output } => {
            let client = AutogenClient::new(config).await?;
            let live = client.snapshot().await?;
            let json = serde_json::to_string_pretty(&live)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), "Snapshot written");
                }
                None => println!("{}", json),
            }
        }
    }

    Ok(())
}

async fn connect(config: Config) -> anyhow::Result<AutogenClient> {
    let mut client = AutogenClient::new(config).await?;
    client.register_models()?;
    Ok(client)
}

/// Options and live schema for a comparison that never touches the database
fn offline(config: &Config, snapshot: &Path) -> anyhow::Result<(AutogenOptions, ReflectedSchema)> {
    let text = std::fs::read_to_string(snapshot)
        .with_context(|| format!("reading {}", snapshot.display()))?;
    let live: ReflectedSchema = serde_json::from_str(&text)?;

    let mut registry = ModelRegistry::new(&config.models);
    registry.scan_and_register()?;
    let options = AutogenOptions::from_config(config)?.target_metadata(registry.to_metadata(None)?);
    Ok((options, live))
}
