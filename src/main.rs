use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use unrest_panel::app::context::AppContext;
use unrest_panel::config::Config;
use unrest_panel::logging;
use unrest_panel::observability::metrics;
use unrest_panel::pipeline::{BuildMode, Orchestrator};

#[derive(Parser)]
#[command(name = "unrest_panel")]
#[command(about = "Monthly per-country panel of conflict incidents and indicator series")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file (defaults to panel.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or reuse) the fused dataset
    Build {
        #[arg(long)]
        indicators: Option<PathBuf>,
        #[arg(long)]
        events: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Reuse the existing fused artifact instead of deriving it
        #[arg(long)]
        trust_cache: bool,
        /// Recompress the output even if a .xz sibling already exists
        #[arg(long)]
        refresh_compressed: bool,
    },
    /// Write PATH.xz next to PATH
    Compress { path: PathBuf },
    /// Restore PATH from PATH.xz (argument must end in .xz)
    Decompress { path: PathBuf },
    /// List countries present in the event extract as JSON
    Countries,
    /// Events for one country within a month range, as JSON
    Snapshot {
        #[arg(long)]
        iso: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _guard = logging::init_logging(&config.logging.dir);
    metrics::init();

    let result = run(cli.command, &mut config);
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    if cli.print_metrics {
        if let Some(text) = metrics::render() {
            eprintln!("{}", text);
        }
    }
    result
}

fn run(command: Commands, config: &mut Config) -> Result<()> {
    match command {
        Commands::Build {
            indicators,
            events,
            output,
            trust_cache,
            refresh_compressed,
        } => {
            if let Some(p) = indicators {
                config.paths.indicators = p;
            }
            if let Some(p) = events {
                config.paths.events = p;
            }
            if let Some(p) = output {
                config.paths.fused = p;
            }
            let mode = if trust_cache { BuildMode::TrustCache } else { BuildMode::Rebuild };
            let refresh = refresh_compressed || config.compression.refresh_on_rebuild;

            info!("Running {} build", mode.as_str());
            let outcome = Orchestrator::new(config.source_paths(), config.cache())
                .refresh_compressed(refresh)
                .run(mode)
                .context("Build failed")?;

            println!("📊 Fused dataset: {}", outcome.path.display());
            println!("   Source: {:?}", outcome.source);
            println!("   Rows: {}", outcome.dataset.len());
            println!("   Features: {}", outcome.dataset.feature_names().join(", "));
            println!("   SHA-256: {}", outcome.digest);
        }
        Commands::Compress { path } => {
            let out = config
                .cache()
                .compress(&path)
                .with_context(|| format!("Failed to compress {}", path.display()))?;
            println!("✅ Wrote {}", out.display());
        }
        Commands::Decompress { path } => {
            let out = config
                .cache()
                .decompress(&path)
                .with_context(|| format!("Failed to decompress {}", path.display()))?;
            println!("✅ Wrote {}", out.display());
        }
        Commands::Countries => {
            let context = AppContext::load(config, BuildMode::TrustCache)?;
            println!("{}", serde_json::to_string_pretty(&context.countries())?);
            context.shutdown();
        }
        Commands::Snapshot { iso, start, end } => {
            let context = AppContext::load(config, BuildMode::TrustCache)?;
            let snapshot = context.snapshot(&iso, &start, &end)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            context.shutdown();
        }
    }
    Ok(())
}
