use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rulewatch::{Rebuild, RebuildScheduler, RuleSetBuilder, Settings};

#[derive(Parser)]
#[command(name = "rulewatch")]
#[command(about = "Watch a rules directory and rebuild the rule artifact on change")]
#[command(version)]
struct Cli {
    /// Path to settings file (defaults to .rulewatch/settings.toml)
    #[arg(short, long, global = true, env = "RULEWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the rules directory and rebuild on every change
    Watch {
        /// Directory to watch (overrides config)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Watch only the root directory, not its subdirectories
        #[arg(long)]
        non_recursive: bool,
    },

    /// Build the rule artifact once and list its contents
    Build {
        /// Rules directory (overrides config)
        #[arg(short, long)]
        root: Option<PathBuf>,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;

    rulewatch::logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Watch {
            root,
            non_recursive,
        } => {
            if let Some(root) = root {
                settings.watch.root = Some(root);
            }
            if non_recursive {
                settings.watch.recursive = false;
            }
            run_watch(&settings).await
        }
        Commands::Build { root } => {
            if let Some(root) = root {
                settings.watch.root = Some(root);
            }
            run_build(&settings)
        }
        Commands::Config => {
            let rendered =
                toml::to_string_pretty(&settings).context("failed to render configuration")?;
            println!("{rendered}");
            Ok(())
        }
    }
}

async fn run_watch(settings: &Settings) -> anyhow::Result<()> {
    let builder = Arc::new(RuleSetBuilder::from_settings(settings));

    // Initial artifact before any change arrives
    if let Err(e) = builder.rebuild().await {
        tracing::error!("[builder] initial build failed: {e}");
    }

    let scheduler = RebuildScheduler::from_config(&settings.watch, builder.clone())
        .context("failed to start directory watcher")?;

    if !scheduler.is_enabled() {
        eprintln!("No watch root configured; set watch.root or pass --root");
    }

    let handle = scheduler.spawn();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    rulewatch::log_event!("rulewatch", "shutting down");

    handle.shutdown().await.context("failed to close watcher")?;
    Ok(())
}

fn run_build(settings: &Settings) -> anyhow::Result<()> {
    let builder = RuleSetBuilder::from_settings(settings);
    if builder.layers().is_empty() {
        anyhow::bail!("no rules directory configured; set watch.root or pass --root");
    }

    let artifact = builder.build().context("rule build failed")?;

    println!("Built {} ({} files)", artifact.version(), artifact.len());
    for name in artifact.names() {
        println!("  {name}");
    }
    Ok(())
}
