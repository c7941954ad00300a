//! CLI entry point for quire

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "quire")]
#[command(version)]
#[command(about = "Resolve and render content from a file-based site", long_about = None)]
struct Cli {
    /// Set the source root (defaults to current directory)
    #[arg(short, long, global = true)]
    cwd: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a request path and print the rendered page
    #[command(alias = "r")]
    Resolve {
        /// Request path, e.g. /docs/guide.html
        path: String,
    },

    /// Print the header fields of a source file as JSON
    Header {
        /// Source file relative to the source root
        file: String,
    },

    /// Build the data namespace and print it as JSON
    Data,

    /// Show the commit that last modified each file
    History {
        /// Directory relative to the source root
        dir: String,

        /// File names inside the directory
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        "quire=debug,info"
    } else {
        "quire=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Determine source root
    let base_dir = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir().context("cannot determine the current directory")?,
    };

    let site = quire::Site::open(&base_dir)
        .await
        .with_context(|| format!("failed to open site at {:?}", base_dir))?;

    match cli.command {
        Commands::Resolve { path } => {
            site.load_data().await?;
            quire::commands::resolve::run(&site, &path).await?;
        }

        Commands::Header { file } => {
            quire::commands::header::run(&site, &file).await?;
        }

        Commands::Data => {
            quire::commands::data::run(&site).await?;
        }

        Commands::History { dir, names } => {
            quire::commands::history::run(&site, &dir, &names).await?;
        }
    }

    Ok(())
}
