//! Ripple CLI entry point

use clap::{Parser, Subcommand};
use ripple_core::ChangeKind;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "ripple")]
#[command(about = "Dependency-aware impact analysis and safe editing for source trees", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Repository root path (defaults to current directory)
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the repository and persist the graph
    Scan {
        /// Ignore the cached graph and rebuild from scratch
        #[arg(long)]
        full: bool,
    },
    /// Resolve `@path` and `#symbol` references in free text
    Resolve {
        text: String,
    },
    /// Show what depends on a file (`@path`) or symbol (`#name`)
    Impact {
        target: String,

        /// Kind of change being considered
        #[arg(short, long, default_value = "modify-body")]
        kind: ChangeKind,

        /// Maximum traversal depth (defaults to the configured value)
        #[arg(short, long)]
        depth: Option<usize>,
    },
    /// Diff two files
    Diff {
        old: PathBuf,
        new: PathBuf,
    },
    /// Replace a file's content with another file's, with backup and validation
    Edit {
        /// File to edit, relative to the root
        path: PathBuf,

        /// File holding the new content
        #[arg(long)]
        from: PathBuf,

        /// Refuse the edit when validation fails
        #[arg(long)]
        strict: bool,
    },
    /// Restore a file from its backups
    Rollback {
        path: PathBuf,

        /// Backup id (defaults to the newest)
        #[arg(long)]
        id: Option<String>,
    },
    /// List a file's backups, newest first
    Backups {
        path: PathBuf,
    },
    /// Show what a file imports and what imports it
    Relations {
        path: PathBuf,
    },
    /// Print project statistics
    Summary,
    /// Clear the cache
    Clear,
    /// Show version
    Version,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("ripple={}", log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Ripple v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Repository root: {}", cli.root.display());

    let out = commands::Output { json: cli.json };
    match cli.command {
        Commands::Scan { full } => commands::scan(&cli.root, full, out),
        Commands::Resolve { text } => commands::resolve(&cli.root, &text, out),
        Commands::Impact { target, kind, depth } => commands::impact(&cli.root, &target, kind, depth, out),
        Commands::Diff { old, new } => commands::diff(&old, &new, out),
        Commands::Edit { path, from, strict } => commands::edit(&cli.root, &path, &from, strict, out),
        Commands::Rollback { path, id } => commands::rollback(&cli.root, &path, id, out),
        Commands::Backups { path } => commands::backups(&cli.root, &path, out),
        Commands::Relations { path } => commands::relations(&cli.root, &path, out),
        Commands::Summary => commands::summary(&cli.root, out),
        Commands::Clear => commands::clear(&cli.root),
        Commands::Version => {
            println!("Ripple v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
