//! atlas CLI: runs one search against a LanceDB dataset and prints the
//! reconciled result set.
//!
//! # Usage
//!
//! ```bash
//! atlas text "itchy rash"
//! atlas text "itchy rash" --vector --filter condition=eczema,psoriasis
//! atlas neighbors 42 --range age=20..40 --json
//! atlas upload lesion.png --pages 2
//! ```

mod args;
mod output;
mod session;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use atlas_core::config::Config;
use atlas_core::filter::FilterSpec;
use atlas_hybrid::UploadFile;

/// Search a dataset by text, by neighboring row or by uploaded file.
#[derive(Parser)]
#[command(name = "atlas", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding config.toml; relative data paths resolve against it
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// SQL row filter applied to every backend, e.g. "age > 30"
    #[arg(long)]
    predicate: Option<String>,

    /// Keep rows whose column equals one of the values: col=a,b
    #[arg(long = "filter", value_parser = args::parse_one_of)]
    filters: Vec<FilterSpec>,

    /// Keep rows whose list column holds any of the values: col=a,b
    #[arg(long = "any", value_parser = args::parse_any_of)]
    any: Vec<FilterSpec>,

    /// Keep rows whose numeric column lies in an inclusive range: col=min..max
    #[arg(long = "range", value_parser = args::parse_range)]
    ranges: Vec<FilterSpec>,

    /// Group results by this column instead of the configured one
    #[arg(long)]
    group: Option<String>,

    /// Extra pages to load after the first
    #[arg(long, default_value = "0")]
    pages: usize,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Full-text search over the configured text columns
    Text {
        query: String,
        /// Use the vector backend instead of full-text
        #[arg(long)]
        vector: bool,
    },
    /// Nearest neighbors of an existing row
    Neighbors { id: String },
    /// Nearest neighbors of a file posted to the upload endpoint
    Upload { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the results, logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "info" } else { "warn" }));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();

    let config = Config::load_from(&cli.config_dir).context("loading configuration")?;
    let settings = config.settings()?;
    info!(env = config.env_name(), dir = %cli.config_dir.display(), "configuration loaded");
    let orchestrator = session::open(&settings, &cli.config_dir, cli.group.clone()).await?;

    if let Some(predicate) = &cli.predicate { orchestrator.set_predicate(predicate).await; }
    let filters: Vec<FilterSpec> = cli.filters.iter().chain(&cli.any).chain(&cli.ranges).cloned().collect();
    if !filters.is_empty() { orchestrator.set_filters(filters).await; }

    match &cli.command {
        Command::Text { query, vector: false } => orchestrator.search_text_now(query).await,
        Command::Text { query, vector: true } => orchestrator.search_vector(query).await,
        Command::Neighbors { id } => orchestrator.find_neighbors(args::parse_row_id(id)).await,
        Command::Upload { path } => {
            let bytes = tokio::fs::read(path).await.with_context(|| format!("reading {}", path.display()))?;
            let name = path.file_name().map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
            orchestrator.submit_upload(UploadFile { name, bytes }).await;
        }
    }

    for _ in 0..cli.pages {
        if !orchestrator.view().has_more { break; }
        orchestrator.load_more().await;
    }

    let view = orchestrator.view();
    if let Some(status) = &view.status { warn!("{status}"); }
    let items = orchestrator.visible_items();
    let groups = orchestrator.groups();
    let focus = orchestrator.focus_point();
    let rendered = if cli.json {
        output::format_json(&view, &items, &groups, focus)
    } else {
        output::format_human(&view, &items, &groups)
    };
    println!("{rendered}");
    Ok(())
}
