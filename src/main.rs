//! patrologia CLI entry point

use clap::{Parser, Subcommand};
use patrologia::{
    config::{Config, StoreBackend},
    error::Result,
    fetch::HttpFetcher,
    pipeline::Harvester,
    progress::LogWriterFactory,
    report::QaRow,
    store::{open_store, SCHEMA_SQL},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "patrologia")]
#[command(version, about = "Harvest hierarchical HTML text corpora into a relational store", long_about = None)]
struct Cli {
    /// Path to config file or its directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print command results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Discover and harvest every version reachable from the index
    Run {
        /// Index page to start discovery from
        #[arg(long)]
        start_url: Option<String>,

        /// Stop after this many versions
        #[arg(long)]
        max_works: Option<usize>,

        /// Requests per second against the source site
        #[arg(long)]
        rate: Option<f64>,

        /// Skip versions before the one with this work slug
        #[arg(long)]
        resume_from: Option<String>,

        /// Store backend: rest, sqlite or none
        #[arg(long, env = "PATROLOGIA_BACKEND")]
        backend: Option<StoreBackend>,

        /// Extract everything but write nothing
        #[arg(long)]
        no_upload: bool,

        /// Where to write the QA report
        #[arg(long)]
        qa_csv: Option<String>,
    },

    /// Harvest a single version page
    Version {
        /// Version URL
        url: String,

        /// Store backend: rest, sqlite or none
        #[arg(long)]
        backend: Option<StoreBackend>,

        /// Extract everything but write nothing
        #[arg(long)]
        no_upload: bool,
    },

    /// Print the relational schema used by the SQLite store
    Schema,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Init { force } => handle_init(cli.config.as_deref(), force),

        Commands::Schema => {
            println!("{}", SCHEMA_SQL.trim());
            Ok(())
        }

        Commands::Run {
            start_url,
            max_works,
            rate,
            resume_from,
            backend,
            no_upload,
            qa_csv,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(url) = start_url {
                config.source.start_url = url;
            }
            if max_works.is_some() {
                config.source.max_works = max_works;
            }
            if let Some(rps) = rate {
                config.fetch.requests_per_second = rps;
            }
            if let Some(path) = qa_csv {
                config.report.qa_csv = path;
            }
            apply_backend(&mut config, backend, no_upload);
            config.validate()?;

            let harvester = build_harvester(config).await?;
            let summary = harvester.run(resume_from.as_deref()).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary.rows)?);
            } else {
                println!(
                    "✓ {} work(s) harvested, {} failed",
                    summary.works_ok, summary.works_failed
                );
            }
            Ok(())
        }

        Commands::Version {
            url,
            backend,
            no_upload,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            apply_backend(&mut config, backend, no_upload);
            config.validate()?;

            let harvester = build_harvester(config).await?;
            let outcome = harvester.process_version(&url).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome.row)?);
            } else {
                print_row(&outcome.row);
                println!("  Rows written: {}", outcome.persisted.total());
            }
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool, json_logs: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(LogWriterFactory))
            .with(filter)
            .init();
    }
}

fn apply_backend(config: &mut Config, backend: Option<StoreBackend>, no_upload: bool) {
    if let Some(backend) = backend {
        config.store.backend = backend;
    }
    if no_upload {
        config.store.backend = StoreBackend::None;
    }
}

async fn build_harvester(config: Config) -> Result<Harvester> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping");
            on_signal.cancel();
        }
    });

    let fetcher = Arc::new(HttpFetcher::new(&config.fetch, cancel.clone())?);
    let store = open_store(&config).await?;
    Ok(Harvester::new(config, fetcher, store, cancel))
}

fn print_row(row: &QaRow) {
    println!("✓ {}", row.work_slug);
    println!("  TOC source: {}", row.toc_source);
    println!(
        "  Sections: {}  Passages: {}  Verses: {}",
        row.sections, row.passages, row.verses
    );
    println!("  Notes: {}  Note links: {}", row.notes, row.note_links);
    if row.units_failed > 0 {
        println!("  Failed units: {}", row.units_failed);
    }
    if !row.dominant_role.is_empty() {
        println!("  Dominant role: {}", row.dominant_role);
    }
}

/// Split `--config` into base directory and config file
fn config_location(path: Option<&Path>) -> (PathBuf, PathBuf) {
    match path {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path.to_path_buf())
        }
        Some(dir) => (dir.to_path_buf(), dir.join("config.toml")),
        None => (Config::default_base_dir(), Config::default_config_path()),
    }
}

fn handle_init(path: Option<&Path>, force: bool) -> Result<()> {
    let (base_dir, config_path) = config_location(path);

    if config_path.exists() && !force {
        eprintln!(
            "Config file already exists at: {}\nUse --force to overwrite.",
            config_path.display()
        );
        std::process::exit(1);
    }

    let mut config = Config::at(base_dir);
    config.paths.config_file = config_path.clone();
    config.save()?;

    println!("✓ patrologia initialized");
    println!("  Config: {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Set source.start_url and the store backend in the config file");
    println!("  2. Export the REST service key as {}", config.store.api_key_env);
    println!("  3. Harvest: patrologia run --max-works 5");

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let (base_dir, config_path) = config_location(path);
    if config_path.exists() {
        Config::load(&config_path)
    } else if path.is_some() {
        eprintln!(
            "Config file not found: {}\nRun 'patrologia init' first.",
            config_path.display()
        );
        std::process::exit(1);
    } else {
        Config::load_from(Some(base_dir))
    }
}
