use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mangaloader::observer::ProgressObserver;
use mangaloader::{Config, Loader, LoaderError, PluginRegistry, RunSummary};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "mangaloader")]
#[command(about = "Download manga chapters and pack them into CBZ archives")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Site plugin to use
    #[arg(short = 'm', long, default_value = "mangafox", global = true)]
    plugin: String,

    /// Download directory (overrides storage.base_path)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the series the site knows about
    Series {
        /// Ignore the catalog cache and query the site
        #[arg(long)]
        refresh: bool,
        /// Only show names containing this text (case-insensitive)
        #[arg(long)]
        filter: Option<String>,
    },
    /// List the chapters of a series
    Chapters {
        /// Exact series name
        name: String,
    },
    /// Download one chapter or an inclusive range, e.g. `-c 14-20`
    Download {
        /// Exact series name
        name: String,
        #[arg(short, long)]
        chapters: String,
        /// Also pack each downloaded chapter into a CBZ
        #[arg(short = 'z', long)]
        zip: bool,
        /// Concurrent image downloads per chapter
        #[arg(long)]
        workers: Option<usize>,
        /// Attempts per image before giving up
        #[arg(long)]
        attempts: Option<u32>,
    },
    /// Pack already downloaded chapters into CBZ archives
    Zip {
        /// Exact series name
        name: String,
        #[arg(short, long)]
        chapters: String,
    },
    /// Write a default configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("reading {}", cli.config.display()))?;
    if let Some(output) = &cli.output {
        config.storage.base_path = output.clone();
    }

    if let Commands::Init = cli.command {
        return run_init(&cli.config, &config);
    }
    if let Commands::Download { workers, attempts, .. } = &cli.command {
        if let Some(workers) = workers {
            config.downloader.workers = *workers;
        }
        if let Some(attempts) = attempts {
            config.downloader.max_attempts = *attempts;
        }
    }

    let registry = PluginRegistry::new(&config)?;
    let plugin = registry
        .get(&cli.plugin)
        .with_context(|| format!("available plugins: {}", registry.names().join(", ")))?;

    let mut loader = Loader::new(plugin, &config)?.with_observer(Arc::new(ProgressObserver::new()));

    tokio::select! {
        result = run_command(&mut loader, cli.command) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping");
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(format!("mangaloader={}", level))
        .with_target(false)
        .init();

    Ok(())
}

fn run_init(path: &PathBuf, config: &Config) -> Result<()> {
    if path.exists() {
        warn!("{} already exists, leaving it alone", path.display());
        return Ok(());
    }
    config.save(path)?;
    info!("Wrote default configuration to {}", path.display());
    Ok(())
}

async fn run_command(loader: &mut Loader, command: Commands) -> Result<()> {
    match command {
        Commands::Series { refresh, filter } => {
            let filter = filter.map(|f| f.to_lowercase());
            let list = loader.all_series(refresh).await?;
            for series in list {
                if let Some(filter) = &filter {
                    if !series.name.to_lowercase().contains(filter) {
                        continue;
                    }
                }
                println!("{}", series.name);
            }
        }
        Commands::Chapters { name } => {
            let Some(mut series) = lookup_series(loader, &name).await? else {
                return Ok(());
            };
            let chapters = loader.chapters(&mut series).await?;
            println!("{:<8} {}", "Chapter", "Title");
            println!("{}", "-".repeat(40));
            for chapter in chapters {
                println!("{:<8} {}", chapter.number, chapter.title);
            }
        }
        Commands::Download { name, chapters, zip, .. } => {
            let numbers = parse_chapter_range(&chapters)?;
            loader.prepare().await.context("creating download directory")?;
            let Some(mut series) = lookup_series(loader, &name).await? else {
                return Ok(());
            };

            info!("Loading {} chapters of {}", numbers.len(), series.name);
            let summary = loader.handle(&mut series, &numbers, zip).await;
            report(&summary);
        }
        Commands::Zip { name, chapters } => {
            let numbers = parse_chapter_range(&chapters)?;
            let Some(mut series) = lookup_series(loader, &name).await? else {
                return Ok(());
            };
            let summary = loader.archive_range(&mut series, &numbers).await;
            report(&summary);
        }
        Commands::Init => {}
    }

    Ok(())
}

/// A missing series is reported, not fatal.
async fn lookup_series(loader: &mut Loader, name: &str) -> Result<Option<mangaloader::Series>> {
    match loader.resolve_series(name).await {
        Ok(series) => Ok(Some(series)),
        Err(e @ LoaderError::SeriesNotFound(_)) => {
            error!("{}", e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn report(summary: &RunSummary) {
    println!();
    print!("{}", summary);
    if summary.is_clean() {
        info!("Done");
    } else {
        warn!("Finished with errors");
    }
}

/// `N` or an inclusive `A-B`.
fn parse_chapter_range(input: &str) -> mangaloader::Result<Vec<u32>> {
    let invalid = || LoaderError::InvalidChapterRange(input.to_string());
    let parse = |s: &str| s.trim().parse::<u32>().map_err(|_| invalid());

    match input.split_once('-') {
        None => Ok(vec![parse(input)?]),
        Some((start, end)) => {
            let (start, end) = (parse(start)?, parse(end)?);
            if start > end {
                return Err(invalid());
            }
            Ok((start..=end).collect())
        }
    }
}
