mod database;
mod ingest;
mod registry;
mod scoring;
mod utils;

use std::path::PathBuf;
use std::thread;
use crossbeam::channel::bounded;
use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::database::repo::{InsertPolicy, Store};
use crate::ingest::collector::Collector;
use crate::ingest::fetcher::HttpFetcher;
use crate::ingest::parser::{ListingParser, DEFAULT_ORIGIN};
use crate::registry::galleries::Registry;
use crate::scoring::{analysis, engine};
use crate::utils::config::{self, Settings};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// KEY=VALUE settings file; ignored when missing
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    /// JSON array of {id, name, url} galleries, replacing the built-in set
    #[arg(long, global = true)]
    galleries: Option<PathBuf>,

    /// Skip posts whose (gallery, link) is already stored
    #[arg(long, global = true)]
    dedup: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest every gallery now and then once per interval
    Collect {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Rank galleries by activity
    Score {
        /// Print the ranking as JSON
        #[arg(long)]
        json: bool,
    },
    /// Post counts per listing date for one gallery
    Trend {
        /// Gallery id from the registry
        #[arg(long)]
        gallery: i64,
    },
    /// Most frequent words in post titles
    Keywords {
        /// How many words to list
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut settings = config::load_settings(&args.env_file)?;
    if let Some(db) = args.db {
        settings.db_path = db;
    }
    if let Some(galleries) = args.galleries {
        settings.galleries_file = Some(galleries);
    }
    if args.dedup {
        settings.insert_policy = InsertPolicy::SkipExisting;
    }

    let registry = match &settings.galleries_file {
        Some(path) => Registry::from_json_file(path)?,
        None => Registry::defaults(),
    };

    match args.command {
        Command::Collect { once } => collect(settings, registry, once),
        Command::Score { json } => print_scores(&settings, &registry, json),
        Command::Trend { gallery } => print_trend(&settings, gallery),
        Command::Keywords { limit } => print_keywords(&settings, limit),
    }
}

fn collect(settings: Settings, registry: Registry, once: bool) -> Result<()> {
    info!("Gallery collector starting");
    info!("DB: {:?}", settings.db_path);
    info!("Galleries: {}", registry.len());
    if registry.is_empty() {
        return Err(anyhow!("No galleries configured"));
    }

    let mut store = Store::open(&settings.db_path)?;
    store.sync_galleries(registry.as_slice())?;

    let fetcher = HttpFetcher::new(&settings.user_agent, settings.request_timeout)?;
    let parser = ListingParser::new(DEFAULT_ORIGIN)?;
    let mut collector = Collector::new(registry, fetcher, parser, store, settings.insert_policy);

    if once {
        let report = collector.run_cycle();
        info!("Single cycle done: {:?}", report);
        return Ok(());
    }

    // The sender is never signalled; the collector runs until the process ends.
    let (_shutdown_tx, shutdown_rx) = bounded::<()>(1);
    let interval = settings.interval;
    let handle = thread::spawn(move || collector.run(interval, shutdown_rx));

    let cycles = handle.join().map_err(|_| anyhow!("Collector thread panicked"))?;
    info!("Collector finished after {} cycles", cycles);
    Ok(())
}

fn print_scores(settings: &Settings, registry: &Registry, json: bool) -> Result<()> {
    let store = Store::open(&settings.db_path)?;
    let posts = store.all_posts()?;
    let ranking = engine::score(&posts, registry.as_slice());

    if json {
        println!("{}", serde_json::to_string_pretty(&ranking)?);
        return Ok(());
    }

    let stored = store.all_galleries()?;
    println!("{:>4}  {:<20} {:>7} {:>9} {:>10} {:>6} {:>8}", "rank", "gallery", "posts", "comments", "views", "recs", "score");
    for (i, record) in ranking.iter().enumerate() {
        let name = stored
            .iter()
            .chain(registry.iter())
            .find(|g| g.id == record.gallery_id)
            .map_or_else(|| record.gallery_id.to_string(), |g| g.name.clone());
        println!(
            "{:>4}  {:<20} {:>7} {:>9} {:>10} {:>6} {:>8.2}",
            i + 1,
            name,
            record.post_count,
            record.comment_count,
            record.view_count,
            record.recommendation_count,
            record.total_score
        );
    }
    Ok(())
}

fn print_trend(settings: &Settings, gallery_id: i64) -> Result<()> {
    let store = Store::open(&settings.db_path)?;
    let posts = store.all_posts()?;
    for (date, count) in analysis::daily_post_counts(&posts, gallery_id) {
        println!("{}\t{}", date, count);
    }
    Ok(())
}

fn print_keywords(settings: &Settings, limit: usize) -> Result<()> {
    let store = Store::open(&settings.db_path)?;
    let posts = store.all_posts()?;
    for (word, count) in analysis::keyword_frequencies(&posts, limit) {
        println!("{}\t{}", word, count);
    }
    Ok(())
}
