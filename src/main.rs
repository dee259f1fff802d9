use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use placerank::config::load_config;
use placerank::store::{ItemSource, JsonPostingsSource};
use placerank_core::{Embedder, HashingEmbedder};
use placerank_ranking::{Query, RankingEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Rank internship postings for a candidate
#[derive(Parser, Debug)]
#[command(name = "placerank")]
#[command(about = "Rank internship postings for a candidate", long_about = None)]
struct Args {
    /// Engine config file (TOML). Falls back to PLACERANK_CONFIG, then defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Postings file (JSON array of listing records)
    #[arg(long, default_value = "./postings.json")]
    catalog: PathBuf,

    /// Embeddings cache file; postings with unchanged text are not embedded again
    #[arg(long)]
    embedding_cache: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rank postings for a query and print the result as JSON
    Rank(RankArgs),
    /// Load postings, build the index and report index/catalog consistency
    Check,
}

#[derive(clap::Args, Debug)]
struct RankArgs {
    /// What the candidate is looking for, in free text
    #[arg(long)]
    text: String,

    #[arg(long)]
    location: Option<String>,

    /// Comma-separated skills
    #[arg(long, value_delimiter = ',')]
    skills: Vec<String>,

    #[arg(long)]
    stipend_min: Option<i64>,

    #[arg(long)]
    stipend_max: Option<i64>,

    /// Desired duration in months
    #[arg(long)]
    duration: Option<u32>,

    #[arg(short = 'n', long, default_value_t = 10)]
    top_n: usize,

    /// Candidates fetched from the index before filtering
    #[arg(long)]
    over_fetch: Option<usize>,

    /// Weight override such as `skills=0.4`; may be repeated
    #[arg(long = "weight", value_parser = parse_weight)]
    weights: Vec<(String, f32)>,

    /// Print a short summary instead of JSON
    #[arg(long)]
    explain: bool,
}

fn parse_weight(raw: &str) -> Result<(String, f32), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=WEIGHT, got '{}'", raw))?;
    let value = value
        .trim()
        .parse::<f32>()
        .map_err(|e| format!("invalid weight '{}': {}", value, e))?;
    Ok((name.trim().to_string(), value))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting placerank v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(args.config.as_deref())?;
    let embedder = Arc::new(HashingEmbedder::new(config.index.dim)?);

    let mut source = JsonPostingsSource::new(&args.catalog, embedder.clone());
    if let Some(cache) = &args.embedding_cache {
        source = source.with_cache(cache);
    }
    let items = source
        .load()
        .with_context(|| format!("failed to load postings from {}", args.catalog.display()))?;
    info!("Loaded {} postings from {:?}", items.len(), args.catalog);

    let engine = RankingEngine::new(config)?;
    engine.rebuild(items).context("failed to build the ranking engine")?;
    info!("Indexed {} postings", engine.len());

    match args.command {
        Command::Rank(rank) => run_rank(&engine, embedder.as_ref(), rank),
        Command::Check => run_check(&engine),
    }
}

fn run_rank(engine: &RankingEngine, embedder: &dyn Embedder, args: RankArgs) -> anyhow::Result<()> {
    let mut query = Query::new(embedder.embed(&args.text)?).with_skills(&args.skills);
    if let Some(location) = args.location {
        query = query.with_location(location);
    }
    match (args.stipend_min, args.stipend_max) {
        (Some(min), Some(max)) => query = query.with_stipend(min, max),
        (Some(min), None) => query = query.with_stipend(min, i64::MAX),
        (None, Some(max)) => query = query.with_stipend(0, max),
        (None, None) => {}
    }
    if let Some(months) = args.duration {
        query = query.with_duration_months(months);
    }
    for (name, weight) in args.weights {
        query = query.with_weight(name, weight);
    }

    let ranking = engine.rank(&query, args.top_n, args.over_fetch)?;
    info!(
        "Ranked {} result(s) in {} round(s), quality {:?}",
        ranking.len(),
        ranking.stats.rounds,
        ranking.quality
    );

    if args.explain {
        println!("{}", ranking.explain());
    } else {
        println!("{}", serde_json::to_string_pretty(&ranking)?);
    }
    Ok(())
}

fn run_check(engine: &RankingEngine) -> anyhow::Result<()> {
    let report = engine.check_integrity();
    let summary = serde_json::json!({
        "indexed": engine.len(),
        "cataloged": engine.catalog().len(),
        "index_version": engine.index().version(),
        "integrity": &report,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !report.is_consistent() {
        bail!("{} indexed posting(s) have no catalog entry", report.dangling.len());
    }
    Ok(())
}
