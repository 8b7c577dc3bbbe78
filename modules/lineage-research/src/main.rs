//! Research runner CLI.
//!
//! Research mode searches every active source for every roster person and
//! stages findings for review; the remaining flags are review/maintenance
//! actions over the durable stores.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cdp_client::BrowserPool;
use kindred_client::KindredClient;
use lineage_common::{config_dir, Config, Query};
use lineage_research::researcher::{Researcher, ResearchOptions};
use lineage_research::{actions, LiveFetcher, RateLimiter};
use lineage_store::{Database, ErrorLog, SearchLog, StagingStore};

#[derive(Parser, Debug)]
#[command(
    name = "lineage-research",
    about = "Search genealogy sources for roster people and stage findings for review",
    after_help = "Examples:
  lineage-research --limit 5               Search 5 people, all sources
  lineage-research --source geneanet       Search Geneanet only
  lineage-research --all                   Full roster scan (careful!)
  lineage-research --review                Review staged findings
  lineage-research --submit-approved       Submit approved findings
  lineage-research --surname Smith --given-name John --birth-year 1850 --source findagrave
                                           One-off search, results printed"
)]
struct Args {
    /// Maximum number of people to process.
    #[arg(long)]
    limit: Option<usize>,

    /// Process all people (no limit).
    #[arg(long)]
    all: bool,

    /// Search a specific source only.
    #[arg(long)]
    source: Option<String>,

    /// Minimum match score to stage.
    #[arg(long, default_value_t = 80.0)]
    min_score: f64,

    /// Disable parallel searching (one source at a time).
    #[arg(long)]
    sequential: bool,

    /// Max parallel workers (the browser itself is limited to 2 tabs).
    #[arg(long, default_value_t = 16)]
    workers: usize,

    /// Show detailed output.
    #[arg(long, short)]
    verbose: bool,

    /// Review staged findings interactively.
    #[arg(long)]
    review: bool,

    /// Show summary of staged findings.
    #[arg(long)]
    summary: bool,

    /// Submit approved findings to the roster API.
    #[arg(long)]
    submit_approved: bool,

    /// Show processing statistics.
    #[arg(long)]
    stats: bool,

    /// Reset processed tracking (re-search everything).
    #[arg(long)]
    reset: bool,

    /// Show error tracking summary.
    #[arg(long)]
    errors: bool,

    /// Per-source quality analysis of pending findings.
    #[arg(long)]
    analyze: bool,

    /// Show roster details and staged findings for one person id.
    #[arg(long)]
    person: Option<String>,

    /// Copy the embedded database into the configured networked one.
    #[arg(long)]
    migrate: bool,

    /// Write config.example.json next to the config path and exit.
    #[arg(long)]
    init_config: bool,

    /// One-off search: surname.
    #[arg(long)]
    surname: Option<String>,

    /// One-off search: given name.
    #[arg(long)]
    given_name: Option<String>,

    /// One-off search: birth year.
    #[arg(long)]
    birth_year: Option<i32>,

    /// One-off search: location.
    #[arg(long)]
    location: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("lineage=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = Config::load();

    if args.review
        || args.summary
        || args.submit_approved
        || args.stats
        || args.reset
        || args.analyze
        || args.person.is_some()
    {
        return run_store_action(&args, &config).await;
    }
    if args.migrate {
        return run_migration(&config).await;
    }
    if args.errors {
        let error_log = ErrorLog::open(config_dir().join("error_log.json"));
        actions::show_errors(&error_log);
        return Ok(());
    }
    if args.init_config {
        let path = Config::write_example().context("writing example config")?;
        println!("Example config written to {}", path.display());
        println!("Copy it to {} and edit your settings", lineage_common::config_file().display());
        return Ok(());
    }
    if args.surname.is_some() {
        return run_single_search(&args, &config).await;
    }
    if args.limit.is_some() || args.all || args.source.is_some() {
        return run_research(&args, &config).await;
    }

    // Nothing selected: show usage.
    use clap::CommandFactory;
    Args::command().print_help()?;
    Ok(())
}

async fn open_database(config: &Config) -> Result<Arc<Database>> {
    Ok(Arc::new(Database::connect(&config.database).await.context("opening database")?))
}

async fn run_store_action(args: &Args, config: &Config) -> Result<()> {
    let db = open_database(config).await?;
    if args.reset {
        let search_log = SearchLog::new(Arc::clone(&db)).await?;
        return actions::reset_search_log(&search_log).await;
    }
    if args.stats {
        let search_log = SearchLog::new(Arc::clone(&db)).await?;
        return actions::show_stats(&search_log).await;
    }

    let staging = StagingStore::new(Arc::clone(&db)).await?;
    if args.review {
        actions::review_findings(&staging).await?;
    } else if args.summary {
        actions::show_summary(&staging).await?;
    } else if args.analyze {
        actions::analyze_findings(&staging).await?;
    } else if let Some(person_id) = &args.person {
        let client = KindredClient::from_config(&config.api).ok();
        actions::show_person(&staging, client.as_ref(), person_id).await?;
    } else if args.submit_approved {
        let client = KindredClient::from_config(&config.api)?;
        actions::submit_approved(&staging, &client).await?;
    }
    staging.close().await;
    Ok(())
}

/// Copy search log and staged findings from the embedded database to the
/// configured networked one. No fallback here: writing to the wrong
/// database silently would defeat the point.
async fn run_migration(config: &Config) -> Result<()> {
    anyhow::ensure!(
        config.database.is_networked(),
        "config must describe the networked database (database.type = \"networked\")"
    );

    let source = Database::open_sqlite(&config.database.sqlite_path)
        .await
        .context("opening embedded database")?;
    let dest = Arc::new(
        Database::connect_postgres(&config.database)
            .await
            .context("connecting to the networked database")?,
    );

    let report = lineage_store::migrate(&source, &dest).await?;
    println!("{report}");
    source.close().await;
    dest.close().await;
    Ok(())
}

async fn run_research(args: &Args, config: &Config) -> Result<()> {
    config.log_redacted();

    let db = open_database(config).await?;
    let search_log = Arc::new(SearchLog::new(Arc::clone(&db)).await?);
    let staging = Arc::new(StagingStore::new(Arc::clone(&db)).await?);
    let error_log = Arc::new(ErrorLog::open(config_dir().join("error_log.json")));

    let pool = BrowserPool::connect(&config.chrome.debug_host, config.chrome.debug_port)
        .await
        .context("connecting to the browser debug endpoint")?;
    let fetcher = Arc::new(LiveFetcher::new(pool));

    let roster = KindredClient::from_config(&config.api)
        .context("research needs the roster API configured")?;
    let mut people = roster.people();

    // Interrupts stop scheduling new people; in-flight workers finish so
    // tabs close cleanly.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, finishing current person then stopping");
            let _ = shutdown_tx.send(true);
        }
    });

    let researcher = Researcher::new(
        lineage_extract::registry(),
        fetcher,
        Arc::new(RateLimiter::new()),
        search_log,
        Arc::clone(&staging),
        error_log,
        shutdown_rx,
    );

    let opts = ResearchOptions {
        sources: args.source.clone().map(|s| vec![s]),
        // Default safety cap when neither --limit nor --all is given.
        limit: if args.all { None } else { Some(args.limit.unwrap_or(10)) },
        min_score: args.min_score,
        parallel: !args.sequential,
        max_workers: args.workers,
        verbose: args.verbose,
    };

    let stats = researcher.run(&mut people, &opts).await?;
    println!("{stats}");
    println!("\nRun with --review to review staged findings");
    staging.close().await;

    if stats.errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// One-off extraction against a single source, results printed not staged.
async fn run_single_search(args: &Args, config: &Config) -> Result<()> {
    let surname = args.surname.clone().unwrap_or_default();
    let source_key = args
        .source
        .clone()
        .context("one-off search requires --source KEY")?;

    let registry = lineage_extract::registry();
    let source = registry
        .iter()
        .find(|s| s.key == source_key)
        .with_context(|| format!("unknown source '{source_key}'"))?;

    let query = Query {
        surname,
        given_name: args.given_name.clone().unwrap_or_default(),
        birth_year: args.birth_year,
        birth_year_end: None,
        location: args.location.clone(),
        country: None,
        region: None,
        is_estimated_year: false,
    };

    let pool = BrowserPool::connect(&config.chrome.debug_host, config.chrome.debug_port)
        .await
        .context("connecting to the browser debug endpoint")?;
    let fetcher = LiveFetcher::new(pool);
    let rate_limiter = RateLimiter::new();

    use lineage_research::ContentFetcher;
    let fetched = rate_limiter
        .retry_with_backoff(source.key, || fetcher.fetch(source, &query))
        .await?;

    let records =
        lineage_extract::extract_with_fallback(source, &fetched.payload, &query, fetched.url.as_deref());

    println!("\n{} -> {} records", source.display_name, records.len());
    for (i, record) in records.iter().enumerate() {
        println!(
            "  {}. {} (b. {}) - {} [Score: {}]",
            i + 1,
            record.name,
            record.birth_year.map(|y| y.to_string()).unwrap_or_else(|| "?".into()),
            record.birth_place.as_deref().unwrap_or("unknown"),
            record.match_score
        );
        if args.verbose {
            if let Some(url) = &record.url {
                println!("     {url}");
            }
        }
    }
    Ok(())
}
