use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, Timelike, Utc};
use clap::{Parser, Subcommand};
use fw_analysis::{FailedAnalysisPolicy, FallbackChain, Mailer, NewsAnalyzer, SmtpMailer};
use fw_core::{AnalysisMode, ArticleStorage, MarketMoverSource, Settings};
use fw_crawlers::adapters::{self, collections_for_region, known_collections};
use fw_crawlers::{
    init_logging, AdapterContext, CrawlManager, DragonTigerSource, Fetcher, Region, TushareSectorSource,
};
use fw_storage::maintenance::{self, SweepOutcome};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "fw", author, version, about = "Financial news crawler and analyzer", long_about = None)]
struct Cli {
    /// Storage URL: `sqlite://path.db` or `memory://`. Overrides STORAGE_URL.
    #[arg(long, global = true)]
    storage: Option<String>,

    /// Debug logging unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl news sources and store new articles.
    Crawl {
        /// Sources to run (see `fw list`). All of them when empty.
        names: Vec<String>,
        /// Articles fetched per source.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Delete articles older than the retention window.
    Maintain {
        #[arg(long, default_value_t = 30)]
        days: u32,
        /// Only report what would be deleted.
        #[arg(long)]
        dry_run: bool,
    },
    /// Analyze recent articles and mail an alert digest.
    Analyze {
        /// Articles per collection.
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Maximum article age in days.
        #[arg(long, default_value_t = 2)]
        days: u32,
        /// morning (US sources) or evening (Chinese sources). Picked from the
        /// local hour when omitted.
        #[arg(long)]
        mode: Option<AnalysisMode>,
        /// Leave failed analyses eligible for the next run.
        #[arg(long)]
        retry_failed: bool,
    },
    /// Show the available sources.
    List,
}

fn list_sources() {
    for region in [Region::China, Region::Us] {
        println!("{}:", region);
        for entry in adapters::registry().iter().filter(|e| e.region == region) {
            println!("  - {} -> {}", entry.name, entry.collection());
        }
    }
}

/// Evening market context: the Dragon & Tiger List first, then sector
/// performance when a Tushare token is configured.
fn mover_sources(settings: &Settings, fetcher: &Fetcher) -> Vec<Arc<dyn MarketMoverSource>> {
    let mut sources: Vec<Arc<dyn MarketMoverSource>> = vec![Arc::new(DragonTigerSource::new(fetcher.clone()))];
    match TushareSectorSource::from_settings(fetcher.clone(), settings) {
        Ok(source) => sources.push(Arc::new(source)),
        Err(e) => warn!("Sector performance disabled: {}", e),
    }
    sources
}

async fn crawl(storage: Arc<dyn ArticleStorage>, settings: Settings, names: Vec<String>, limit: usize) -> anyhow::Result<()> {
    let context = AdapterContext {
        fetcher: Fetcher::new()?,
        settings: Arc::new(settings),
    };
    let manager = CrawlManager::new(storage, context);

    info!(
        "Crawling {} (limit {} per source)",
        if names.is_empty() { "all sources".to_string() } else { names.join(", ") },
        limit
    );
    let reports = manager.run(&names, limit).await;
    for report in &reports {
        println!("{}", report);
    }
    let failed = reports.iter().filter(|r| r.outcome.is_failure()).count();
    if failed > 0 {
        warn!("{} of {} sources failed", failed, reports.len());
    }
    Ok(())
}

async fn maintain(storage: Arc<dyn ArticleStorage>, days: u32, dry_run: bool) -> anyhow::Result<()> {
    let targets = known_collections();
    let report = maintenance::purge(storage.as_ref(), &targets, days, dry_run, Utc::now()).await;

    for sweep in &report.collections {
        let line = match &sweep.outcome {
            SweepOutcome::Clean => "nothing to delete".to_string(),
            SweepOutcome::WouldDelete(n) => format!("would delete {}", n),
            SweepOutcome::Deleted { expected, deleted } => format!("deleted {} of {}", deleted, expected),
            SweepOutcome::Failed(reason) => format!("failed: {}", reason),
        };
        println!("{}: {}", sweep.collection, line);
    }
    if report.dry_run {
        println!("Dry run: {} documents older than {} would be deleted", report.total_matched(), report.cutoff);
    } else {
        println!("Deleted {} documents older than {}", report.total_deleted(), report.cutoff);
    }
    if report.failures() > 0 {
        warn!("{} collections could not be swept", report.failures());
    }
    Ok(())
}

async fn analyze(
    storage: Arc<dyn ArticleStorage>,
    settings: Settings,
    limit: usize,
    days: u32,
    mode: Option<AnalysisMode>,
    retry_failed: bool,
) -> anyhow::Result<()> {
    let mode = mode.unwrap_or_else(|| AnalysisMode::for_hour(Local::now().hour()));
    let region = match mode {
        AnalysisMode::Morning => Region::Us,
        AnalysisMode::Evening => Region::China,
    };

    let models = FallbackChain::from_settings(&settings).context("no usable LLM configuration")?;
    let policy = if retry_failed {
        FailedAnalysisPolicy::Retry
    } else {
        FailedAnalysisPolicy::MarkAnalyzed
    };
    let mut analyzer = NewsAnalyzer::new(storage, models).with_failed_policy(policy);

    match settings.email().and_then(|email| SmtpMailer::new(&email)) {
        Ok(mailer) => analyzer = analyzer.with_mailer(Arc::new(mailer) as Arc<dyn Mailer>),
        Err(e) => warn!("Email alerts disabled: {}", e),
    }
    if mode == AnalysisMode::Evening {
        analyzer = analyzer.with_mover_sources(mover_sources(&settings, &Fetcher::new()?));
    }

    info!(mode = %mode, "Starting analysis pipeline");
    let summary = analyzer.run(mode, &collections_for_region(region), limit, days).await;
    for collection in &summary.collections {
        println!(
            "{}: {} analyzed, {} failed, {} saved, {} alerts",
            collection.collection, collection.found, collection.failed, collection.saved, collection.alerts
        );
    }
    info!(
        analyzed = summary.analyzed(),
        alerts = summary.alerts(),
        "Analysis pipeline finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Commands::List = cli.command {
        list_sources();
        return Ok(());
    }

    let settings = Settings::from_env()?;
    let storage_url = cli.storage.clone().unwrap_or_else(|| settings.storage_url.clone());
    let storage = fw_storage::create_storage(&storage_url)
        .await
        .with_context(|| format!("could not open storage at {}", storage_url))?;
    info!("Storage ready ({})", storage_url);

    let outcome = match cli.command {
        Commands::Crawl { names, limit } => crawl(storage.clone(), settings, names, limit).await,
        Commands::Maintain { days, dry_run } => maintain(storage.clone(), days, dry_run).await,
        Commands::Analyze {
            limit,
            days,
            mode,
            retry_failed,
        } => analyze(storage.clone(), settings, limit, days, mode, retry_failed).await,
        Commands::List => Ok(()),
    };

    if let Err(e) = storage.close().await {
        error!("Failed to close storage: {}", e);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["fw", "--storage", "memory://", "crawl", "sina", "nbd"]).unwrap();
        assert_eq!(cli.storage.as_deref(), Some("memory://"));
        match cli.command {
            Commands::Crawl { names, limit } => {
                assert_eq!(names, vec!["sina", "nbd"]);
                assert_eq!(limit, 10);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::try_parse_from(["fw", "maintain", "--dry-run"]).unwrap();
        assert!(cli.storage.is_none());
        assert!(matches!(cli.command, Commands::Maintain { days: 30, dry_run: true }));

        let cli = Cli::try_parse_from(["fw", "analyze", "--mode", "evening"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Analyze {
                limit: 20,
                days: 2,
                mode: Some(AnalysisMode::Evening),
                retry_failed: false
            }
        ));
        assert!(Cli::try_parse_from(["fw", "analyze", "--mode", "noon"]).is_err());
    }

    #[tokio::test]
    async fn test_maintain_dry_run_on_memory_storage() {
        let storage = fw_storage::create_storage("memory://").await.unwrap();
        maintain(storage, 30, true).await.unwrap();
    }

    #[test]
    fn test_evening_mover_sources() {
        let fetcher = Fetcher::new().unwrap();

        let names = |sources: Vec<Arc<dyn MarketMoverSource>>| {
            sources.iter().map(|s| s.name().to_string()).collect::<Vec<_>>()
        };
        assert_eq!(names(mover_sources(&Settings::default(), &fetcher)), vec!["eastmoney_dragon_tiger"]);

        let settings = Settings {
            tushare_token: Some("t0k".to_string()),
            ..Settings::default()
        };
        assert_eq!(
            names(mover_sources(&settings, &fetcher)),
            vec!["eastmoney_dragon_tiger", "tushare_sectors"]
        );
    }
}
