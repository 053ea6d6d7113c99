//! Unanalyzed articles -> prompt -> model -> parsed details -> storage,
//! then one alert digest per collection.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use fw_core::{
    AnalysisDetails, AnalysisMode, AnalysisResult, Article, ArticleStorage, CollectionRef, MarketMoverSource, Result,
};
use tracing::{debug, error, info, warn};

use crate::alerts::{compose_digest, select_alerts, AlertThresholds};
use crate::email::Mailer;
use crate::models::FallbackChain;
use crate::movers;
use crate::parse::extract_analysis_details;
use crate::prompt::build_prompt;

pub const FAILED_RAW: &str = "Analysis failed due to error.";

/// What happens to an article whose analysis errored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailedAnalysisPolicy {
    /// Store the error and flag the article analyzed; it is never retried.
    #[default]
    MarkAnalyzed,
    /// Store the error but leave the article eligible for the next run.
    Retry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSummary {
    pub collection: CollectionRef,
    pub found: usize,
    pub failed: usize,
    pub saved: usize,
    pub alerts: usize,
}

impl CollectionSummary {
    fn empty(collection: &CollectionRef) -> Self {
        Self {
            collection: collection.clone(),
            found: 0,
            failed: 0,
            saved: 0,
            alerts: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub mode: AnalysisMode,
    pub collections: Vec<CollectionSummary>,
}

impl RunSummary {
    pub fn analyzed(&self) -> usize {
        self.collections.iter().map(|c| c.found).sum()
    }

    pub fn alerts(&self) -> usize {
        self.collections.iter().map(|c| c.alerts).sum()
    }
}

pub struct NewsAnalyzer {
    storage: Arc<dyn ArticleStorage>,
    models: FallbackChain,
    mover_sources: Vec<Arc<dyn MarketMoverSource>>,
    mailer: Option<Arc<dyn Mailer>>,
    thresholds: AlertThresholds,
    failed_policy: FailedAnalysisPolicy,
    concurrency: usize,
    completion_delay: Duration,
}

impl NewsAnalyzer {
    pub fn new(storage: Arc<dyn ArticleStorage>, models: FallbackChain) -> Self {
        Self {
            storage,
            models,
            mover_sources: Vec::new(),
            mailer: None,
            thresholds: AlertThresholds::default(),
            failed_policy: FailedAnalysisPolicy::default(),
            concurrency: 4,
            completion_delay: Duration::from_secs(1),
        }
    }

    pub fn with_mover_sources(mut self, sources: Vec<Arc<dyn MarketMoverSource>>) -> Self {
        self.mover_sources = sources;
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_thresholds(mut self, thresholds: AlertThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_failed_policy(mut self, policy: FailedAnalysisPolicy) -> Self {
        self.failed_policy = policy;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Pause after each completed article, to stay under provider rate limits.
    pub fn with_completion_delay(mut self, delay: Duration) -> Self {
        self.completion_delay = delay;
        self
    }

    /// Never fails: model errors become an error result.
    pub async fn analyze_article(
        &self,
        article: &Article,
        collection: &CollectionRef,
        mode: AnalysisMode,
        market_context: &str,
    ) -> AnalysisResult {
        let short_title: String = article.title.chars().take(50).collect();
        info!(mode = %mode, url = %article.url, "Analyzing '{}'", short_title);

        let prompt = build_prompt(article, mode, market_context);
        let (model, raw, details, error) = match self.models.generate(&prompt).await {
            Ok((model, text)) => {
                debug!(model = %model, "Raw analysis: {}", text);
                let details = extract_analysis_details(&text);
                info!(
                    url = %article.url,
                    importance = details.importance_score,
                    sentiment = details.sentiment_score,
                    "Analysis extracted"
                );
                (Some(model), text, details, None)
            }
            Err(e) => {
                error!(url = %article.url, "LLM query failed: {}", e);
                (None, FAILED_RAW.to_string(), AnalysisDetails::default(), Some(e.to_string()))
            }
        };

        AnalysisResult {
            article_url: article.url.clone(),
            article_title: article.title.clone(),
            collection: collection.clone(),
            analysis_type: mode,
            model,
            raw,
            details,
            analyzed_at: Utc::now(),
            error,
        }
    }

    /// Analyze concurrently, pausing after every completion. Results come
    /// back in completion order.
    pub async fn analyze_batch(
        &self,
        articles: &[Article],
        collection: &CollectionRef,
        mode: AnalysisMode,
        market_context: &str,
    ) -> Vec<AnalysisResult> {
        info!(collection = %collection, mode = %mode, "Analyzing batch of {} articles", articles.len());

        let mut pending = stream::iter(articles)
            .map(|article| self.analyze_article(article, collection, mode, market_context))
            .buffer_unordered(self.concurrency);

        let mut results = Vec::with_capacity(articles.len());
        while let Some(result) = pending.next().await {
            results.push(result);
            if !self.completion_delay.is_zero() {
                tokio::time::sleep(self.completion_delay).await;
            }
        }
        results
    }

    /// Returns how many results were written. Write failures are logged.
    pub async fn save_results(&self, collection: &CollectionRef, results: &[AnalysisResult]) -> usize {
        if results.is_empty() {
            info!(collection = %collection, "No analysis results to save");
            return 0;
        }

        let mut saved = 0;
        for result in results {
            let mark_analyzed = !result.is_error() || self.failed_policy == FailedAnalysisPolicy::MarkAnalyzed;
            match self.storage.save_analysis(collection, result, mark_analyzed).await {
                Ok(true) => saved += 1,
                Ok(false) => warn!(url = %result.article_url, "Analyzed article no longer stored"),
                Err(e) => error!(url = %result.article_url, "Failed to save analysis: {}", e),
            }
        }
        info!(collection = %collection, "Saved {}/{} analysis results", saved, results.len());
        saved
    }

    /// Send one digest for every result that crosses the thresholds.
    /// Returns the number of alerts mailed.
    pub async fn check_alerts(&self, results: &[AnalysisResult]) -> Result<usize> {
        let alerts = select_alerts(results, &self.thresholds);
        let Some(digest) = compose_digest(&alerts) else {
            info!("No articles met the alert thresholds");
            return Ok(0);
        };

        let Some(mailer) = &self.mailer else {
            warn!("{} alerts triggered but no mailer is configured", alerts.len());
            return Ok(0);
        };

        info!("{} articles met the alert thresholds, sending digest", alerts.len());
        mailer.send(&digest.subject, &digest.body).await?;
        Ok(alerts.len())
    }

    async fn market_context(&self) -> String {
        movers::format_for_prompt(&movers::gather(&self.mover_sources).await)
    }

    /// One pass over `collections`. `mode` is chosen by the caller.
    pub async fn run(
        &self,
        mode: AnalysisMode,
        collections: &[CollectionRef],
        limit: usize,
        max_age_days: u32,
    ) -> RunSummary {
        let since = Utc::now() - ChronoDuration::days(i64::from(max_age_days));
        let mut market_context: Option<String> = None;
        let mut summaries = Vec::new();

        for collection in collections {
            info!(collection = %collection, mode = %mode, "Processing collection");
            let mut summary = CollectionSummary::empty(collection);

            let articles = match self.storage.find_unanalyzed(collection, since, limit).await {
                Ok(articles) => articles,
                Err(e) => {
                    error!(collection = %collection, "Could not load unanalyzed articles: {}", e);
                    summaries.push(summary);
                    continue;
                }
            };
            if articles.is_empty() {
                info!(collection = %collection, "No recent unanalyzed articles");
                summaries.push(summary);
                continue;
            }

            // Movers are fetched once per run, and only when something needs them.
            let context = match (mode, &market_context) {
                (AnalysisMode::Morning, _) => String::new(),
                (AnalysisMode::Evening, Some(context)) => context.clone(),
                (AnalysisMode::Evening, None) => {
                    let context = self.market_context().await;
                    market_context = Some(context.clone());
                    context
                }
            };

            let results = self.analyze_batch(&articles, collection, mode, &context).await;
            summary.found = articles.len();
            summary.failed = results.iter().filter(|r| r.is_error()).count();
            summary.saved = self.save_results(collection, &results).await;
            summary.alerts = match self.check_alerts(&results).await {
                Ok(sent) => sent,
                Err(e) => {
                    error!(collection = %collection, "Failed to send alert digest: {}", e);
                    0
                }
            };
            summaries.push(summary);
        }

        RunSummary {
            mode,
            collections: summaries,
        }
    }
}
