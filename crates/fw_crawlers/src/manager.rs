use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use fw_core::{Article, ArticleStorage, CollectionRef, Result, SaveCounts};
use tracing::{debug, error, info, warn};

use crate::adapters::{self, AdapterContext, AdapterEntry, SourceAdapter};

/// How one adapter run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Saved(SaveCounts),
    /// The listing came back empty.
    NothingListed,
    /// Every candidate was already stored or had no extractable body.
    NothingFetched,
    Failed(String),
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub source: String,
    pub collection: CollectionRef,
    pub outcome: RunOutcome,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = &self.collection;
        match &self.outcome {
            RunOutcome::Saved(counts) => write!(
                f,
                "{} -> {}: {} inserted, {} updated",
                self.source, target, counts.inserted, counts.updated
            ),
            RunOutcome::NothingListed => write!(f, "{} -> {}: nothing listed", self.source, target),
            RunOutcome::NothingFetched => write!(f, "{} -> {}: nothing new", self.source, target),
            RunOutcome::Failed(reason) => write!(f, "{} -> {}: failed: {}", self.source, target, reason),
        }
    }
}

/// Runs source adapters concurrently against one storage backend.
pub struct CrawlManager {
    storage: Arc<dyn ArticleStorage>,
    context: AdapterContext,
    entries: Vec<AdapterEntry>,
}

impl CrawlManager {
    pub fn new(storage: Arc<dyn ArticleStorage>, context: AdapterContext) -> Self {
        Self::with_entries(storage, context, adapters::registry())
    }

    pub fn with_entries(storage: Arc<dyn ArticleStorage>, context: AdapterContext, entries: Vec<AdapterEntry>) -> Self {
        Self {
            storage,
            context,
            entries,
        }
    }

    /// Entries for `names`, or all of them when `names` is empty. Unknown
    /// names are logged and skipped.
    fn select(&self, names: &[String]) -> Vec<AdapterEntry> {
        if names.is_empty() {
            return self.entries.clone();
        }
        let mut selected = Vec::new();
        for name in names {
            match self.entries.iter().find(|e| e.name.eq_ignore_ascii_case(name)) {
                Some(entry) if !selected.iter().any(|s: &AdapterEntry| s.name == entry.name) => selected.push(*entry),
                Some(_) => {}
                None => warn!(source = %name, "Unknown source, skipping"),
            }
        }
        selected
    }

    /// Build and run the named adapters, `limit` articles each.
    pub async fn run(&self, names: &[String], limit: usize) -> Vec<RunReport> {
        let mut reports = Vec::new();
        let mut built = Vec::new();

        for entry in self.select(names) {
            match (entry.build)(&self.context) {
                Ok(adapter) => built.push(adapter),
                Err(e) => {
                    error!(source = entry.name, "Could not construct adapter: {}", e);
                    reports.push(RunReport {
                        source: entry.name.to_string(),
                        collection: entry.collection(),
                        outcome: RunOutcome::Failed(e.to_string()),
                    });
                }
            }
        }

        reports.extend(self.run_adapters(built, limit).await);
        reports
    }

    /// Each adapter is its own task so a panic in one leaves the rest intact.
    pub async fn run_adapters(&self, adapters: Vec<Box<dyn SourceAdapter>>, limit: usize) -> Vec<RunReport> {
        let labels: Vec<(String, CollectionRef)> = adapters
            .iter()
            .map(|a| (a.name().to_string(), a.collection()))
            .collect();

        let handles = adapters.into_iter().map(|adapter| {
            let storage = self.storage.clone();
            tokio::spawn(async move { run_adapter(adapter.as_ref(), storage.as_ref(), limit).await })
        });

        join_all(handles)
            .await
            .into_iter()
            .zip(labels)
            .map(|(joined, (source, collection))| {
                let outcome = match joined {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => {
                        error!(source = %source, "Crawl failed: {}", e);
                        RunOutcome::Failed(e.to_string())
                    }
                    Err(e) => {
                        error!(source = %source, "Crawl task aborted: {}", e);
                        RunOutcome::Failed(format!("task aborted: {}", e))
                    }
                };
                RunReport {
                    source,
                    collection,
                    outcome,
                }
            })
            .collect()
    }
}

/// Fetch-List -> Dedup-Filter -> Fetch-Bodies -> Persist.
async fn run_adapter(adapter: &dyn SourceAdapter, storage: &dyn ArticleStorage, limit: usize) -> Result<RunOutcome> {
    let source = adapter.name();
    let collection = adapter.collection();
    info!(source, collection = %collection, limit, "Starting crawl");

    let candidates = adapter.list_candidates(limit).await?;
    if candidates.is_empty() {
        info!(source, "Listing is empty");
        return Ok(RunOutcome::NothingListed);
    }

    let mut seen = HashSet::new();
    let mut fresh = Vec::new();
    for candidate in candidates {
        if !seen.insert(candidate.url.clone()) {
            debug!(source, url = %candidate.url, "Duplicate in listing");
            continue;
        }
        match storage.exists(&collection, &candidate.url).await {
            Ok(true) => debug!(source, url = %candidate.url, "Already stored"),
            Ok(false) => fresh.push(candidate),
            Err(e) => {
                // Upsert settles it either way.
                warn!(source, url = %candidate.url, "Existence check failed: {}", e);
                fresh.push(candidate);
            }
        }
    }
    info!(source, "{} new articles to fetch", fresh.len());

    let mut articles = Vec::new();
    for candidate in fresh {
        let body = match adapter.fetch_body(&candidate.url).await {
            Ok(Some(body)) if !body.trim().is_empty() => body,
            Ok(_) => {
                warn!(source, url = %candidate.url, "No content extracted, skipping");
                continue;
            }
            Err(e) => {
                warn!(source, url = %candidate.url, "Body fetch failed, skipping: {}", e);
                continue;
            }
        };
        articles.push(Article::from_candidate(candidate, body, source, Utc::now()));
    }

    if articles.is_empty() {
        return Ok(RunOutcome::NothingFetched);
    }

    let counts = storage.upsert_articles(&collection, &articles).await?;
    info!(
        source,
        inserted = counts.inserted,
        updated = counts.updated,
        "Saved articles to {}",
        collection
    );
    Ok(RunOutcome::Saved(counts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Region;
    use crate::fetch::testing::{fetcher, ScriptedTransport};
    use async_trait::async_trait;
    use fw_core::{Candidate, Error, Settings};
    use fw_storage::InMemoryStorage;

    enum Behaviour {
        Ok,
        Fails,
        Panics,
        EmptyList,
    }

    struct FakeAdapter {
        name: &'static str,
        behaviour: Behaviour,
    }

    fn candidate(url: &str) -> Candidate {
        Candidate {
            url: url.to_string(),
            title: format!("title of {}", url),
            published_date: None,
            source_page_url: Some("https://fake.test/list".to_string()),
        }
    }

    #[async_trait]
    impl SourceAdapter for FakeAdapter {
        fn name(&self) -> &str {
            self.name
        }

        fn collection(&self) -> CollectionRef {
            CollectionRef::new("Fake", self.name)
        }

        async fn list_candidates(&self, limit: usize) -> Result<Vec<Candidate>> {
            match self.behaviour {
                Behaviour::Fails => Err(Error::Scraping("listing broke".to_string())),
                Behaviour::Panics => panic!("adapter blew up"),
                Behaviour::EmptyList => Ok(Vec::new()),
                Behaviour::Ok => Ok(vec![
                    candidate("https://fake.test/1"),
                    candidate("https://fake.test/1"),
                    candidate("https://fake.test/2"),
                    candidate("https://fake.test/no-body"),
                    candidate("https://fake.test/3"),
                ]
                .into_iter()
                .take(limit)
                .collect()),
            }
        }

        async fn fetch_body(&self, url: &str) -> Result<Option<String>> {
            match url {
                "https://fake.test/no-body" => Ok(None),
                "https://fake.test/3" => Err(Error::Fetch("gone".to_string())),
                _ => Ok(Some(format!("body of {}", url))),
            }
        }
    }

    fn fake(name: &'static str, behaviour: Behaviour) -> Box<dyn SourceAdapter> {
        Box::new(FakeAdapter { name, behaviour })
    }

    fn manager(storage: Arc<InMemoryStorage>, entries: Vec<AdapterEntry>) -> CrawlManager {
        let context = AdapterContext {
            fetcher: fetcher(Arc::new(ScriptedTransport::new())),
            settings: Arc::new(Settings::default()),
        };
        CrawlManager::with_entries(storage, context, entries)
    }

    #[tokio::test]
    async fn test_one_failing_adapter_does_not_affect_others() {
        let storage = Arc::new(InMemoryStorage::new());
        let manager = manager(storage.clone(), Vec::new());

        let reports = manager
            .run_adapters(
                vec![
                    fake("alpha", Behaviour::Ok),
                    fake("broken", Behaviour::Panics),
                    fake("beta", Behaviour::Ok),
                    fake("erroring", Behaviour::Fails),
                ],
                10,
            )
            .await;

        assert_eq!(reports.len(), 4);
        let saved = SaveCounts { inserted: 2, updated: 0 };
        assert_eq!(reports[0].outcome, RunOutcome::Saved(saved));
        assert!(reports[1].outcome.is_failure());
        assert_eq!(reports[2].outcome, RunOutcome::Saved(saved));
        assert!(reports[3].outcome.is_failure());

        let alpha = CollectionRef::new("Fake", "alpha");
        assert!(storage.exists(&alpha, "https://fake.test/2").await.unwrap());
        assert!(!storage.exists(&alpha, "https://fake.test/no-body").await.unwrap());
    }

    #[tokio::test]
    async fn test_stored_urls_are_not_refetched() {
        let storage = Arc::new(InMemoryStorage::new());
        let manager = manager(storage.clone(), Vec::new());

        let first = manager.run_adapters(vec![fake("alpha", Behaviour::Ok)], 10).await;
        assert_eq!(first[0].outcome, RunOutcome::Saved(SaveCounts { inserted: 2, updated: 0 }));

        let second = manager.run_adapters(vec![fake("alpha", Behaviour::Ok)], 10).await;
        assert_eq!(second[0].outcome, RunOutcome::NothingFetched);
    }

    #[tokio::test]
    async fn test_empty_listing_and_limit() {
        let storage = Arc::new(InMemoryStorage::new());
        let manager = manager(storage, Vec::new());

        let reports = manager
            .run_adapters(vec![fake("empty", Behaviour::EmptyList), fake("alpha", Behaviour::Ok)], 1)
            .await;
        assert_eq!(reports[0].outcome, RunOutcome::NothingListed);
        assert_eq!(reports[1].outcome, RunOutcome::Saved(SaveCounts { inserted: 1, updated: 0 }));
    }

    fn build_alpha(_: &AdapterContext) -> Result<Box<dyn SourceAdapter>> {
        Ok(fake("alpha", Behaviour::Ok))
    }

    fn build_missing_key(_: &AdapterContext) -> Result<Box<dyn SourceAdapter>> {
        Err(Error::Config("FAKE_API_KEY is not set".to_string()))
    }

    const ALPHA: AdapterEntry = AdapterEntry {
        name: "alpha",
        region: Region::China,
        database: "Fake",
        collection: "alpha",
        build: build_alpha,
    };

    const KEYED: AdapterEntry = AdapterEntry {
        name: "keyed",
        region: Region::Us,
        database: "Fake",
        collection: "keyed",
        build: build_missing_key,
    };

    #[tokio::test]
    async fn test_run_selects_by_name() {
        let storage = Arc::new(InMemoryStorage::new());
        let manager = manager(storage, vec![ALPHA, KEYED]);

        let reports = manager.run(&["ALPHA".to_string(), "nope".to_string()], 10).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].source, "alpha");

        let reports = manager.run(&[], 10).await;
        assert_eq!(reports.len(), 2);
        let keyed = reports.iter().find(|r| r.source == "keyed").unwrap();
        assert!(keyed.outcome.is_failure());
        assert_eq!(keyed.collection, CollectionRef::new("Fake", "keyed"));
    }
}
