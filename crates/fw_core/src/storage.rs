use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{AnalysisResult, Article, CollectionRef, SaveCounts};
use crate::Result;

#[async_trait]
pub trait ArticleStorage: Send + Sync {
    /// Point-read used to skip body fetches for already stored URLs.
    async fn exists(&self, collection: &CollectionRef, url: &str) -> Result<bool>;

    /// Insert or fully replace each article keyed by URL.
    async fn upsert_articles(
        &self,
        collection: &CollectionRef,
        articles: &[Article],
    ) -> Result<SaveCounts>;

    async fn get_article(&self, collection: &CollectionRef, url: &str) -> Result<Option<Article>>;

    /// Articles with `analyzed == false` fetched at or after `fetched_since`.
    async fn find_unanalyzed(
        &self,
        collection: &CollectionRef,
        fetched_since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Article>>;

    /// Attach an analysis to the article it references. Returns false when
    /// no stored article matched.
    async fn save_analysis(
        &self,
        collection: &CollectionRef,
        result: &AnalysisResult,
        mark_analyzed: bool,
    ) -> Result<bool>;

    /// Number of articles whose `fetched_at` is strictly before `cutoff`.
    async fn count_older_than(&self, collection: &CollectionRef, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn delete_older_than(&self, collection: &CollectionRef, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Release connections. Called once on every exit path.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
