use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fw_core::{AnalysisResult, Article, ArticleStorage, CollectionRef, Result, SaveCounts};
use tokio::sync::RwLock;

/// Articles per collection, in first-insertion order.
#[derive(Default)]
pub struct MemoryStore {
    collections: HashMap<CollectionRef, Vec<Article>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn articles(&self, collection: &CollectionRef) -> &[Article] {
        self.collections
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn upsert(&mut self, collection: &CollectionRef, article: &Article) -> bool {
        let articles = self.collections.entry(collection.clone()).or_default();
        if let Some(existing) = articles.iter_mut().find(|a| a.url == article.url) {
            *existing = article.clone();
            false
        } else {
            articles.push(article.clone());
            true
        }
    }

    pub fn get(&self, collection: &CollectionRef, url: &str) -> Option<&Article> {
        self.articles(collection).iter().find(|a| a.url == url)
    }

    pub fn get_mut(&mut self, collection: &CollectionRef, url: &str) -> Option<&mut Article> {
        self.collections
            .get_mut(collection)
            .and_then(|articles| articles.iter_mut().find(|a| a.url == url))
    }

    pub fn unanalyzed(&self, collection: &CollectionRef, since: DateTime<Utc>, limit: usize) -> Vec<Article> {
        self.articles(collection)
            .iter()
            .filter(|a| !a.analyzed && a.fetched_at >= since)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn count_before(&self, collection: &CollectionRef, cutoff: DateTime<Utc>) -> u64 {
        self.articles(collection)
            .iter()
            .filter(|a| a.fetched_at < cutoff)
            .count() as u64
    }

    pub fn delete_before(&mut self, collection: &CollectionRef, cutoff: DateTime<Utc>) -> u64 {
        match self.collections.get_mut(collection) {
            Some(articles) => {
                let before = articles.len();
                articles.retain(|a| a.fetched_at >= cutoff);
                (before - articles.len()) as u64
            }
            None => 0,
        }
    }
}

/// Process-local backend, selected with `memory://`.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArticleStorage for InMemoryStorage {
    async fn exists(&self, collection: &CollectionRef, url: &str) -> Result<bool> {
        Ok(self.store.read().await.get(collection, url).is_some())
    }

    async fn upsert_articles(&self, collection: &CollectionRef, articles: &[Article]) -> Result<SaveCounts> {
        let mut store = self.store.write().await;
        let mut counts = SaveCounts::default();
        for article in articles {
            if store.upsert(collection, article) {
                counts.inserted += 1;
            } else {
                counts.updated += 1;
            }
        }
        Ok(counts)
    }

    async fn get_article(&self, collection: &CollectionRef, url: &str) -> Result<Option<Article>> {
        Ok(self.store.read().await.get(collection, url).cloned())
    }

    async fn find_unanalyzed(
        &self,
        collection: &CollectionRef,
        fetched_since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Article>> {
        Ok(self.store.read().await.unanalyzed(collection, fetched_since, limit))
    }

    async fn save_analysis(
        &self,
        collection: &CollectionRef,
        result: &AnalysisResult,
        mark_analyzed: bool,
    ) -> Result<bool> {
        let mut store = self.store.write().await;
        match store.get_mut(collection, &result.article_url) {
            Some(article) => {
                article.analysis = Some(result.clone());
                article.analyzed = mark_analyzed;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_older_than(&self, collection: &CollectionRef, cutoff: DateTime<Utc>) -> Result<u64> {
        Ok(self.store.read().await.count_before(collection, cutoff))
    }

    async fn delete_older_than(&self, collection: &CollectionRef, cutoff: DateTime<Utc>) -> Result<u64> {
        Ok(self.store.write().await.delete_before(collection, cutoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use fw_core::{AnalysisDetails, AnalysisMode};

    fn article(url: &str, content: &str, fetched_at: DateTime<Utc>) -> Article {
        Article {
            url: url.to_string(),
            title: "Test Article".to_string(),
            source_page_url: None,
            content: content.to_string(),
            source: "test".to_string(),
            fetched_at,
            published_date: None,
            analyzed: false,
            analysis: None,
        }
    }

    fn coll() -> CollectionRef {
        CollectionRef::new("Test_DB", "news")
    }

    #[tokio::test]
    async fn test_upsert_is_last_write_wins() {
        let storage = InMemoryStorage::new();
        let now = Utc::now();
        let first = article("http://test.com/1", "first", now);
        let second = article("http://test.com/1", "second", now + Duration::seconds(5));

        let counts = storage.upsert_articles(&coll(), &[first]).await.unwrap();
        assert_eq!(counts, SaveCounts { inserted: 1, updated: 0 });
        let counts = storage.upsert_articles(&coll(), &[second.clone()]).await.unwrap();
        assert_eq!(counts, SaveCounts { inserted: 0, updated: 1 });

        let stored = storage.get_article(&coll(), "http://test.com/1").await.unwrap();
        assert_eq!(stored, Some(second));
        assert!(storage.exists(&coll(), "http://test.com/1").await.unwrap());
        assert!(!storage.exists(&CollectionRef::new("Other", "news"), "http://test.com/1").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_unanalyzed_and_save_analysis() {
        let storage = InMemoryStorage::new();
        let now = Utc::now();
        storage
            .upsert_articles(
                &coll(),
                &[
                    article("http://test.com/old", "x", now - Duration::days(5)),
                    article("http://test.com/new", "y", now),
                ],
            )
            .await
            .unwrap();

        let pending = storage.find_unanalyzed(&coll(), now - Duration::days(2), 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url, "http://test.com/new");

        let result = AnalysisResult {
            article_url: "http://test.com/new".to_string(),
            article_title: "Test Article".to_string(),
            collection: coll(),
            analysis_type: AnalysisMode::Evening,
            model: Some("dummy".to_string()),
            raw: "Importance_Score: 3".to_string(),
            details: AnalysisDetails { importance_score: 3, ..Default::default() },
            analyzed_at: now,
            error: None,
        };
        assert!(storage.save_analysis(&coll(), &result, true).await.unwrap());
        let pending = storage.find_unanalyzed(&coll(), now - Duration::days(2), 10).await.unwrap();
        assert!(pending.is_empty());

        let missing = AnalysisResult { article_url: "http://nope".to_string(), ..result };
        assert!(!storage.save_analysis(&coll(), &missing, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_count_and_delete_older_than() {
        let storage = InMemoryStorage::new();
        let now = Utc::now();
        storage
            .upsert_articles(
                &coll(),
                &[
                    article("http://test.com/a", "a", now - Duration::days(40)),
                    article("http://test.com/b", "b", now - Duration::days(31)),
                    article("http://test.com/c", "c", now - Duration::days(1)),
                ],
            )
            .await
            .unwrap();

        let cutoff = now - Duration::days(30);
        assert_eq!(storage.count_older_than(&coll(), cutoff).await.unwrap(), 2);
        assert_eq!(storage.delete_older_than(&coll(), cutoff).await.unwrap(), 2);
        assert_eq!(storage.count_older_than(&coll(), cutoff).await.unwrap(), 0);
        assert!(storage.exists(&coll(), "http://test.com/c").await.unwrap());
    }
}
