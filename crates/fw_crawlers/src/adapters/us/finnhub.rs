//! Finnhub general market news. The API already carries a summary, which is
//! stored as the article body.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use fw_core::{date, Candidate, CollectionRef, Error, Result};
use serde::Deserialize;
use tracing::info;

use crate::adapters::{AdapterContext, AdapterEntry, Region, SourceAdapter};
use crate::fetch::Fetcher;

pub const ENTRY: AdapterEntry = AdapterEntry {
    name: "finnhub",
    region: Region::Us,
    database: "Finnhub_News",
    collection: "market_news",
    build: FinnhubAdapter::build,
};

const API_URL: &str = "https://finnhub.io/api/v1/news";
const CATEGORY: &str = "general";

#[derive(Debug, Deserialize)]
struct NewsItem {
    #[serde(default)]
    headline: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    url: String,
    datetime: Option<i64>,
}

pub struct FinnhubAdapter {
    fetcher: Fetcher,
    api_key: String,
    summaries: Mutex<HashMap<String, String>>,
}

impl FinnhubAdapter {
    pub fn new(fetcher: Fetcher, api_key: impl Into<String>) -> Self {
        Self {
            fetcher,
            api_key: api_key.into(),
            summaries: Mutex::new(HashMap::new()),
        }
    }

    fn build(ctx: &AdapterContext) -> Result<Box<dyn SourceAdapter>> {
        let key = ctx.settings.require_finnhub_key()?;
        Ok(Box::new(Self::new(ctx.fetcher.clone(), key)))
    }

    fn news_url(&self) -> String {
        format!("{}?category={}&minId=0&token={}", API_URL, CATEGORY, self.api_key)
    }
}

fn source_page() -> String {
    format!("finnhub_api_{}", CATEGORY)
}

fn parse_news(raw: &str, limit: usize) -> Result<Vec<(Candidate, String)>> {
    let items: Vec<NewsItem> = serde_json::from_str(raw)?;
    Ok(items
        .into_iter()
        .filter(|item| !item.url.trim().is_empty())
        .take(limit)
        .map(|item| {
            let title = if item.headline.trim().is_empty() {
                "N/A".to_string()
            } else {
                item.headline.trim().to_string()
            };
            let candidate = Candidate {
                url: item.url.trim().to_string(),
                title,
                published_date: item.datetime.and_then(date::from_unix),
                source_page_url: Some(source_page()),
            };
            (candidate, item.summary.trim().to_string())
        })
        .collect())
}

#[async_trait]
impl SourceAdapter for FinnhubAdapter {
    fn name(&self) -> &str {
        ENTRY.name
    }

    fn collection(&self) -> CollectionRef {
        ENTRY.collection()
    }

    async fn list_candidates(&self, limit: usize) -> Result<Vec<Candidate>> {
        let raw = self.fetcher.fetch(&self.news_url()).await?;
        let parsed = parse_news(&raw, limit)?;

        let mut summaries = self
            .summaries
            .lock()
            .map_err(|_| Error::Scraping("Finnhub summary cache poisoned".to_string()))?;
        let candidates = parsed
            .into_iter()
            .map(|(candidate, summary)| {
                summaries.insert(candidate.url.clone(), summary);
                candidate
            })
            .collect::<Vec<_>>();
        info!(source = ENTRY.name, "Listed {} articles", candidates.len());
        Ok(candidates)
    }

    async fn fetch_body(&self, url: &str) -> Result<Option<String>> {
        let summaries = self
            .summaries
            .lock()
            .map_err(|_| Error::Scraping("Finnhub summary cache poisoned".to_string()))?;
        Ok(summaries.get(url).filter(|s| !s.is_empty()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{fetcher, ScriptedTransport};
    use fw_core::Settings;
    use std::sync::Arc;

    const NEWS: &str = r#"[
        {"category":"top news","datetime":1700000000,"headline":"Stocks rally on rate hopes","id":1,
         "source":"Reuters","summary":"Wall Street closed higher.","url":"https://example.com/1"},
        {"category":"top news","datetime":1700000100,"headline":"","id":2,
         "source":"CNBC","summary":"","url":"https://example.com/2"},
        {"category":"top news","datetime":1700000200,"headline":"No link","id":3,"summary":"x","url":""}
    ]"#;

    #[test]
    fn test_parse_news() {
        let parsed = parse_news(NEWS, 10).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].0.title, "Stocks rally on rate hopes");
        assert_eq!(parsed[0].0.published_date.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(parsed[0].0.source_page_url.as_deref(), Some("finnhub_api_general"));
        assert_eq!(parsed[1].0.title, "N/A");
    }

    #[tokio::test]
    async fn test_body_is_cached_summary() {
        let adapter = FinnhubAdapter::new(
            fetcher(Arc::new(
                ScriptedTransport::new()
                    .on("https://finnhub.io/api/v1/news?category=general&minId=0&token=k", vec![Ok(NEWS.to_string())]),
            )),
            "k",
        );

        let candidates = adapter.list_candidates(10).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(
            adapter.fetch_body("https://example.com/1").await.unwrap().as_deref(),
            Some("Wall Street closed higher.")
        );
        assert_eq!(adapter.fetch_body("https://example.com/2").await.unwrap(), None);
        assert_eq!(adapter.fetch_body("https://example.com/unknown").await.unwrap(), None);
    }

    #[test]
    fn test_build_requires_key() {
        let ctx = AdapterContext {
            fetcher: fetcher(Arc::new(ScriptedTransport::new())),
            settings: Arc::new(Settings::default()),
        };
        assert!(matches!((ENTRY.build)(&ctx), Err(Error::Config(_))));
    }
}
