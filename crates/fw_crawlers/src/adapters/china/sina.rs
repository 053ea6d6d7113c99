use async_trait::async_trait;
use fw_core::{date, Candidate, CollectionRef, Error, Result};
use scraper::Html;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::adapters::{absolutize, AdapterContext, AdapterEntry, Region, SourceAdapter};
use crate::extract::{extract_body, unwrap_assignment, Strategy, TextMode};
use crate::fetch::Fetcher;

pub const ENTRY: AdapterEntry = AdapterEntry {
    name: "sina",
    region: Region::China,
    database: "Sina_Stock",
    collection: "sina_news_roll",
    build: SinaAdapter::build,
};

const LIST_URL: &str = "http://roll.finance.sina.com.cn/api/news_list.php?tag=2&cat_1=wlxbhd&cat_2=1";
const BASE_URL: &str = "http://finance.sina.com.cn";
// Both the roll API and article pages need this to decode correctly.
const ENCODING: &str = "gb2312";

const BODY: &[Strategy] = &[Strategy::Container {
    selectors: &[
        "div#artibody",
        "div.article_content",
        "div.article-content",
        "div.article",
        "div#articleContent",
        "section.art_pic_card.art_content",
    ],
    strip: &["div.appendQr_wrap", "div.ggcontent", "div.page-view", "p.show_author"],
    mode: TextMode::Paragraphs,
}];

pub struct SinaAdapter {
    fetcher: Fetcher,
}

impl SinaAdapter {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    fn build(ctx: &AdapterContext) -> Result<Box<dyn SourceAdapter>> {
        Ok(Box::new(Self::new(ctx.fetcher.clone())))
    }
}

fn parse_listing(raw: &str, limit: usize) -> Result<Vec<Candidate>> {
    let payload = unwrap_assignment(raw).unwrap_or_else(|| raw.trim());
    let data: Value = serde_json::from_str(payload)?;
    let items = data
        .get("list")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Scraping("Sina roll response has no 'list' array".to_string()))?;

    let mut candidates = Vec::new();
    for item in items {
        if candidates.len() >= limit {
            break;
        }
        let title = item.get("title").and_then(Value::as_str).map(str::trim);
        let href = item.get("url").and_then(Value::as_str);
        // `time` is a Unix timestamp, sometimes quoted.
        let time = item
            .get("time")
            .and_then(|t| t.as_i64().or_else(|| t.as_str().and_then(|s| s.trim().parse().ok())));

        let (Some(title), Some(href), Some(time)) = (title, href, time) else {
            debug!("Skipping roll item missing url, title or time");
            continue;
        };
        if title.is_empty() {
            continue;
        }
        let Some(url) = absolutize(BASE_URL, href) else {
            continue;
        };

        candidates.push(Candidate {
            url,
            title: title.to_string(),
            published_date: date::from_unix(time),
            source_page_url: Some(LIST_URL.to_string()),
        });
    }
    Ok(candidates)
}

fn parse_body(html: &str) -> Option<String> {
    extract_body(&Html::parse_document(html), BODY)
}

#[async_trait]
impl SourceAdapter for SinaAdapter {
    fn name(&self) -> &str {
        ENTRY.name
    }

    fn collection(&self) -> CollectionRef {
        ENTRY.collection()
    }

    async fn list_candidates(&self, limit: usize) -> Result<Vec<Candidate>> {
        let raw = self.fetcher.fetch_with_encoding(LIST_URL, Some(ENCODING)).await?;
        let candidates = parse_listing(&raw, limit)?;
        if candidates.is_empty() {
            warn!(source = ENTRY.name, "Roll API returned no usable items");
        } else {
            info!(source = ENTRY.name, "Listed {} articles", candidates.len());
        }
        Ok(candidates)
    }

    async fn fetch_body(&self, url: &str) -> Result<Option<String>> {
        let page = self.fetcher.fetch_page(url, Some(ENCODING)).await?;
        Ok(parse_body(&page.body))
    }
}
