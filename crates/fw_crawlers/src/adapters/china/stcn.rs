use async_trait::async_trait;
use fw_core::{date, Candidate, CollectionRef, Result};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::adapters::{absolutize, AdapterContext, AdapterEntry, Region, SourceAdapter};
use crate::extract::{extract_body, Strategy, TextMode};
use crate::fetch::Fetcher;

pub const ENTRY: AdapterEntry = AdapterEntry {
    name: "stcn",
    region: Region::China,
    database: "Stcn_Stock",
    collection: "stcn_news_roll",
    build: StcnAdapter::build,
};

const LIST_URL: &str = "https://www.stcn.com/article/list/yw.html";
const BASE_URL: &str = "https://www.stcn.com";

const BODY: &[Strategy] = &[Strategy::Container {
    selectors: &["div.detail-content", "div.content"],
    strip: &["div.ad", "div.statement", "div.tjyd", "div.zebian"],
    mode: TextMode::Paragraphs,
}];

lazy_static! {
    static ref CLOCK_RE: Regex = Regex::new(r"^\d{1,2}:\d{2}$").unwrap();
    static ref ITEM_SEL: Selector = Selector::parse("ul.list.infinite-list > li").unwrap();
    static ref TITLE_SEL: Selector = Selector::parse("div.tt > a").unwrap();
    static ref INFO_SPAN_SEL: Selector = Selector::parse("div.info span").unwrap();
}

pub struct StcnAdapter {
    fetcher: Fetcher,
}

impl StcnAdapter {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    fn build(ctx: &AdapterContext) -> Result<Box<dyn SourceAdapter>> {
        Ok(Box::new(Self::new(ctx.fetcher.clone())))
    }
}

fn parse_listing(document: &Html, limit: usize) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for item in document.select(&ITEM_SEL) {
        if candidates.len() >= limit {
            break;
        }
        let Some(link) = item.select(&TITLE_SEL).next() else {
            continue;
        };
        let title = link.text().collect::<String>().trim().to_string();
        let Some(url) = link.value().attr("href").and_then(|href| absolutize(BASE_URL, href)) else {
            debug!(title = %title, "List item without a usable link");
            continue;
        };

        // The listing only prints a clock time; it belongs to today.
        let clock = item
            .select(&INFO_SPAN_SEL)
            .map(|span| span.text().collect::<String>().trim().to_string())
            .filter(|text| CLOCK_RE.is_match(text))
            .last();

        candidates.push(Candidate {
            url,
            title,
            published_date: clock.as_deref().and_then(date::parse_local),
            source_page_url: Some(LIST_URL.to_string()),
        });
    }
    candidates
}

fn parse_body(html: &str) -> Option<String> {
    extract_body(&Html::parse_document(html), BODY)
}

#[async_trait]
impl SourceAdapter for StcnAdapter {
    fn name(&self) -> &str {
        ENTRY.name
    }

    fn collection(&self) -> CollectionRef {
        ENTRY.collection()
    }

    async fn list_candidates(&self, limit: usize) -> Result<Vec<Candidate>> {
        let page = self.fetcher.fetch_page(LIST_URL, None).await?;
        let candidates = parse_listing(&page.document(), limit);
        if candidates.is_empty() {
            warn!(source = ENTRY.name, "No list items matched on {}", LIST_URL);
        } else {
            info!(source = ENTRY.name, "Listed {} articles", candidates.len());
        }
        Ok(candidates)
    }

    async fn fetch_body(&self, url: &str) -> Result<Option<String>> {
        let page = self.fetcher.fetch_page(url, None).await?;
        Ok(parse_body(&page.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, Timelike};

    const LISTING: &str = r#"
        <ul class="list infinite-list">
            <li>
                <div class="tt"><a href="/article/detail/1851841.html">证监会发布新规</a></div>
                <div class="info"><span>证券时报</span><span>09:15</span></div>
            </li>
            <li>
                <div class="tt"><a href="https://www.stcn.com/article/detail/1851842.html">两市成交回暖</a></div>
                <div class="info"><span>证券时报网</span></div>
            </li>
            <li><div class="pic"><img src="x.png"></div></li>
        </ul>
    "#;

    #[test]
    fn test_parse_listing() {
        let candidates = parse_listing(&Html::parse_document(LISTING), 10);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].url, "https://www.stcn.com/article/detail/1851841.html");
        assert_eq!(candidates[0].title, "证监会发布新规");
        let published = candidates[0].published_date.unwrap().with_timezone(&Local);
        assert_eq!((published.hour(), published.minute()), (9, 15));
        assert!(candidates[1].published_date.is_none());
        assert_eq!(parse_listing(&Html::parse_document(LISTING), 1).len(), 1);
    }

    #[test]
    fn test_parse_body_falls_back_to_content() {
        let html = r#"<div class="content"><div class="zebian">责任编辑</div>正文第一段<br>正文第二段</div>"#;
        assert_eq!(parse_body(html).as_deref(), Some("正文第一段\n正文第二段"));
    }
}
