use async_trait::async_trait;
use chrono::Utc;
use fw_core::{date, Candidate, CollectionRef, Error, Result};
use scraper::Html;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::adapters::{AdapterContext, AdapterEntry, Region, SourceAdapter};
use crate::extract::{extract_body, unwrap_jsonp, Strategy, TextMode};
use crate::fetch::Fetcher;

pub const ENTRY: AdapterEntry = AdapterEntry {
    name: "eastmoney",
    region: Region::China,
    database: "Eastmoney_Stock",
    collection: "eastmoney_kuaixun_api_news",
    build: EastmoneyAdapter::build,
};

const CALLBACKS: &[&str] = &["ajaxResult_102", "kxall_ajaxResult102"];
// Article pages are GBK; the list API is left to auto-detection.
const BODY_ENCODING: &str = "gbk";

const BODY: &[Strategy] = &[Strategy::Container {
    selectors: &[
        "div#ContentBody",
        "div.newsContent",
        "div.Body",
        "article.content-text",
        "div.content_body",
        "div.article-content",
    ],
    strip: &[
        "div.c_review_comment",
        "div.c-comment-circle",
        "div.footer_copyright",
        "div.footer",
        "div.share-bar",
        "div.share_buttons",
        "div.readall",
        "div.readall_box",
        "div.ad",
        "div.gg",
        "[class*='advert']",
        "div.corrnews",
        "div.related_news",
        "div.source",
        "p.source",
        "span.source",
        "p.detail-link",
        "div#em_stock_comments",
        "div.hide",
        "[style*='display:none']",
        "iframe",
    ],
    mode: TextMode::Full,
}];

#[derive(Debug, Deserialize)]
struct KuaixunResponse {
    rc: Option<i64>,
    #[serde(default)]
    news: Option<Vec<KuaixunItem>>,
}

#[derive(Debug, Deserialize)]
struct KuaixunItem {
    title: Option<String>,
    url_w: Option<String>,
    showtime: Option<String>,
}

pub struct EastmoneyAdapter {
    fetcher: Fetcher,
}

impl EastmoneyAdapter {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    fn build(ctx: &AdapterContext) -> Result<Box<dyn SourceAdapter>> {
        Ok(Box::new(Self::new(ctx.fetcher.clone())))
    }

    fn list_url(limit: usize, timestamp_ms: i64) -> String {
        format!(
            "https://newsapi.eastmoney.com/kuaixun/v2/api/list?callback=ajaxResult_102&column=102&limit={}&p=1&_={}",
            limit, timestamp_ms
        )
    }
}

fn parse_listing(raw: &str, limit: usize, source_page_url: &str) -> Result<Vec<Candidate>> {
    let payload = unwrap_jsonp(raw, CALLBACKS)
        .ok_or_else(|| Error::Scraping("Kuaixun response is not JSONP".to_string()))?;
    let response: KuaixunResponse = serde_json::from_str(payload)?;

    let news = response.news.unwrap_or_default();
    if response.rc != Some(1) || news.is_empty() {
        warn!(rc = ?response.rc, "Kuaixun API reported failure or no news");
        return Ok(Vec::new());
    }

    let candidates = news
        .into_iter()
        .filter_map(|item| {
            let (Some(title), Some(url), Some(showtime)) = (item.title, item.url_w, item.showtime) else {
                debug!("Skipping Kuaixun item missing title, url or showtime");
                return None;
            };
            if title.trim().is_empty() || url.trim().is_empty() {
                return None;
            }
            Some(Candidate {
                url: url.trim().to_string(),
                title: title.trim().to_string(),
                published_date: date::parse_local(&showtime),
                source_page_url: Some(source_page_url.to_string()),
            })
        })
        .take(limit)
        .collect();
    Ok(candidates)
}

fn parse_body(html: &str) -> Option<String> {
    extract_body(&Html::parse_document(html), BODY)
}

#[async_trait]
impl SourceAdapter for EastmoneyAdapter {
    fn name(&self) -> &str {
        ENTRY.name
    }

    fn collection(&self) -> CollectionRef {
        ENTRY.collection()
    }

    async fn list_candidates(&self, limit: usize) -> Result<Vec<Candidate>> {
        let url = Self::list_url(limit, Utc::now().timestamp_millis());
        let raw = self.fetcher.fetch(&url).await?;
        let candidates = parse_listing(&raw, limit, &url)?;
        info!(source = ENTRY.name, "Listed {} articles", candidates.len());
        Ok(candidates)
    }

    async fn fetch_body(&self, url: &str) -> Result<Option<String>> {
        let page = self.fetcher.fetch_page(url, Some(BODY_ENCODING)).await?;
        Ok(parse_body(&page.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "https://newsapi.eastmoney.com/kuaixun/v2/api/list";

    #[test]
    fn test_parse_listing() {
        let raw = r#"ajaxResult_102({"rc":1,"me":"","news":[
            {"title":"央行开展逆回购操作","url_w":"https://finance.eastmoney.com/a/1.html","showtime":"2024-05-17 09:30:00"},
            {"title":"缺少链接","showtime":"2024-05-17 09:31:00"},
            {"title":"新能源板块走强","url_w":"https://finance.eastmoney.com/a/2.html","showtime":"bad date"}
        ]});"#;
        let candidates = parse_listing(raw, 10, SOURCE).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "央行开展逆回购操作");
        assert!(candidates[0].published_date.is_some());
        assert!(candidates[1].published_date.is_none());
        assert_eq!(candidates[1].source_page_url.as_deref(), Some(SOURCE));
    }

    #[test]
    fn test_parse_listing_fallback_callback_and_failure() {
        let raw = r#"kxall_ajaxResult102({"rc":1,"news":[{"title":"t","url_w":"https://e.com/1","showtime":"2024-05-17 09:30"}]})"#;
        assert_eq!(parse_listing(raw, 10, SOURCE).unwrap().len(), 1);

        let failed = r#"ajaxResult_102({"rc":0,"me":"error","news":null})"#;
        assert!(parse_listing(failed, 10, SOURCE).unwrap().is_empty());

        let empty = r#"ajaxResult_102({"rc":0,"me":"error"})"#;
        assert!(parse_listing(empty, 10, SOURCE).unwrap().is_empty());
        assert!(parse_listing("<html></html>", 10, SOURCE).is_err());
    }

    #[test]
    fn test_parse_body_strips_noise() {
        let html = r#"<div id="ContentBody">
            <p>A股午后拉升。</p>
            <div class="share-bar">分享到</div>
            <p class="source">来源：东方财富</p>
            <iframe src="x"></iframe>
            <p>沪深两市成交额放大。</p>
            <div style="display:none">hidden</div>
        </div>"#;
        assert_eq!(parse_body(html).as_deref(), Some("A股午后拉升。\n沪深两市成交额放大。"));
    }

    #[test]
    fn test_list_url() {
        let url = EastmoneyAdapter::list_url(20, 1_700_000_000_000);
        assert!(url.contains("limit=20"));
        assert!(url.ends_with("&_=1700000000000"));
    }
}
