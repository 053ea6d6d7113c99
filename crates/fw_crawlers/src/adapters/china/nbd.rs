use async_trait::async_trait;
use fw_core::{date, Candidate, CollectionRef, Result};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::adapters::{absolutize, AdapterContext, AdapterEntry, Region, SourceAdapter};
use crate::extract::{extract_body, Strategy, TextMode};
use crate::fetch::Fetcher;

pub const ENTRY: AdapterEntry = AdapterEntry {
    name: "nbd",
    region: Region::China,
    database: "Nbd_Stock",
    collection: "nbd_news_roll",
    build: NbdAdapter::build,
};

const LIST_URL: &str = "https://finance.nbd.com.cn/";

// Tried in order when the hidden latest-news block is absent.
const FALLBACK_LINKS: &[&str] = &[
    "div.latest-news ul li a",
    "ul.news-list li a",
    "section.latest-updates ul li a",
    ".news_list li a",
    "div[class*='zx_list'] ul li a",
    "div.u-newslist ul.u-newslist-01 li a",
    "ul.u_news_list li div.news_title a",
    "div.m-columnnewslist ul li a",
];

const BODY: &[Strategy] = &[
    Strategy::JsonLd {
        keys: &["articleBody", "description"],
    },
    Strategy::Container {
        selectors: &[
            "div.g-articl-text",
            "div.g_article_content",
            "div.article_content",
            "div.main_content",
            "div.u-article-content",
            "div.article-text",
            "div#articleText",
            "article",
            "div[role='article']",
        ],
        strip: &[
            "div.ad",
            "div.copyright",
            "div.hot_news",
            "div.share",
            "div.tags",
            "div.related_read",
            "div.video-player",
            "div.author-info",
            "div.article-function",
            "div.comment-module",
        ],
        mode: TextMode::Paragraphs,
    },
];

lazy_static! {
    static ref HIDDEN_BLOCK_SEL: Selector =
        Selector::parse("div[style*='overflow:hidden'][style*='height:0'] ul").unwrap();
    static ref DIRECT_LINK_SEL: Selector = Selector::parse("li > a").unwrap();
    static ref SPAN_SEL: Selector = Selector::parse("span").unwrap();
    static ref DATETIME_RE: Regex = Regex::new(r"\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}(?::\d{2})?").unwrap();
}

pub struct NbdAdapter {
    fetcher: Fetcher,
}

impl NbdAdapter {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    fn build(ctx: &AdapterContext) -> Result<Box<dyn SourceAdapter>> {
        Ok(Box::new(Self::new(ctx.fetcher.clone())))
    }
}

fn list_links(document: &Html) -> Vec<ElementRef<'_>> {
    if let Some(list) = document.select(&HIDDEN_BLOCK_SEL).next() {
        let links: Vec<_> = list.select(&DIRECT_LINK_SEL).collect();
        if !links.is_empty() {
            return links;
        }
    }
    for selector in FALLBACK_LINKS {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        let links: Vec<_> = document.select(&sel).collect();
        if !links.is_empty() {
            debug!(selector, "Using fallback list selector");
            return links;
        }
    }
    Vec::new()
}

fn link_date(link: ElementRef<'_>) -> Option<String> {
    let sibling = link
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "span");
    if let Some(span) = sibling {
        return Some(span.text().collect::<String>().trim().to_string());
    }
    let item = link
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "li")?;
    let text = item.text().collect::<Vec<_>>().join(" ");
    DATETIME_RE.find(&text).map(|m| m.as_str().to_string())
}

fn parse_listing(document: &Html, limit: usize) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for link in list_links(document) {
        if candidates.len() >= limit {
            break;
        }
        let title = match link.select(&SPAN_SEL).next() {
            Some(span) => span.text().collect::<String>(),
            None => link.value().attr("title").unwrap_or_default().to_string(),
        };
        let title = title.trim().to_string();
        let url = link.value().attr("href").and_then(|href| absolutize(LIST_URL, href));
        let (Some(url), false) = (url, title.is_empty()) else {
            continue;
        };

        candidates.push(Candidate {
            url,
            title,
            published_date: link_date(link).as_deref().and_then(date::parse_local),
            source_page_url: Some(LIST_URL.to_string()),
        });
    }
    candidates
}

fn parse_body(html: &str) -> Option<String> {
    extract_body(&Html::parse_document(html), BODY)
}

#[async_trait]
impl SourceAdapter for NbdAdapter {
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
            warn!(source = ENTRY.name, "No article links found on {}", LIST_URL);
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
