use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use fw_core::{Candidate, CollectionRef, Result, Settings};

use crate::fetch::Fetcher;

pub mod china;
pub mod us;

/// One news source: a listing plus a way to fetch each body.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// CLI name, also stored as the article's `source`.
    fn name(&self) -> &str;

    fn collection(&self) -> CollectionRef;

    /// Up to `limit` listing entries, newest first as the site orders them.
    async fn list_candidates(&self, limit: usize) -> Result<Vec<Candidate>>;

    /// Body text for `url`, or `None` when no extraction strategy matched.
    async fn fetch_body(&self, url: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    China,
    Us,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::China => f.write_str("china"),
            Region::Us => f.write_str("us"),
        }
    }
}

/// Shared handles every adapter is built from.
#[derive(Clone)]
pub struct AdapterContext {
    pub fetcher: Fetcher,
    pub settings: Arc<Settings>,
}

pub type AdapterFactory = fn(&AdapterContext) -> Result<Box<dyn SourceAdapter>>;

#[derive(Clone, Copy)]
pub struct AdapterEntry {
    pub name: &'static str,
    pub region: Region,
    pub database: &'static str,
    pub collection: &'static str,
    pub build: AdapterFactory,
}

impl AdapterEntry {
    pub fn collection(&self) -> CollectionRef {
        CollectionRef::new(self.database, self.collection)
    }
}

impl fmt::Debug for AdapterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterEntry")
            .field("name", &self.name)
            .field("region", &self.region)
            .field("collection", &self.collection())
            .finish()
    }
}

/// Every known adapter, in the order `crawl` runs them by default.
pub fn registry() -> Vec<AdapterEntry> {
    vec![
        china::sina::ENTRY,
        china::eastmoney::ENTRY,
        china::stcn::ENTRY,
        china::nbd::ENTRY,
        us::finnhub::ENTRY,
    ]
}

pub fn collections_for_region(region: Region) -> Vec<CollectionRef> {
    registry()
        .into_iter()
        .filter(|entry| entry.region == region)
        .map(|entry| entry.collection())
        .collect()
}

/// Every collection an adapter writes to.
pub fn known_collections() -> Vec<CollectionRef> {
    registry().iter().map(AdapterEntry::collection).collect()
}

/// Absolute URL for `href` found on `base`.
pub(crate) fn absolutize(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with('#') {
        return None;
    }
    url::Url::parse(base)
        .and_then(|base| base.join(href))
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map(|u| u.to_string())
}
