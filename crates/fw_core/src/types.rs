use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A `(database, collection)` pair naming where a source's articles live.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionRef {
    pub database: String,
    pub collection: String,
}

impl CollectionRef {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.database, self.collection)
    }
}

/// An entry from a source listing, before its body has been fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub url: String,
    pub title: String,
    pub published_date: Option<DateTime<Utc>>,
    /// Page or API endpoint the link was found on.
    pub source_page_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub title: String,
    pub source_page_url: Option<String>,
    pub content: String,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    pub published_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub analyzed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
}

impl Article {
    pub fn from_candidate(
        candidate: Candidate,
        content: String,
        source: &str,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let title = if candidate.title.trim().is_empty() {
            "N/A".to_string()
        } else {
            candidate.title
        };
        Self {
            url: candidate.url,
            title,
            source_page_url: candidate.source_page_url,
            content,
            source: source.to_string(),
            fetched_at,
            published_date: candidate.published_date,
            analyzed: false,
            analysis: None,
        }
    }
}

/// Counts reported by a bulk upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveCounts {
    pub inserted: usize,
    pub updated: usize,
}

/// Which prompt variant and source set an analysis run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// US news, judged for impact on the Chinese market.
    Morning,
    /// Chinese news, judged against the day's market movers.
    Evening,
}

impl AnalysisMode {
    /// Cron-style default: 08:00-16:00 local runs the
    /// morning pipeline, anything else the evening one.
    pub fn for_hour(hour: u32) -> Self {
        if (8..16).contains(&hour) {
            Self::Morning
        } else {
            Self::Evening
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Evening => "evening",
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "morning" => Ok(Self::Morning),
            "evening" => Ok(Self::Evening),
            other => Err(crate::Error::Config(format!(
                "unknown analysis mode '{}', expected morning or evening",
                other
            ))),
        }
    }
}

/// Fields pulled out of a model response. Missing fields stay at their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisDetails {
    pub importance_score: u32,
    pub sentiment_score: u32,
    pub sectors: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub article_url: String,
    pub article_title: String,
    pub collection: CollectionRef,
    pub analysis_type: AnalysisMode,
    /// Key of the model that answered, if any did.
    pub model: Option<String>,
    pub raw: String,
    pub details: AnalysisDetails,
    pub analyzed_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl AnalysisResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One row of market context, e.g. a Dragon & Tiger List entry or a sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMover {
    pub name: String,
    pub change_pct: f64,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_for_hour() {
        assert_eq!(AnalysisMode::for_hour(7), AnalysisMode::Evening);
        assert_eq!(AnalysisMode::for_hour(8), AnalysisMode::Morning);
        assert_eq!(AnalysisMode::for_hour(15), AnalysisMode::Morning);
        assert_eq!(AnalysisMode::for_hour(16), AnalysisMode::Evening);
        assert_eq!(AnalysisMode::for_hour(23), AnalysisMode::Evening);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("Morning".parse::<AnalysisMode>().unwrap(), AnalysisMode::Morning);
        assert_eq!("evening".parse::<AnalysisMode>().unwrap(), AnalysisMode::Evening);
        assert!("noon".parse::<AnalysisMode>().is_err());
    }

    #[test]
    fn test_article_from_candidate() {
        let now = Utc::now();
        let candidate = Candidate {
            url: "https://example.com/a".to_string(),
            title: "  ".to_string(),
            published_date: None,
            source_page_url: Some("https://example.com".to_string()),
        };
        let article = Article::from_candidate(candidate, "body".to_string(), "sina", now);
        assert_eq!(article.title, "N/A");
        assert_eq!(article.source, "sina");
        assert!(!article.analyzed);
        assert!(article.analysis.is_none());
    }

    #[test]
    fn test_collection_display() {
        let c = CollectionRef::new("Sina_Stock", "sina_news_roll");
        assert_eq!(c.to_string(), "Sina_Stock/sina_news_roll");
    }
}
