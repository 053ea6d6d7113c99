//! Tolerant reader for the labelled plain-text format the prompts ask for.
//!
//! Models do not always follow the format; anything missing keeps its
//! default instead of failing the article.

use fw_core::AnalysisDetails;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

lazy_static! {
    static ref IMPORTANCE_RE: Regex = Regex::new(r"(?i)Importance_Score:\s*(\d+)").unwrap();
    static ref SENTIMENT_RE: Regex = Regex::new(r"(?i)Sentiment_Score:\s*(\d+)").unwrap();
    static ref SECTORS_RE: Regex = Regex::new(r"(?is)Affected_Sectors_Start(.*?)Affected_Sectors_End").unwrap();
    static ref SECTOR_ITEM_RE: Regex = Regex::new(r"(?m)^\s*-\s*(.*)").unwrap();
    static ref SUMMARY_RE: Regex = Regex::new(r"(?is)Analysis_Summary:\s*(.*)").unwrap();
}

fn score(re: &Regex, text: &str) -> u32 {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

pub fn extract_analysis_details(text: &str) -> AnalysisDetails {
    if text.trim().is_empty() {
        warn!("Analysis text is empty, using default details");
        return AnalysisDetails::default();
    }

    let sectors = match SECTORS_RE.captures(text).and_then(|caps| caps.get(1)) {
        Some(block) => SECTOR_ITEM_RE
            .captures_iter(block.as_str())
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => {
            debug!("Affected_Sectors block not found");
            Vec::new()
        }
    };

    let summary = SUMMARY_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let details = AnalysisDetails {
        importance_score: score(&IMPORTANCE_RE, text),
        sentiment_score: score(&SENTIMENT_RE, text),
        sectors,
        summary,
    };
    debug!(
        importance = details.importance_score,
        sentiment = details.sentiment_score,
        sectors = details.sectors.len(),
        "Extracted analysis details"
    );
    details
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_response() {
        let raw = "Importance_Score: 8\nSentiment_Score: 2\nAffected_Sectors_Start\n- Tech: impact\nAffected_Sectors_End\nAnalysis_Summary: text";
        assert_eq!(
            extract_analysis_details(raw),
            AnalysisDetails {
                importance_score: 8,
                sentiment_score: 2,
                sectors: vec!["Tech: impact".to_string()],
                summary: "text".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_sector_block() {
        let raw = "importance_score: 6\nSENTIMENT_SCORE:9\nAnalysis_Summary:\n  第一行\n  第二行\n";
        let details = extract_analysis_details(raw);
        assert_eq!(details.importance_score, 6);
        assert_eq!(details.sentiment_score, 9);
        assert!(details.sectors.is_empty());
        assert_eq!(details.summary, "第一行\n  第二行");
    }

    #[test]
    fn test_multiple_sectors_and_noise() {
        let raw = "Here you go.\nImportance_Score: 7\nAffected_Sectors_Start\n  - 新能源汽车: 出口承压\n-半导体: 供应链\n-   \nAffected_Sectors_End\n";
        let details = extract_analysis_details(raw);
        assert_eq!(details.sectors, vec!["新能源汽车: 出口承压", "半导体: 供应链"]);
        assert_eq!(details.sentiment_score, 0);
        assert_eq!(details.summary, "");
    }

    #[test]
    fn test_empty_input_is_default() {
        assert_eq!(extract_analysis_details(""), AnalysisDetails::default());
        assert_eq!(extract_analysis_details("   \n"), AnalysisDetails::default());
    }
}
