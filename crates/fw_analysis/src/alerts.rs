use fw_core::AnalysisResult;

const SEPARATOR: &str = "--------------------------------------------------";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertThresholds {
    pub importance: u32,
    /// Sentiment at or above this is a positive alert.
    pub positive_sentiment: u32,
    /// Sentiment at or below this is a negative alert.
    pub negative_sentiment: u32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            importance: 7,
            positive_sentiment: 8,
            negative_sentiment: 3,
        }
    }
}

impl AlertThresholds {
    pub fn triggers(&self, result: &AnalysisResult) -> bool {
        let details = &result.details;
        details.importance_score >= self.importance
            && (details.sentiment_score >= self.positive_sentiment
                || details.sentiment_score <= self.negative_sentiment)
    }
}

/// Successful results that cross the thresholds, in input order.
pub fn select_alerts<'a>(results: &'a [AnalysisResult], thresholds: &AlertThresholds) -> Vec<&'a AnalysisResult> {
    results
        .iter()
        .filter(|r| !r.is_error())
        .filter(|r| thresholds.triggers(r))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub subject: String,
    pub body: String,
}

/// One email covering every alert, or `None` when there is nothing to send.
pub fn compose_digest(alerts: &[&AnalysisResult]) -> Option<Digest> {
    if alerts.is_empty() {
        return None;
    }

    let subject = format!("每日新闻分析警报 - {}条重要新闻", alerts.len());
    let mut body = format!(
        "您好，\n\n系统分析发现 {} 条可能影响市场的重要新闻，详情如下：\n{}\n",
        alerts.len(),
        SEPARATOR
    );

    for alert in alerts {
        let details = &alert.details;
        let sectors = if details.sectors.is_empty() {
            "未提及".to_string()
        } else {
            details.sectors.join(", ")
        };
        let summary = if details.summary.is_empty() {
            "无摘要"
        } else {
            details.summary.as_str()
        };
        body.push_str(&format!(
            "\n新闻标题: {}\n重要性评分: {}/10\n市场情绪评分: {}/10\n影响板块: {}\n\n分析摘要:\n{}\n\n新闻链接: {}\n{}\n",
            alert.article_title,
            details.importance_score,
            details.sentiment_score,
            sectors,
            summary,
            alert.article_url,
            SEPARATOR
        ));
    }

    Some(Digest { subject, body })
}
