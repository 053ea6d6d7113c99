use fw_core::{AnalysisMode, Article};

const RESPONSE_FORMAT: &str = "Provide a structured analysis in Chinese. Your entire response MUST strictly follow the format below, using the exact headers without any markdown (like ** or *):";

fn article_block(article: &Article) -> String {
    format!(
        "**News Article:**\n- **Title:** \"{}\"\n- **Content:** \"{}\"\n- **Source:** \"{}\"\n- **URL:** {}",
        article.title, article.content, article.source, article.url
    )
}

fn evening(article: &Article, market_context: &str) -> String {
    format!(
        "Analyze the following Chinese news article in the context of today's market performance.

**Market Context:**
{context}

{article}

**Your Task:**
{format}

Importance_Score: [1-10, where 10 is critically important]
Sentiment_Score: [1-10, where 1 is very negative, 5 is neutral, 10 is very positive]
Affected_Sectors_Start
- [Sector Name 1]: [Brief explanation of the impact]
- [Sector Name 2]: [Brief explanation of the impact]
Affected_Sectors_End
Analysis_Summary: [A concise summary of your reasoning and predictive analysis, explaining why this news is or isn't important based on the market context.]
",
        context = market_context,
        article = article_block(article),
        format = RESPONSE_FORMAT,
    )
}

fn morning(article: &Article) -> String {
    format!(
        "Analyze the following US news article and its potential impact on the Chinese stock market.

{article}

**Your Task:**
{format}

Importance_Score: [1-10]
Sentiment_Score: [1-10]
Affected_Sectors_Start
- [Sector Name 1]: [Brief explanation of the impact]
- [Sector Name 2]: [Brief explanation of the impact]
Affected_Sectors_End
Analysis_Summary: [A concise summary of your reasoning and predictive analysis]

**Example Response Format:**
Importance_Score: 7
Sentiment_Score: 8
Affected_Sectors_Start
- 新能源汽车: 美国市场的政策变化可能影响中国相关产业链的出口预期。
- 半导体: 对全球供应链的担忧可能传导至中国的芯片设计和制造公司。
Affected_Sectors_End
Analysis_Summary: 该新闻预示着美国新能源政策的重大转变，可能对中国的相关出口构成挑战，但也会加速国内市场的整合。预计短期内相关板块将承压。
",
        article = article_block(article),
        format = RESPONSE_FORMAT,
    )
}

/// Prompt for one article. `market_context` is only used by the evening
/// variant.
pub fn build_prompt(article: &Article, mode: AnalysisMode, market_context: &str) -> String {
    match mode {
        AnalysisMode::Morning => morning(article),
        AnalysisMode::Evening => evening(article, market_context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article() -> Article {
        Article {
            url: "https://finance.sina.com.cn/a.html".to_string(),
            title: "央行降准".to_string(),
            source_page_url: None,
            content: "央行宣布下调存款准备金率。".to_string(),
            source: "sina".to_string(),
            fetched_at: Utc::now(),
            published_date: None,
            analyzed: false,
            analysis: None,
        }
    }

    #[test]
    fn test_evening_prompt_carries_market_context() {
        let prompt = build_prompt(&article(), AnalysisMode::Evening, "Market Context:\nTop Gainers: A: 1.00%");
        assert!(prompt.contains("in the context of today's market performance"));
        assert!(prompt.contains("Top Gainers: A: 1.00%"));
        assert!(prompt.contains("- **Title:** \"央行降准\""));
        assert!(prompt.contains("- **URL:** https://finance.sina.com.cn/a.html"));
        assert!(prompt.contains("Affected_Sectors_Start"));
    }

    #[test]
    fn test_morning_prompt_ignores_market_context() {
        let prompt = build_prompt(&article(), AnalysisMode::Morning, "SHOULD NOT APPEAR");
        assert!(prompt.contains("impact on the Chinese stock market"));
        assert!(prompt.contains("**Example Response Format:**"));
        assert!(!prompt.contains("SHOULD NOT APPEAR"));
    }
}
