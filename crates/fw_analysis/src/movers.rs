//! Market-mover context for the evening prompt.

use std::collections::HashSet;
use std::sync::Arc;

use fw_core::{MarketMover, MarketMoverSource};
use tracing::{error, info, warn};

pub const TOP_N: usize = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedMovers {
    /// Largest rise first.
    pub gainers: Vec<MarketMover>,
    /// Largest fall first.
    pub losers: Vec<MarketMover>,
}

/// Dedupe by name (first occurrence wins), then keep the top gainers and losers.
pub fn rank_movers(movers: Vec<MarketMover>) -> RankedMovers {
    let mut seen = HashSet::new();
    let mut unique: Vec<MarketMover> = movers
        .into_iter()
        .filter(|m| !m.name.trim().is_empty() && m.change_pct.is_finite())
        .filter(|m| seen.insert(m.name.clone()))
        .collect();
    unique.sort_by(|a, b| b.change_pct.total_cmp(&a.change_pct));

    let gainers: Vec<_> = unique.iter().filter(|m| m.change_pct > 0.0).take(TOP_N).cloned().collect();
    let losers: Vec<_> = unique.iter().rev().filter(|m| m.change_pct < 0.0).take(TOP_N).cloned().collect();

    info!("Identified {} top gainers and {} top losers", gainers.len(), losers.len());
    RankedMovers { gainers, losers }
}

fn format_side(label: &str, movers: &[MarketMover]) -> String {
    if movers.is_empty() {
        return format!("{}: None", label);
    }
    let items: Vec<String> = movers
        .iter()
        .map(|m| format!("{}: {:.2}%", m.name, m.change_pct))
        .collect();
    format!("{}: {}", label, items.join(", "))
}

pub fn format_for_prompt(ranked: &RankedMovers) -> String {
    format!(
        "Market Context:\n{}\n{}",
        format_side("Top Gainers", &ranked.gainers),
        format_side("Top Losers", &ranked.losers)
    )
}

/// Pull from every source in order and rank the union. A failing source is
/// logged and skipped.
pub async fn gather(sources: &[Arc<dyn MarketMoverSource>]) -> RankedMovers {
    let mut all = Vec::new();
    for source in sources {
        match source.fetch_movers().await {
            Ok(movers) => {
                info!(source = source.name(), "Fetched {} market movers", movers.len());
                all.extend(movers);
            }
            Err(e) => error!(source = source.name(), "Could not fetch market movers: {}", e),
        }
    }
    if all.is_empty() {
        warn!("No market mover data available from any source");
        return RankedMovers::default();
    }
    rank_movers(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fw_core::{Error, Result};

    fn mover(name: &str, change_pct: f64) -> MarketMover {
        MarketMover {
            name: name.to_string(),
            change_pct,
            reason: None,
        }
    }

    #[test]
    fn test_rank_dedupes_and_orders() {
        let ranked = rank_movers(vec![
            mover("A", 3.0),
            mover("B", -2.0),
            mover("A", 9.0),
            mover("C", 10.0),
            mover("D", -7.5),
            mover("E", 0.0),
            mover("", 5.0),
        ]);
        let gainers: Vec<_> = ranked.gainers.iter().map(|m| (m.name.as_str(), m.change_pct)).collect();
        let losers: Vec<_> = ranked.losers.iter().map(|m| (m.name.as_str(), m.change_pct)).collect();
        assert_eq!(gainers, vec![("C", 10.0), ("A", 3.0)]);
        assert_eq!(losers, vec![("D", -7.5), ("B", -2.0)]);
    }

    #[test]
    fn test_rank_keeps_top_ten() {
        let movers = (1..=15).map(|i| mover(&format!("S{}", i), i as f64)).collect();
        let ranked = rank_movers(movers);
        assert_eq!(ranked.gainers.len(), TOP_N);
        assert_eq!(ranked.gainers[0].name, "S15");
        assert!(ranked.losers.is_empty());
    }

    #[test]
    fn test_format_for_prompt() {
        let ranked = RankedMovers {
            gainers: vec![mover("浦发银行", 10.018), mover("B", 1.5)],
            losers: Vec::new(),
        };
        assert_eq!(
            format_for_prompt(&ranked),
            "Market Context:\nTop Gainers: 浦发银行: 10.02%, B: 1.50%\nTop Losers: None"
        );
    }

    struct StaticSource(Option<Vec<MarketMover>>);

    #[async_trait]
    impl MarketMoverSource for StaticSource {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch_movers(&self) -> Result<Vec<MarketMover>> {
            self.0.clone().ok_or_else(|| Error::Fetch("unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_gather_skips_failing_sources() {
        let sources: Vec<Arc<dyn MarketMoverSource>> = vec![
            Arc::new(StaticSource(None)),
            Arc::new(StaticSource(Some(vec![mover("X", -1.0), mover("Y", 2.0)]))),
        ];
        let ranked = gather(&sources).await;
        assert_eq!(ranked.gainers.len(), 1);
        assert_eq!(ranked.losers.len(), 1);

        let ranked = gather(&[Arc::new(StaticSource(None)) as Arc<dyn MarketMoverSource>]).await;
        assert_eq!(ranked, RankedMovers::default());
    }
}
