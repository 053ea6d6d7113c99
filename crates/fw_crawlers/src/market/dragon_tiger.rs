//! Eastmoney Dragon & Tiger List (龙虎榜).

use async_trait::async_trait;
use fw_core::{Error, MarketMover, MarketMoverSource, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::as_number;
use crate::extract::unwrap_jsonp;
use crate::fetch::Fetcher;

const PAGE_SIZE: usize = 20;

const COLUMNS: &str = "SECURITY_CODE,SECUCODE,SECURITY_NAME_ABBR,TRADE_DATE,EXPLAIN,CLOSE_PRICE,CHANGE_RATE,\
BILLBOARD_NET_AMT,BILLBOARD_BUY_AMT,BILLBOARD_SELL_AMT,BILLBOARD_DEAL_AMT,ACCUM_AMOUNT,\
DEAL_NET_RATIO,DEAL_AMOUNT_RATIO,TURNOVERRATE,FREE_MARKET_CAP,EXPLANATION";

#[derive(Debug, Deserialize)]
struct BillboardResponse {
    #[serde(default)]
    success: bool,
    result: Option<BillboardResult>,
}

#[derive(Debug, Deserialize)]
struct BillboardResult {
    data: Option<Vec<BillboardRow>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct BillboardRow {
    security_name_abbr: Option<String>,
    change_rate: Option<Value>,
    explain: Option<String>,
}

pub struct DragonTigerSource {
    fetcher: Fetcher,
}

impl DragonTigerSource {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    fn api_url() -> String {
        format!(
            "https://datacenter-web.eastmoney.com/api/data/v1/get?sortColumns=SECURITY_CODE,TRADE_DATE&sortTypes=-1,-1\
             &pageSize={}&pageNumber=1&reportName=RPT_DAILYBILLBOARD_DETAILSNEW&columns={}&source=WEB&client=WEB",
            PAGE_SIZE, COLUMNS
        )
    }
}

fn parse_movers(raw: &str) -> Result<Vec<MarketMover>> {
    let payload = unwrap_jsonp(raw, &[]).unwrap_or(raw);
    let response: BillboardResponse = serde_json::from_str(payload)?;

    let rows = match (response.success, response.result.and_then(|r| r.data)) {
        (true, Some(rows)) => rows,
        _ => {
            return Err(Error::Scraping(
                "Dragon & Tiger API did not return the expected structure".to_string(),
            ))
        }
    };

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let name = row.security_name_abbr?.trim().to_string();
            if name.is_empty() {
                return None;
            }
            Some(MarketMover {
                name,
                change_pct: as_number(row.change_rate.as_ref()).unwrap_or(0.0),
                reason: row.explain.filter(|e| !e.trim().is_empty()),
            })
        })
        .collect())
}

#[async_trait]
impl MarketMoverSource for DragonTigerSource {
    fn name(&self) -> &str {
        "eastmoney_dragon_tiger"
    }

    async fn fetch_movers(&self) -> Result<Vec<MarketMover>> {
        let raw = self.fetcher.fetch(&Self::api_url()).await?;
        let movers = parse_movers(&raw)?;
        if movers.is_empty() {
            warn!("No rows in the Dragon & Tiger List");
        } else {
            info!("Fetched {} Dragon & Tiger List rows", movers.len());
        }
        Ok(movers)
    }
}
