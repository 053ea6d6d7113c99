//! Shenwan level-1 industry performance from the Tushare Pro API.

use async_trait::async_trait;
use chrono::{Duration, Local};
use fw_core::{Error, MarketMover, MarketMoverSource, Result, Settings};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::as_number;
use crate::fetch::Fetcher;

const API_URL: &str = "http://api.tushare.pro";

pub const SECTOR_REASON: &str = "Sector Performance";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<Table>,
}

/// Column names plus positional rows.
#[derive(Debug, Default, Deserialize)]
struct Table {
    fields: Vec<String>,
    #[serde(default)]
    items: Vec<Vec<Value>>,
}

impl Table {
    fn records(&self) -> Vec<Map<String, Value>> {
        self.items
            .iter()
            .map(|item| self.fields.iter().cloned().zip(item.iter().cloned()).collect())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Industry {
    index_code: String,
    name: String,
}

fn decode(api_name: &str, raw: &str) -> Result<Table> {
    let response: ApiResponse = serde_json::from_str(raw)?;
    if response.code != 0 {
        return Err(Error::Scraping(format!(
            "Tushare {} returned code {}: {}",
            api_name,
            response.code,
            response.msg.unwrap_or_default()
        )));
    }
    Ok(response.data.unwrap_or_default())
}

fn industries(table: &Table) -> Vec<Industry> {
    let text = |record: &Map<String, Value>, key: &str| {
        record
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    table
        .records()
        .iter()
        .filter_map(|record| {
            Some(Industry {
                index_code: text(record, "index_code")?,
                name: text(record, "industry_name")?,
            })
        })
        .collect()
}

fn daily_change(table: &Table) -> Option<f64> {
    table
        .records()
        .iter()
        .find_map(|record| as_number(record.get("pct_chg")))
}

pub struct TushareSectorSource {
    fetcher: Fetcher,
    token: String,
}

impl TushareSectorSource {
    pub fn new(fetcher: Fetcher, token: impl Into<String>) -> Self {
        Self {
            fetcher,
            token: token.into(),
        }
    }

    pub fn from_settings(fetcher: Fetcher, settings: &Settings) -> Result<Self> {
        Ok(Self::new(fetcher, settings.require_tushare_token()?))
    }

    async fn query(&self, api_name: &str, params: Value, fields: &str) -> Result<Table> {
        let body = json!({
            "api_name": api_name,
            "token": self.token,
            "params": params,
            "fields": fields,
        });
        let raw = self.fetcher.post_json(API_URL, &body).await?;
        decode(api_name, &raw)
    }

    /// One mover per industry index that traded on `trade_date` (`YYYYMMDD`).
    pub async fn sector_performance(&self, trade_date: &str) -> Result<Vec<MarketMover>> {
        let table = self
            .query(
                "index_classify",
                json!({"level": "L1", "src": "SW"}),
                "index_code,industry_name",
            )
            .await?;
        let industries = industries(&table);
        if industries.is_empty() {
            return Err(Error::Scraping("Tushare returned no industry indices".to_string()));
        }

        let mut movers = Vec::new();
        for industry in industries {
            let params = json!({"ts_code": &industry.index_code, "trade_date": trade_date});
            match self.query("index_daily", params, "ts_code,trade_date,pct_chg").await {
                Ok(table) => match daily_change(&table) {
                    Some(change_pct) => movers.push(MarketMover {
                        name: industry.name,
                        change_pct,
                        reason: Some(SECTOR_REASON.to_string()),
                    }),
                    None => debug!(index = %industry.index_code, trade_date, "No daily data"),
                },
                Err(e) => warn!(index = %industry.index_code, "Skipping sector {}: {}", industry.name, e),
            }
        }

        if movers.is_empty() {
            warn!(trade_date, "No sector performance data");
        } else {
            info!(trade_date, "Fetched performance for {} sectors", movers.len());
        }
        Ok(movers)
    }
}

#[async_trait]
impl MarketMoverSource for TushareSectorSource {
    fn name(&self) -> &str {
        "tushare_sectors"
    }

    async fn fetch_movers(&self) -> Result<Vec<MarketMover>> {
        let trade_date = (Local::now() - Duration::days(1)).format("%Y%m%d").to_string();
        self.sector_performance(&trade_date).await
    }
}
