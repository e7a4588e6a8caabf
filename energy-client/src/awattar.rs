//! aWATTar day-ahead market data.

use reqwest::StatusCode;
use serde::Deserialize;
use time::{Date, OffsetDateTime};

use crate::{domain::PricePoint, http::HttpSettings};

pub const DEFAULT_BASE_URL: &str = "https://api.awattar.de";

const MARKET_DATA: &str = "/v1/marketdata";
const EXPECTED_UNIT: &str = "Eur/MWh";

#[derive(thiserror::Error, Debug)]
pub enum AwattarError {
    #[error("market data request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("market data endpoint returned HTTP {0}")]
    Status(StatusCode),
    #[error("market data response is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("market slot timestamp {0} is out of range")]
    InvalidTimestamp(i64),
    #[error("price window is empty: start {start} is not before end {end}")]
    EmptyWindow { start: Date, end: Date },
}

#[derive(Debug, Deserialize)]
struct MarketData {
    data: Vec<MarketSlot>,
}

#[derive(Debug, Deserialize)]
struct MarketSlot {
    start_timestamp: i64,
    marketprice: f64,
    #[serde(default)]
    unit: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AwattarClient {
    http: reqwest::Client,
    base_url: String,
}

impl AwattarClient {
    pub fn new(base_url: impl Into<String>, settings: &HttpSettings) -> reqwest::Result<Self> {
        Ok(Self {
            http: settings.build_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Prices for every market slot from midnight UTC of `start` up to
    /// (excluding) midnight UTC of `end`.
    pub async fn fetch_prices(&self, start: Date, end: Date) -> Result<Vec<PricePoint>, AwattarError> {
        if start >= end {
            return Err(AwattarError::EmptyWindow { start, end });
        }

        let response = self
            .http
            .get(format!("{}{}", self.base_url, MARKET_DATA))
            .query(&[("start", midnight_millis(start)), ("end", midnight_millis(end))])
            .send()
            .await
            .map_err(AwattarError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AwattarError::Status(status));
        }

        let body = response.bytes().await.map_err(AwattarError::Http)?;
        let market: MarketData = serde_json::from_slice(&body)?;

        let mut prices = Vec::with_capacity(market.data.len());
        for slot in market.data {
            if let Some(unit) = slot.unit.as_deref().filter(|u| *u != EXPECTED_UNIT) {
                tracing::warn!(unit, "market slot quoted in an unexpected unit");
            }
            let ts = OffsetDateTime::from_unix_timestamp_nanos(i128::from(slot.start_timestamp) * 1_000_000)
                .map_err(|_| AwattarError::InvalidTimestamp(slot.start_timestamp))?;
            prices.push(PricePoint::from_eur_per_mwh(ts, slot.marketprice));
        }

        tracing::debug!(slots = prices.len(), "fetched day-ahead prices");
        Ok(prices)
    }
}

fn midnight_millis(date: Date) -> i64 {
    date.midnight().assume_utc().unix_timestamp() * 1000
}
