use crate::error::AppError;
use crate::market::types::{HistoryCandle, HistoryCandleWire};
use reqwest::Client;
use std::future::Future;

/// Supplier of the historical buckets a stream is seeded with.
pub trait HistorySource: Send + Sync + 'static {
    fn fetch_history(
        &self,
        symbol: &str,
    ) -> impl Future<Output = Result<Vec<HistoryCandle>, AppError>> + Send;
}

/// `GET {base_url}/price-history/{symbol}`.
#[derive(Debug, Clone)]
pub struct RestHistorySource {
    client: Client,
    base_url: String,
}

impl RestHistorySource {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

fn price_history_endpoint(base_url: &str, symbol: &str) -> String {
    format!(
        "{}/price-history/{}",
        base_url.trim_end_matches('/'),
        symbol.to_ascii_uppercase()
    )
}

impl HistorySource for RestHistorySource {
    async fn fetch_history(&self, symbol: &str) -> Result<Vec<HistoryCandle>, AppError> {
        let endpoint = price_history_endpoint(&self.base_url, symbol);
        let response = self.client.get(endpoint).send().await?.error_for_status()?;
        let payload = response.json::<Vec<HistoryCandleWire>>().await?;
        normalize_history(payload)
    }
}

/// Validates wire rows, orders them by time and keeps the last row per timestamp.
pub fn normalize_history(payload: Vec<HistoryCandleWire>) -> Result<Vec<HistoryCandle>, AppError> {
    let mut candles = Vec::with_capacity(payload.len());
    for row in payload {
        let candle: HistoryCandle = row.try_into()?;
        candles.push(candle);
    }

    candles.sort_by_key(|history| history.candle.recorded_at);
    let mut deduped: Vec<HistoryCandle> = Vec::with_capacity(candles.len());
    for history in candles {
        match deduped.last_mut() {
            Some(last) if last.candle.recorded_at == history.candle.recorded_at => *last = history,
            _ => deduped.push(history),
        }
    }
    Ok(deduped)
}
