use crate::error::AppError;
use crate::market::frame::ProtocolError;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;

pub const STREAM_INFO_EVENT: &str = "exchange.stream_info";

pub const DEFAULT_SYMBOL: &str = "AAPL";
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";
pub const DEFAULT_HISTORY_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_SEED_HISTORY: bool = true;
pub const DEFAULT_SEED_CURSOR: SeedCursor = SeedCursor::FreshBucket;
pub const DEFAULT_RECONNECT_ENABLED: bool = true;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;
pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 200;
pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 5_000;
pub const DEFAULT_RECONNECT_JITTER_MS: u64 = 250;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const MIN_RECONNECT_BASE_DELAY_MS: u64 = 1;
pub const MAX_RECONNECT_DELAY_MS: u64 = 300_000;
pub const MAX_RECONNECT_JITTER_MS: u64 = 10_000;
pub const MIN_CONNECT_TIMEOUT_MS: u64 = 100;
pub const MAX_CONNECT_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_HISTORY_TIMEOUT_MS: u64 = 10_000;
pub const MAX_RETENTION: usize = 1_000_000;

const RECONNECT_MAX_EXPONENT: u32 = 6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Subscribed,
    Streaming,
    Error,
    Closed,
}

/// Cursor state the store adopts right after a history seed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeedCursor {
    /// The next streaming update opens a new bucket.
    FreshBucket,
    /// The next streaming update completes the last historical bucket.
    ResumeLast,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub recorded_at: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumePoint {
    pub recorded_at: i64,
    pub volume: f64,
}

/// One historical bucket as served by the price-history endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryCandle {
    pub candle: Candle,
    pub ask_volume: f64,
    pub bid_volume: f64,
}

/// Payload of a streaming `exchange.stream_info` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SymbolUpdate {
    pub symbol: String,
    pub price: f64,
    pub ask_volume: f64,
    pub bid_volume: f64,
    pub best_bid: f64,
    pub best_ask: f64,
    pub candle: Candle,
    pub new_candle: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_RECONNECT_ATTEMPTS),
            base_delay_ms: DEFAULT_RECONNECT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_RECONNECT_MAX_DELAY_MS,
            jitter_ms: DEFAULT_RECONNECT_JITTER_MS,
        }
    }
}

impl ReconnectPolicy {
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map(|max| attempt <= max).unwrap_or(true)
    }

    /// Exponential backoff for the given 1-based attempt, capped at `max_delay_ms`.
    pub fn delay(&self, attempt: u32, jitter_seed: u64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(RECONNECT_MAX_EXPONENT);
        let base_ms = self.base_delay_ms.saturating_mul(1_u64 << exponent);
        let jitter_ms = if self.jitter_ms == 0 {
            0
        } else {
            jitter_seed % self.jitter_ms
        };
        Duration::from_millis(base_ms.saturating_add(jitter_ms).min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartStreamArgs {
    pub symbol: Option<String>,
    pub ws_url: Option<String>,
    pub history_base_url: Option<String>,
    pub seed_history: Option<bool>,
    pub seed_cursor: Option<SeedCursor>,
    pub retention: Option<usize>,
    pub reconnect: Option<bool>,
    pub max_reconnect_attempts: Option<u32>,
    pub reconnect_base_delay_ms: Option<u64>,
    pub reconnect_max_delay_ms: Option<u64>,
    pub reconnect_jitter_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub history_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub symbol: String,
    pub ws_url: String,
    pub history_base_url: String,
    pub seed_history: bool,
    pub seed_cursor: SeedCursor,
    pub retention: Option<NonZeroUsize>,
    pub reconnect: Option<ReconnectPolicy>,
    pub connect_timeout_ms: u64,
    pub history_timeout_ms: u64,
}

fn normalize_url(raw: Option<String>, default: &str, schemes: &[&str]) -> Result<String, AppError> {
    let url = raw
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string());

    if !schemes
        .iter()
        .any(|scheme| url.starts_with(&format!("{scheme}://")))
    {
        return Err(AppError::InvalidArgument(format!(
            "url '{url}' must use one of: {}",
            schemes.join(", ")
        )));
    }
    Ok(url)
}

impl StartStreamArgs {
    pub fn normalize(self) -> Result<StreamConfig, AppError> {
        let symbol = self
            .symbol
            .unwrap_or_else(|| DEFAULT_SYMBOL.to_string())
            .trim()
            .to_ascii_uppercase();

        if symbol.is_empty() || !symbol.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(AppError::InvalidArgument(
                "symbol must be non-empty alphanumeric ASCII".to_string(),
            ));
        }

        let ws_url = normalize_url(self.ws_url, DEFAULT_WS_URL, &["ws", "wss"])?;
        let history_base_url =
            normalize_url(self.history_base_url, DEFAULT_HISTORY_BASE_URL, &["http", "https"])?;

        let retention = match self.retention {
            None => None,
            Some(capacity) if capacity > MAX_RETENTION => {
                return Err(AppError::InvalidArgument(format!(
                    "retention must be between 1 and {MAX_RETENTION}"
                )));
            }
            Some(capacity) => Some(NonZeroUsize::new(capacity).ok_or_else(|| {
                AppError::InvalidArgument(format!(
                    "retention must be between 1 and {MAX_RETENTION}"
                ))
            })?),
        };

        let base_delay_ms = self
            .reconnect_base_delay_ms
            .unwrap_or(DEFAULT_RECONNECT_BASE_DELAY_MS);
        let max_delay_ms = self
            .reconnect_max_delay_ms
            .unwrap_or(DEFAULT_RECONNECT_MAX_DELAY_MS);
        if !(MIN_RECONNECT_BASE_DELAY_MS..=MAX_RECONNECT_DELAY_MS).contains(&base_delay_ms)
            || !(base_delay_ms..=MAX_RECONNECT_DELAY_MS).contains(&max_delay_ms)
        {
            return Err(AppError::InvalidArgument(format!(
                "reconnect delays must satisfy {MIN_RECONNECT_BASE_DELAY_MS} <= base <= max <= {MAX_RECONNECT_DELAY_MS}"
            )));
        }
        let jitter_ms = self.reconnect_jitter_ms.unwrap_or(DEFAULT_RECONNECT_JITTER_MS);
        if jitter_ms > MAX_RECONNECT_JITTER_MS {
            return Err(AppError::InvalidArgument(format!(
                "reconnectJitterMs must be at most {MAX_RECONNECT_JITTER_MS}"
            )));
        }

        let max_attempts = match self
            .max_reconnect_attempts
            .unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS)
        {
            0 => None,
            attempts => Some(attempts),
        };
        let reconnect = self
            .reconnect
            .unwrap_or(DEFAULT_RECONNECT_ENABLED)
            .then_some(ReconnectPolicy {
                max_attempts,
                base_delay_ms,
                max_delay_ms,
                jitter_ms,
            });

        let connect_timeout_ms = self.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS);
        if !(MIN_CONNECT_TIMEOUT_MS..=MAX_CONNECT_TIMEOUT_MS).contains(&connect_timeout_ms) {
            return Err(AppError::InvalidArgument(format!(
                "connectTimeoutMs must be between {MIN_CONNECT_TIMEOUT_MS} and {MAX_CONNECT_TIMEOUT_MS}"
            )));
        }

        let history_timeout_ms = self.history_timeout_ms.unwrap_or(DEFAULT_HISTORY_TIMEOUT_MS);
        if !(MIN_CONNECT_TIMEOUT_MS..=MAX_CONNECT_TIMEOUT_MS).contains(&history_timeout_ms) {
            return Err(AppError::InvalidArgument(format!(
                "historyTimeoutMs must be between {MIN_CONNECT_TIMEOUT_MS} and {MAX_CONNECT_TIMEOUT_MS}"
            )));
        }

        Ok(StreamConfig {
            symbol,
            ws_url,
            history_base_url,
            seed_history: self.seed_history.unwrap_or(DEFAULT_SEED_HISTORY),
            seed_cursor: self.seed_cursor.unwrap_or(DEFAULT_SEED_CURSOR),
            retention,
            reconnect,
            connect_timeout_ms,
            history_timeout_ms,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSession {
    pub running: bool,
    pub symbol: String,
    pub ws_url: String,
    pub seed_history: bool,
    pub seed_cursor: SeedCursor,
    pub retention: Option<usize>,
    pub reconnect: bool,
}

impl StreamSession {
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            running: true,
            symbol: config.symbol.clone(),
            ws_url: config.ws_url.clone(),
            seed_history: config.seed_history,
            seed_cursor: config.seed_cursor,
            retention: config.retention.map(NonZeroUsize::get),
            reconnect: config.reconnect.is_some(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStopResult {
    pub stopped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatusSnapshot {
    pub state: ConnectionState,
    pub symbol: String,
    pub reconnect_attempt: u32,
    pub frames_received: u64,
    pub appends: u64,
    pub overwrites: u64,
    pub protocol_errors: u64,
    pub application_errors: u64,
    pub series_len: usize,
    pub reason: Option<String>,
}

impl StreamStatusSnapshot {
    pub fn idle(symbol: String, reason: Option<String>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            symbol,
            reconnect_attempt: 0,
            frames_received: 0,
            appends: 0,
            overwrites: 0,
            protocol_errors: 0,
            application_errors: 0,
            series_len: 0,
            reason,
        }
    }
}

/// A JSON number or a numeric string; decimals arrive quoted from some servers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumericWire {
    Number(f64),
    Text(String),
}

impl NumericWire {
    fn to_f64(&self, field: &'static str) -> Result<f64, ProtocolError> {
        let value = match self {
            Self::Number(value) => *value,
            Self::Text(text) => {
                text.trim()
                    .parse::<f64>()
                    .map_err(|error| ProtocolError::InvalidValue {
                        field,
                        reason: error.to_string(),
                    })?
            }
        };
        if !value.is_finite() {
            return Err(ProtocolError::InvalidValue {
                field,
                reason: "value must be finite".to_string(),
            });
        }
        Ok(value)
    }
}

/// Unix milliseconds as an integer, a float, or an RFC 3339 string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TimestampWire {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl TimestampWire {
    fn to_unix_ms(&self) -> Result<i64, ProtocolError> {
        match self {
            Self::Integer(value) => Ok(*value),
            Self::Float(value) if value.is_finite() => Ok(value.round() as i64),
            Self::Float(_) => Err(ProtocolError::InvalidValue {
                field: "recorded_at",
                reason: "timestamp must be finite".to_string(),
            }),
            Self::Text(text) => {
                let trimmed = text.trim();
                if let Ok(millis) = trimmed.parse::<i64>() {
                    return Ok(millis);
                }
                chrono::DateTime::parse_from_rfc3339(trimmed)
                    .map(|parsed| parsed.timestamp_millis())
                    .map_err(|error| ProtocolError::InvalidValue {
                        field: "recorded_at",
                        reason: error.to_string(),
                    })
            }
        }
    }
}

fn required_number(
    value: Option<&NumericWire>,
    field: &'static str,
) -> Result<f64, ProtocolError> {
    value
        .ok_or(ProtocolError::MissingField(field))?
        .to_f64(field)
}

fn optional_number(value: Option<&NumericWire>, field: &'static str) -> Result<f64, ProtocolError> {
    value.map(|wire| wire.to_f64(field)).transpose().map(Option::unwrap_or_default)
}

fn non_negative(value: f64, field: &'static str) -> Result<f64, ProtocolError> {
    if value < 0.0 {
        return Err(ProtocolError::InvalidValue {
            field,
            reason: "volume must be non-negative".to_string(),
        });
    }
    Ok(value)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandleDataWire {
    pub recorded_at: Option<TimestampWire>,
    pub open: Option<NumericWire>,
    pub high: Option<NumericWire>,
    pub low: Option<NumericWire>,
    pub close: Option<NumericWire>,
    pub volume: Option<NumericWire>,
    pub ask_volume: Option<NumericWire>,
    pub bid_volume: Option<NumericWire>,
    pub new_candle: Option<bool>,
}

/// `result` of a stream frame. Candle fields may be flat or nested under
/// `candle_data`; flat fields take precedence.
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolUpdateWire {
    pub symbol: Option<String>,
    pub price: Option<NumericWire>,
    pub ask_volume: Option<NumericWire>,
    pub bid_volume: Option<NumericWire>,
    pub best_bid: Option<NumericWire>,
    pub best_ask: Option<NumericWire>,
    #[serde(flatten)]
    pub candle: CandleDataWire,
    pub candle_data: Option<CandleDataWire>,
}

impl TryFrom<SymbolUpdateWire> for SymbolUpdate {
    type Error = ProtocolError;

    fn try_from(value: SymbolUpdateWire) -> Result<Self, Self::Error> {
        let flat = &value.candle;
        let nested = value.candle_data.as_ref();
        let pick = |flat: Option<&NumericWire>,
                    nested: Option<&NumericWire>|
         -> Option<NumericWire> { flat.or(nested).cloned() };

        let symbol = value
            .symbol
            .as_deref()
            .map(str::trim)
            .filter(|symbol| !symbol.is_empty())
            .ok_or(ProtocolError::MissingField("symbol"))?
            .to_string();

        let recorded_at = flat
            .recorded_at
            .as_ref()
            .or_else(|| nested.and_then(|candle| candle.recorded_at.as_ref()))
            .ok_or(ProtocolError::MissingField("recorded_at"))?
            .to_unix_ms()?;

        let field = |selector: fn(&CandleDataWire) -> Option<&NumericWire>| {
            pick(selector(flat), nested.and_then(selector))
        };

        let candle = Candle {
            recorded_at,
            open: required_number(field(|c| c.open.as_ref()).as_ref(), "open")?,
            high: required_number(field(|c| c.high.as_ref()).as_ref(), "high")?,
            low: required_number(field(|c| c.low.as_ref()).as_ref(), "low")?,
            close: required_number(field(|c| c.close.as_ref()).as_ref(), "close")?,
            volume: non_negative(
                required_number(field(|c| c.volume.as_ref()).as_ref(), "volume")?,
                "volume",
            )?,
        };

        let ask_volume = pick(
            value.ask_volume.as_ref(),
            field(|c| c.ask_volume.as_ref()).as_ref(),
        );
        let bid_volume = pick(
            value.bid_volume.as_ref(),
            field(|c| c.bid_volume.as_ref()).as_ref(),
        );

        let new_candle = flat
            .new_candle
            .or_else(|| nested.and_then(|candle| candle.new_candle))
            .ok_or(ProtocolError::MissingField("new_candle"))?;

        Ok(Self {
            symbol,
            price: optional_number(value.price.as_ref(), "price")?,
            ask_volume: non_negative(optional_number(ask_volume.as_ref(), "ask_volume")?, "ask_volume")?,
            bid_volume: non_negative(optional_number(bid_volume.as_ref(), "bid_volume")?, "bid_volume")?,
            best_bid: optional_number(value.best_bid.as_ref(), "best_bid")?,
            best_ask: optional_number(value.best_ask.as_ref(), "best_ask")?,
            candle,
            new_candle,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryCandleWire {
    pub recorded_at: TimestampWire,
    pub open: NumericWire,
    pub high: NumericWire,
    pub low: NumericWire,
    pub close: NumericWire,
    pub volume: NumericWire,
    pub ask_volume: Option<NumericWire>,
    pub bid_volume: Option<NumericWire>,
}

impl TryFrom<HistoryCandleWire> for HistoryCandle {
    type Error = ProtocolError;

    fn try_from(value: HistoryCandleWire) -> Result<Self, Self::Error> {
        Ok(Self {
            candle: Candle {
                recorded_at: value.recorded_at.to_unix_ms()?,
                open: value.open.to_f64("open")?,
                high: value.high.to_f64("high")?,
                low: value.low.to_f64("low")?,
                close: value.close.to_f64("close")?,
                volume: non_negative(value.volume.to_f64("volume")?, "volume")?,
            },
            ask_volume: non_negative(optional_number(value.ask_volume.as_ref(), "ask_volume")?, "ask_volume")?,
            bid_volume: non_negative(optional_number(value.bid_volume.as_ref(), "bid_volume")?, "bid_volume")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_start_args_defaults() {
        let config = StartStreamArgs::default()
            .normalize()
            .expect("defaults should be valid");

        assert_eq!(config.symbol, DEFAULT_SYMBOL);
        assert_eq!(config.ws_url, DEFAULT_WS_URL);
        assert_eq!(config.history_base_url, DEFAULT_HISTORY_BASE_URL);
        assert_eq!(config.seed_history, DEFAULT_SEED_HISTORY);
        assert_eq!(config.seed_cursor, DEFAULT_SEED_CURSOR);
        assert_eq!(config.retention, None);
        assert_eq!(config.reconnect, Some(ReconnectPolicy::default()));
        assert_eq!(config.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
        assert_eq!(config.history_timeout_ms, DEFAULT_HISTORY_TIMEOUT_MS);
    }

    #[test]
    fn rejects_history_timeout_out_of_range() {
        let result = StartStreamArgs {
            history_timeout_ms: Some(0),
            ..Default::default()
        }
        .normalize();

        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
    }

    #[test]
    fn uppercases_symbol_and_trims_trailing_slash() {
        let config = StartStreamArgs {
            symbol: Some(" msft ".to_string()),
            history_base_url: Some("https://prices.example.com/".to_string()),
            ..Default::default()
        }
        .normalize()
        .expect("args should be valid");

        assert_eq!(config.symbol, "MSFT");
        assert_eq!(config.history_base_url, "https://prices.example.com");
    }

    #[test]
    fn rejects_non_alphanumeric_symbol() {
        let result = StartStreamArgs {
            symbol: Some("BTC/USD".to_string()),
            ..Default::default()
        }
        .normalize();

        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
    }

    #[test]
    fn rejects_http_websocket_url() {
        let result = StartStreamArgs {
            ws_url: Some("http://localhost:8080/ws".to_string()),
            ..Default::default()
        }
        .normalize();

        assert!(result.is_err());
    }

    #[test]
    fn validates_retention_range() {
        let zero = StartStreamArgs {
            retention: Some(0),
            ..Default::default()
        }
        .normalize();
        assert!(zero.is_err());

        let fifty = StartStreamArgs {
            retention: Some(50),
            ..Default::default()
        }
        .normalize()
        .expect("retention of 50 should be valid");
        assert_eq!(fifty.retention.map(NonZeroUsize::get), Some(50));
    }

    #[test]
    fn validates_reconnect_delay_ordering() {
        let result = StartStreamArgs {
            reconnect_base_delay_ms: Some(1_000),
            reconnect_max_delay_ms: Some(500),
            ..Default::default()
        }
        .normalize();

        assert!(result.is_err());
    }

    #[test]
    fn disabling_reconnect_drops_policy() {
        let config = StartStreamArgs {
            reconnect: Some(false),
            ..Default::default()
        }
        .normalize()
        .expect("args should be valid");

        assert!(config.reconnect.is_none());
    }

    #[test]
    fn zero_max_attempts_means_unbounded() {
        let config = StartStreamArgs {
            max_reconnect_attempts: Some(0),
            ..Default::default()
        }
        .normalize()
        .expect("args should be valid");

        let policy = config.reconnect.expect("reconnect enabled by default");
        assert_eq!(policy.max_attempts, None);
        assert!(policy.allows(u32::MAX));
    }

    #[test]
    fn reconnect_delay_grows_and_caps() {
        let policy = ReconnectPolicy {
            max_attempts: Some(3),
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            jitter_ms: 0,
        };

        assert_eq!(policy.delay(1, 0), Duration::from_millis(200));
        assert_eq!(policy.delay(2, 0), Duration::from_millis(400));
        assert_eq!(policy.delay(4, 0), Duration::from_millis(1_600));
        assert_eq!(policy.delay(30, 0), Duration::from_millis(5_000));
        assert!(policy.allows(3));
        assert!(!policy.allows(4));
    }

    #[test]
    fn reconnect_jitter_stays_below_bound() {
        let policy = ReconnectPolicy {
            jitter_ms: 250,
            ..ReconnectPolicy::default()
        };

        let delay = policy.delay(1, 1_234_567);
        assert!(delay >= Duration::from_millis(200));
        assert!(delay < Duration::from_millis(450));
    }

    #[test]
    fn parses_rfc3339_timestamps() {
        let wire = TimestampWire::Text("2024-01-02T03:04:05.500Z".to_string());
        assert_eq!(wire.to_unix_ms().expect("timestamp should parse"), 1_704_164_645_500);
    }

    #[test]
    fn rejects_non_finite_numbers() {
        let wire = NumericWire::Text("NaN".to_string());
        assert!(wire.to_f64("open").is_err());
    }
}
