use crate::market::types::{SymbolUpdate, SymbolUpdateWire, STREAM_INFO_EVENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] simd_json::Error),
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("successful '{0}' envelope carried no result")]
    MissingResult(String),
    #[error("unexpected symbol '{found}' (subscribed to '{expected}')")]
    UnexpectedSymbol { expected: String, found: String },
    #[error("bucket at {found} is older than the series tail at {last}")]
    OutOfOrder { last: i64, found: i64 },
}

/// A decoded inbound frame.
///
/// `result` is only populated for successful `exchange.stream_info` frames;
/// other events keep their payload undecoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub event: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub result: Option<SymbolUpdate>,
}

impl Envelope {
    pub fn is_stream_info(&self) -> bool {
        self.event == STREAM_INFO_EVENT
    }
}

#[derive(Debug, Deserialize)]
struct EnvelopeWire {
    event: String,
    success: bool,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    result: Option<simd_json::OwnedValue>,
}

#[derive(Debug, Serialize)]
struct SubscribeParams<'a> {
    symbol: &'a str,
}

#[derive(Debug, Serialize)]
struct SubscribeFrame<'a> {
    event: &'static str,
    params: SubscribeParams<'a>,
}

/// Decodes a frame in place; `payload` is clobbered by the parser.
pub fn decode_frame(payload: &mut [u8]) -> Result<Envelope, ProtocolError> {
    let wire: EnvelopeWire = simd_json::serde::from_slice(payload)?;

    let result = if wire.success && wire.event == STREAM_INFO_EVENT {
        let raw = wire
            .result
            .ok_or_else(|| ProtocolError::MissingResult(wire.event.clone()))?;
        let update_wire: SymbolUpdateWire = simd_json::serde::from_owned_value(raw)?;
        Some(SymbolUpdate::try_from(update_wire)?)
    } else {
        None
    };

    Ok(Envelope {
        event: wire.event,
        success: wire.success,
        error_message: wire.error_message,
        result,
    })
}

pub fn decode(raw: &str) -> Result<Envelope, ProtocolError> {
    let mut owned = raw.as_bytes().to_vec();
    decode_frame(&mut owned)
}

pub fn subscribe_frame(symbol: &str) -> Result<String, ProtocolError> {
    let frame = SubscribeFrame {
        event: STREAM_INFO_EVENT,
        params: SubscribeParams { symbol },
    };
    Ok(simd_json::serde::to_string(&frame)?)
}
