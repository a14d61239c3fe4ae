use crate::error::AppError;
use crate::market::frame::{decode_frame, ProtocolError};
use crate::market::history::HistorySource;
use crate::market::store::{AppliedMutation, MutationKind, SharedSeriesStore};
use crate::market::transport::{close_stream, connect_stream, send_subscribe, StreamSocket};
use crate::market::types::{ConnectionState, StreamConfig, StreamStatusSnapshot};
use futures_util::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Informational events published while a stream runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamEvent {
    Status(StreamStatusSnapshot),
    Seeded { len: usize },
    SeedLoadFailed { reason: String },
    SeriesUpdated(AppliedMutation),
    ProtocolError { reason: String },
    ApplicationError { message: String },
    InvariantViolation { reason: String },
    /// Last event of a run; nothing is published for this stream afterwards.
    Ended { state: ConnectionState },
}

struct StreamRuntimeContext<'a, H> {
    config: &'a StreamConfig,
    history: &'a H,
    store: &'a SharedSeriesStore,
    status_store: &'a Arc<RwLock<StreamStatusSnapshot>>,
    events: &'a broadcast::Sender<StreamEvent>,
    cancel_token: &'a CancellationToken,
}

impl<H> StreamRuntimeContext<'_, H> {
    fn emit(&self, event: StreamEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

enum SessionOutcome {
    Cancelled,
    Failed {
        reached_streaming: bool,
        error: AppError,
    },
}

#[derive(Debug, PartialEq)]
enum FrameOutcome {
    Applied(MutationKind),
    Ignored,
    ProtocolError,
    ApplicationError,
    Reseeded,
}

pub async fn run_stream<H: HistorySource>(
    config: StreamConfig,
    history: H,
    store: SharedSeriesStore,
    status_store: Arc<RwLock<StreamStatusSnapshot>>,
    events: broadcast::Sender<StreamEvent>,
    cancel_token: CancellationToken,
) {
    let context = StreamRuntimeContext {
        config: &config,
        history: &history,
        store: &store,
        status_store: &status_store,
        events: &events,
        cancel_token: &cancel_token,
    };

    {
        let mut writable = status_store.write().await;
        *writable = StreamStatusSnapshot::idle(config.symbol.clone(), None);
    }
    publish_status(
        &context,
        ConnectionState::Disconnected,
        Some("stream starting".to_string()),
    )
    .await;

    if config.seed_history {
        tokio::select! {
            _ = cancel_token.cancelled() => {}
            _ = seed_from_history(&context) => {}
        }
    }

    let mut reconnect_attempt = 0_u32;
    let mut after_error = false;
    while !cancel_token.is_cancelled() {
        if after_error {
            store.write().reset_cursor();
        }

        let reason = if after_error {
            Some(format!("reconnect attempt {reconnect_attempt}"))
        } else {
            Some("opening websocket stream".to_string())
        };
        publish_status(&context, ConnectionState::Connecting, reason).await;

        let timeout = Duration::from_millis(config.connect_timeout_ms);
        let connected = tokio::select! {
            _ = cancel_token.cancelled() => break,
            connected = connect_stream(&config.ws_url, timeout) => connected,
        };

        let outcome = match connected {
            Ok(mut socket) => {
                let outcome = run_session(&mut socket, &context).await;
                close_stream(&mut socket).await;
                outcome
            }
            Err(error) => SessionOutcome::Failed {
                reached_streaming: false,
                error,
            },
        };

        let error = match outcome {
            SessionOutcome::Cancelled => break,
            SessionOutcome::Failed {
                reached_streaming,
                error,
            } => {
                if reached_streaming {
                    reconnect_attempt = 0;
                }
                error
            }
        };

        after_error = true;
        warn!(symbol = %config.symbol, %error, "stream transport failed");
        publish_status(
            &context,
            ConnectionState::Error,
            Some(format!("transport error: {error}")),
        )
        .await;

        let Some(policy) = config.reconnect else {
            info!(symbol = %config.symbol, "reconnect disabled, stopping stream");
            context.emit(StreamEvent::Ended {
                state: ConnectionState::Error,
            });
            return;
        };

        reconnect_attempt = reconnect_attempt.saturating_add(1);
        if !policy.allows(reconnect_attempt) {
            error!(
                symbol = %config.symbol,
                attempts = reconnect_attempt - 1,
                "reconnect attempts exhausted"
            );
            publish_status(
                &context,
                ConnectionState::Error,
                Some(format!(
                    "giving up after {} reconnect attempts: {error}",
                    reconnect_attempt - 1
                )),
            )
            .await;
            context.emit(StreamEvent::Ended {
                state: ConnectionState::Error,
            });
            return;
        }

        {
            let mut writable = status_store.write().await;
            writable.reconnect_attempt = reconnect_attempt;
        }
        let delay = policy.delay(reconnect_attempt, now_unix_ms().unsigned_abs());
        debug!(
            attempt = reconnect_attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "scheduling reconnect"
        );
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    publish_status(
        &context,
        ConnectionState::Closed,
        Some("stream stopped".to_string()),
    )
    .await;
    context.emit(StreamEvent::Ended {
        state: ConnectionState::Closed,
    });
}

async fn run_session<H: HistorySource>(
    socket: &mut StreamSocket,
    context: &StreamRuntimeContext<'_, H>,
) -> SessionOutcome {
    publish_status(
        context,
        ConnectionState::Open,
        Some("websocket connected".to_string()),
    )
    .await;

    if let Err(error) = send_subscribe(socket, &context.config.symbol).await {
        return SessionOutcome::Failed {
            reached_streaming: false,
            error,
        };
    }
    publish_status(
        context,
        ConnectionState::Subscribed,
        Some(format!("subscribed to {}", context.config.symbol)),
    )
    .await;

    let mut streaming = false;
    loop {
        let frame = tokio::select! {
            biased;
            _ = context.cancel_token.cancelled() => return SessionOutcome::Cancelled,
            next_message = socket.next() => next_message,
        };
        if context.cancel_token.is_cancelled() {
            return SessionOutcome::Cancelled;
        }

        let Some(frame_result) = frame else {
            return SessionOutcome::Failed {
                reached_streaming: streaming,
                error: AppError::ConnectionClosed("stream ended".to_string()),
            };
        };

        let payload = match frame_result {
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Binary(binary)) => binary,
            Ok(Message::Close(close_frame)) => {
                let reason = close_frame
                    .map(|frame| format!("closed by server ({}): {}", frame.code, frame.reason))
                    .unwrap_or_else(|| "closed by server".to_string());
                return SessionOutcome::Failed {
                    reached_streaming: streaming,
                    error: AppError::ConnectionClosed(reason),
                };
            }
            Ok(_) => continue,
            Err(error) => {
                return SessionOutcome::Failed {
                    reached_streaming: streaming,
                    error: error.into(),
                };
            }
        };

        if !streaming {
            streaming = true;
            publish_status(
                context,
                ConnectionState::Streaming,
                Some("receiving frames".to_string()),
            )
            .await;
        }

        let outcome = handle_payload(payload, context).await;
        record_frame(context, &outcome).await;
    }
}

async fn handle_payload<H: HistorySource>(
    mut payload: Vec<u8>,
    context: &StreamRuntimeContext<'_, H>,
) -> FrameOutcome {
    let envelope = match decode_frame(payload.as_mut_slice()) {
        Ok(envelope) => envelope,
        Err(error) => return report_protocol_error(context, error),
    };

    if !envelope.success {
        let message = envelope
            .error_message
            .unwrap_or_else(|| "server reported failure without a message".to_string());
        let error = AppError::Application(message.clone());
        warn!(symbol = %context.config.symbol, %error, "stream frame reported failure");
        context.emit(StreamEvent::ApplicationError { message });
        return FrameOutcome::ApplicationError;
    }

    if !envelope.is_stream_info() {
        debug!(event = %envelope.event, "ignoring frame for unrelated event");
        return FrameOutcome::Ignored;
    }

    let Some(update) = envelope.result else {
        return report_protocol_error(context, ProtocolError::MissingResult(envelope.event));
    };

    if !update.symbol.eq_ignore_ascii_case(&context.config.symbol) {
        return report_protocol_error(
            context,
            ProtocolError::UnexpectedSymbol {
                expected: context.config.symbol.clone(),
                found: update.symbol,
            },
        );
    }

    let applied = context.store.write().ingest(&update);
    match applied {
        Ok(applied) => {
            trace!(
                kind = ?applied.kind,
                index = applied.index,
                len = applied.len,
                new_candle = update.new_candle,
                "applied candle update"
            );
            context.emit(StreamEvent::SeriesUpdated(applied));
            FrameOutcome::Applied(applied.kind)
        }
        Err(AppError::Protocol(error)) => report_protocol_error(context, error),
        Err(error) => {
            error!(symbol = %context.config.symbol, %error, "series store corrupted, resetting");
            context.emit(StreamEvent::InvariantViolation {
                reason: error.to_string(),
            });
            context.store.write().reset();
            if context.config.seed_history {
                tokio::select! {
                    _ = context.cancel_token.cancelled() => {}
                    _ = seed_from_history(context) => {}
                }
            }
            FrameOutcome::Reseeded
        }
    }
}

fn report_protocol_error<H>(
    context: &StreamRuntimeContext<'_, H>,
    error: ProtocolError,
) -> FrameOutcome {
    warn!(symbol = %context.config.symbol, %error, "dropping malformed frame");
    context.emit(StreamEvent::ProtocolError {
        reason: error.to_string(),
    });
    FrameOutcome::ProtocolError
}

async fn record_frame<H>(context: &StreamRuntimeContext<'_, H>, outcome: &FrameOutcome) {
    let series_len = context.store.read().len();
    let mut writable = context.status_store.write().await;
    writable.frames_received = writable.frames_received.saturating_add(1);
    writable.series_len = series_len;
    match outcome {
        FrameOutcome::Applied(MutationKind::Append) => writable.appends += 1,
        FrameOutcome::Applied(MutationKind::Overwrite) => writable.overwrites += 1,
        FrameOutcome::ProtocolError => writable.protocol_errors += 1,
        FrameOutcome::ApplicationError => writable.application_errors += 1,
        FrameOutcome::Ignored | FrameOutcome::Reseeded => {}
    }
}

async fn seed_from_history<H: HistorySource>(context: &StreamRuntimeContext<'_, H>) {
    let symbol = &context.config.symbol;
    let timeout = Duration::from_millis(context.config.history_timeout_ms);
    let fetched = tokio::time::timeout(timeout, context.history.fetch_history(symbol))
        .await
        .unwrap_or_else(|_| {
            Err(AppError::SeedLoad(format!(
                "history request timed out after {}ms",
                timeout.as_millis()
            )))
        });
    match fetched {
        Ok(candles) => {
            let len = context.store.write().seed(&candles);
            info!(%symbol, fetched = candles.len(), len, "seeded series from history");
            {
                let mut writable = context.status_store.write().await;
                writable.series_len = len;
            }
            context.emit(StreamEvent::Seeded { len });
        }
        Err(error) => {
            let error = match error {
                AppError::SeedLoad(_) => error,
                other => AppError::SeedLoad(other.to_string()),
            };
            warn!(%symbol, %error, "history unavailable, streaming from an empty series");
            context.emit(StreamEvent::SeedLoadFailed {
                reason: error.to_string(),
            });
        }
    }
}

async fn publish_status<H>(
    context: &StreamRuntimeContext<'_, H>,
    state: ConnectionState,
    reason: Option<String>,
) {
    let series_len = context.store.read().len();
    let snapshot = {
        let mut writable = context.status_store.write().await;
        writable.state = state;
        writable.symbol = context.config.symbol.clone();
        writable.series_len = series_len;
        writable.reason = reason;
        writable.clone()
    };

    info!(
        symbol = %snapshot.symbol,
        state = ?snapshot.state,
        reason = snapshot.reason.as_deref().unwrap_or_default(),
        "stream status changed"
    );
    context.emit(StreamEvent::Status(snapshot));
}

fn now_unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}
