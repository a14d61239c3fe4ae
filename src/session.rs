use crate::error::AppError;
use crate::market::history::RestHistorySource;
use crate::market::pipeline::run_stream;
use crate::market::store::SeriesSnapshot;
use crate::market::types::{
    ConnectionState, StartStreamArgs, StreamSession, StreamStatusSnapshot, StreamStopResult,
};
use crate::state::{AppState, StreamHandle};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

async fn shutdown_handle(handle: Option<StreamHandle>) -> bool {
    let Some(handle) = handle else {
        return false;
    };

    handle.cancellation_token.cancel();
    if let Err(error) = handle.join_handle.await {
        warn!(%error, "stream task ended abnormally");
    }
    true
}

/// Starts streaming `args.symbol`, replacing any stream already running.
///
/// The stream slot stays locked from teardown of the previous task until the
/// new handle is installed, so concurrent callers are serialized and every
/// spawned task remains cancellable.
pub async fn start_stream(
    state: &AppState,
    args: Option<StartStreamArgs>,
) -> Result<StreamSession, AppError> {
    let config = args.unwrap_or_default().normalize()?;

    let mut stream_slot = state.stream.lock().await;
    shutdown_handle(stream_slot.take()).await;
    state
        .series
        .write()
        .reconfigure(config.retention, config.seed_cursor);

    let cancellation_token = CancellationToken::new();
    let history = RestHistorySource::new(state.http_client.clone(), config.history_base_url.clone());
    let join_handle = tokio::spawn(run_stream(
        config.clone(),
        history,
        Arc::clone(&state.series),
        Arc::clone(&state.stream_status),
        state.events.clone(),
        cancellation_token.clone(),
    ));
    *stream_slot = Some(StreamHandle {
        cancellation_token,
        join_handle,
    });
    drop(stream_slot);

    info!(symbol = %config.symbol, url = %config.ws_url, "market stream started");
    Ok(StreamSession::from_config(&config))
}

pub async fn stop_stream(state: &AppState) -> StreamStopResult {
    let stopped = {
        let mut stream_slot = state.stream.lock().await;
        shutdown_handle(stream_slot.take()).await
    };

    let mut writable = state.stream_status.write().await;
    writable.state = ConnectionState::Closed;
    writable.reason = Some("stream stopped by command".to_string());

    StreamStopResult { stopped }
}

pub async fn stream_status(state: &AppState) -> StreamStatusSnapshot {
    state.stream_status.read().await.clone()
}

pub fn series_snapshot(state: &AppState) -> SeriesSnapshot {
    state.series.read().snapshot()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: u128,
    pub stream: ConnectionState,
    pub series_len: usize,
    pub revision: u64,
}

pub async fn health(state: &AppState) -> HealthResponse {
    let stream = state.stream_status.read().await.state;
    let (series_len, revision) = {
        let series = state.series.read();
        (series.len(), series.revision())
    };

    HealthResponse {
        status: if stream == ConnectionState::Error { "degraded" } else { "ok" },
        uptime_ms: state.started_at.elapsed().as_millis(),
        stream,
        series_len,
        revision,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_args(symbol: &str) -> StartStreamArgs {
        StartStreamArgs {
            symbol: Some(symbol.to_string()),
            // port 9 (discard) is closed on test hosts, so connects fail fast
            ws_url: Some("ws://127.0.0.1:9/ws".to_string()),
            seed_history: Some(false),
            reconnect_base_delay_ms: Some(50),
            reconnect_jitter_ms: Some(0),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn rejects_invalid_args_without_touching_state() {
        let state = AppState::new();
        let result = start_stream(
            &state,
            Some(StartStreamArgs {
                symbol: Some("not a symbol".to_string()),
                ..Default::default()
            }),
        )
        .await;

        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
        assert!(state.stream.lock().await.is_none());
    }

    #[tokio::test]
    async fn symbol_change_replaces_running_stream() {
        let state = AppState::new();

        let first = start_stream(&state, Some(unreachable_args("AAPL")))
            .await
            .expect("first stream should start");
        assert_eq!(first.symbol, "AAPL");

        let second = start_stream(&state, Some(unreachable_args("msft")))
            .await
            .expect("second stream should start");
        assert_eq!(second.symbol, "MSFT");
        assert!(second.running);

        let stopped = stop_stream(&state).await;
        assert!(stopped.stopped);
        assert_eq!(stream_status(&state).await.state, ConnectionState::Closed);

        let stopped_again = stop_stream(&state).await;
        assert!(!stopped_again.stopped);
    }

    #[tokio::test]
    async fn concurrent_starts_leave_a_single_cancellable_stream() {
        let state = AppState::new();
        start_stream(&state, Some(unreachable_args("IBM")))
            .await
            .expect("initial stream should start");

        let (first, second) = tokio::join!(
            start_stream(&state, Some(unreachable_args("AAPL"))),
            start_stream(&state, Some(unreachable_args("MSFT"))),
        );
        first.expect("first concurrent start should succeed");
        second.expect("second concurrent start should succeed");

        let mut events = state.subscribe();
        assert!(stop_stream(&state).await.stopped);
        while events.try_recv().is_ok() {}

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert!(
            events.try_recv().is_err(),
            "no stream task may outlive stop_stream"
        );
    }

    #[tokio::test]
    async fn health_reports_idle_stream_and_empty_series() {
        let state = AppState::new();

        let response = health(&state).await;

        assert_eq!(response.status, "ok");
        assert_eq!(response.stream, ConnectionState::Disconnected);
        assert_eq!(response.series_len, 0);
        assert!(response.uptime_ms <= 1_000);
    }

    #[tokio::test]
    async fn start_clears_previous_series() {
        let state = AppState::new();
        state.series.write().seed(&[crate::market::types::HistoryCandle {
            candle: crate::market::types::Candle {
                recorded_at: 0,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
            },
            ask_volume: 0.0,
            bid_volume: 0.0,
        }]);
        assert_eq!(series_snapshot(&state).len(), 1);

        let reader = state.series_reader();
        start_stream(&state, Some(unreachable_args("AAPL")))
            .await
            .expect("stream should start");

        assert!(series_snapshot(&state).is_empty());
        assert!(reader.is_empty());
        stop_stream(&state).await;
    }
}
