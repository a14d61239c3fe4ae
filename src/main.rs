use candle_stream_lib::market::types::SeedCursor;
use candle_stream_lib::session::{health, start_stream, stop_stream, stream_status};
use candle_stream_lib::{AppError, AppState, StartStreamArgs, StreamEvent};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Streams OHLCV candles for one symbol and keeps an aligned in-memory series.
#[derive(Debug, Parser)]
#[command(name = "candle-stream", version, about)]
struct Cli {
    /// Ticker to subscribe to.
    #[arg(long, env = "CANDLE_STREAM_SYMBOL")]
    symbol: Option<String>,

    /// WebSocket endpoint of the market data server.
    #[arg(long, env = "CANDLE_STREAM_WS_URL")]
    ws_url: Option<String>,

    /// Base URL of the price-history REST API.
    #[arg(long, env = "CANDLE_STREAM_HISTORY_URL")]
    history_url: Option<String>,

    /// Keep only the newest N buckets.
    #[arg(long, env = "CANDLE_STREAM_RETENTION")]
    retention: Option<usize>,

    /// Skip the history seed and start from an empty series.
    #[arg(long)]
    no_history: bool,

    /// Let the first streaming update complete the last historical bucket.
    #[arg(long)]
    resume_last: bool,

    /// Stop on the first transport failure instead of reconnecting.
    #[arg(long)]
    no_reconnect: bool,

    /// Reconnect attempts before giving up (0 retries forever).
    #[arg(long, env = "CANDLE_STREAM_MAX_RECONNECT_ATTEMPTS")]
    max_reconnect_attempts: Option<u32>,

    /// Print every event as a JSON line on stdout.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn stream_args(&self) -> StartStreamArgs {
        StartStreamArgs {
            symbol: self.symbol.clone(),
            ws_url: self.ws_url.clone(),
            history_base_url: self.history_url.clone(),
            seed_history: Some(!self.no_history),
            seed_cursor: self.resume_last.then_some(SeedCursor::ResumeLast),
            retention: self.retention,
            reconnect: Some(!self.no_reconnect),
            max_reconnect_attempts: self.max_reconnect_attempts,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        tracing::error!(%error, "candle-stream failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let state = AppState::new();
    let mut events = state.subscribe();

    let session = start_stream(&state, Some(cli.stream_args())).await?;
    tracing::info!(
        symbol = %session.symbol,
        seed_history = session.seed_history,
        reconnect = session.reconnect,
        "session configured"
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, shutting down");
                break;
            }
            received = events.recv() => match received {
                Ok(event) => {
                    let finished = is_terminal(&event);
                    report(&event, cli.json);
                    if finished {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event consumer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    let stopped = stop_stream(&state).await;
    let status = stream_status(&state).await;
    let summary = health(&state).await;
    tracing::info!(
        stopped = stopped.stopped,
        frames = status.frames_received,
        appends = status.appends,
        overwrites = status.overwrites,
        protocol_errors = status.protocol_errors,
        application_errors = status.application_errors,
        series_len = summary.series_len,
        uptime_ms = summary.uptime_ms as u64,
        "stream closed"
    );

    Ok(())
}

fn is_terminal(event: &StreamEvent) -> bool {
    matches!(event, StreamEvent::Ended { .. })
}

fn report(event: &StreamEvent, json: bool) {
    if json {
        match simd_json::serde::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(error) => tracing::warn!(%error, "failed to encode event"),
        }
        return;
    }

    match event {
        StreamEvent::Status(status) => tracing::info!(
            state = ?status.state,
            attempt = status.reconnect_attempt,
            reason = status.reason.as_deref().unwrap_or(""),
            "stream status"
        ),
        StreamEvent::Seeded { len } => tracing::info!(len, "series seeded from history"),
        StreamEvent::SeedLoadFailed { reason } => {
            tracing::warn!(%reason, "history unavailable, streaming from empty series")
        }
        StreamEvent::SeriesUpdated(applied) => tracing::debug!(
            kind = ?applied.kind,
            index = applied.index,
            len = applied.len,
            revision = applied.revision,
            "series updated"
        ),
        StreamEvent::ProtocolError { reason } => tracing::warn!(%reason, "frame dropped"),
        StreamEvent::ApplicationError { message } => {
            tracing::warn!(%message, "server reported failure")
        }
        StreamEvent::InvariantViolation { reason } => {
            tracing::error!(%reason, "series alignment broken")
        }
        StreamEvent::Ended { state } => tracing::info!(state = ?state, "stream ended"),
    }
}
