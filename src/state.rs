use crate::market::pipeline::StreamEvent;
use crate::market::store::{SeriesReader, SeriesStore, SharedSeriesStore};
use crate::market::types::{StreamStatusSnapshot, DEFAULT_SEED_CURSOR, DEFAULT_SYMBOL};
use crate::market::EVENT_CHANNEL_CAPACITY;
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct StreamHandle {
    pub cancellation_token: CancellationToken,
    pub join_handle: JoinHandle<()>,
}

pub struct AppState {
    pub started_at: Instant,
    pub http_client: Client,
    pub stream: Mutex<Option<StreamHandle>>,
    pub stream_status: Arc<RwLock<StreamStatusSnapshot>>,
    pub series: SharedSeriesStore,
    pub events: broadcast::Sender<StreamEvent>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        let stream_status = StreamStatusSnapshot::idle(
            DEFAULT_SYMBOL.to_string(),
            Some("stream idle".to_string()),
        );
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            started_at: Instant::now(),
            http_client: Client::new(),
            stream: Mutex::new(None),
            stream_status: Arc::new(RwLock::new(stream_status)),
            series: SeriesStore::shared(None, DEFAULT_SEED_CURSOR),
            events,
        }
    }

    pub fn series_reader(&self) -> SeriesReader {
        SeriesReader::new(Arc::clone(&self.series))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }
}
