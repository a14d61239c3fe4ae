mod error;
pub mod market;
pub mod session;
mod state;

pub use error::AppError;
pub use market::classifier::{classify, CursorState, SeriesEntry, SeriesMutation};
pub use market::frame::{decode, decode_frame, subscribe_frame, Envelope, ProtocolError};
pub use market::history::{HistorySource, RestHistorySource};
pub use market::pipeline::{run_stream, StreamEvent};
pub use market::store::{SeriesReader, SeriesSnapshot, SeriesStore};
pub use market::types::{
    Candle, ConnectionState, HistoryCandle, StartStreamArgs, StreamConfig, StreamStatusSnapshot,
    SymbolUpdate, VolumePoint,
};
pub use state::AppState;
