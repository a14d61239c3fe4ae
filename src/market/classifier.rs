use crate::market::types::{Candle, SymbolUpdate, VolumePoint};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CursorState {
    #[default]
    New,
    Continue,
}

/// One aligned row across the price, ask-volume and bid-volume series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeriesEntry {
    pub candle: Candle,
    pub ask: VolumePoint,
    pub bid: VolumePoint,
}

impl SeriesEntry {
    pub fn new(candle: Candle, ask_volume: f64, bid_volume: f64) -> Self {
        Self {
            candle,
            ask: VolumePoint {
                recorded_at: candle.recorded_at,
                volume: ask_volume,
            },
            bid: VolumePoint {
                recorded_at: candle.recorded_at,
                volume: bid_volume,
            },
        }
    }
}

impl From<&SymbolUpdate> for SeriesEntry {
    fn from(update: &SymbolUpdate) -> Self {
        Self::new(update.candle, update.ask_volume, update.bid_volume)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeriesMutation {
    Append(SeriesEntry),
    OverwriteLast(SeriesEntry),
}

impl SeriesMutation {
    pub fn entry(&self) -> &SeriesEntry {
        match self {
            Self::Append(entry) | Self::OverwriteLast(entry) => entry,
        }
    }
}

/// Decides where `update` lands and what the cursor becomes afterwards.
///
/// Placement depends only on the current cursor; the update's `new_candle`
/// flag only selects the next cursor.
pub fn classify(state: CursorState, update: &SymbolUpdate) -> (CursorState, SeriesMutation) {
    let entry = SeriesEntry::from(update);
    let mutation = match state {
        CursorState::New => SeriesMutation::Append(entry),
        CursorState::Continue => SeriesMutation::OverwriteLast(entry),
    };
    let next = if update.new_candle {
        CursorState::New
    } else {
        CursorState::Continue
    };
    (next, mutation)
}
