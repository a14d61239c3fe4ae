use crate::error::AppError;
use crate::market::classifier::{classify, CursorState, SeriesEntry, SeriesMutation};
use crate::market::frame::ProtocolError;
use crate::market::types::{Candle, HistoryCandle, SeedCursor, SymbolUpdate, VolumePoint};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Arc;

pub type SharedSeriesStore = Arc<RwLock<SeriesStore>>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Append,
    Overwrite,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppliedMutation {
    pub kind: MutationKind,
    /// Position of the touched entry after retention ran.
    pub index: usize,
    pub len: usize,
    pub evicted: usize,
    pub revision: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSnapshot {
    pub prices: Vec<Candle>,
    pub ask_volume: Vec<VolumePoint>,
    pub bid_volume: Vec<VolumePoint>,
    pub cursor: CursorState,
    pub revision: u64,
}

impl SeriesSnapshot {
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// Owner of the aligned price and volume series.
///
/// The three sequences only change together, through `seed`, `apply` or
/// `reset`, so their lengths always match. `recorded_at` never decreases
/// along the price series.
#[derive(Debug)]
pub struct SeriesStore {
    prices: VecDeque<Candle>,
    asks: VecDeque<VolumePoint>,
    bids: VecDeque<VolumePoint>,
    cursor: CursorState,
    capacity: Option<NonZeroUsize>,
    seed_cursor: SeedCursor,
    revision: u64,
}

impl Default for SeriesStore {
    fn default() -> Self {
        Self::new(None, SeedCursor::FreshBucket)
    }
}

impl SeriesStore {
    pub fn new(capacity: Option<NonZeroUsize>, seed_cursor: SeedCursor) -> Self {
        Self {
            prices: VecDeque::new(),
            asks: VecDeque::new(),
            bids: VecDeque::new(),
            cursor: CursorState::New,
            capacity,
            seed_cursor,
            revision: 0,
        }
    }

    pub fn shared(capacity: Option<NonZeroUsize>, seed_cursor: SeedCursor) -> SharedSeriesStore {
        Arc::new(RwLock::new(Self::new(capacity, seed_cursor)))
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn cursor(&self) -> CursorState {
        self.cursor
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replaces every series with `candles`, keeping the newest entries when
    /// retention is bounded.
    pub fn seed(&mut self, candles: &[HistoryCandle]) -> usize {
        let skip = self
            .capacity
            .map(|capacity| candles.len().saturating_sub(capacity.get()))
            .unwrap_or(0);

        self.prices.clear();
        self.asks.clear();
        self.bids.clear();
        for history in &candles[skip..] {
            let entry = SeriesEntry::new(history.candle, history.ask_volume, history.bid_volume);
            self.prices.push_back(entry.candle);
            self.asks.push_back(entry.ask);
            self.bids.push_back(entry.bid);
        }

        self.cursor = match self.seed_cursor {
            SeedCursor::ResumeLast if !self.prices.is_empty() => CursorState::Continue,
            _ => CursorState::New,
        };
        self.revision = self.revision.wrapping_add(1);
        self.prices.len()
    }

    pub fn apply(&mut self, mutation: SeriesMutation) -> Result<AppliedMutation, AppError> {
        self.check_aligned()?;

        let (kind, entry) = match mutation {
            SeriesMutation::OverwriteLast(entry) if self.prices.is_empty() => {
                tracing::warn!("overwrite requested on an empty series, appending instead");
                (MutationKind::Append, entry)
            }
            SeriesMutation::Append(entry) => (MutationKind::Append, entry),
            SeriesMutation::OverwriteLast(entry) => (MutationKind::Overwrite, entry),
        };

        self.check_ordered(kind, entry.candle.recorded_at)?;

        let mut evicted = 0;
        match kind {
            MutationKind::Append => {
                self.prices.push_back(entry.candle);
                self.asks.push_back(entry.ask);
                self.bids.push_back(entry.bid);
                evicted = self.enforce_retention();
            }
            MutationKind::Overwrite => {
                let index = self.prices.len() - 1;
                self.prices[index] = entry.candle;
                self.asks[index] = entry.ask;
                self.bids[index] = entry.bid;
            }
        }

        self.revision = self.revision.wrapping_add(1);
        let len = self.prices.len();
        Ok(AppliedMutation {
            kind,
            index: len - 1,
            len,
            evicted,
            revision: self.revision,
        })
    }

    /// Classifies `update` against the current cursor and applies the result.
    ///
    /// The cursor only advances when the mutation was applied.
    pub fn ingest(&mut self, update: &SymbolUpdate) -> Result<AppliedMutation, AppError> {
        let (next, mutation) = classify(self.cursor, update);
        let applied = self.apply(mutation)?;
        self.cursor = next;
        Ok(applied)
    }

    /// Clears everything and adopts a new retention and seed policy.
    pub fn reconfigure(&mut self, capacity: Option<NonZeroUsize>, seed_cursor: SeedCursor) {
        self.capacity = capacity;
        self.seed_cursor = seed_cursor;
        self.reset();
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = CursorState::New;
    }

    pub fn reset(&mut self) {
        self.prices.clear();
        self.asks.clear();
        self.bids.clear();
        self.cursor = CursorState::New;
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn snapshot(&self) -> SeriesSnapshot {
        SeriesSnapshot {
            prices: self.prices.iter().copied().collect(),
            ask_volume: self.asks.iter().copied().collect(),
            bid_volume: self.bids.iter().copied().collect(),
            cursor: self.cursor,
            revision: self.revision,
        }
    }

    fn check_aligned(&self) -> Result<(), AppError> {
        let (prices, asks, bids) = (self.prices.len(), self.asks.len(), self.bids.len());
        if prices != asks || prices != bids {
            return Err(AppError::InvariantViolation { prices, asks, bids });
        }
        Ok(())
    }

    /// Rejects an entry that would precede its predecessor in the price series.
    fn check_ordered(&self, kind: MutationKind, recorded_at: i64) -> Result<(), AppError> {
        let predecessor = match kind {
            MutationKind::Append => self.prices.back(),
            MutationKind::Overwrite => self.prices.iter().rev().nth(1),
        };
        match predecessor {
            Some(last) if recorded_at < last.recorded_at => Err(ProtocolError::OutOfOrder {
                last: last.recorded_at,
                found: recorded_at,
            }
            .into()),
            _ => Ok(()),
        }
    }

    fn enforce_retention(&mut self) -> usize {
        let Some(capacity) = self.capacity else {
            return 0;
        };

        let mut evicted = 0;
        while self.prices.len() > capacity.get() {
            self.prices.pop_front();
            self.asks.pop_front();
            self.bids.pop_front();
            evicted += 1;
        }
        evicted
    }
}

/// Read-only view handed to consumers of the series.
#[derive(Debug, Clone)]
pub struct SeriesReader {
    store: SharedSeriesStore,
}

impl SeriesReader {
    pub fn new(store: SharedSeriesStore) -> Self {
        Self { store }
    }

    pub fn snapshot(&self) -> SeriesSnapshot {
        self.store.read().snapshot()
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.store.read().revision()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_update(recorded_at: i64, close: f64, new_candle: bool) -> SymbolUpdate {
        SymbolUpdate {
            symbol: "AAPL".to_string(),
            price: close,
            ask_volume: close * 2.0,
            bid_volume: close * 3.0,
            best_bid: close - 0.5,
            best_ask: close + 0.5,
            candle: Candle {
                recorded_at,
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1.0,
            },
            new_candle,
        }
    }

    fn sample_history(count: usize) -> Vec<HistoryCandle> {
        (0..count)
            .map(|index| HistoryCandle {
                candle: Candle {
                    recorded_at: index as i64 * 60_000,
                    open: 10.0,
                    high: 11.0,
                    low: 9.0,
                    close: 10.0 + index as f64,
                    volume: 100.0,
                },
                ask_volume: 4.0,
                bid_volume: 6.0,
            })
            .collect()
    }

    fn assert_aligned(store: &SeriesStore) {
        assert_eq!(store.prices.len(), store.asks.len());
        assert_eq!(store.prices.len(), store.bids.len());
    }

    #[test]
    fn classifier_trace_matches_expected_layout() {
        let mut store = SeriesStore::default();
        let flags = [true, false, false, true, true];
        let mut lengths = Vec::new();
        let mut cursors = Vec::new();

        for (step, flag) in flags.iter().enumerate() {
            let update = sample_update(step as i64, 100.0 + step as f64, *flag);
            store.ingest(&update).expect("ingest should succeed");
            assert_aligned(&store);
            lengths.push(store.len());
            cursors.push(store.cursor());
        }

        assert_eq!(lengths, vec![1, 2, 2, 2, 3]);
        assert_eq!(
            cursors,
            vec![
                CursorState::New,
                CursorState::Continue,
                CursorState::Continue,
                CursorState::New,
                CursorState::New,
            ]
        );

        let snapshot = store.snapshot();
        // index 1 holds u4, not u3
        assert_eq!(snapshot.prices[1].close, 103.0);
        assert_eq!(snapshot.ask_volume[1].volume, 206.0);
        assert_eq!(snapshot.bid_volume[1].volume, 309.0);
        assert_eq!(snapshot.prices[2].close, 104.0);
    }

    #[test]
    fn lengths_stay_aligned_for_mixed_sequences() {
        let mut store = SeriesStore::new(NonZeroUsize::new(7), SeedCursor::FreshBucket);
        store.seed(&sample_history(3));

        for step in 0..200_i64 {
            let flag = step % 3 == 0 || step % 7 == 0;
            store
                .ingest(&sample_update(180_000 + step, step as f64, flag))
                .expect("ingest should succeed");
            assert_aligned(&store);
            assert!(store.len() <= 7);
        }
    }

    #[test]
    fn retention_evicts_oldest_from_every_series() {
        let mut store = SeriesStore::new(NonZeroUsize::new(50), SeedCursor::FreshBucket);

        let mut last = None;
        for step in 0..51_i64 {
            last = Some(
                store
                    .ingest(&sample_update(step, step as f64, true))
                    .expect("append should succeed"),
            );
        }

        let applied = last.expect("at least one mutation");
        assert_eq!(applied.kind, MutationKind::Append);
        assert_eq!(applied.evicted, 1);
        assert_eq!(applied.len, 50);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.prices.len(), 50);
        assert_eq!(snapshot.ask_volume.len(), 50);
        assert_eq!(snapshot.bid_volume.len(), 50);
        assert_eq!(snapshot.prices[0].recorded_at, 1);
        assert_eq!(snapshot.ask_volume[0].recorded_at, 1);
        assert_eq!(snapshot.bid_volume[0].recorded_at, 1);
        assert_eq!(snapshot.prices[49].recorded_at, 50);
    }

    #[test]
    fn overwrite_never_evicts() {
        let mut store = SeriesStore::new(NonZeroUsize::new(2), SeedCursor::FreshBucket);
        store.ingest(&sample_update(0, 1.0, true)).expect("append");
        store.ingest(&sample_update(1, 2.0, false)).expect("append");
        let applied = store.ingest(&sample_update(1, 3.0, false)).expect("overwrite");

        assert_eq!(applied.kind, MutationKind::Overwrite);
        assert_eq!(applied.evicted, 0);
        assert_eq!(store.snapshot().prices[0].close, 1.0);
    }

    #[test]
    fn seed_then_stream_appends_with_fresh_bucket_cursor() {
        let mut store = SeriesStore::new(None, SeedCursor::FreshBucket);
        store.seed(&sample_history(3));
        assert_eq!(store.cursor(), CursorState::New);

        let applied = store
            .ingest(&sample_update(180_000, 50.0, false))
            .expect("ingest should succeed");

        assert_eq!(applied.kind, MutationKind::Append);
        assert_eq!(store.len(), 4);
        assert_eq!(store.snapshot().prices[2].close, 12.0);
    }

    #[test]
    fn seed_then_stream_overwrites_last_with_resume_cursor() {
        let mut store = SeriesStore::new(None, SeedCursor::ResumeLast);
        store.seed(&sample_history(3));
        assert_eq!(store.cursor(), CursorState::Continue);

        let applied = store
            .ingest(&sample_update(120_000, 50.0, false))
            .expect("ingest should succeed");

        assert_eq!(applied.kind, MutationKind::Overwrite);
        assert_eq!(applied.index, 2);
        assert_eq!(store.len(), 3);
        assert_eq!(store.snapshot().prices[2].close, 50.0);
    }

    #[test]
    fn resume_cursor_on_empty_seed_starts_fresh() {
        let mut store = SeriesStore::new(None, SeedCursor::ResumeLast);
        store.seed(&[]);
        assert_eq!(store.cursor(), CursorState::New);
    }

    #[test]
    fn seed_keeps_newest_entries_under_retention() {
        let mut store = SeriesStore::new(NonZeroUsize::new(2), SeedCursor::FreshBucket);
        assert_eq!(store.seed(&sample_history(5)), 2);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.prices[0].recorded_at, 180_000);
        assert_eq!(snapshot.prices[1].recorded_at, 240_000);
    }

    #[test]
    fn overwrite_on_empty_store_appends() {
        let mut store = SeriesStore::default();
        let entry = SeriesEntry::from(&sample_update(0, 1.0, false));

        let applied = store
            .apply(SeriesMutation::OverwriteLast(entry))
            .expect("apply should succeed");

        assert_eq!(applied.kind, MutationKind::Append);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn diverged_lengths_raise_invariant_violation_without_mutation() {
        let mut store = SeriesStore::default();
        store.ingest(&sample_update(0, 1.0, true)).expect("append");
        store.asks.pop_back();
        let revision = store.revision();

        let result = store.ingest(&sample_update(1, 2.0, false));

        assert!(matches!(
            result,
            Err(AppError::InvariantViolation {
                prices: 1,
                asks: 0,
                bids: 1
            })
        ));
        assert_eq!(store.prices.len(), 1);
        assert_eq!(store.cursor(), CursorState::New);
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn reset_clears_series_and_cursor() {
        let mut store = SeriesStore::default();
        store.ingest(&sample_update(0, 1.0, false)).expect("append");
        assert_eq!(store.cursor(), CursorState::Continue);

        store.reset();

        assert!(store.is_empty());
        assert_eq!(store.cursor(), CursorState::New);
    }

    #[test]
    fn reconfigure_applies_new_capacity_and_bumps_revision() {
        let mut store = SeriesStore::default();
        for step in 0..5_i64 {
            store
                .ingest(&sample_update(step, step as f64, true))
                .expect("append");
        }
        let revision = store.revision();

        store.reconfigure(NonZeroUsize::new(2), SeedCursor::ResumeLast);
        assert!(store.is_empty());
        assert!(store.revision() > revision);

        for step in 0..3_i64 {
            store
                .ingest(&sample_update(step, step as f64, true))
                .expect("append");
        }
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn rejects_append_older_than_tail_without_side_effects() {
        let mut store = SeriesStore::default();
        store
            .ingest(&sample_update(120_000, 1.0, true))
            .expect("append");
        let revision = store.revision();

        let result = store.ingest(&sample_update(60_000, 2.0, true));

        assert!(matches!(
            result,
            Err(AppError::Protocol(ProtocolError::OutOfOrder {
                last: 120_000,
                found: 60_000
            }))
        ));
        assert_eq!(store.len(), 1);
        assert_eq!(store.cursor(), CursorState::New);
        assert_eq!(store.revision(), revision);

        store
            .ingest(&sample_update(180_000, 3.0, true))
            .expect("later bucket appends");
        let recorded: Vec<i64> = store
            .snapshot()
            .prices
            .iter()
            .map(|candle| candle.recorded_at)
            .collect();
        assert_eq!(recorded, vec![120_000, 180_000]);
    }

    #[test]
    fn equal_timestamps_are_accepted() {
        let mut store = SeriesStore::default();
        store.ingest(&sample_update(60_000, 1.0, true)).expect("append");
        store
            .ingest(&sample_update(60_000, 2.0, true))
            .expect("equal timestamp appends");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn overwrite_cannot_move_tail_before_predecessor() {
        let mut store = SeriesStore::default();
        store.ingest(&sample_update(60_000, 1.0, true)).expect("append");
        store.ingest(&sample_update(120_000, 2.0, false)).expect("append");

        let result = store.ingest(&sample_update(0, 3.0, false));

        assert!(matches!(
            result,
            Err(AppError::Protocol(ProtocolError::OutOfOrder { .. }))
        ));
        assert_eq!(store.snapshot().prices[1].close, 2.0);
        assert_eq!(store.cursor(), CursorState::Continue);
    }

    #[test]
    fn snapshot_is_detached_from_store() {
        let shared = SeriesStore::shared(None, SeedCursor::FreshBucket);
        let reader = SeriesReader::new(Arc::clone(&shared));
        shared
            .write()
            .ingest(&sample_update(0, 1.0, true))
            .expect("append");

        let before = reader.snapshot();
        shared
            .write()
            .ingest(&sample_update(1, 2.0, true))
            .expect("append");

        assert_eq!(before.len(), 1);
        assert_eq!(reader.len(), 2);
        assert!(reader.revision() > before.revision);
    }
}
