//! Track and slice bookkeeping on top of [`TraceStorage`].

use std::collections::HashMap;

use crate::storage::{SliceId, SliceRow, Stat, StringId, TraceStorage, TrackId};

/// Creates tracks and remembers the global ones by name.
#[derive(Debug, Default)]
pub struct TrackTracker {
    global_tracks: HashMap<StringId, TrackId>,
}

impl TrackTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the global track called `name`, creating it the first time it is asked for.
    pub fn intern_global_track(&mut self, storage: &mut TraceStorage, name: StringId) -> TrackId {
        *self
            .global_tracks
            .entry(name)
            .or_insert_with(|| storage.insert_track(name))
    }
}

/// Creates slices, enforcing that slices on a track arrive in timestamp order.
#[derive(Debug, Default)]
pub struct SliceTracker {
    last_start: HashMap<TrackId, i64>,
}

impl SliceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a complete slice of duration `dur` starting at `ts`.
    ///
    /// Returns `None` if the slice starts before the previous slice on the same
    /// track; the sorter should have prevented that so it is counted as an error.
    pub fn scoped(
        &mut self,
        storage: &mut TraceStorage,
        ts: i64,
        track: TrackId,
        category: StringId,
        name: StringId,
        dur: i64,
    ) -> Option<SliceId> {
        if let Some(last) = self.last_start.get(&track) {
            if ts < *last {
                storage.increment_stats(Stat::SliceOutOfOrder);
                return None;
            }
        }
        self.last_start.insert(track, ts);

        Some(storage.insert_slice(SliceRow {
            id: SliceId(0),
            ts,
            dur,
            track,
            category,
            name,
            depth: 0,
        }))
    }
}
