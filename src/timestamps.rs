//! Chunk modification side table.
//!
//! Host-side block edits are reported here instead of being written into the
//! provider's own objects. Discovery merges these times with whatever the
//! provider has persisted, and a provider can read them back when it saves.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use crate::chunk::{BlockSample, Timestamp};
use crate::coords::ChunkCoordinate;

/// Last-modified times recorded from change notifications.
#[derive(Default)]
pub struct ModificationTable {
    times: RwLock<HashMap<ChunkCoordinate, Timestamp>>,
}

impl ModificationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a chunk changed at `at`. Older times never replace newer ones.
    pub fn touch_at(&self, coord: ChunkCoordinate, at: Timestamp) {
        let mut times = self.times.write().unwrap_or_else(|e| e.into_inner());
        let entry = times.entry(coord).or_insert(at);
        if at > *entry {
            *entry = at;
        }
    }

    /// Record that a chunk changed now
    pub fn touch(&self, coord: ChunkCoordinate) {
        self.touch_at(coord, Utc::now());
    }

    /// Record a single block edit. Edits that keep the block's color class
    /// and liquid flag cannot change the map and are ignored.
    ///
    /// Returns whether the chunk was marked modified.
    pub fn block_changed(&self, coord: ChunkCoordinate, before: BlockSample, after: BlockSample) -> bool {
        if before == after {
            return false;
        }
        self.touch(coord);
        true
    }

    pub fn get(&self, coord: ChunkCoordinate) -> Option<Timestamp> {
        self.times.read().unwrap_or_else(|e| e.into_inner()).get(&coord).copied()
    }

    /// Effective modification time given what the provider reported.
    ///
    /// A chunk that never recorded a time counts as modified now. That time
    /// is stored, so later passes see the same value instead of a fresh one.
    pub fn effective(&self, coord: ChunkCoordinate, provider: Option<Timestamp>) -> Timestamp {
        match (provider, self.get(coord)) {
            (Some(p), Some(t)) => p.max(t),
            (Some(p), None) => p,
            (None, Some(t)) => t,
            (None, None) => {
                let mut times = self.times.write().unwrap_or_else(|e| e.into_inner());
                *times.entry(coord).or_insert_with(Utc::now)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.times.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::MapColor;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_property_only_change_ignored() {
        let table = ModificationTable::new();
        let coord = ChunkCoordinate::new(1, 2);
        let stone = BlockSample::solid(MapColor::STONE);

        assert!(!table.block_changed(coord, stone, stone));
        assert!(table.get(coord).is_none());

        assert!(table.block_changed(coord, stone, BlockSample::AIR));
        assert!(table.get(coord).is_some());
    }

    #[test]
    fn test_touch_keeps_newest() {
        let table = ModificationTable::new();
        let coord = ChunkCoordinate::new(0, 0);
        let early = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let late = early + Duration::hours(1);

        table.touch_at(coord, late);
        table.touch_at(coord, early);
        assert_eq!(table.get(coord), Some(late));
    }

    #[test]
    fn test_effective_merges_sources() {
        let table = ModificationTable::new();
        let coord = ChunkCoordinate::new(0, 0);
        let stored = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(table.effective(coord, Some(stored)), stored);

        let edited = stored + Duration::minutes(5);
        table.touch_at(coord, edited);
        assert_eq!(table.effective(coord, Some(stored)), edited);

        let before = Utc::now();
        let fallback = table.effective(ChunkCoordinate::new(7, 7), None);
        assert!(fallback >= before);
    }

    #[test]
    fn test_fallback_time_is_kept() {
        let table = ModificationTable::new();
        let coord = ChunkCoordinate::new(-4, 9);

        let first = table.effective(coord, None);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(table.effective(coord, None), first);
        assert_eq!(table.get(coord), Some(first));

        // A real edit still moves it forward
        let edited = first + Duration::seconds(1);
        table.touch_at(coord, edited);
        assert_eq!(table.effective(coord, None), edited);
    }
}
