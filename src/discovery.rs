//! Flood-fill discovery of populated chunks.
//!
//! Breadth-first search from one or more seeds. Every valid chunk expands the
//! frontier to all coordinates within `SEARCH_RADIUS` steps on both axes;
//! invalid or unreadable coordinates are remembered but never expanded, so
//! clusters separated by a wider gap need their own seed.

use std::collections::{HashMap, VecDeque};

use log::{debug, warn};

use crate::chunk::ChunkRecord;
use crate::coords::ChunkCoordinate;
use crate::provider::WorldProvider;
use crate::timestamps::ModificationTable;

/// Step radius of the flood fill
pub const SEARCH_RADIUS: i32 = 4;

/// Outcome of one discovery run
#[derive(Debug, Default)]
pub struct Discovery {
    /// Valid chunks, in no particular order
    pub records: Vec<ChunkRecord>,
    /// Coordinates examined, valid or not
    pub visited: usize,
    /// Coordinates whose reads failed
    pub read_failures: usize,
}

/// Discover every valid chunk reachable from `seeds`.
pub fn discover_chunks(
    provider: &dyn WorldProvider,
    modifications: &ModificationTable,
    seeds: &[ChunkCoordinate],
) -> Discovery {
    let mut visited: HashMap<ChunkCoordinate, Option<ChunkRecord>> = HashMap::new();
    let mut queue: VecDeque<ChunkCoordinate> = seeds.iter().copied().collect();
    let mut read_failures = 0;

    while let Some(coord) = queue.pop_front() {
        if visited.contains_key(&coord) {
            continue;
        }

        let header = if provider.chunk_exists(coord) {
            match provider.read_header(coord) {
                Ok(header) => header,
                Err(e) => {
                    warn!("failed to read chunk {}: {}", coord, e);
                    read_failures += 1;
                    None
                }
            }
        } else {
            None
        };

        let Some(header) = header else {
            visited.insert(coord, None);
            continue;
        };

        let last_modified = modifications.effective(coord, header.last_modified);
        visited.insert(coord, Some(ChunkRecord { coord, last_modified }));

        for next in coord.neighbors_within(SEARCH_RADIUS) {
            if !visited.contains_key(&next) {
                queue.push_back(next);
            }
        }
    }

    let examined = visited.len();
    let records: Vec<ChunkRecord> = visited.into_values().flatten().collect();
    debug!("discovery examined {} coordinates, found {} chunks", examined, records.len());

    Discovery {
        records,
        visited: examined,
        read_failures,
    }
}
