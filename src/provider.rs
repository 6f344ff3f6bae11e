//! World data provider boundary.
//!
//! The core never touches a storage engine directly: it asks a
//! `WorldProvider` whether a chunk exists and reads its payload. Providers
//! must be shareable across pool workers. State that only lives on the
//! host's own thread (such as the spawn point) goes through `LiveWorld`
//! and the `host` request channel instead.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::chunk::{ChunkPayload, Timestamp};
use crate::coords::{BlockPos, ChunkCoordinate};

/// Cheap per-chunk metadata used by discovery
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkHeader {
    pub last_modified: Option<Timestamp>,
}

/// Durable chunk storage, readable from any thread.
pub trait WorldProvider: Send + Sync {
    /// Whether anything is stored for this coordinate
    fn chunk_exists(&self, coord: ChunkCoordinate) -> bool;

    /// Read a fully generated chunk.
    ///
    /// `Ok(None)` means the coordinate holds no valid, fully generated chunk.
    fn read_chunk(&self, coord: ChunkCoordinate) -> Result<Option<ChunkPayload>, ProviderError>;

    /// Metadata of a fully generated chunk. Providers able to read it without
    /// decoding block data should override this.
    fn read_header(&self, coord: ChunkCoordinate) -> Result<Option<ChunkHeader>, ProviderError> {
        Ok(self.read_chunk(coord)?.map(|chunk| ChunkHeader {
            last_modified: chunk.last_modified,
        }))
    }
}

/// Live host state that may only be touched on the host's owner thread.
pub trait LiveWorld {
    /// Default discovery seed when none are configured
    fn spawn_point(&self) -> BlockPos;
}

/// Errors a provider can report for one coordinate.
#[derive(Debug)]
pub enum ProviderError {
    /// IO error reading the backing store
    Io(std::io::Error),
    /// Stored data could not be decoded
    Corrupt(String),
    /// Storage temporarily unreachable
    Unavailable(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Io(e) => write!(f, "IO error: {}", e),
            ProviderError::Corrupt(e) => write!(f, "corrupt chunk data: {}", e),
            ProviderError::Unavailable(e) => write!(f, "storage unavailable: {}", e),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<std::io::Error> for ProviderError {
    fn from(e: std::io::Error) -> Self {
        ProviderError::Io(e)
    }
}

#[derive(Default)]
struct MemoryState {
    chunks: HashMap<ChunkCoordinate, ChunkPayload>,
    /// Chunks that exist but never finished generating
    partial: HashSet<ChunkCoordinate>,
    /// Chunks whose reads fail
    broken: HashSet<ChunkCoordinate>,
}

/// In-memory world used by the demo binary and tests.
pub struct MemoryWorld {
    state: RwLock<MemoryState>,
    spawn: BlockPos,
}

impl MemoryWorld {
    pub fn new(spawn: BlockPos) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            spawn,
        }
    }

    /// Store a fully generated chunk, replacing any previous one
    pub fn insert(&self, chunk: ChunkPayload) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.partial.remove(&chunk.coord);
        state.chunks.insert(chunk.coord, chunk);
    }

    /// Mark a coordinate as present but not fully generated
    pub fn insert_partial(&self, coord: ChunkCoordinate) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.chunks.remove(&coord);
        state.partial.insert(coord);
    }

    /// Make every read of this coordinate fail
    pub fn break_chunk(&self, coord: ChunkCoordinate) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.broken.insert(coord);
    }

    /// Edit a stored chunk in place; returns false if it is not stored
    pub fn modify<F: FnOnce(&mut ChunkPayload)>(&self, coord: ChunkCoordinate, f: F) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        match state.chunks.get_mut(&coord) {
            Some(chunk) => {
                f(chunk);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap_or_else(|e| e.into_inner()).chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WorldProvider for MemoryWorld {
    fn chunk_exists(&self, coord: ChunkCoordinate) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.chunks.contains_key(&coord) || state.partial.contains(&coord) || state.broken.contains(&coord)
    }

    fn read_chunk(&self, coord: ChunkCoordinate) -> Result<Option<ChunkPayload>, ProviderError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        if state.broken.contains(&coord) {
            return Err(ProviderError::Corrupt(format!("chunk {} is unreadable", coord)));
        }
        Ok(state.chunks.get(&coord).cloned())
    }

    fn read_header(&self, coord: ChunkCoordinate) -> Result<Option<ChunkHeader>, ProviderError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        if state.broken.contains(&coord) {
            return Err(ProviderError::Corrupt(format!("chunk {} is unreadable", coord)));
        }
        Ok(state.chunks.get(&coord).map(|chunk| ChunkHeader {
            last_modified: chunk.last_modified,
        }))
    }
}

impl LiveWorld for MemoryWorld {
    fn spawn_point(&self) -> BlockPos {
        self.spawn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_world_states() {
        let world = MemoryWorld::new(BlockPos::new(0, 64, 0));
        let full = ChunkCoordinate::new(0, 0);
        let partial = ChunkCoordinate::new(1, 0);
        let broken = ChunkCoordinate::new(2, 0);

        world.insert(ChunkPayload::new(full, 0, 8));
        world.insert_partial(partial);
        world.break_chunk(broken);

        assert!(world.chunk_exists(full));
        assert!(world.read_chunk(full).unwrap().is_some());

        assert!(world.chunk_exists(partial));
        assert!(world.read_chunk(partial).unwrap().is_none());

        assert!(world.read_chunk(broken).is_err());
        assert!(!world.chunk_exists(ChunkCoordinate::new(9, 9)));
    }

    #[test]
    fn test_default_header_reads_payload_timestamp() {
        struct Plain(MemoryWorld);
        impl WorldProvider for Plain {
            fn chunk_exists(&self, coord: ChunkCoordinate) -> bool {
                self.0.chunk_exists(coord)
            }
            fn read_chunk(&self, coord: ChunkCoordinate) -> Result<Option<ChunkPayload>, ProviderError> {
                self.0.read_chunk(coord)
            }
        }

        let at = chrono::Utc::now();
        let world = Plain(MemoryWorld::new(BlockPos::new(0, 0, 0)));
        world.0.insert(ChunkPayload::new(ChunkCoordinate::new(4, 4), 0, 1).with_last_modified(at));

        let header = world.read_header(ChunkCoordinate::new(4, 4)).unwrap().unwrap();
        assert_eq!(header.last_modified, Some(at));
        assert!(world.read_header(ChunkCoordinate::new(5, 5)).unwrap().is_none());
    }
}
