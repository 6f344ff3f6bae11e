//! Chunk payloads as consumed by the rasterizer.
//!
//! A payload is the provider-neutral view of one 16×16 column of the world:
//! a surface heightmap, one `BlockSample` per block and the chunk's
//! last-modified timestamp.

use chrono::{DateTime, Utc};

use crate::coords::{ChunkCoordinate, CHUNK_SIZE};
use crate::palette::MapColor;

/// Wall-clock timestamp used for chunk modification and tile write times
pub type Timestamp = DateTime<Utc>;

const COLUMNS: usize = (CHUNK_SIZE * CHUNK_SIZE) as usize;

/// What the map cares about for a single block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct BlockSample {
    pub color: MapColor,
    pub liquid: bool,
}

impl BlockSample {
    pub const AIR: BlockSample = BlockSample { color: MapColor::CLEAR, liquid: false };

    pub fn solid(color: MapColor) -> Self {
        Self { color, liquid: false }
    }

    pub fn liquid(color: MapColor) -> Self {
        Self { color, liquid: true }
    }

    pub fn is_air(&self) -> bool {
        self.color.is_clear() && !self.liquid
    }
}

/// Block data of one chunk.
#[derive(Clone, Debug)]
pub struct ChunkPayload {
    pub coord: ChunkCoordinate,
    /// Lowest block y (the world floor)
    pub min_y: i32,
    /// Number of block layers above `min_y`
    pub layers: usize,
    /// First free y above the topmost non-air block, per column (z * 16 + x)
    surface: Vec<i32>,
    /// Block samples, layer-major: `(y - min_y) * 256 + z * 16 + x`
    blocks: Vec<BlockSample>,
    /// Last time a map-relevant block changed, if the provider recorded one
    pub last_modified: Option<Timestamp>,
}

impl ChunkPayload {
    /// Create an all-air chunk
    pub fn new(coord: ChunkCoordinate, min_y: i32, layers: usize) -> Self {
        Self {
            coord,
            min_y,
            layers,
            surface: vec![min_y; COLUMNS],
            blocks: vec![BlockSample::AIR; layers * COLUMNS],
            last_modified: None,
        }
    }

    pub fn with_last_modified(mut self, at: Timestamp) -> Self {
        self.last_modified = Some(at);
        self
    }

    /// One past the highest block y
    pub fn max_y(&self) -> i32 {
        self.min_y + self.layers as i32
    }

    fn column(x: usize, z: usize) -> usize {
        debug_assert!(x < 16 && z < 16, "column out of bounds");
        z * CHUNK_SIZE as usize + x
    }

    fn index(&self, x: usize, y: i32, z: usize) -> Option<usize> {
        if y < self.min_y || y >= self.max_y() {
            return None;
        }
        Some((y - self.min_y) as usize * COLUMNS + Self::column(x, z))
    }

    /// Block at a local column and world y; air outside the vertical range
    pub fn block(&self, x: usize, y: i32, z: usize) -> BlockSample {
        self.index(x, y, z).map(|i| self.blocks[i]).unwrap_or(BlockSample::AIR)
    }

    /// Surface height of a column (first free y above the topmost block)
    pub fn surface_height(&self, x: usize, z: usize) -> i32 {
        self.surface[Self::column(x, z)]
    }

    /// Surface heights of the southernmost row (z = 15), west to east
    pub fn south_edge(&self) -> [i32; 16] {
        let mut row = [self.min_y; 16];
        for (x, h) in row.iter_mut().enumerate() {
            *h = self.surface_height(x, CHUNK_SIZE as usize - 1);
        }
        row
    }

    /// Set a block, keeping the surface heightmap in sync.
    /// Writes outside the vertical range are ignored.
    pub fn set_block(&mut self, x: usize, y: i32, z: usize, sample: BlockSample) {
        let Some(i) = self.index(x, y, z) else {
            return;
        };
        self.blocks[i] = sample;

        let col = Self::column(x, z);
        if !sample.is_air() && y + 1 > self.surface[col] {
            self.surface[col] = y + 1;
        } else if sample.is_air() && y + 1 == self.surface[col] {
            self.surface[col] = self.scan_surface(x, z);
        }
    }

    /// Fill a column from the floor up to and including `top_y`
    pub fn fill_column(&mut self, x: usize, z: usize, top_y: i32, sample: BlockSample) {
        for y in self.min_y..=top_y.min(self.max_y() - 1) {
            self.set_block(x, y, z, sample);
        }
    }

    fn scan_surface(&self, x: usize, z: usize) -> i32 {
        (self.min_y..self.max_y())
            .rev()
            .find(|&y| !self.block(x, y, z).is_air())
            .map(|y| y + 1)
            .unwrap_or(self.min_y)
    }
}

/// A discovered chunk: where it is and when it last changed.
///
/// The payload itself is fetched again through the provider by the parse
/// stage, so a record stays small for the whole pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkRecord {
    pub coord: ChunkCoordinate,
    pub last_modified: Timestamp,
}
