//! Coordinate system for the tiled map.
//!
//! Three levels: blocks (world space), chunks (16×16 columns) and regions
//! (32×32 chunks, one 512×512 tile each). All conversions use floor division
//! so negative coordinates land in the correct cell.

use serde::{Deserialize, Serialize};

/// Columns per chunk side
pub const CHUNK_SIZE: i32 = 16;

/// Chunks per region side
pub const REGION_CHUNKS: i32 = 32;

/// Pixels per region tile side (one pixel per column)
pub const REGION_PIXELS: u32 = (CHUNK_SIZE * REGION_CHUNKS) as u32;

/// A block position in world space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chunk containing this block
    pub fn chunk(&self) -> ChunkCoordinate {
        ChunkCoordinate::new(self.x.div_euclid(CHUNK_SIZE), self.z.div_euclid(CHUNK_SIZE))
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}, {}]", self.x, self.y, self.z)
    }
}

/// Identifies one 16×16 column of the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoordinate {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoordinate {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Region this chunk belongs to
    pub fn region(&self) -> RegionCoordinate {
        RegionCoordinate::of(*self)
    }

    /// Pixel offset of this chunk's origin column inside its region tile.
    ///
    /// Both components are multiples of 16 in `0..=496`.
    pub fn pixel_offset(&self) -> (u32, u32) {
        let local_x = self.x.rem_euclid(REGION_CHUNKS);
        let local_z = self.z.rem_euclid(REGION_CHUNKS);
        ((local_x * CHUNK_SIZE) as u32, (local_z * CHUNK_SIZE) as u32)
    }

    /// The chunk directly north (one step towards -z)
    pub fn north(&self) -> Self {
        Self::new(self.x, self.z - 1)
    }

    /// Offset by a chunk delta
    pub fn offset(&self, dx: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.z + dz)
    }

    /// All coordinates within `radius` steps on both axes, excluding self.
    pub fn neighbors_within(&self, radius: i32) -> impl Iterator<Item = ChunkCoordinate> + '_ {
        (-radius..=radius)
            .flat_map(move |dx| (-radius..=radius).map(move |dz| (dx, dz)))
            .filter(|&(dx, dz)| dx != 0 || dz != 0)
            .map(move |(dx, dz)| self.offset(dx, dz))
    }
}

impl std::fmt::Display for ChunkCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Identifies one 32×32-chunk tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionCoordinate {
    pub x: i32,
    pub z: i32,
}

impl RegionCoordinate {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Region containing a chunk (floor division by 32 on both axes)
    pub fn of(chunk: ChunkCoordinate) -> Self {
        Self::new(chunk.x.div_euclid(REGION_CHUNKS), chunk.z.div_euclid(REGION_CHUNKS))
    }

    /// North-west chunk of this region
    pub fn origin_chunk(&self) -> ChunkCoordinate {
        ChunkCoordinate::new(self.x * REGION_CHUNKS, self.z * REGION_CHUNKS)
    }

    /// Deterministic file name of this region's tile
    pub fn tile_filename(&self) -> String {
        format!("{}_{}.png", self.x, self.z)
    }
}

impl std::fmt::Display for RegionCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_floor_division() {
        assert_eq!(RegionCoordinate::of(ChunkCoordinate::new(-1, -1)), RegionCoordinate::new(-1, -1));
        assert_eq!(RegionCoordinate::of(ChunkCoordinate::new(-33, 5)), RegionCoordinate::new(-2, 0));
        assert_eq!(RegionCoordinate::of(ChunkCoordinate::new(31, 32)), RegionCoordinate::new(0, 1));
        assert_eq!(RegionCoordinate::of(ChunkCoordinate::new(-32, 0)), RegionCoordinate::new(-1, 0));
    }

    #[test]
    fn test_pixel_offset_range() {
        for x in -70..70 {
            for z in [-65, -33, -1, 0, 17, 64] {
                let chunk = ChunkCoordinate::new(x, z);
                let (px, pz) = chunk.pixel_offset();
                assert_eq!(px % 16, 0);
                assert_eq!(pz % 16, 0);
                assert!(px <= 496 && pz <= 496);
                assert_eq!(chunk.pixel_offset(), (px, pz));
            }
        }
        assert_eq!(ChunkCoordinate::new(-1, 0).pixel_offset(), (496, 0));
        assert_eq!(ChunkCoordinate::new(33, -32).pixel_offset(), (16, 0));
    }

    #[test]
    fn test_region_origin_round_trip() {
        let chunk = ChunkCoordinate::new(-40, 70);
        let region = chunk.region();
        let origin = region.origin_chunk();
        let (px, pz) = chunk.pixel_offset();
        assert_eq!(origin.x + (px / 16) as i32, chunk.x);
        assert_eq!(origin.z + (pz / 16) as i32, chunk.z);
    }

    #[test]
    fn test_block_to_chunk() {
        assert_eq!(BlockPos::new(0, 64, 0).chunk(), ChunkCoordinate::new(0, 0));
        assert_eq!(BlockPos::new(-1, 64, -16).chunk(), ChunkCoordinate::new(-1, -1));
        assert_eq!(BlockPos::new(-17, 0, 15).chunk(), ChunkCoordinate::new(-2, 0));
    }

    #[test]
    fn test_neighbors_within_radius() {
        let center = ChunkCoordinate::new(3, -2);
        let neighbors: Vec<_> = center.neighbors_within(4).collect();
        assert_eq!(neighbors.len(), 80);
        assert!(!neighbors.contains(&center));
        assert!(neighbors.contains(&ChunkCoordinate::new(7, 2)));
        assert!(!neighbors.contains(&ChunkCoordinate::new(8, -2)));
    }

    #[test]
    fn test_tile_filename() {
        assert_eq!(RegionCoordinate::new(-2, 0).tile_filename(), "-2_0.png");
    }
}
