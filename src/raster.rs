//! Per-column rasterization of a chunk.
//!
//! Each of the 256 columns is reduced to one pixel:
//! - scan down from the surface to the first block with a map color
//! - for liquids, measure depth (up to `MAX_LIQUID_DEPTH`) and find the floor
//! - pick a shade: depth for liquids, north-south slope for land
//! - tint shallow liquids with their floor color
//!
//! Columns without any colored block get the `SENTINEL` pixel so a later
//! incremental pass can tell "rendered, empty" apart from "never rendered".

use image::Rgba;

use crate::chunk::ChunkPayload;
use crate::coords::{ChunkCoordinate, CHUNK_SIZE};
use crate::palette::{
    blend, opaque, round_half_up, shade_at, MapColor, DARKEST_RANK, FLOOR_BLEND_STRENGTH, LIGHTEST_RANK, SENTINEL,
};

/// Extra blocks scanned below a liquid surface looking for its floor
pub const MAX_LIQUID_DEPTH: i32 = 15;

/// Liquid depth per shade step
const DEPTH_PER_SHADE: f64 = 5.0;

/// Slope bias; a flat column lands between the middle ranks
const SLOPE_BIAS: f64 = 1.5;

const SIDE: usize = CHUNK_SIZE as usize;

/// Rendered pixels of one chunk, row-major (z * 16 + x).
#[derive(Clone, Debug)]
pub struct ChunkRaster {
    pub coord: ChunkCoordinate,
    pub pixels: Vec<Rgba<u8>>,
}

impl ChunkRaster {
    pub fn pixel(&self, x: usize, z: usize) -> Rgba<u8> {
        self.pixels[z * SIDE + x]
    }
}

/// What a downward scan of one column found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ColumnHit {
    color: MapColor,
    liquid: bool,
    depth: i32,
    floor: Option<MapColor>,
}

/// Shade id for a liquid column `depth` blocks deep. Deeper is darker.
pub fn liquid_shade(depth: i32) -> u8 {
    let rank = round_half_up((depth as f64 / DEPTH_PER_SHADE).clamp(0.0, DARKEST_RANK as f64));
    shade_at(rank)
}

/// Shade id for a land column given `previous_top - this_top`.
pub fn land_shade(delta: i32) -> u8 {
    let rank = round_half_up((SLOPE_BIAS + delta as f64).clamp(0.0, DARKEST_RANK as f64));
    shade_at(DARKEST_RANK - rank)
}

fn scan_column(chunk: &ChunkPayload, x: usize, z: usize) -> Option<ColumnHit> {
    let mut y = chunk.surface_height(x, z);
    let block = loop {
        if y < chunk.min_y {
            return None;
        }
        let block = chunk.block(x, y, z);
        if !block.color.is_clear() {
            break block;
        }
        y -= 1;
    };

    let mut hit = ColumnHit {
        color: block.color,
        liquid: block.liquid,
        depth: 0,
        floor: None,
    };
    if !block.liquid {
        return Some(hit);
    }

    for _ in 0..MAX_LIQUID_DEPTH {
        y -= 1;
        if y < chunk.min_y {
            break;
        }
        let below = chunk.block(x, y, z);
        if !below.liquid {
            hit.floor = Some(below.color).filter(|c| !c.is_clear());
            break;
        }
        hit.depth += 1;
    }

    Some(hit)
}

/// Rasterize a chunk. `north` is the chunk at z - 1, used for shading the
/// first row; without it the first row slopes from the world floor.
pub fn rasterize_chunk(chunk: &ChunkPayload, north: Option<&ChunkPayload>) -> ChunkRaster {
    let mut pixels = vec![SENTINEL; SIDE * SIDE];

    for z in 0..SIDE {
        for x in 0..SIDE {
            let Some(hit) = scan_column(chunk, x, z) else {
                continue;
            };

            let shade = if hit.liquid {
                liquid_shade(hit.depth)
            } else {
                let previous = if z > 0 {
                    chunk.surface_height(x, z - 1)
                } else {
                    north.map(|n| n.surface_height(x, SIDE - 1)).unwrap_or(chunk.min_y)
                };
                land_shade(previous - chunk.surface_height(x, z))
            };

            let base = hit.color.render(shade);
            let rgb = match hit.floor {
                Some(floor) => blend(base, floor.render(shade_at(LIGHTEST_RANK)), FLOOR_BLEND_STRENGTH),
                None => base,
            };
            pixels[z * SIDE + x] = opaque(rgb);
        }
    }

    ChunkRaster {
        coord: chunk.coord,
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::BlockSample;
    use crate::palette::SHADE_PERMUTATION;

    fn flat(coord: ChunkCoordinate, top: i32, color: MapColor) -> ChunkPayload {
        let mut chunk = ChunkPayload::new(coord, 0, 64);
        for z in 0..16 {
            for x in 0..16 {
                chunk.fill_column(x, z, top, BlockSample::solid(color));
            }
        }
        chunk
    }

    #[test]
    fn test_liquid_shade_by_depth() {
        assert_eq!(liquid_shade(0), SHADE_PERMUTATION[LIGHTEST_RANK]);
        assert_eq!(liquid_shade(2), SHADE_PERMUTATION[0]);
        assert_eq!(liquid_shade(3), SHADE_PERMUTATION[1]);
        assert_eq!(liquid_shade(12), SHADE_PERMUTATION[2]);
        assert_eq!(liquid_shade(15), SHADE_PERMUTATION[DARKEST_RANK]);
        assert_eq!(liquid_shade(40), SHADE_PERMUTATION[DARKEST_RANK]);
    }

    #[test]
    fn test_land_shade_by_slope() {
        assert_eq!(land_shade(0), SHADE_PERMUTATION[1]);
        assert_eq!(land_shade(1), SHADE_PERMUTATION[LIGHTEST_RANK]);
        assert_eq!(land_shade(5), SHADE_PERMUTATION[LIGHTEST_RANK]);
        assert_eq!(land_shade(-1), SHADE_PERMUTATION[2]);
        assert_eq!(land_shade(-2), SHADE_PERMUTATION[DARKEST_RANK]);
    }

    #[test]
    fn test_air_chunk_is_sentinel() {
        let chunk = ChunkPayload::new(ChunkCoordinate::new(0, 0), 0, 16);
        let raster = rasterize_chunk(&chunk, None);
        assert!(raster.pixels.iter().all(|&p| p == SENTINEL));
    }

    #[test]
    fn test_flat_land_with_north_neighbor() {
        let coord = ChunkCoordinate::new(0, 1);
        let chunk = flat(coord, 10, MapColor::GRASS);
        let north = flat(coord.north(), 10, MapColor::GRASS);

        let raster = rasterize_chunk(&chunk, Some(&north));
        let expected = opaque(MapColor::GRASS.render(SHADE_PERMUTATION[1]));
        assert!(raster.pixels.iter().all(|&p| p == expected));
    }

    #[test]
    fn test_missing_north_neighbor_uses_world_floor() {
        let chunk = flat(ChunkCoordinate::new(0, 0), 10, MapColor::GRASS);
        let raster = rasterize_chunk(&chunk, None);

        // First row climbs from the floor: steep ascent
        let edge = opaque(MapColor::GRASS.render(SHADE_PERMUTATION[DARKEST_RANK]));
        let inner = opaque(MapColor::GRASS.render(SHADE_PERMUTATION[1]));
        assert_eq!(raster.pixel(4, 0), edge);
        assert_eq!(raster.pixel(4, 1), inner);
    }

    #[test]
    fn test_shallow_water_blends_floor() {
        let mut chunk = flat(ChunkCoordinate::new(0, 0), 10, MapColor::SAND);
        chunk.set_block(3, 11, 3, BlockSample::liquid(MapColor::WATER));

        let raster = rasterize_chunk(&chunk, None);
        let base = MapColor::WATER.render(SHADE_PERMUTATION[LIGHTEST_RANK]);
        let floor = MapColor::SAND.render(SHADE_PERMUTATION[LIGHTEST_RANK]);
        assert_eq!(raster.pixel(3, 3), opaque(blend(base, floor, FLOOR_BLEND_STRENGTH)));
    }

    #[test]
    fn test_deep_water_has_no_floor() {
        let mut chunk = ChunkPayload::new(ChunkCoordinate::new(0, 0), 0, 64);
        chunk.fill_column(0, 0, 2, BlockSample::solid(MapColor::STONE));
        for y in 3..30 {
            chunk.set_block(0, y, 0, BlockSample::liquid(MapColor::WATER));
        }

        let raster = rasterize_chunk(&chunk, None);
        let expected = opaque(MapColor::WATER.render(SHADE_PERMUTATION[DARKEST_RANK]));
        assert_eq!(raster.pixel(0, 0), expected);
    }

    #[test]
    fn test_water_reaching_world_floor() {
        let mut chunk = ChunkPayload::new(ChunkCoordinate::new(0, 0), 0, 64);
        for y in 0..5 {
            chunk.set_block(1, y, 1, BlockSample::liquid(MapColor::WATER));
        }

        let raster = rasterize_chunk(&chunk, None);
        let expected = opaque(MapColor::WATER.render(liquid_shade(4)));
        assert_eq!(raster.pixel(1, 1), expected);
    }

    #[test]
    fn test_clear_blocks_are_skipped() {
        let mut chunk = flat(ChunkCoordinate::new(0, 0), 5, MapColor::STONE);
        // Raises the surface but has no map color
        chunk.set_block(2, 6, 2, BlockSample::liquid(MapColor::CLEAR));
        let raster = rasterize_chunk(&chunk, None);
        assert_eq!(raster.pixel(2, 2)[3], 255);
        assert_ne!(raster.pixel(2, 2), SENTINEL);
    }
}
