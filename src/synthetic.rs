//! Deterministic demo world.
//!
//! Builds a square of chunks around the origin from layered Perlin noise so
//! the renderer can be driven without a host. The same seed always yields
//! the same blocks.

use chrono::{TimeZone, Utc};
use noise::{NoiseFn, Perlin};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::chunk::{BlockSample, ChunkPayload};
use crate::coords::{BlockPos, ChunkCoordinate, CHUNK_SIZE};
use crate::palette::MapColor;
use crate::provider::MemoryWorld;

/// Terrain shape parameters
#[derive(Clone, Debug)]
pub struct TerrainParams {
    /// Base frequency (lower = larger features)
    pub frequency: f64,
    pub octaves: u32,
    /// Amplitude decay per octave
    pub persistence: f64,
    pub sea_level: i32,
    /// Height swing above and below sea level
    pub relief: f64,
    /// Chance per land column of a tree
    pub tree_chance: f64,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            frequency: 0.01,
            octaves: 4,
            persistence: 0.5,
            sea_level: 62,
            relief: 40.0,
            tree_chance: 0.02,
        }
    }
}

// Vertical extent of generated chunks
const MIN_Y: i32 = 0;
const LAYERS: usize = 128;

const SNOW_LINE: i32 = 92;
const STONE_LINE: i32 = 80;
const BEACH_HEIGHT: i32 = 2;

/// Fractal Brownian motion over Perlin noise, roughly in -1..1
fn fbm(perlin: &Perlin, x: f64, z: f64, params: &TerrainParams) -> f64 {
    let mut total = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = params.frequency;
    let mut norm = 0.0;

    for _ in 0..params.octaves {
        total += perlin.get([x * frequency, z * frequency]) * amplitude;
        norm += amplitude;
        amplitude *= params.persistence;
        frequency *= 2.0;
    }

    total / norm
}

/// Surface height of a world column
pub fn surface_height(perlin: &Perlin, x: i32, z: i32, params: &TerrainParams) -> i32 {
    let h = params.sea_level as f64 + fbm(perlin, x as f64, z as f64, params) * params.relief;
    (h.round() as i32).clamp(MIN_Y + 1, MIN_Y + LAYERS as i32 - 8)
}

fn surface_color(height: i32, sea_level: i32) -> MapColor {
    if height >= SNOW_LINE {
        MapColor::SNOW
    } else if height >= STONE_LINE {
        MapColor::STONE
    } else if height <= sea_level + BEACH_HEIGHT {
        MapColor::SAND
    } else {
        MapColor::GRASS
    }
}

/// Generate one chunk.
pub fn generate_chunk(seed: u64, coord: ChunkCoordinate, params: &TerrainParams) -> ChunkPayload {
    let perlin = Perlin::new(seed as u32);
    let chunk_seed = seed
        .wrapping_mul(31)
        .wrapping_add((coord.x as i64 as u64) << 32)
        .wrapping_add(coord.z as u32 as u64);
    let mut rng = ChaCha8Rng::seed_from_u64(chunk_seed);

    let mut chunk = ChunkPayload::new(coord, MIN_Y, LAYERS);
    let side = CHUNK_SIZE as usize;

    for z in 0..side {
        for x in 0..side {
            let wx = coord.x * CHUNK_SIZE + x as i32;
            let wz = coord.z * CHUNK_SIZE + z as i32;
            let height = surface_height(&perlin, wx, wz, params);

            chunk.fill_column(x, z, height - 3, BlockSample::solid(MapColor::STONE));
            let top = surface_color(height, params.sea_level);
            let filler = if top == MapColor::GRASS { MapColor::DIRT } else { top };
            for y in (height - 2)..height {
                chunk.set_block(x, y, z, BlockSample::solid(filler));
            }
            chunk.set_block(x, height, z, BlockSample::solid(top));

            if height < params.sea_level {
                for y in (height + 1)..=params.sea_level {
                    chunk.set_block(x, y, z, BlockSample::liquid(MapColor::WATER));
                }
            } else if top == MapColor::GRASS && rng.gen_bool(params.tree_chance) {
                let trunk = rng.gen_range(3..6);
                for y in 1..=trunk {
                    chunk.set_block(x, height + y, z, BlockSample::solid(MapColor::WOOD));
                }
                chunk.set_block(x, height + trunk + 1, z, BlockSample::solid(MapColor::PLANT));
            }
        }
    }

    chunk.with_last_modified(Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now))
}

/// Generate every chunk within `radius` chunks of the origin, in parallel.
pub fn generate_world(seed: u64, radius: i32, params: &TerrainParams) -> MemoryWorld {
    let perlin = Perlin::new(seed as u32);
    let spawn = BlockPos::new(8, surface_height(&perlin, 8, 8, params) + 1, 8);
    let world = MemoryWorld::new(spawn);

    let coords: Vec<ChunkCoordinate> = (-radius..=radius)
        .flat_map(|x| (-radius..=radius).map(move |z| ChunkCoordinate::new(x, z)))
        .collect();

    let chunks: Vec<ChunkPayload> = coords
        .into_par_iter()
        .map(|coord| generate_chunk(seed, coord, params))
        .collect();

    for chunk in chunks {
        world.insert(chunk);
    }
    world
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::WorldProvider;

    #[test]
    fn test_generation_is_deterministic() {
        let params = TerrainParams::default();
        let coord = ChunkCoordinate::new(-3, 7);
        let a = generate_chunk(42, coord, &params);
        let b = generate_chunk(42, coord, &params);
        for z in 0..16 {
            for x in 0..16 {
                assert_eq!(a.surface_height(x, z), b.surface_height(x, z));
            }
        }
    }

    #[test]
    fn test_flat_terrain_is_beach() {
        let params = TerrainParams {
            relief: 0.0,
            sea_level: 70,
            ..TerrainParams::default()
        };
        let chunk = generate_chunk(1, ChunkCoordinate::new(0, 0), &params);
        for (x, z) in [(0, 0), (7, 9), (15, 15)] {
            assert_eq!(chunk.surface_height(x, z), 71);
            assert_eq!(chunk.block(x, 70, z), BlockSample::solid(MapColor::SAND));
            assert_eq!(chunk.block(x, 66, z), BlockSample::solid(MapColor::STONE));
        }
    }

    #[test]
    fn test_world_covers_radius() {
        let world = generate_world(7, 2, &TerrainParams::default());
        assert_eq!(world.len(), 25);
        assert!(world.chunk_exists(ChunkCoordinate::new(-2, 2)));
        assert!(!world.chunk_exists(ChunkCoordinate::new(3, 0)));
    }
}
