//! Tile persistence and staleness.
//!
//! Tiles are stored as `{x}_{z}.png` RGBA images under the tile directory.
//! The file's modification time is the tile's write timestamp; a chunk
//! modified at or after it needs re-rendering.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::{ImageFormat, RgbaImage};

use crate::chunk::{ChunkRecord, Timestamp};
use crate::coords::{RegionCoordinate, REGION_PIXELS};
use crate::palette::{SENTINEL, TRANSPARENT};

/// A tile read back from disk.
pub struct CachedTile {
    pub image: RgbaImage,
    pub written_at: Timestamp,
}

impl CachedTile {
    /// Whether `chunk` has to be rendered again on top of this tile.
    ///
    /// A translucent origin pixel that isn't the empty-column sentinel means
    /// the chunk was never actually drawn, whatever its timestamp says.
    pub fn is_stale(&self, chunk: &ChunkRecord) -> bool {
        let (px, pz) = chunk.coord.pixel_offset();
        let origin = *self.image.get_pixel(px, pz);
        if origin[3] != 255 && origin != SENTINEL {
            return true;
        }
        chunk.last_modified >= self.written_at
    }

    /// Subset of `chunks` that is stale
    pub fn stale_chunks(&self, chunks: &[ChunkRecord]) -> Vec<ChunkRecord> {
        chunks.iter().filter(|c| self.is_stale(c)).copied().collect()
    }
}

/// Reads and writes region tiles in one directory.
#[derive(Clone, Debug)]
pub struct TileStore {
    dir: PathBuf,
}

impl TileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tile_path(&self, region: RegionCoordinate) -> PathBuf {
        self.dir.join(region.tile_filename())
    }

    /// Ensure the tile directory exists
    pub fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    /// Load a tile and its write time. Returns None if no tile exists.
    pub fn load(&self, region: RegionCoordinate) -> Result<Option<CachedTile>, TileError> {
        let path = self.tile_path(region);
        if !path.exists() {
            return Ok(None);
        }

        let written_at: DateTime<Utc> = fs::metadata(&path)?.modified()?.into();
        let image = image::open(&path)?.to_rgba8();
        if image.width() != REGION_PIXELS || image.height() != REGION_PIXELS {
            return Err(TileError::Dimensions {
                width: image.width(),
                height: image.height(),
            });
        }

        Ok(Some(CachedTile { image, written_at }))
    }

    /// Write a tile as PNG, replacing any previous one.
    pub fn save(&self, region: RegionCoordinate, image: &RgbaImage) -> Result<(), TileError> {
        self.ensure_dir()?;
        image.save_with_format(self.tile_path(region), ImageFormat::Png)?;
        Ok(())
    }

    /// List the regions that currently have a tile
    pub fn list_tiles(&self) -> Result<Vec<RegionCoordinate>, TileError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut regions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }
            // Parse "X_Z" stems
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if let Some((x, z)) = stem.split_once('_') {
                    if let (Ok(x), Ok(z)) = (x.parse(), z.parse()) {
                        regions.push(RegionCoordinate::new(x, z));
                    }
                }
            }
        }

        Ok(regions)
    }
}

/// Fresh, fully transparent tile buffer
pub fn blank_tile() -> RgbaImage {
    RgbaImage::from_pixel(REGION_PIXELS, REGION_PIXELS, TRANSPARENT)
}

/// Errors that can occur reading or writing a tile.
#[derive(Debug)]
pub enum TileError {
    /// IO error (permissions, missing directory, etc.)
    Io(std::io::Error),
    /// PNG encode/decode error
    Image(image::ImageError),
    /// Tile on disk has the wrong size
    Dimensions { width: u32, height: u32 },
}

impl std::fmt::Display for TileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TileError::Io(e) => write!(f, "IO error: {}", e),
            TileError::Image(e) => write!(f, "image error: {}", e),
            TileError::Dimensions { width, height } => {
                write!(f, "tile is {}x{}, expected {}x{}", width, height, REGION_PIXELS, REGION_PIXELS)
            }
        }
    }
}

impl std::error::Error for TileError {}

impl From<std::io::Error> for TileError {
    fn from(e: std::io::Error) -> Self {
        TileError::Io(e)
    }
}

impl From<image::ImageError> for TileError {
    fn from(e: image::ImageError) -> Self {
        TileError::Image(e)
    }
}
