//! Voxel world map renderer library
//!
//! Discovers generated chunks, renders them top-down into 512×512 region
//! tiles and keeps those tiles current incrementally.

pub mod chunk;
pub mod config;
pub mod coords;
pub mod discovery;
pub mod host;
pub mod palette;
pub mod pipeline;
pub mod pool;
pub mod provider;
pub mod raster;
pub mod regions;
pub mod synthetic;
pub mod tiles;
pub mod timestamps;

pub use config::MapConfig;
pub use pipeline::{RenderMode, Renderer, SeedList, StatsSnapshot};
