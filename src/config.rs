//! Renderer configuration.
//!
//! Stored as pretty-printed JSON. Missing fields take their defaults, so
//! older files keep loading when options are added.

use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::coords::{BlockPos, ChunkCoordinate};

/// Lowest accepted worker priority
pub const MIN_PRIORITY: u8 = 1;
/// Highest accepted worker priority
pub const MAX_PRIORITY: u8 = 10;
/// Priorities above this may starve the host
pub const NORM_PRIORITY: u8 = 5;

/// Configuration for the map renderer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Number of worker threads. <= 0 uses one less than the available cores.
    pub worker_threads: i32,

    /// Worker thread priority (1-10). Keep below 5 so the host stays responsive.
    pub worker_priority: u8,

    /// Regions rendered at once. 0 uses the worker count.
    pub max_parallel_regions: usize,

    /// Cache directory for renderer state.
    pub cache_dir: PathBuf,

    /// Tile output directory. Defaults to `tiles` under the cache directory.
    pub tile_dir: Option<PathBuf>,

    /// Block positions discovery starts from. Empty uses the world spawn.
    pub discovery_seeds: Vec<BlockPos>,

    /// Seconds outstanding work gets to finish on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            worker_threads: -1,
            worker_priority: 3,
            max_parallel_regions: 2,
            cache_dir: PathBuf::from("bmap"),
            tile_dir: None,
            discovery_seeds: Vec::new(),
            shutdown_grace_secs: 10,
        }
    }
}

impl MapConfig {
    /// Worker count after applying the "<= 0 means auto" rule
    pub fn resolved_workers(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads as usize;
        }
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        cores.saturating_sub(1).max(1)
    }

    /// In-flight region limit after applying the "0 means auto" rule
    pub fn resolved_parallel_regions(&self) -> usize {
        if self.max_parallel_regions == 0 {
            self.resolved_workers()
        } else {
            self.max_parallel_regions
        }
    }

    pub fn resolved_tile_dir(&self) -> PathBuf {
        self.tile_dir.clone().unwrap_or_else(|| self.cache_dir.join("tiles"))
    }

    /// Configured seeds as chunk coordinates
    pub fn seed_chunks(&self) -> Vec<ChunkCoordinate> {
        self.discovery_seeds.iter().map(|p| p.chunk()).collect()
    }

    /// Check values and make sure both directories are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        if self.worker_threads > 0 && self.worker_threads as usize > cores.saturating_sub(1) {
            warn!("exceeding {} worker threads may slow the host down", cores.saturating_sub(1));
        }

        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.worker_priority) {
            return Err(ConfigError::Invalid(format!(
                "worker priority must be between {} and {}",
                MIN_PRIORITY, MAX_PRIORITY
            )));
        }
        if self.worker_priority > NORM_PRIORITY {
            warn!("worker priority {} may severely slow the host down", self.worker_priority);
        }

        for (what, dir) in [("cache", self.cache_dir.clone()), ("tile", self.resolved_tile_dir())] {
            fs::create_dir_all(&dir).map_err(|e| {
                ConfigError::Invalid(format!("{} directory `{}` cannot be created: {}", what, dir.display(), e))
            })?;
            let readonly = fs::metadata(&dir)?.permissions().readonly();
            if readonly {
                return Err(ConfigError::Invalid(format!(
                    "{} directory `{}` cannot be written to",
                    what,
                    dir.display()
                )));
            }
        }

        Ok(())
    }

    /// Read a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Write this config as pretty JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load and validate `path`, falling back to defaults on any error.
    /// A missing file is created with the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let exists = path.exists();

        if exists {
            match Self::load(path).and_then(|config| config.validate().map(|_| config)) {
                Ok(config) => return config,
                Err(e) => error!("failed to load configuration, falling back to default: {}", e),
            }
        }

        warn!("loading default configuration");
        let config = Self::default();
        if !exists {
            info!("saving default configuration to {}", path.display());
            if let Err(e) = config.save(path) {
                error!("failed to write default configuration: {}", e);
            }
        }
        config
    }
}

/// Errors from loading or validating a config.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading or writing the file
    Io(std::io::Error),
    /// Malformed JSON
    Parse(serde_json::Error),
    /// A value is out of range or a directory is unusable
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "parse error: {}", e),
            ConfigError::Invalid(e) => write!(f, "invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = MapConfig::default();
        assert_eq!(config.worker_threads, -1);
        assert_eq!(config.worker_priority, 3);
        assert_eq!(config.max_parallel_regions, 2);
        assert_eq!(config.resolved_tile_dir(), PathBuf::from("bmap").join("tiles"));
        assert!(config.resolved_workers() >= 1);
    }

    #[test]
    fn test_explicit_workers() {
        let config = MapConfig {
            worker_threads: 3,
            max_parallel_regions: 0,
            ..MapConfig::default()
        };
        assert_eq!(config.resolved_workers(), 3);
        assert_eq!(config.resolved_parallel_regions(), 3);
    }

    #[test]
    fn test_save_load_keeps_seeds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("voxmap.json");
        let config = MapConfig {
            discovery_seeds: vec![BlockPos::new(-20, 64, 300)],
            ..MapConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = MapConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.seed_chunks(), vec![ChunkCoordinate::new(-2, 18)]);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("voxmap.json");
        fs::write(&path, r#"{ "worker_threads": 2 }"#).unwrap();

        let loaded = MapConfig::load(&path).unwrap();
        assert_eq!(loaded.worker_threads, 2);
        assert_eq!(loaded.worker_priority, 3);
    }

    #[test]
    fn test_bad_priority_rejected() {
        let dir = tempdir().unwrap();
        let config = MapConfig {
            worker_priority: 11,
            cache_dir: dir.path().to_path_buf(),
            ..MapConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_creates_directories() {
        let dir = tempdir().unwrap();
        let config = MapConfig {
            cache_dir: dir.path().join("cache"),
            ..MapConfig::default()
        };
        config.validate().unwrap();
        assert!(dir.path().join("cache").join("tiles").is_dir());
    }

    #[test]
    fn test_load_or_default_writes_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("voxmap.json");

        let config = MapConfig::load_or_default(&path);
        assert_eq!(config, MapConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_load_or_default_recovers_from_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("voxmap.json");
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(MapConfig::load_or_default(&path), MapConfig::default());
    }
}
