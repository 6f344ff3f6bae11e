//! Render pipeline.
//!
//! A pass runs: seeds → discovery → region grouping → (incremental only)
//! staleness filtering → batched chunk parsing → batched rasterization →
//! tile write. `Renderer::render_full` and `Renderer::render_incremental`
//! only submit the pass; progress shows up in the log and in `RenderStats`.
//!
//! Regions are admitted through a semaphore shared by every pass, so at most
//! `max_parallel_regions` tile buffers are alive at once. A failing region is
//! logged and counted; its siblings carry on.
//!
//! Passes are not mutually excluded: two overlapping passes writing the same
//! tile directory can race on tile files. A region that fails mid-render may
//! leave its previous tile in place or, if the write itself fails, a partial
//! file.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbaImage;
use log::{debug, error, info, warn};
use tokio::sync::Semaphore;

use crate::chunk::{BlockSample, ChunkPayload, ChunkRecord};
use crate::config::MapConfig;
use crate::coords::{BlockPos, ChunkCoordinate, CHUNK_SIZE};
use crate::discovery::discover_chunks;
use crate::host::{HostError, HostHandle};
use crate::pool::{PoolHandle, RenderPool, ShutdownReport};
use crate::provider::{LiveWorld, WorldProvider};
use crate::raster::{rasterize_chunk, ChunkRaster};
use crate::regions::{group_regions, RegionSet};
use crate::palette::TRANSPARENT;
use crate::tiles::{blank_tile, TileError, TileStore};
use crate::timestamps::ModificationTable;

/// Whether a pass reuses existing tiles
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    /// Ignore existing tiles and render everything discovered
    Full,
    /// Render only chunks that changed since their tile was written
    Incremental,
}

impl RenderMode {
    pub fn name(&self) -> &'static str {
        match self {
            RenderMode::Full => "full",
            RenderMode::Incremental => "incremental",
        }
    }
}

/// Counters updated as passes progress.
#[derive(Default)]
pub struct RenderStats {
    passes_started: AtomicUsize,
    passes_finished: AtomicUsize,
    regions_discovered: AtomicUsize,
    regions_rewritten: AtomicUsize,
    regions_skipped: AtomicUsize,
    regions_failed: AtomicUsize,
    chunks_rendered: AtomicUsize,
    regions_in_flight: AtomicUsize,
    peak_regions_in_flight: AtomicUsize,
}

/// Point-in-time copy of `RenderStats`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub passes_started: usize,
    pub passes_finished: usize,
    pub regions_discovered: usize,
    pub regions_rewritten: usize,
    pub regions_skipped: usize,
    pub regions_failed: usize,
    pub chunks_rendered: usize,
    /// Region tasks currently holding a slot
    pub regions_in_flight: usize,
    /// Most region tasks ever holding a slot at once
    pub peak_regions_in_flight: usize,
}

impl RenderStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            passes_started: self.passes_started.load(Ordering::SeqCst),
            passes_finished: self.passes_finished.load(Ordering::SeqCst),
            regions_discovered: self.regions_discovered.load(Ordering::SeqCst),
            regions_rewritten: self.regions_rewritten.load(Ordering::SeqCst),
            regions_skipped: self.regions_skipped.load(Ordering::SeqCst),
            regions_failed: self.regions_failed.load(Ordering::SeqCst),
            chunks_rendered: self.chunks_rendered.load(Ordering::SeqCst),
            regions_in_flight: self.regions_in_flight.load(Ordering::SeqCst),
            peak_regions_in_flight: self.peak_regions_in_flight.load(Ordering::SeqCst),
        }
    }
}

/// Counts a region task as in flight for as long as it lives.
struct InFlight<'a>(&'a RenderStats);

impl<'a> InFlight<'a> {
    fn enter(stats: &'a RenderStats) -> Self {
        let now = stats.regions_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak_regions_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.regions_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Discovery seeds as seen by an operator
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SeedList {
    Configured(Vec<BlockPos>),
    /// No seeds configured; discovery starts at the world spawn
    Default(BlockPos),
}

/// Everything a pass needs, built once and shared by all of its tasks.
pub struct PipelineContext {
    provider: Arc<dyn WorldProvider>,
    modifications: Arc<ModificationTable>,
    host: HostHandle,
    tiles: TileStore,
    seeds: Vec<ChunkCoordinate>,
    region_slots: Arc<Semaphore>,
    stats: Arc<RenderStats>,
    pool: PoolHandle,
}

/// How one region task ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RegionOutcome {
    /// Tile written with this many freshly rendered chunks
    Written(usize),
    /// Nothing stale or nothing readable; tile left alone
    Unchanged,
}

/// Failure of a single region task.
#[derive(Debug)]
pub enum RegionError {
    Tile(TileError),
    /// A batch task panicked or was cancelled
    Task(String),
}

impl std::fmt::Display for RegionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionError::Tile(e) => write!(f, "tile error: {}", e),
            RegionError::Task(e) => write!(f, "worker task failed: {}", e),
        }
    }
}

impl std::error::Error for RegionError {}

impl From<TileError> for RegionError {
    fn from(e: TileError) -> Self {
        RegionError::Tile(e)
    }
}

impl From<tokio::task::JoinError> for RegionError {
    fn from(e: tokio::task::JoinError) -> Self {
        RegionError::Task(e.to_string())
    }
}

/// Entry point: owns the pool and submits passes.
pub struct Renderer {
    config: MapConfig,
    provider: Arc<dyn WorldProvider>,
    host: HostHandle,
    modifications: Arc<ModificationTable>,
    stats: Arc<RenderStats>,
    region_slots: Arc<Semaphore>,
    pool: RenderPool,
    context: Arc<PipelineContext>,
}

impl Renderer {
    pub fn new(config: MapConfig, provider: Arc<dyn WorldProvider>, host: HostHandle) -> std::io::Result<Self> {
        let pool = RenderPool::new(config.resolved_workers(), config.worker_priority)?;
        let region_slots = Arc::new(Semaphore::new(config.resolved_parallel_regions().max(1)));
        let modifications = Arc::new(ModificationTable::new());
        let stats = Arc::new(RenderStats::default());

        let context = Arc::new(PipelineContext {
            provider: provider.clone(),
            modifications: modifications.clone(),
            host: host.clone(),
            tiles: TileStore::new(config.resolved_tile_dir()),
            seeds: config.seed_chunks(),
            region_slots: region_slots.clone(),
            stats: stats.clone(),
            pool: pool.handle(),
        });

        Ok(Self {
            config,
            provider,
            host,
            modifications,
            stats,
            region_slots,
            pool,
            context,
        })
    }

    fn rebuild_context(&mut self) {
        self.context = Arc::new(PipelineContext {
            provider: self.provider.clone(),
            modifications: self.modifications.clone(),
            host: self.host.clone(),
            tiles: TileStore::new(self.config.resolved_tile_dir()),
            seeds: self.config.seed_chunks(),
            region_slots: self.region_slots.clone(),
            stats: self.stats.clone(),
            pool: self.pool.handle(),
        });
    }

    /// Re-render everything reachable, ignoring existing tiles.
    pub fn render_full(&self) {
        self.submit(RenderMode::Full);
    }

    /// Re-render only chunks that changed since their tile was written.
    pub fn render_incremental(&self) {
        self.submit(RenderMode::Incremental);
    }

    fn submit(&self, mode: RenderMode) {
        self.stats.passes_started.fetch_add(1, Ordering::SeqCst);
        let context = self.context.clone();
        let pool = self.context.pool.clone();
        let stats = self.stats.clone();

        // A panicking pass still counts as finished
        let _ = self.context.pool.spawn(async move {
            if let Err(e) = pool.spawn(run_pass(context, mode)).await {
                error!("{} pass died: {}", mode.name(), e);
                stats.passes_finished.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn tiles(&self) -> &TileStore {
        &self.context.tiles
    }

    /// Side table a provider reads back when persisting chunks
    pub fn modifications(&self) -> &Arc<ModificationTable> {
        &self.modifications
    }

    /// Mark a chunk modified now
    pub fn notify_chunk_changed(&self, coord: ChunkCoordinate) {
        self.modifications.touch(coord);
    }

    /// Report a single block edit; property-only edits are ignored
    pub fn notify_block_changed(&self, pos: BlockPos, before: BlockSample, after: BlockSample) -> bool {
        self.modifications.block_changed(pos.chunk(), before, after)
    }

    /// Effective discovery seeds. Call on the owner thread.
    pub fn seeds(&self, world: &dyn LiveWorld) -> SeedList {
        if self.config.discovery_seeds.is_empty() {
            SeedList::Default(world.spawn_point())
        } else {
            SeedList::Configured(self.config.discovery_seeds.clone())
        }
    }

    /// Add a discovery seed for future passes
    pub fn add_seed(&mut self, pos: BlockPos) {
        info!("adding discovery seed at {}", pos);
        self.config.discovery_seeds.push(pos);
        self.rebuild_context();
    }

    /// Swap in a new configuration. The old pool is retired on a background
    /// thread after its grace period so the caller never blocks on it.
    pub fn reconfigure(&mut self, config: MapConfig) -> std::io::Result<()> {
        let pool = RenderPool::new(config.resolved_workers(), config.worker_priority)?;
        let old = std::mem::replace(&mut self.pool, pool);
        let grace = Duration::from_secs(self.config.shutdown_grace_secs);

        self.region_slots = Arc::new(Semaphore::new(config.resolved_parallel_regions().max(1)));
        self.config = config;
        self.rebuild_context();
        info!("configuration applied");

        std::thread::Builder::new()
            .name("voxmap-retire".to_string())
            .spawn(move || {
                old.shutdown(grace);
            })?;
        Ok(())
    }

    /// Tasks still queued or running
    pub fn outstanding(&self) -> usize {
        self.context.pool.outstanding()
    }

    /// Shut down with the configured grace period.
    pub fn shutdown(self) -> ShutdownReport {
        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        self.shutdown_within(grace)
    }

    pub fn shutdown_within(self, grace: Duration) -> ShutdownReport {
        info!("shutting down render worker pool");
        self.pool.shutdown(grace)
    }
}

async fn resolve_seeds(context: &PipelineContext) -> Result<Vec<ChunkCoordinate>, HostError> {
    if !context.seeds.is_empty() {
        return Ok(context.seeds.clone());
    }
    let spawn = context.host.call(|world| world.spawn_point()).await?;
    Ok(vec![spawn.chunk()])
}

async fn run_pass(context: Arc<PipelineContext>, mode: RenderMode) {
    let start = Instant::now();
    let stats = context.stats.clone();

    match render_pass(context, mode).await {
        Ok((rewritten, total)) => info!(
            "{} pass rewrote {} of {} regions in {} ms",
            mode.name(),
            rewritten,
            total,
            start.elapsed().as_millis()
        ),
        Err(e) => error!("{} pass aborted: {}", mode.name(), e),
    }

    stats.passes_finished.fetch_add(1, Ordering::SeqCst);
}

async fn render_pass(context: Arc<PipelineContext>, mode: RenderMode) -> Result<(usize, usize), HostError> {
    let seeds = resolve_seeds(&context).await?;

    let start = Instant::now();
    let discovery = discover_chunks(&*context.provider, &context.modifications, &seeds);
    info!(
        "found {} chunks in {} ms ({} coordinates examined)",
        discovery.records.len(),
        start.elapsed().as_millis(),
        discovery.visited
    );
    if discovery.read_failures > 0 {
        warn!("{} chunks could not be read and were skipped", discovery.read_failures);
    }

    let regions = group_regions(&discovery.records);
    let total = regions.len();
    context.stats.regions_discovered.fetch_add(total, Ordering::SeqCst);

    if let Err(e) = context.tiles.ensure_dir() {
        error!("cannot create tile directory {}: {}", context.tiles.dir().display(), e);
    }

    let mut tasks = Vec::with_capacity(total);
    for set in regions {
        // Admit the next region only once a slot frees up
        let Ok(permit) = context.region_slots.clone().acquire_owned().await else {
            break;
        };
        let region = set.region;
        let region_context = context.clone();
        let task = context.pool.spawn(async move {
            let _permit = permit;
            let _in_flight = InFlight::enter(&region_context.stats);
            render_region(&region_context, set, mode).await
        });
        tasks.push((region, task));
    }

    let mut rewritten = 0;
    let mut skipped = 0;
    for (region, task) in tasks {
        match task.await {
            Ok(Ok(RegionOutcome::Written(chunks))) => {
                debug!("region {} rewritten with {} fresh chunks", region, chunks);
                rewritten += 1;
            }
            Ok(Ok(RegionOutcome::Unchanged)) => skipped += 1,
            Ok(Err(e)) => {
                error!("failed to render region {}: {}", region, e);
                context.stats.regions_failed.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                error!("render task for region {} died: {}", region, e);
                context.stats.regions_failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    if mode == RenderMode::Incremental {
        info!("skipped {} up-to-date regions", skipped);
    }
    context.stats.regions_rewritten.fetch_add(rewritten, Ordering::SeqCst);
    context.stats.regions_skipped.fetch_add(skipped, Ordering::SeqCst);

    Ok((rewritten, total))
}

async fn render_region(
    context: &Arc<PipelineContext>,
    set: RegionSet,
    mode: RenderMode,
) -> Result<RegionOutcome, RegionError> {
    let start = Instant::now();
    let region = set.region;

    let (mut image, chunks) = match mode {
        RenderMode::Full => (blank_tile(), set.chunks),
        RenderMode::Incremental => match context.tiles.load(region)? {
            Some(tile) => {
                let stale = tile.stale_chunks(&set.chunks);
                if stale.is_empty() {
                    debug!("region {} is up to date", region);
                    return Ok(RegionOutcome::Unchanged);
                }
                debug!(
                    "region {}: reusing renders for {} up-to-date chunks",
                    region,
                    set.chunks.len() - stale.len()
                );
                (tile.image, stale)
            }
            None => (blank_tile(), set.chunks),
        },
    };

    let payloads = parse_chunks(context, &chunks).await?;
    let rasters = rasterize_chunks(context, payloads).await?;
    if rasters.is_empty() {
        warn!("region {}: no chunk payloads could be read", region);
        return Ok(RegionOutcome::Unchanged);
    }

    for raster in &rasters {
        blit(&mut image, raster);
    }

    // Chunks that could not be read keep their old pixels, but lose the
    // opaque origin so the next incremental pass picks them up again
    let rendered: HashSet<ChunkCoordinate> = rasters.iter().map(|r| r.coord).collect();
    let mut unread = 0;
    for record in chunks.iter().filter(|c| !rendered.contains(&c.coord)) {
        let (px, pz) = record.coord.pixel_offset();
        image.put_pixel(px, pz, TRANSPARENT);
        unread += 1;
    }
    if unread > 0 {
        warn!("region {}: {} chunks could not be read and will be retried", region, unread);
    }

    context.tiles.save(region, &image)?;
    context.stats.chunks_rendered.fetch_add(rasters.len(), Ordering::SeqCst);

    info!(
        "rendered region {} ({} chunks) in {} ms",
        region,
        rasters.len(),
        start.elapsed().as_millis()
    );
    Ok(RegionOutcome::Written(rasters.len()))
}

/// Chunk payloads of one region plus the northern neighbors they need.
struct ParsedRegion {
    targets: Vec<ChunkCoordinate>,
    payloads: HashMap<ChunkCoordinate, ChunkPayload>,
}

/// Split `len` items evenly over the pool's workers
fn batch_size(len: usize, workers: usize) -> usize {
    len.div_ceil(workers.max(1)).max(1)
}

async fn parse_chunks(context: &Arc<PipelineContext>, chunks: &[ChunkRecord]) -> Result<ParsedRegion, RegionError> {
    let targets: Arc<HashSet<ChunkCoordinate>> = Arc::new(chunks.iter().map(|c| c.coord).collect());

    let mut tasks = Vec::new();
    for batch in chunks.chunks(batch_size(chunks.len(), context.pool.workers())) {
        let coords: Vec<ChunkCoordinate> = batch.iter().map(|c| c.coord).collect();
        let provider = context.provider.clone();
        let targets = targets.clone();
        tasks.push(context.pool.spawn(async move { parse_batch(&*provider, &coords, &targets) }));
    }

    let mut parsed = ParsedRegion {
        targets: Vec::with_capacity(chunks.len()),
        payloads: HashMap::new(),
    };
    for task in tasks {
        let (chunks, neighbors) = task.await?;
        for chunk in chunks {
            parsed.targets.push(chunk.coord);
            parsed.payloads.insert(chunk.coord, chunk);
        }
        for chunk in neighbors {
            parsed.payloads.entry(chunk.coord).or_insert(chunk);
        }
    }
    Ok(parsed)
}

/// Read a batch of chunks and, for each, its northern neighbor when that
/// neighbor is not being rendered itself.
fn parse_batch(
    provider: &dyn WorldProvider,
    coords: &[ChunkCoordinate],
    targets: &HashSet<ChunkCoordinate>,
) -> (Vec<ChunkPayload>, Vec<ChunkPayload>) {
    let mut chunks = Vec::with_capacity(coords.len());
    let mut neighbors = Vec::new();

    for &coord in coords {
        match provider.read_chunk(coord) {
            Ok(Some(chunk)) => chunks.push(chunk),
            Ok(None) => debug!("chunk {} vanished since discovery", coord),
            Err(e) => warn!("failed to read chunk {}: {}", coord, e),
        }

        let north = coord.north();
        if targets.contains(&north) || !provider.chunk_exists(north) {
            continue;
        }
        match provider.read_chunk(north) {
            Ok(Some(chunk)) => neighbors.push(chunk),
            Ok(None) => {}
            Err(e) => debug!("northern neighbor {} unreadable: {}", north, e),
        }
    }

    (chunks, neighbors)
}

async fn rasterize_chunks(
    context: &Arc<PipelineContext>,
    parsed: ParsedRegion,
) -> Result<Vec<ChunkRaster>, RegionError> {
    let ParsedRegion { targets, payloads } = parsed;
    let payloads = Arc::new(payloads);

    let mut tasks = Vec::new();
    for batch in targets.chunks(batch_size(targets.len(), context.pool.workers())) {
        let batch = batch.to_vec();
        let payloads = payloads.clone();
        tasks.push(context.pool.spawn(async move {
            batch
                .iter()
                .filter_map(|coord| {
                    let chunk = payloads.get(coord)?;
                    Some(rasterize_chunk(chunk, payloads.get(&coord.north())))
                })
                .collect::<Vec<_>>()
        }));
    }

    let mut rasters = Vec::with_capacity(targets.len());
    for task in tasks {
        rasters.extend(task.await?);
    }
    Ok(rasters)
}

/// Copy a chunk's pixels into its slot of the region tile
fn blit(image: &mut RgbaImage, raster: &ChunkRaster) {
    let (ox, oz) = raster.coord.pixel_offset();
    let side = CHUNK_SIZE as usize;
    for z in 0..side {
        for x in 0..side {
            image.put_pixel(ox + x as u32, oz + z as u32, raster.pixel(x, z));
        }
    }
}
