use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;

use voxmap::host::host_channel;
use voxmap::synthetic::{generate_world, TerrainParams};
use voxmap::{MapConfig, Renderer, SeedList};

#[derive(Parser, Debug)]
#[command(name = "voxmap")]
#[command(about = "Render a synthetic voxel world into region map tiles")]
struct Args {
    /// Configuration file (created with defaults if missing)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Re-render everything instead of only stale chunks
    #[arg(long)]
    full: bool,

    /// World seed
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Radius of the generated world in chunks
    #[arg(short, long, default_value = "24")]
    radius: i32,

    /// Tile output directory (overrides the config)
    #[arg(short, long)]
    tiles: Option<PathBuf>,

    /// Worker threads (overrides the config, <= 0 for auto)
    #[arg(short, long)]
    workers: Option<i32>,

    /// Minutes to wait for the pass before giving up
    #[arg(long, default_value = "10")]
    timeout: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MapConfig::load_or_default(path),
        None => MapConfig::default(),
    };
    if let Some(dir) = args.tiles {
        config.tile_dir = Some(dir);
    }
    if let Some(workers) = args.workers {
        config.worker_threads = workers;
    }
    config.validate()?;

    println!("Generating world (seed {}, radius {} chunks)...", args.seed, args.radius);
    let start = Instant::now();
    let world = Arc::new(generate_world(args.seed, args.radius, &TerrainParams::default()));
    println!("  {} chunks in {:.2?}", world.len(), start.elapsed());

    let (host, mut queue) = host_channel();
    let renderer = Renderer::new(config, world.clone(), host)?;

    match renderer.seeds(&*world) {
        SeedList::Configured(seeds) => println!("Discovery seeds: {:?}", seeds),
        SeedList::Default(spawn) => println!("Discovery seed: world spawn {}", spawn),
    }

    let start = Instant::now();
    if args.full {
        println!("Rendering all regions...");
        renderer.render_full();
    } else {
        println!("Rendering stale regions...");
        renderer.render_incremental();
    }

    // This thread owns the world: serve renderer requests until the pass ends
    let finished = queue.serve_until(&*world, Duration::from_secs(args.timeout * 60), || {
        renderer.stats().passes_finished >= 1
    });
    if !finished {
        eprintln!(
            "Render pass did not finish within {} minutes ({} tasks still outstanding)",
            args.timeout,
            renderer.outstanding()
        );
    }

    let stats = renderer.stats();
    println!("Pass finished in {:.2?}", start.elapsed());
    println!("  regions discovered: {}", stats.regions_discovered);
    println!("  regions rewritten:  {}", stats.regions_rewritten);
    println!("  regions up to date: {}", stats.regions_skipped);
    println!("  regions failed:     {}", stats.regions_failed);
    println!("  chunks rendered:    {}", stats.chunks_rendered);

    let tiles = renderer.tiles().list_tiles()?;
    println!("{} tiles in {}", tiles.len(), renderer.tiles().dir().display());

    let report = renderer.shutdown();
    if report.abandoned > 0 {
        eprintln!("Abandoned {} outstanding tasks on shutdown", report.abandoned);
    }

    Ok(())
}
