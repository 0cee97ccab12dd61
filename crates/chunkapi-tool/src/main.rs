//! Workload driver for the chunk section storage engine.
//!
//! Loads a square of chunk columns, lays down simple terrain, then runs one
//! writer thread against several reader threads before saving every column to
//! the legacy layout and loading it back.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p chunkapi-tool -- --chunk-radius 4 --reader-threads 8`.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use chunkapi_config::{CliArgs, Config, WorkloadConfig, default_config_dir};
use chunkapi_storage::{
    BlockAccess, BlockPos, BlockState, ChunkLifecycle, ChunkSectionRegistry, LegacySection,
    RegistryError, SECTION_SIZE, SECTIONS_PER_CHUNK, SectionCoord,
};
use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{error, info, warn};

const STONE: BlockState = BlockState(1);
const DIRT: BlockState = BlockState(3);
const GRASS: BlockState = BlockState(2);

/// Sections filled solid with stone at the bottom of each column.
const STONE_SECTIONS: i32 = 3;

/// Common states written by the workload; rarer IDs are drawn from the whole space.
const COMMON_STATES: [BlockState; 6] = [
    BlockState::AIR,
    STONE,
    GRASS,
    DIRT,
    BlockState(4),
    BlockState(12),
];

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .or_else(default_config_dir)
        .unwrap_or_else(|| ".".into());

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    chunkapi_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = config.storage.validate() {
        error!("Invalid storage settings: {e}");
        return ExitCode::FAILURE;
    }

    info!(
        initial_bits = config.storage.initial_bits,
        global_id_bits = config.storage.global_id_bits,
        policy = ?config.storage.width_policy,
        "Starting chunk section workload"
    );

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Workload failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> Result<(), RegistryError> {
    let registry = ChunkSectionRegistry::new(config.storage.clone());
    let columns = columns(&config.workload);

    let start = Instant::now();
    for &(chunk_x, chunk_z) in &columns {
        registry.on_chunk_load(chunk_x, chunk_z)?;
        lay_terrain(&registry, chunk_x, chunk_z)?;
    }
    info!(
        columns = columns.len(),
        sections = registry.section_count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Loaded terrain"
    );

    run_mixed_workload(&registry, config, &columns)?;
    log_stats(&registry, "after workload");

    legacy_round_trip(&registry, &columns)?;
    log_stats(&registry, "after legacy reload");

    for &(chunk_x, chunk_z) in &columns {
        registry.on_chunk_unload(chunk_x, chunk_z);
    }
    info!(sections = registry.section_count(), "Unloaded all columns");
    Ok(())
}

/// Chunk columns in the square `-radius..=radius` on both axes.
fn columns(workload: &WorkloadConfig) -> Vec<(i32, i32)> {
    let radius = workload.chunk_radius as i32;
    (-radius..=radius)
        .flat_map(|x| (-radius..=radius).map(move |z| (x, z)))
        .collect()
}

/// Stone sections at the bottom, then a dirt layer capped with grass.
fn lay_terrain(
    registry: &ChunkSectionRegistry,
    chunk_x: i32,
    chunk_z: i32,
) -> Result<(), RegistryError> {
    for section_y in 0..STONE_SECTIONS {
        let coord = SectionCoord::new(chunk_x, chunk_z, section_y);
        if let Some(section) = registry.get_section(coord) {
            section.fill(STONE)?;
        }
    }

    let surface = STONE_SECTIONS * SECTION_SIZE as i32;
    let size = SECTION_SIZE as i32;
    for local_x in 0..size {
        for local_z in 0..size {
            let x = chunk_x * size + local_x;
            let z = chunk_z * size + local_z;
            for y in surface..surface + 3 {
                registry.set_block_state(BlockPos::new(x, y, z), DIRT)?;
            }
            registry.set_block_state(BlockPos::new(x, surface + 3, z), GRASS)?;
        }
    }
    Ok(())
}

/// One writer thread against `reader_threads` snapshot readers.
fn run_mixed_workload(
    registry: &ChunkSectionRegistry,
    config: &Config,
    columns: &[(i32, i32)],
) -> Result<(), RegistryError> {
    let workload = &config.workload;
    let id_space = config.storage.global_id_count().min(u64::from(u32::MAX)) as u32;
    let done = AtomicBool::new(false);
    let snapshots_read = AtomicU64::new(0);
    let start = Instant::now();

    let writer_result = std::thread::scope(|scope| {
        for index in 0..workload.reader_threads {
            let spawned = std::thread::Builder::new()
                .name(format!("reader-{index}"))
                .spawn_scoped(scope, || read_until_done(registry, columns, &done, &snapshots_read));
            if let Err(e) = spawned {
                warn!("Failed to spawn reader thread: {e}");
            }
        }

        let result = write_random(registry, workload, columns, id_space);
        done.store(true, Ordering::Release);
        result
    });
    let written = writer_result?;

    info!(
        written,
        snapshots = snapshots_read.load(Ordering::Relaxed),
        readers = workload.reader_threads,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Mixed workload finished"
    );
    Ok(())
}

fn write_random(
    registry: &dyn BlockAccess,
    workload: &WorkloadConfig,
    columns: &[(i32, i32)],
    id_space: u32,
) -> Result<u32, RegistryError> {
    let mut rng = ChaCha8Rng::seed_from_u64(workload.seed);
    let size = SECTION_SIZE as i32;
    let height = SECTIONS_PER_CHUNK * size;

    for _ in 0..workload.writes {
        let (chunk_x, chunk_z) = columns[rng.random_range(0..columns.len())];
        let pos = BlockPos::new(
            chunk_x * size + rng.random_range(0..size),
            rng.random_range(0..height),
            chunk_z * size + rng.random_range(0..size),
        );
        let state = if rng.random_bool(0.9) {
            COMMON_STATES[rng.random_range(0..COMMON_STATES.len())]
        } else {
            BlockState(rng.random_range(0..id_space))
        };
        registry.set_block_state(pos, state)?;
    }
    Ok(workload.writes)
}

/// Counts non-air voxels in random sections until the writer finishes.
fn read_until_done(
    registry: &ChunkSectionRegistry,
    columns: &[(i32, i32)],
    done: &AtomicBool,
    snapshots_read: &AtomicU64,
) {
    let mut rng = rand::rng();
    let mut local = 0u64;
    while !done.load(Ordering::Acquire) {
        let (chunk_x, chunk_z) = columns[rng.random_range(0..columns.len())];
        let section_y = rng.random_range(0..SECTIONS_PER_CHUNK);
        let Some(section) = registry.get_section(SectionCoord::new(chunk_x, chunk_z, section_y))
        else {
            continue;
        };

        let snapshot = section.snapshot();
        let counted = snapshot
            .states()
            .filter(|state| state.as_ref().is_ok_and(|s| !s.is_air()))
            .count();
        if counted != snapshot.non_default_count() {
            error!(
                chunk_x,
                chunk_z,
                section_y,
                counted,
                tracked = snapshot.non_default_count(),
                "Snapshot disagrees with its non-air count"
            );
        }
        local += 1;
    }
    snapshots_read.fetch_add(local, Ordering::Relaxed);
}

/// Saves every column to legacy arrays, unloads it, and loads it back.
fn legacy_round_trip(
    registry: &ChunkSectionRegistry,
    columns: &[(i32, i32)],
) -> Result<(), RegistryError> {
    let start = Instant::now();
    let mut saved: Vec<((i32, i32), Vec<(i32, LegacySection)>)> = Vec::with_capacity(columns.len());
    for &(chunk_x, chunk_z) in columns {
        saved.push(((chunk_x, chunk_z), registry.save_chunk_to_legacy(chunk_x, chunk_z)?));
        registry.unload_chunk(chunk_x, chunk_z);
    }
    let bytes: usize = saved
        .iter()
        .flat_map(|(_, sections)| sections)
        .map(|(_, s)| s.blocks.len() + s.add.as_ref().map_or(0, Vec::len))
        .sum();

    let mut recovered = 0;
    for ((chunk_x, chunk_z), sections) in &saved {
        recovered += registry.load_chunk_from_legacy(*chunk_x, *chunk_z, sections)?;
    }
    for ((chunk_x, chunk_z), sections) in &saved {
        if registry.save_chunk_to_legacy(*chunk_x, *chunk_z)? != *sections {
            warn!(chunk_x, chunk_z, "Legacy round trip changed column contents");
        }
    }

    info!(
        columns = saved.len(),
        legacy_bytes = bytes,
        recovered,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Legacy round trip complete"
    );
    Ok(())
}

fn log_stats(registry: &ChunkSectionRegistry, stage: &str) {
    let stats = registry.stats();
    info!(
        stage,
        sections = stats.sections,
        empty = stats.empty_sections,
        direct = stats.direct_sections,
        storage_kib = stats.storage_bytes / 1024,
        "Registry stats"
    );
}
