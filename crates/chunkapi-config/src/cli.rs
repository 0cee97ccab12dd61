//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, WidthPolicy};

/// ChunkAPI tool command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "chunkapi", about = "Paletted chunk section storage workload")]
pub struct CliArgs {
    /// Initial bit width for new sections.
    #[arg(long)]
    pub initial_bits: Option<u8>,

    /// Width of the global block-state ID space (direct-mode threshold).
    #[arg(long)]
    pub global_id_bits: Option<u8>,

    /// Palette width growth policy.
    #[arg(long, value_enum)]
    pub width_policy: Option<WidthPolicy>,

    /// Chunk columns loaded around the origin, per axis.
    #[arg(long)]
    pub chunk_radius: Option<u32>,

    /// Number of concurrent reader threads.
    #[arg(long)]
    pub reader_threads: Option<u32>,

    /// Number of block writes performed by the writer thread.
    #[arg(long)]
    pub writes: Option<u32>,

    /// Seed for the workload's random writes.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(bits) = args.initial_bits {
            self.storage.initial_bits = bits;
        }
        if let Some(bits) = args.global_id_bits {
            self.storage.global_id_bits = bits;
        }
        if let Some(policy) = args.width_policy {
            self.storage.width_policy = policy;
        }
        if let Some(radius) = args.chunk_radius {
            self.workload.chunk_radius = radius;
        }
        if let Some(threads) = args.reader_threads {
            self.workload.reader_threads = threads;
        }
        if let Some(writes) = args.writes {
            self.workload.writes = writes;
        }
        if let Some(seed) = args.seed {
            self.workload.seed = seed;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
