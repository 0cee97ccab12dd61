//! Configuration for the ChunkAPI section storage.
//!
//! Settings persist to disk as `config.ron`, accept CLI overrides via clap,
//! and are validated once at startup before any section is created.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, StorageConfig, WidthPolicy, WorkloadConfig, default_config_dir,
};
pub use error::ConfigError;
