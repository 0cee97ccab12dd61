//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Widest packed element the section storage supports.
const MAX_BITS: u8 = 32;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Section storage layout.
    pub storage: StorageConfig,
    /// Synthetic workload run by the tool binary.
    pub workload: WorkloadConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// How a palette picks its bit width when it outgrows the current one.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum WidthPolicy {
    /// Smallest width `w` with `2^w >= palette size`.
    #[default]
    Exact,
    /// Round up to 1, 2, 4, 8, 16 or 32 bits so no element straddles a word.
    Aligned,
}

/// Section storage configuration.
///
/// Supplied once at startup; sections never re-derive these values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Bit width a freshly created section starts with (0 = uniform, no index storage).
    pub initial_bits: u8,
    /// Width of the global block-state ID space. A palette that would need
    /// this many bits switches the section to direct mode.
    pub global_id_bits: u8,
    /// Growth step used when the palette overflows.
    pub width_policy: WidthPolicy,
}

/// Workload settings for the tool binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Chunk columns loaded around the origin, per axis.
    pub chunk_radius: u32,
    /// Number of concurrent reader threads.
    pub reader_threads: u32,
    /// Number of block writes performed by the writer thread.
    pub writes: u32,
    /// Seed for the write pattern.
    pub seed: u64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            initial_bits: 0,
            global_id_bits: 12,
            width_policy: WidthPolicy::Exact,
        }
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            chunk_radius: 2,
            reader_threads: 3,
            writes: 50_000,
            seed: 42,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl StorageConfig {
    /// Checks that the widths describe a usable layout.
    ///
    /// The global ID space must fit a packed element, and the initial width
    /// must stay below the direct-mode threshold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.global_id_bits == 0 || self.global_id_bits > MAX_BITS {
            return Err(ConfigError::Invalid(format!(
                "global_id_bits must be in 1..={MAX_BITS}, got {}",
                self.global_id_bits
            )));
        }
        if self.initial_bits >= self.global_id_bits {
            return Err(ConfigError::Invalid(format!(
                "initial_bits ({}) must be below global_id_bits ({})",
                self.initial_bits, self.global_id_bits
            )));
        }
        Ok(())
    }

    /// Number of distinct global IDs the configured ID space can hold.
    pub fn global_id_count(&self) -> u64 {
        1u64 << self.global_id_bits
    }
}

/// Default directory holding `config.ron`, under the platform config dir.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chunkapi"))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.storage.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Re-reads `config.ron`: returns `Some(new_config)` if the file changed, `None` otherwise.
    ///
    /// Storage settings only apply to sections created afterwards.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.storage.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("global_id_bits: 12"));
        assert!(ron_str.contains("width_policy: Exact"));
    }

    #[test]
    fn test_default_storage_is_valid() {
        let storage = StorageConfig::default();
        assert!(storage.validate().is_ok());
        assert_eq!(storage.global_id_count(), 4096);
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.storage.width_policy = WidthPolicy::Aligned;
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let config: Config = ron::from_str("(storage: (initial_bits: 4))").unwrap();
        assert_eq!(config.storage.initial_bits, 4);
        assert_eq!(config.storage.global_id_bits, 12);
        assert_eq!(config.workload, WorkloadConfig::default());
    }

    #[test]
    fn test_zero_global_bits_rejected() {
        let storage = StorageConfig {
            global_id_bits: 0,
            ..StorageConfig::default()
        };
        assert!(matches!(storage.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_oversized_global_bits_rejected() {
        let storage = StorageConfig {
            global_id_bits: 33,
            ..StorageConfig::default()
        };
        assert!(matches!(storage.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_initial_bits_must_stay_below_threshold() {
        let storage = StorageConfig {
            initial_bits: 12,
            global_id_bits: 12,
            ..StorageConfig::default()
        };
        assert!(matches!(storage.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.initial_bits = 4;
        config.workload.reader_threads = 8;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_load_rejects_invalid_storage() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.ron"),
            "(storage: (initial_bits: 20, global_id_bits: 16))",
        )
        .unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.storage.global_id_bits = 16;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().storage.global_id_bits, 16);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }
}
