//! Palette-indexed chunk section storage with legacy byte/nibble interop.
//!
//! A [`ChunkSection`] maps block states to compact palette indices packed into
//! a [`BitStorage`], growing the bit width as new states appear. The
//! [`ChunkSectionRegistry`] owns every live section of a world and is the entry
//! point the host's world-access code calls through [`BlockAccess`].

pub mod bit_storage;
pub mod block_state;
pub mod error;
pub mod host;
pub mod legacy;
pub mod palette;
pub mod registry;
pub mod section;

pub use bit_storage::BitStorage;
pub use block_state::BlockState;
pub use error::StorageError;
pub use host::{BlockAccess, ChunkLifecycle};
pub use legacy::{
    LEGACY_ID_BITS, LegacyError, LegacySection, from_legacy, from_legacy_section, to_legacy,
    to_legacy_lossy,
};
pub use palette::{IndexFor, Palette, PaletteMode};
pub use registry::{BlockPos, ChunkSectionRegistry, RegistryError, RegistryStats, SectionCoord};
pub use section::{
    ChunkSection, SECTION_SIZE, SECTION_VOLUME, SECTIONS_PER_CHUNK, SectionSnapshot,
};
