//! Owner of every live section, keyed by [`SectionCoord`].
//!
//! The [`ChunkSectionRegistry`] is a concurrent map from section coordinates
//! to shared [`ChunkSection`] handles. Different sections are read and written
//! from any thread without a registry-wide lock; a handle taken before an
//! unload stays valid and simply becomes detached from the world.

use std::sync::Arc;

use chunkapi_config::StorageConfig;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rustc_hash::FxBuildHasher;

use crate::block_state::BlockState;
use crate::error::StorageError;
use crate::legacy::{self, LegacyError, LegacySection};
use crate::palette::PaletteMode;
use crate::section::{ChunkSection, SECTION_SIZE, SECTIONS_PER_CHUNK};

/// Identifies one section: the chunk column plus the vertical section index.
///
/// `section_y` is not limited to the vanilla `0..16` range; negative and
/// taller columns resolve the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionCoord {
    /// Chunk-grid X.
    pub chunk_x: i32,
    /// Chunk-grid Z.
    pub chunk_z: i32,
    /// Section index within the column.
    pub section_y: i32,
}

impl SectionCoord {
    /// Creates a section coordinate.
    pub fn new(chunk_x: i32, chunk_z: i32, section_y: i32) -> Self {
        Self {
            chunk_x,
            chunk_z,
            section_y,
        }
    }

    /// The vanilla sections `0..16` of a chunk column.
    pub fn column(chunk_x: i32, chunk_z: i32) -> impl Iterator<Item = SectionCoord> {
        (0..SECTIONS_PER_CHUNK).map(move |section_y| Self::new(chunk_x, chunk_z, section_y))
    }

    /// Returns `true` if this section belongs to the given column.
    pub fn in_column(&self, chunk_x: i32, chunk_z: i32) -> bool {
        self.chunk_x == chunk_x && self.chunk_z == chunk_z
    }
}

/// A world voxel coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockPos {
    /// World X.
    pub x: i32,
    /// World Y.
    pub y: i32,
    /// World Z.
    pub z: i32,
}

impl BlockPos {
    /// Creates a world position.
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The section containing this position.
    ///
    /// Arithmetic shifts floor toward negative infinity, so `x = -1` lands in
    /// chunk `-1`.
    pub fn section(self) -> SectionCoord {
        SectionCoord::new(self.x >> 4, self.z >> 4, self.y >> 4)
    }

    /// Local `(x, y, z)` within the containing section.
    pub fn local(self) -> (usize, usize, usize) {
        let mask = SECTION_SIZE as i32 - 1;
        (
            (self.x & mask) as usize,
            (self.y & mask) as usize,
            (self.z & mask) as usize,
        )
    }
}

/// Errors raised by [`ChunkSectionRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No section is loaded at this coordinate.
    #[error("section {0:?} is not loaded")]
    SectionNotLoaded(SectionCoord),
    /// A section already exists at this coordinate.
    #[error("section {0:?} is already loaded")]
    AlreadyLoaded(SectionCoord),
    /// The section rejected the operation.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A section could not be converted to legacy form.
    #[error(transparent)]
    Legacy(#[from] LegacyError),
}

/// Aggregate figures over all loaded sections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Loaded sections.
    pub sections: usize,
    /// Loaded sections holding only air.
    pub empty_sections: usize,
    /// Loaded sections in direct mode.
    pub direct_sections: usize,
    /// Total packed storage across all sections, in bytes.
    pub storage_bytes: usize,
}

/// Owns all loaded sections and routes world coordinates to them.
///
/// Passed around by reference (or `Arc`); there is no global instance.
pub struct ChunkSectionRegistry {
    sections: DashMap<SectionCoord, Arc<ChunkSection>, FxBuildHasher>,
    config: StorageConfig,
}

impl ChunkSectionRegistry {
    /// Creates an empty registry. Every section it creates uses `config`.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            sections: DashMap::with_hasher(FxBuildHasher),
            config,
        }
    }

    /// The storage settings new sections are created with.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Creates an empty section at `coord`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyLoaded`] if a section exists there.
    pub fn load_section(&self, coord: SectionCoord) -> Result<Arc<ChunkSection>, RegistryError> {
        let section = ChunkSection::new(&self.config)?;
        self.insert_section(coord, section)
    }

    /// Registers an existing section at `coord`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyLoaded`] if a section exists there; the
    /// existing section is left in place.
    pub fn insert_section(
        &self,
        coord: SectionCoord,
        section: ChunkSection,
    ) -> Result<Arc<ChunkSection>, RegistryError> {
        match self.sections.entry(coord) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyLoaded(coord)),
            Entry::Vacant(vacant) => {
                let section = Arc::new(section);
                vacant.insert(Arc::clone(&section));
                Ok(section)
            }
        }
    }

    /// Shared handle to the section at `coord`, if loaded.
    pub fn get_section(&self, coord: SectionCoord) -> Option<Arc<ChunkSection>> {
        self.sections.get(&coord).map(|entry| Arc::clone(entry.value()))
    }

    /// Removes the section at `coord`, returning it if it was loaded.
    pub fn unload_section(&self, coord: SectionCoord) -> Option<Arc<ChunkSection>> {
        self.sections.remove(&coord).map(|(_, section)| section)
    }

    /// Removes every section of a column, whatever its `section_y`.
    ///
    /// Returns the number of sections removed.
    pub fn unload_chunk(&self, chunk_x: i32, chunk_z: i32) -> usize {
        let removed = self
            .column_coords(chunk_x, chunk_z)
            .into_iter()
            .filter(|coord| self.sections.remove(coord).is_some())
            .count();
        tracing::info!(chunk_x, chunk_z, removed, "unloaded chunk column");
        removed
    }

    /// Reads the state at a world position.
    ///
    /// # Errors
    ///
    /// [`RegistryError::SectionNotLoaded`] if the containing section is absent.
    pub fn get_block_state(&self, pos: BlockPos) -> Result<BlockState, RegistryError> {
        let section = self.require(pos.section())?;
        let (x, y, z) = pos.local();
        Ok(section.get_block_state(x, y, z)?)
    }

    /// Writes the state at a world position and returns the previous state.
    ///
    /// # Errors
    ///
    /// [`RegistryError::SectionNotLoaded`] if the containing section is absent,
    /// [`RegistryError::Storage`] if the section rejects the state.
    pub fn set_block_state(
        &self,
        pos: BlockPos,
        state: BlockState,
    ) -> Result<BlockState, RegistryError> {
        let section = self.require(pos.section())?;
        let (x, y, z) = pos.local();
        Ok(section.set_block_state(x, y, z, state)?)
    }

    /// Returns `true` if the section holds only air or is not loaded.
    pub fn is_section_empty(&self, coord: SectionCoord) -> bool {
        self.sections
            .get(&coord)
            .is_none_or(|section| section.is_empty())
    }

    /// Loads a column from legacy sections, one `(section_y, data)` per entry.
    ///
    /// The vanilla sections `0..16` missing from `sections` are created empty.
    /// A section whose arrays are corrupt is replaced by an empty one and a
    /// warning is logged; the rest of the column still loads.
    ///
    /// Returns the number of sections that had to be replaced.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyLoaded`] if any section of the column is
    /// loaded or `sections` names a `section_y` twice. The column is left
    /// exactly as it was: sections inserted by this call are removed again.
    pub fn load_chunk_from_legacy(
        &self,
        chunk_x: i32,
        chunk_z: i32,
        sections: &[(i32, LegacySection)],
    ) -> Result<usize, RegistryError> {
        if let Some(coord) = self.column_coords(chunk_x, chunk_z).into_iter().next() {
            return Err(RegistryError::AlreadyLoaded(coord));
        }

        let mut recovered = 0;
        let mut column = Vec::with_capacity(sections.len().max(SECTIONS_PER_CHUNK as usize));
        for (section_y, data) in sections {
            let coord = SectionCoord::new(chunk_x, chunk_z, *section_y);
            let section = match legacy::from_legacy_section(&self.config, data) {
                Ok(section) => section,
                Err(err) => {
                    tracing::warn!(
                        chunk_x,
                        chunk_z,
                        section_y,
                        error = %err,
                        "corrupt legacy section, loading as air"
                    );
                    recovered += 1;
                    ChunkSection::new(&self.config)?
                }
            };
            column.push((coord, section));
        }
        for coord in SectionCoord::column(chunk_x, chunk_z) {
            if !column.iter().any(|(c, _)| *c == coord) {
                column.push((coord, ChunkSection::new(&self.config)?));
            }
        }

        self.insert_column(column)?;
        tracing::debug!(chunk_x, chunk_z, sections = sections.len(), recovered, "loaded legacy chunk");
        Ok(recovered)
    }

    /// Inserts a batch of sections, all or nothing.
    ///
    /// On the first occupied coordinate every section this call inserted is
    /// removed again and [`RegistryError::AlreadyLoaded`] is returned.
    pub(crate) fn insert_column(
        &self,
        column: Vec<(SectionCoord, ChunkSection)>,
    ) -> Result<(), RegistryError> {
        let mut inserted: Vec<(SectionCoord, Arc<ChunkSection>)> = Vec::with_capacity(column.len());
        for (coord, section) in column {
            match self.insert_section(coord, section) {
                Ok(handle) => inserted.push((coord, handle)),
                Err(err) => {
                    for (coord, ours) in &inserted {
                        self.sections
                            .remove_if(coord, |_, current| Arc::ptr_eq(current, ours));
                    }
                    tracing::warn!(
                        rolled_back = inserted.len(),
                        error = %err,
                        "column insert failed"
                    );
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Encodes every non-empty section of a column, ordered by `section_y`.
    ///
    /// States outside the 12-bit legacy ID space are written as air with a
    /// warning.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Legacy`] if a section's palette and storage disagree.
    pub fn save_chunk_to_legacy(
        &self,
        chunk_x: i32,
        chunk_z: i32,
    ) -> Result<Vec<(i32, LegacySection)>, RegistryError> {
        let mut coords = self.column_coords(chunk_x, chunk_z);
        coords.sort_unstable();

        let mut saved = Vec::with_capacity(coords.len());
        for coord in coords {
            let Some(section) = self.get_section(coord) else {
                continue;
            };
            if section.is_empty() {
                continue;
            }
            let (data, substituted) = legacy::to_legacy_lossy(&section)?;
            if substituted > 0 {
                tracing::warn!(
                    chunk_x,
                    chunk_z,
                    section_y = coord.section_y,
                    substituted,
                    "saved section with unencodable states replaced by air"
                );
            }
            saved.push((coord.section_y, data));
        }
        Ok(saved)
    }

    /// Number of loaded sections.
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Coordinates of every loaded section, in no particular order.
    pub fn loaded_coords(&self) -> Vec<SectionCoord> {
        self.sections.iter().map(|entry| *entry.key()).collect()
    }

    /// Collects [`RegistryStats`] over one snapshot per section.
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for entry in self.sections.iter() {
            let snapshot = entry.value().snapshot();
            stats.sections += 1;
            stats.storage_bytes += snapshot.storage_bytes();
            if snapshot.is_empty() {
                stats.empty_sections += 1;
            }
            if snapshot.mode() == PaletteMode::Direct {
                stats.direct_sections += 1;
            }
        }
        stats
    }

    fn require(&self, coord: SectionCoord) -> Result<Arc<ChunkSection>, RegistryError> {
        self.get_section(coord)
            .ok_or(RegistryError::SectionNotLoaded(coord))
    }

    fn column_coords(&self, chunk_x: i32, chunk_z: i32) -> Vec<SectionCoord> {
        self.sections
            .iter()
            .map(|entry| *entry.key())
            .filter(|coord| coord.in_column(chunk_x, chunk_z))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
