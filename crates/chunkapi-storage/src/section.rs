//! Palette-compressed storage for one 16×16×16 chunk section.
//!
//! A section pairs a [`Palette`] with a [`BitStorage`] of palette indices and
//! keeps both behind a single `RwLock<Arc<_>>`:
//!
//! - reads run concurrently under the read lock, or on a [`SectionSnapshot`]
//!   that holds the published pair without any lock;
//! - writes are serialized by the write lock. A write that reuses a known
//!   state patches the published pair in place (copy-on-write if a snapshot
//!   still shares it); a write that grows the palette builds a complete new
//!   pair, re-encoding storage at the wider width, and swaps it in.
//!
//! Readers therefore only ever observe a palette together with the storage
//! built for it.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chunkapi_config::StorageConfig;

use crate::bit_storage::BitStorage;
use crate::block_state::BlockState;
use crate::error::StorageError;
use crate::palette::{IndexFor, Palette, PaletteMode};

/// Side length of a section in voxels.
pub const SECTION_SIZE: usize = 16;

/// Total number of voxels in a section (16³).
pub const SECTION_VOLUME: usize = SECTION_SIZE * SECTION_SIZE * SECTION_SIZE;

/// Sections in a vanilla chunk column (section Y `0..16`).
pub const SECTIONS_PER_CHUNK: i32 = 16;

/// One consistent (palette, storage) pair.
#[derive(Clone, Debug)]
struct SectionData {
    palette: Palette,
    storage: BitStorage,
    /// Positions not holding [`BlockState::AIR`].
    non_default: u32,
}

impl SectionData {
    fn empty(config: &StorageConfig) -> Result<Self, StorageError> {
        Ok(Self {
            palette: Palette::new(config),
            storage: BitStorage::new(config.initial_bits, SECTION_VOLUME)?,
            non_default: 0,
        })
    }

    fn state_at(&self, position: usize) -> Result<BlockState, StorageError> {
        let index = self.storage.get(position)?;
        self.palette.state_for(index)
    }

    /// Writes a state whose index is already known and fits the storage.
    fn write_index(
        &mut self,
        position: usize,
        index: u32,
        previous: BlockState,
        state: BlockState,
    ) -> Result<(), StorageError> {
        self.storage.set(position, index)?;
        self.track_default(previous, state);
        Ok(())
    }

    /// Writes a state that may be new to the palette, resizing as needed.
    fn insert(
        &mut self,
        position: usize,
        previous: BlockState,
        state: BlockState,
    ) -> Result<(), StorageError> {
        let index = match self.palette.index_for(state)? {
            IndexFor::Present(index) => index,
            IndexFor::Appended { index, bits } => {
                if bits > self.storage.bits() {
                    tracing::debug!(
                        from = self.storage.bits(),
                        to = bits,
                        palette_len = self.palette.entry_count(),
                        "resizing section storage"
                    );
                    self.storage = self.storage.with_width(bits)?;
                }
                index
            }
            IndexFor::Overflow => {
                self.make_direct()?;
                state.global_id()
            }
        };
        self.write_index(position, index, previous, state)
    }

    /// Re-encodes every palette index as its global ID and drops the palette table.
    fn make_direct(&mut self) -> Result<(), StorageError> {
        let palette = &self.palette;
        let storage = self.storage.remap(palette.global_id_bits(), |index| {
            palette.state_for(index).map(BlockState::global_id)
        })?;
        tracing::info!(
            palette_len = palette.entry_count(),
            bits = palette.global_id_bits(),
            "section switched to direct mode"
        );
        self.palette.make_direct();
        self.storage = storage;
        Ok(())
    }

    fn track_default(&mut self, previous: BlockState, state: BlockState) {
        match (previous.is_air(), state.is_air()) {
            (true, false) => self.non_default += 1,
            (false, true) => self.non_default -= 1,
            _ => {}
        }
    }
}

/// A 16×16×16 block of voxels, safe to share between threads.
///
/// Local coordinates are in `[0, 16)` per axis; positions are laid out
/// `y << 8 | z << 4 | x`, the order the legacy arrays use.
#[derive(Debug)]
pub struct ChunkSection {
    data: RwLock<Arc<SectionData>>,
    config: StorageConfig,
    /// Loaded with a high-nibble ID array; saving writes it back even if all zero.
    extended_ids: bool,
}

impl ChunkSection {
    /// Creates a section filled with air at the configured initial width.
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        Ok(Self::from_data(SectionData::empty(config)?, config))
    }

    /// Builds a section from all [`SECTION_VOLUME`] states at once.
    ///
    /// The palette is populated first and the storage allocated once at the
    /// final width, which may be several bits above the initial width, or the
    /// global ID width if the input has too many distinct states.
    ///
    /// # Errors
    ///
    /// [`StorageError::LengthMismatch`] if `states` is not exactly
    /// [`SECTION_VOLUME`] long, [`StorageError::StateOutOfIdSpace`] for a state
    /// outside the configured ID space.
    pub fn from_states(config: &StorageConfig, states: &[BlockState]) -> Result<Self, StorageError> {
        if states.len() != SECTION_VOLUME {
            return Err(StorageError::LengthMismatch {
                expected: SECTION_VOLUME,
                actual: states.len(),
            });
        }

        let mut palette = Palette::new(config);
        let mut indices = Vec::with_capacity(SECTION_VOLUME);
        for &state in states {
            match palette.index_for(state)? {
                IndexFor::Present(index) | IndexFor::Appended { index, .. } => indices.push(index),
                IndexFor::Overflow => {
                    palette.make_direct();
                    break;
                }
            }
        }
        if palette.mode() == PaletteMode::Direct {
            indices.clear();
            for &state in states {
                if !state.fits_in(palette.global_id_bits()) {
                    return Err(StorageError::StateOutOfIdSpace {
                        state,
                        bits: palette.global_id_bits(),
                    });
                }
                indices.push(state.global_id());
            }
        }

        let mut storage = BitStorage::new(palette.bits(), SECTION_VOLUME)?;
        for (position, &index) in indices.iter().enumerate() {
            storage.set(position, index)?;
        }
        let non_default = states.iter().filter(|s| !s.is_air()).count() as u32;

        tracing::debug!(
            bits = palette.bits(),
            palette_len = palette.entry_count(),
            non_default,
            "built section from batch"
        );
        Ok(Self::from_data(
            SectionData {
                palette,
                storage,
                non_default,
            },
            config,
        ))
    }

    fn from_data(data: SectionData, config: &StorageConfig) -> Self {
        Self {
            data: RwLock::new(Arc::new(data)),
            config: config.clone(),
            extended_ids: false,
        }
    }

    /// Marks whether the legacy form of this section carries the extended
    /// (high-nibble) ID array regardless of its contents.
    pub fn with_extended_ids(mut self, keep: bool) -> Self {
        self.extended_ids = keep;
        self
    }

    /// Returns `true` if saving must emit the extended ID array.
    pub fn keeps_extended_ids(&self) -> bool {
        self.extended_ids
    }

    /// Returns the state at local `(x, y, z)`.
    ///
    /// # Errors
    ///
    /// [`StorageError::CoordinateOutOfRange`] if any coordinate is `>= 16`.
    pub fn get_block_state(&self, x: usize, y: usize, z: usize) -> Result<BlockState, StorageError> {
        let position = linear_index(x, y, z)?;
        self.read_guard().state_at(position)
    }

    /// Sets the state at local `(x, y, z)` and returns the state it replaced.
    ///
    /// If the state is new to the palette and the palette outgrows the
    /// current width, the storage is rebuilt at the wider width before the
    /// write, and the rebuilt pair is published in one swap.
    ///
    /// # Errors
    ///
    /// [`StorageError::CoordinateOutOfRange`] for a bad coordinate,
    /// [`StorageError::StateOutOfIdSpace`] for a state outside the global ID
    /// space. The section is unchanged on error.
    pub fn set_block_state(
        &self,
        x: usize,
        y: usize,
        z: usize,
        state: BlockState,
    ) -> Result<BlockState, StorageError> {
        let position = linear_index(x, y, z)?;
        let mut guard = self.write_guard();

        let previous = guard.state_at(position)?;
        if previous == state {
            return Ok(previous);
        }

        match guard.palette.index_of(state) {
            Some(index) if guard.storage.fits(index) => {
                Arc::make_mut(&mut *guard).write_index(position, index, previous, state)?;
            }
            _ => {
                let mut next = SectionData::clone(&guard);
                next.insert(position, previous, state)?;
                *guard = Arc::new(next);
            }
        }
        Ok(previous)
    }

    /// Returns `true` if every position holds air.
    pub fn is_empty(&self) -> bool {
        self.read_guard().non_default == 0
    }

    /// Number of positions not holding air.
    pub fn non_default_count(&self) -> usize {
        self.read_guard().non_default as usize
    }

    /// Resets every position to `state` in one swap.
    ///
    /// The palette restarts from scratch, so stale entries are dropped.
    pub fn fill(&self, state: BlockState) -> Result<(), StorageError> {
        let next = if state.is_air() {
            SectionData::empty(&self.config)?
        } else {
            let mut palette = Palette::new(&self.config);
            let (index, bits) = match palette.index_for(state)? {
                IndexFor::Appended { index, bits } => (index, bits),
                IndexFor::Present(index) => (index, palette.bits()),
                IndexFor::Overflow => {
                    palette.make_direct();
                    (state.global_id(), palette.bits())
                }
            };
            let mut storage = BitStorage::new(bits, SECTION_VOLUME)?;
            for position in 0..SECTION_VOLUME {
                storage.set(position, index)?;
            }
            SectionData {
                palette,
                storage,
                non_default: SECTION_VOLUME as u32,
            }
        };
        *self.write_guard() = Arc::new(next);
        Ok(())
    }

    /// Returns an independent deep copy of this section.
    pub fn duplicate(&self) -> Self {
        let data = SectionData::clone(&self.read_guard());
        Self::from_data(data, &self.config).with_extended_ids(self.extended_ids)
    }

    /// Captures the current (palette, storage) pair.
    ///
    /// The snapshot is immutable and unaffected by later writes; use it for
    /// multi-voxel reads that must see one consistent state.
    pub fn snapshot(&self) -> SectionSnapshot {
        SectionSnapshot {
            data: Arc::clone(&*self.read_guard()),
        }
    }

    /// The storage settings this section was created with.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Arc<SectionData>> {
        // Published data is only ever replaced by complete values.
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Arc<SectionData>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An immutable view of a section at one point in time.
#[derive(Clone, Debug)]
pub struct SectionSnapshot {
    data: Arc<SectionData>,
}

impl SectionSnapshot {
    /// Returns the state at local `(x, y, z)` as of this snapshot.
    pub fn get_block_state(&self, x: usize, y: usize, z: usize) -> Result<BlockState, StorageError> {
        self.data.state_at(linear_index(x, y, z)?)
    }

    /// Returns the state at a linear position in `[0, 4096)`.
    pub fn state_at(&self, position: usize) -> Result<BlockState, StorageError> {
        self.data.state_at(position)
    }

    /// Iterates over all states in position order.
    pub fn states(&self) -> impl Iterator<Item = Result<BlockState, StorageError>> + '_ {
        self.data
            .storage
            .iter()
            .map(|index| self.data.palette.state_for(index))
    }

    /// Current bit width per packed index.
    pub fn bits(&self) -> u8 {
        self.data.storage.bits()
    }

    /// Number of palette entries (0 in direct mode).
    pub fn palette_len(&self) -> usize {
        self.data.palette.entry_count()
    }

    /// Indirect or direct.
    pub fn mode(&self) -> PaletteMode {
        self.data.palette.mode()
    }

    /// The palette of this snapshot.
    pub fn palette(&self) -> &Palette {
        &self.data.palette
    }

    /// Bytes used by the packed index storage.
    pub fn storage_bytes(&self) -> usize {
        self.data.storage.storage_bytes()
    }

    /// Number of positions not holding air.
    pub fn non_default_count(&self) -> usize {
        self.data.non_default as usize
    }

    /// Returns `true` if every position holds air.
    pub fn is_empty(&self) -> bool {
        self.data.non_default == 0
    }

    /// Returns `true` if both snapshots share the same published pair.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

/// Converts local `(x, y, z)` to a linear position (x varies fastest, then z, then y).
fn linear_index(x: usize, y: usize, z: usize) -> Result<usize, StorageError> {
    if x >= SECTION_SIZE || y >= SECTION_SIZE || z >= SECTION_SIZE {
        return Err(StorageError::CoordinateOutOfRange {
            x,
            y,
            z,
            extent: SECTION_SIZE,
        });
    }
    Ok((y << 8) | (z << 4) | x)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
