//! Per-section palette mapping block states to compact indices.
//!
//! Entries are appended in first-seen order and never removed, so an index
//! stays bound to the same state for the palette's lifetime. Index 0 is always
//! [`BlockState::AIR`]. Once the palette would need as many bits as the global
//! ID space it is replaced by direct mode, where the index is the global ID.

use chunkapi_config::{StorageConfig, WidthPolicy};
use rustc_hash::FxHashMap;

use crate::bit_storage::MAX_BITS;
use crate::block_state::BlockState;
use crate::error::StorageError;

/// Whether a palette translates indices through a lookup table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaletteMode {
    /// Indices resolve through the entry table.
    Indirect,
    /// Indices are global IDs; no table.
    Direct,
}

/// Outcome of [`Palette::index_for`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexFor {
    /// The state already had this index (or, in direct mode, this global ID).
    Present(u32),
    /// The state was appended. `bits` is the width the storage now needs,
    /// which may be more than one step above the previous width.
    Appended {
        /// Newly assigned index.
        index: u32,
        /// Required storage width after the append.
        bits: u8,
    },
    /// Appending would reach the global ID width. Nothing was inserted; the
    /// owner must switch to direct mode.
    Overflow,
}

#[derive(Clone, Debug)]
enum Entries {
    Indirect {
        /// Dense array where `index == position`.
        states: Vec<BlockState>,
        /// Reverse lookup: state -> index.
        lookup: FxHashMap<BlockState, u32>,
    },
    Direct,
}

/// Bidirectional state <-> index map with a current bit width.
#[derive(Clone, Debug)]
pub struct Palette {
    entries: Entries,
    /// Width the owning storage is kept at.
    bits: u8,
    policy: WidthPolicy,
    global_id_bits: u8,
}

impl Palette {
    /// Creates a palette holding only air, at the configured initial width.
    pub fn new(config: &StorageConfig) -> Self {
        let mut lookup = FxHashMap::default();
        lookup.insert(BlockState::AIR, 0);
        Self {
            entries: Entries::Indirect {
                states: vec![BlockState::AIR],
                lookup,
            },
            bits: config.initial_bits,
            policy: config.width_policy,
            global_id_bits: config.global_id_bits,
        }
    }

    /// Returns the index for `state`, appending it if unseen.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::StateOutOfIdSpace`] if the state's global ID
    /// does not fit the configured ID space.
    pub fn index_for(&mut self, state: BlockState) -> Result<IndexFor, StorageError> {
        if !state.fits_in(self.global_id_bits) {
            return Err(StorageError::StateOutOfIdSpace {
                state,
                bits: self.global_id_bits,
            });
        }

        let (states, lookup) = match &mut self.entries {
            Entries::Direct => return Ok(IndexFor::Present(state.global_id())),
            Entries::Indirect { states, lookup } => (states, lookup),
        };

        if let Some(&index) = lookup.get(&state) {
            return Ok(IndexFor::Present(index));
        }

        let required = required_bits(self.policy, states.len() + 1).max(self.bits);
        if required >= self.global_id_bits {
            return Ok(IndexFor::Overflow);
        }

        let index = states.len() as u32;
        states.push(state);
        lookup.insert(state, index);
        self.bits = required;
        Ok(IndexFor::Appended {
            index,
            bits: required,
        })
    }

    /// Returns the index for `state` without inserting it.
    pub fn index_of(&self, state: BlockState) -> Option<u32> {
        match &self.entries {
            Entries::Indirect { lookup, .. } => lookup.get(&state).copied(),
            Entries::Direct => state
                .fits_in(self.global_id_bits)
                .then_some(state.global_id()),
        }
    }

    /// Resolves an index back to its state.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfPalette`] if no entry has this index.
    pub fn state_for(&self, index: u32) -> Result<BlockState, StorageError> {
        match &self.entries {
            Entries::Indirect { states, .. } => {
                states
                    .get(index as usize)
                    .copied()
                    .ok_or(StorageError::OutOfPalette {
                        index,
                        len: states.len(),
                    })
            }
            Entries::Direct => Ok(BlockState::from_global_id(index)),
        }
    }

    /// Drops the lookup table; from now on indices are global IDs.
    ///
    /// The caller re-encodes its storage before publishing the change.
    pub(crate) fn make_direct(&mut self) {
        self.entries = Entries::Direct;
        self.bits = self.global_id_bits;
    }

    /// Current storage width.
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Indirect or direct.
    pub fn mode(&self) -> PaletteMode {
        match self.entries {
            Entries::Indirect { .. } => PaletteMode::Indirect,
            Entries::Direct => PaletteMode::Direct,
        }
    }

    /// Number of entries in the lookup table; 0 in direct mode.
    pub fn entry_count(&self) -> usize {
        match &self.entries {
            Entries::Indirect { states, .. } => states.len(),
            Entries::Direct => 0,
        }
    }

    /// Entries in index order; empty in direct mode.
    pub fn entries(&self) -> &[BlockState] {
        match &self.entries {
            Entries::Indirect { states, .. } => states,
            Entries::Direct => &[],
        }
    }

    /// Width of the global ID space this palette falls back to.
    pub fn global_id_bits(&self) -> u8 {
        self.global_id_bits
    }
}

/// Width needed to index `len` entries under `policy`.
pub fn required_bits(policy: WidthPolicy, len: usize) -> u8 {
    let exact = if len <= 1 {
        0
    } else {
        (usize::BITS - (len - 1).leading_zeros()) as u8
    };
    match policy {
        WidthPolicy::Exact => exact,
        WidthPolicy::Aligned if exact == 0 => 0,
        WidthPolicy::Aligned => exact.next_power_of_two().min(MAX_BITS),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
