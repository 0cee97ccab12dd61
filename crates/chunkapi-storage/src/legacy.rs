//! Conversion between paletted sections and the legacy byte + nibble layout.
//!
//! The legacy layout stores one global ID per position in 12 bits:
//!
//! | Array    | Size | Contents |
//! |----------|------|----------|
//! | `blocks` | 4096 | low 8 bits of each ID |
//! | `add`    | 2048 | high 4 bits, two positions per byte (optional) |
//!
//! Position `i` of the `add` array lives in byte `i >> 1`: the low nibble for
//! even `i`, the high nibble for odd `i`. A missing `add` array reads as all
//! zeros. On save it is written whenever a high nibble is set or the section
//! was loaded with one, so an all-zero array survives a round trip.
//!
//! Positions use the section's `y << 8 | z << 4 | x` order, so no reordering
//! happens here.

use chunkapi_config::StorageConfig;
use serde::{Deserialize, Serialize};

use crate::block_state::BlockState;
use crate::error::StorageError;
use crate::section::{ChunkSection, SECTION_VOLUME, SectionSnapshot};

/// Width of the legacy global ID space (8-bit byte + 4-bit nibble).
pub const LEGACY_ID_BITS: u8 = 12;

/// Byte length of the `add` nibble array.
const NIBBLE_LEN: usize = SECTION_VOLUME / 2;

/// Errors raised at the persistence boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LegacyError {
    /// An input array has the wrong length.
    #[error("corrupt legacy data: {field} array has {actual} bytes, expected {expected}")]
    CorruptLegacyData {
        /// Which array was malformed.
        field: &'static str,
        /// Required length.
        expected: usize,
        /// Length found.
        actual: usize,
    },
    /// A state's global ID does not fit 12 bits.
    #[error("{state:?} at position {position} does not fit the 12-bit legacy ID space")]
    UnencodableState {
        /// Linear position within the section.
        position: usize,
        /// Offending state.
        state: BlockState,
    },
    /// The decoded IDs could not be stored.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// One section in legacy form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacySection {
    /// Low 8 bits of every ID, 4096 bytes.
    pub blocks: Vec<u8>,
    /// High 4 bits, 2048 bytes, or `None` if absent.
    pub add: Option<Vec<u8>>,
}

impl LegacySection {
    /// An all-air section in legacy form.
    pub fn empty() -> Self {
        Self {
            blocks: vec![0; SECTION_VOLUME],
            add: None,
        }
    }

    /// Returns `true` if any ID needs the high nibble.
    pub fn add_needed(&self) -> bool {
        self.add
            .as_deref()
            .is_some_and(|add| add.iter().any(|&b| b != 0))
    }
}

/// Builds a section from legacy arrays.
///
/// `add` may be `None`, in which case every high nibble is zero. A present
/// `add` array is remembered on the section (see
/// [`ChunkSection::keeps_extended_ids`]) and written back on save. The section
/// is built through [`ChunkSection::from_states`], so storage is allocated
/// once at its final width.
///
/// # Errors
///
/// [`LegacyError::CorruptLegacyData`] if `blocks` is not 4096 bytes or `add`
/// is present and not 2048 bytes. [`LegacyError::Storage`] if `config` uses a
/// global ID space narrower than the decoded IDs.
pub fn from_legacy(
    config: &StorageConfig,
    blocks: &[u8],
    add: Option<&[u8]>,
) -> Result<ChunkSection, LegacyError> {
    check_len("blocks", blocks.len(), SECTION_VOLUME)?;
    if let Some(add) = add {
        check_len("add", add.len(), NIBBLE_LEN)?;
    }

    let states: Vec<BlockState> = (0..SECTION_VOLUME)
        .map(|position| {
            let high = add.map_or(0, |add| u32::from(nibble(add, position)));
            BlockState::from_global_id(u32::from(blocks[position]) | (high << 8))
        })
        .collect();
    Ok(ChunkSection::from_states(config, &states)?.with_extended_ids(add.is_some()))
}

/// Decodes a [`LegacySection`] value.
pub fn from_legacy_section(
    config: &StorageConfig,
    legacy: &LegacySection,
) -> Result<ChunkSection, LegacyError> {
    from_legacy(config, &legacy.blocks, legacy.add.as_deref())
}

/// Encodes a section into legacy arrays from one consistent snapshot.
///
/// # Errors
///
/// [`LegacyError::UnencodableState`] for the first state whose global ID needs
/// more than 12 bits.
pub fn to_legacy(section: &ChunkSection) -> Result<LegacySection, LegacyError> {
    encode(&section.snapshot(), section.keeps_extended_ids(), |position, state| {
        Err(LegacyError::UnencodableState { position, state })
    })
}

/// Encodes a section, writing air for states that do not fit 12 bits.
///
/// Returns the encoded section and how many positions were substituted.
pub fn to_legacy_lossy(section: &ChunkSection) -> Result<(LegacySection, usize), LegacyError> {
    let mut substituted = 0usize;
    let legacy = encode(&section.snapshot(), section.keeps_extended_ids(), |position, state| {
        if substituted == 0 {
            tracing::warn!(position, ?state, "state not encodable in legacy IDs, saving as air");
        }
        substituted += 1;
        Ok(BlockState::AIR)
    })?;
    Ok((legacy, substituted))
}

fn encode<F>(
    snapshot: &SectionSnapshot,
    keep_add: bool,
    mut on_unencodable: F,
) -> Result<LegacySection, LegacyError>
where
    F: FnMut(usize, BlockState) -> Result<BlockState, LegacyError>,
{
    let mut blocks = vec![0u8; SECTION_VOLUME];
    let mut add = vec![0u8; NIBBLE_LEN];
    let mut add_used = keep_add;

    for (position, state) in snapshot.states().enumerate() {
        let mut state = state?;
        if !state.fits_in(LEGACY_ID_BITS) {
            state = on_unencodable(position, state)?;
        }
        let id = state.global_id();
        blocks[position] = (id & 0xFF) as u8;
        let high = ((id >> 8) & 0xF) as u8;
        if high != 0 {
            set_nibble(&mut add, position, high);
            add_used = true;
        }
    }

    Ok(LegacySection {
        blocks,
        add: add_used.then_some(add),
    })
}

fn check_len(field: &'static str, actual: usize, expected: usize) -> Result<(), LegacyError> {
    if actual != expected {
        return Err(LegacyError::CorruptLegacyData {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

fn nibble(array: &[u8], position: usize) -> u8 {
    let byte = array[position >> 1];
    if position & 1 == 0 { byte & 0x0F } else { byte >> 4 }
}

fn set_nibble(array: &mut [u8], position: usize, value: u8) {
    let byte = &mut array[position >> 1];
    if position & 1 == 0 {
        *byte = (*byte & 0xF0) | (value & 0x0F);
    } else {
        *byte = (*byte & 0x0F) | (value << 4);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::palette::PaletteMode;

    use super::*;

    fn config() -> StorageConfig {
        StorageConfig::default()
    }

    #[test]
    fn test_nibble_layout() {
        let mut add = vec![0u8; 4];
        set_nibble(&mut add, 0, 0xA);
        set_nibble(&mut add, 1, 0x5);
        set_nibble(&mut add, 6, 0xF);
        assert_eq!(add, vec![0x5A, 0x00, 0x00, 0x0F]);
        assert_eq!(nibble(&add, 0), 0xA);
        assert_eq!(nibble(&add, 1), 0x5);
        assert_eq!(nibble(&add, 7), 0x0);
    }

    #[test]
    fn test_decodes_byte_and_nibble() {
        let mut blocks = vec![0u8; SECTION_VOLUME];
        let mut add = vec![0u8; NIBBLE_LEN];
        blocks[0] = 1;
        blocks[257] = 0x34;
        set_nibble(&mut add, 257, 0x2);

        let section = from_legacy(&config(), &blocks, Some(&add)).unwrap();
        assert_eq!(section.get_block_state(0, 0, 0), Ok(BlockState(1)));
        // 257 = y 1, z 0, x 1.
        assert_eq!(section.get_block_state(1, 1, 0), Ok(BlockState(0x234)));
        assert_eq!(section.non_default_count(), 2);
    }

    #[test]
    fn test_missing_add_reads_as_zero() {
        let blocks: Vec<u8> = (0..SECTION_VOLUME).map(|i| (i % 7) as u8).collect();
        let section = from_legacy(&config(), &blocks, None).unwrap();
        assert_eq!(section.get_block_state(6, 0, 0), Ok(BlockState(6)));
        assert_eq!(to_legacy(&section).unwrap().add, None);
    }

    #[test]
    fn test_roundtrip_with_add() {
        let blocks: Vec<u8> = (0..SECTION_VOLUME).map(|i| (i * 31 % 251) as u8).collect();
        let add: Vec<u8> = (0..NIBBLE_LEN).map(|i| (i % 3) as u8 * 0x11).collect();
        let section = from_legacy(&config(), &blocks, Some(&add)).unwrap();
        let legacy = to_legacy(&section).unwrap();
        assert_eq!(legacy.blocks, blocks);
        assert_eq!(legacy.add.as_deref(), Some(add.as_slice()));
        assert!(legacy.add_needed());
    }

    #[test]
    fn test_all_zero_add_survives_roundtrip() {
        let blocks = vec![9u8; SECTION_VOLUME];
        let add = vec![0u8; NIBBLE_LEN];
        let section = from_legacy(&config(), &blocks, Some(&add)).unwrap();
        assert!(section.keeps_extended_ids());

        let legacy = to_legacy(&section).unwrap();
        assert_eq!(legacy.add.as_deref(), Some(add.as_slice()));
        assert_eq!(legacy.blocks, blocks);
        assert!(!legacy.add_needed());

        let (lossy, substituted) = to_legacy_lossy(&section.duplicate()).unwrap();
        assert_eq!(substituted, 0);
        assert_eq!(lossy, legacy);
    }

    #[test]
    fn test_absent_add_stays_absent() {
        let blocks = vec![9u8; SECTION_VOLUME];
        let section = from_legacy(&config(), &blocks, None).unwrap();
        assert!(!section.keeps_extended_ids());
        assert_eq!(to_legacy(&section).unwrap().add, None);

        // A high nibble written later still needs the array.
        section.set_block_state(0, 0, 0, BlockState(0x100)).unwrap();
        let add = to_legacy(&section).unwrap().add.unwrap();
        assert_eq!(nibble(&add, 0), 1);
    }

    #[test]
    fn test_many_distinct_ids_load_direct() {
        let blocks: Vec<u8> = (0..SECTION_VOLUME).map(|i| i as u8).collect();
        let add: Vec<u8> = (0..NIBBLE_LEN).map(|i| ((i >> 7) as u8 & 0xF) * 0x11).collect();
        let section = from_legacy(&config(), &blocks, Some(&add)).unwrap();
        assert_eq!(section.snapshot().mode(), PaletteMode::Direct);
        let legacy = to_legacy(&section).unwrap();
        assert_eq!(legacy.blocks, blocks);
        assert_eq!(legacy.add.as_deref(), Some(add.as_slice()));
    }

    #[test]
    fn test_corrupt_lengths() {
        assert_eq!(
            from_legacy(&config(), &[0u8; 100], None).err(),
            Some(LegacyError::CorruptLegacyData {
                field: "blocks",
                expected: SECTION_VOLUME,
                actual: 100
            })
        );
        assert!(matches!(
            from_legacy(&config(), &[0u8; SECTION_VOLUME], Some(&[0u8; 10])),
            Err(LegacyError::CorruptLegacyData { field: "add", .. })
        ));
    }

    #[test]
    fn test_unencodable_state() {
        let wide = StorageConfig {
            global_id_bits: 16,
            ..StorageConfig::default()
        };
        let section = ChunkSection::new(&wide).unwrap();
        section.set_block_state(2, 0, 0, BlockState(5000)).unwrap();
        assert_eq!(
            to_legacy(&section),
            Err(LegacyError::UnencodableState {
                position: 2,
                state: BlockState(5000)
            })
        );

        let (legacy, substituted) = to_legacy_lossy(&section).unwrap();
        assert_eq!(substituted, 1);
        assert!(legacy.blocks.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_legacy_section_value_roundtrip() {
        let mut legacy = LegacySection::empty();
        legacy.blocks[4095] = 200;
        let section = from_legacy_section(&config(), &legacy).unwrap();
        assert_eq!(section.get_block_state(15, 15, 15), Ok(BlockState(200)));
        assert_eq!(to_legacy(&section).unwrap(), legacy);
    }
}
