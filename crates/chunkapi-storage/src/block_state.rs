//! Block-state values stored in chunk sections.
//!
//! Air is always global ID 0 so that zero-initialized index storage, palette
//! index 0, and the default state all agree.

use serde::{Deserialize, Serialize};

/// Opaque identifier of a voxel's type and variant.
///
/// The storage engine only compares and hashes states; the wrapped global ID
/// is read in direct mode and at the legacy boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockState(pub u32);

impl BlockState {
    /// The default state every section starts filled with.
    pub const AIR: BlockState = BlockState(0);

    /// Creates a state from its global ID.
    pub const fn from_global_id(id: u32) -> Self {
        Self(id)
    }

    /// Returns the global ID of this state.
    pub const fn global_id(self) -> u32 {
        self.0
    }

    /// Returns `true` for the default (air) state.
    pub const fn is_air(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the global ID fits in `bits` bits.
    pub fn fits_in(self, bits: u8) -> bool {
        bits >= 32 || self.0 < (1u32 << bits)
    }
}

impl From<u32> for BlockState {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_air_is_id_zero() {
        assert_eq!(BlockState::AIR.global_id(), 0);
        assert!(BlockState::AIR.is_air());
        assert_eq!(BlockState::default(), BlockState::AIR);
    }

    #[test]
    fn test_fits_in() {
        assert!(BlockState(4095).fits_in(12));
        assert!(!BlockState(4096).fits_in(12));
        assert!(BlockState(0).fits_in(0));
        assert!(!BlockState(1).fits_in(0));
        assert!(BlockState(u32::MAX).fits_in(32));
    }
}
