//! Storage contract violations.
//!
//! None of these are recoverable: they mean a caller bypassed the palette
//! layer, passed a bad coordinate, or the palette and storage fell out of
//! sync. They surface immediately instead of being corrected.

use crate::block_state::BlockState;

/// Errors raised by [`BitStorage`](crate::BitStorage),
/// [`Palette`](crate::Palette) and [`ChunkSection`](crate::ChunkSection).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// A local coordinate was outside the section extent.
    #[error("coordinate ({x}, {y}, {z}) outside section extent 0..{extent}")]
    CoordinateOutOfRange {
        /// Local X.
        x: usize,
        /// Local Y.
        y: usize,
        /// Local Z.
        z: usize,
        /// Section side length.
        extent: usize,
    },
    /// A packed-array position was outside `[0, len)`.
    #[error("position {position} out of bounds for length {len}")]
    OutOfBounds {
        /// Requested position.
        position: usize,
        /// Element count of the storage.
        len: usize,
    },
    /// A batch of states did not cover the section exactly.
    #[error("expected {expected} states, got {actual}")]
    LengthMismatch {
        /// Required element count.
        expected: usize,
        /// Element count supplied.
        actual: usize,
    },
    /// A value does not fit the storage's element width.
    #[error("value {value} does not fit in {bits} bits")]
    ValueTooWide {
        /// Value that was written.
        value: u32,
        /// Current element width.
        bits: u8,
    },
    /// A packed index has no palette entry.
    #[error("index {index} has no palette entry (palette size {len})")]
    OutOfPalette {
        /// Offending index.
        index: u32,
        /// Current palette size.
        len: usize,
    },
    /// A block state's global ID does not fit the configured ID space.
    #[error("{state:?} outside the {bits}-bit global ID space")]
    StateOutOfIdSpace {
        /// Offending state.
        state: BlockState,
        /// Configured global ID width.
        bits: u8,
    },
    /// A requested width is narrower than the current one or wider than supported.
    #[error("cannot migrate storage from {from} to {to} bits")]
    InvalidWidth {
        /// Current width.
        from: u8,
        /// Requested width.
        to: u8,
    },
}
