//! Seams between the registry and the host world.
//!
//! The host's world-access code reads and writes voxels through
//! [`BlockAccess`]; its chunk loader drives section lifetimes through
//! [`ChunkLifecycle`]. [`ChunkSectionRegistry`] implements both.

use crate::block_state::BlockState;
use crate::registry::{BlockPos, ChunkSectionRegistry, RegistryError, SectionCoord};
use crate::section::ChunkSection;

/// World-coordinate voxel access.
pub trait BlockAccess {
    /// Reads the state at `pos`.
    fn get_block_state(&self, pos: BlockPos) -> Result<BlockState, RegistryError>;

    /// Writes `state` at `pos`, returning the state it replaced.
    fn set_block_state(&self, pos: BlockPos, state: BlockState) -> Result<BlockState, RegistryError>;

    /// Returns `true` if the section at `coord` holds only air or is absent.
    fn is_section_empty(&self, coord: SectionCoord) -> bool;
}

/// Chunk load/unload notifications from the host.
///
/// The host stops handing out references to a chunk before calling
/// [`on_chunk_unload`](ChunkLifecycle::on_chunk_unload).
pub trait ChunkLifecycle {
    /// A chunk column became live; create its sections.
    fn on_chunk_load(&self, chunk_x: i32, chunk_z: i32) -> Result<(), RegistryError>;

    /// A chunk column was released; drop its sections.
    fn on_chunk_unload(&self, chunk_x: i32, chunk_z: i32);
}

impl BlockAccess for ChunkSectionRegistry {
    fn get_block_state(&self, pos: BlockPos) -> Result<BlockState, RegistryError> {
        ChunkSectionRegistry::get_block_state(self, pos)
    }

    fn set_block_state(&self, pos: BlockPos, state: BlockState) -> Result<BlockState, RegistryError> {
        ChunkSectionRegistry::set_block_state(self, pos, state)
    }

    fn is_section_empty(&self, coord: SectionCoord) -> bool {
        ChunkSectionRegistry::is_section_empty(self, coord)
    }
}

impl ChunkLifecycle for ChunkSectionRegistry {
    /// Creates the vanilla sections `0..16` of the column.
    ///
    /// Fails with [`RegistryError::AlreadyLoaded`] if any of them exists,
    /// leaving the registry as it was.
    fn on_chunk_load(&self, chunk_x: i32, chunk_z: i32) -> Result<(), RegistryError> {
        let column = SectionCoord::column(chunk_x, chunk_z)
            .map(|coord| ChunkSection::new(self.config()).map(|section| (coord, section)))
            .collect::<Result<Vec<_>, _>>()?;
        self.insert_column(column)?;
        tracing::info!(chunk_x, chunk_z, "chunk sections created");
        Ok(())
    }

    fn on_chunk_unload(&self, chunk_x: i32, chunk_z: i32) {
        self.unload_chunk(chunk_x, chunk_z);
    }
}
