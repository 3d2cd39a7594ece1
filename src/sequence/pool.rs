use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

/// Index of a block checked out of a [BlockPool].
pub type BlockId = usize;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PoolError {
    #[error("block {0} is not checked out")]
    NotCheckedOut(BlockId),
    #[error("block {0} does not belong to this pool")]
    UnknownBlock(BlockId),
    #[error("access of {len} samples at offset {offset} exceeds block size {block_size}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        block_size: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Blocks ever allocated by the pool.
    pub allocated: usize,
    /// Blocks currently on the free list.
    pub free: usize,
}

#[derive(Default)]
struct Arena {
    blocks: Vec<Box<[i32]>>,
    checked_out: Vec<bool>,
    free: Vec<BlockId>,
}

impl Arena {
    fn block(&mut self, id: BlockId) -> Result<&mut [i32], PoolError> {
        match self.checked_out.get(id) {
            None => Err(PoolError::UnknownBlock(id)),
            Some(false) => Err(PoolError::NotCheckedOut(id)),
            Some(true) => Ok(&mut self.blocks[id][..]),
        }
    }
}

/// Arena of fixed size sample blocks shared by every [Sequence](super::Sequence) of a run.
///
/// Blocks are checked out by index and returned to a free list when released, so memory
/// is reused across sequences instead of being freed. Cloning a pool produces another
/// handle to the same arena.
#[derive(Clone)]
pub struct BlockPool {
    arena: Arc<Mutex<Arena>>,
    block_size: usize,
}

impl BlockPool {
    pub const DEFAULT_BLOCK_SIZE: usize = 4096;

    /// # Panics
    /// If `block_size` is 0.
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        assert!(block_size > 0, "block size must be greater than 0");
        BlockPool {
            arena: Arc::new(Mutex::new(Arena::default())),
            block_size,
        }
    }

    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn lock(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().expect("block pool lock poisoned")
    }

    /// Check out a block, reusing a released block if one is available.
    pub fn checkout(&self) -> BlockId {
        let mut arena = self.lock();
        if let Some(id) = arena.free.pop() {
            arena.checked_out[id] = true;
            return id;
        }
        let id = arena.blocks.len();
        arena.blocks.push(vec![0; self.block_size].into_boxed_slice());
        arena.checked_out.push(true);
        trace!(block = id, "allocated block");
        id
    }

    /// Return a block to the free list.
    ///
    /// # Errors
    /// If the block is unknown to this pool or was already released.
    pub fn release(&self, id: BlockId) -> Result<(), PoolError> {
        let mut arena = self.lock();
        arena.block(id)?;
        arena.checked_out[id] = false;
        arena.free.push(id);
        Ok(())
    }

    /// Copy `samples` into block `id` starting at `offset`.
    ///
    /// # Errors
    /// If the block is not checked out or the write does not fit in a block.
    pub fn write(&self, id: BlockId, offset: usize, samples: &[i32]) -> Result<(), PoolError> {
        self.check_bounds(offset, samples.len())?;
        let mut arena = self.lock();
        arena.block(id)?[offset..offset + samples.len()].copy_from_slice(samples);
        Ok(())
    }

    /// Fill `dest` with samples from block `id` starting at `offset`.
    ///
    /// # Errors
    /// If the block is not checked out or the read does not fit in a block.
    pub fn read(&self, id: BlockId, offset: usize, dest: &mut [i32]) -> Result<(), PoolError> {
        self.check_bounds(offset, dest.len())?;
        let mut arena = self.lock();
        dest.copy_from_slice(&arena.block(id)?[offset..offset + dest.len()]);
        Ok(())
    }

    fn check_bounds(&self, offset: usize, len: usize) -> Result<(), PoolError> {
        if offset + len > self.block_size {
            return Err(PoolError::OutOfBounds {
                offset,
                len,
                block_size: self.block_size,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let arena = self.lock();
        PoolStats {
            allocated: arena.blocks.len(),
            free: arena.free.len(),
        }
    }
}

impl Default for BlockPool {
    fn default() -> Self {
        BlockPool::new(Self::DEFAULT_BLOCK_SIZE)
    }
}

impl std::fmt::Debug for BlockPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockPool")
            .field("block_size", &self.block_size)
            .field("stats", &self.stats())
            .finish()
    }
}
