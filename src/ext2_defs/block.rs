use crate::prelude::*;

/// A filesystem block: its physical id and a shared view of its bytes.
///
/// Blocks handed out by the cache share their buffer with the cache, so a
/// `Block` is an immutable snapshot. Mutation goes through `to_vec` and an
/// explicit write back.
#[derive(Debug, Clone)]
pub struct Block {
    /// Physical block id
    pub id: PBlockId,
    /// Raw block data
    pub data: Arc<[u8]>,
}

impl Block {
    pub fn new(id: PBlockId, data: Arc<[u8]>) -> Self {
        Self { id, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow `len` bytes at `offset`
    pub fn read_offset(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    /// Read the `index`-th 4-byte block pointer stored in this block
    pub fn pointer_at(&self, index: usize) -> u32 {
        super::layout::read_u32(&self.data, index * 4)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }
}
