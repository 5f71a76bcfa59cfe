//! # Extent trees
//!
//! An extent tree maps logical file blocks to physical runs. The root node
//! lives in the inode's 60-byte `i_block` area; deeper nodes occupy a whole
//! block each. Every node starts with a 12-byte header followed by 12-byte
//! entries: leaf extents at depth 0, index entries above.
//!
//! Entries within a node are sorted by their first logical block, so both
//! kinds of node are searched by bisection.

use super::layout::*;
use crate::constants::*;
use crate::prelude::*;
use crate::return_error;

/// Size of a header, an extent and an extent index alike
pub const EXTENT_ENTRY_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentHeader {
    /// Number of valid entries following the header.
    pub entries_count: u16,
    /// Maximum number of entries that could follow the header.
    pub max_entries_count: u16,
    /// Depth of this extent node in the extent tree.
    /// 0 = this extent node points to data blocks;
    /// otherwise, this extent node points to other extent nodes.
    pub depth: u16,
}

impl ExtentHeader {
    /// Decode a node header, rejecting a wrong magic number or an entry
    /// count that cannot fit in `node_len` bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < EXTENT_ENTRY_SIZE {
            return_error!(ErrCode::EINVAL, "Extent node of {} bytes", bytes.len());
        }
        let magic = read_u16(bytes, 0);
        if magic != EXT4_EXTENT_MAGIC {
            return_error!(ErrCode::EINVAL, "Bad extent header magic {:#06x}", magic);
        }
        let header = Self {
            entries_count: read_u16(bytes, 2),
            max_entries_count: read_u16(bytes, 4),
            depth: read_u16(bytes, 6),
        };
        let capacity = (bytes.len() / EXTENT_ENTRY_SIZE - 1) as u16;
        if header.entries_count > header.max_entries_count || header.max_entries_count > capacity
        {
            return_error!(
                ErrCode::EINVAL,
                "Extent node claims {} of {} entries, room for {}",
                header.entries_count,
                header.max_entries_count,
                capacity
            );
        }
        if header.depth > EXT4_EXTENT_MAX_DEPTH {
            return_error!(
                ErrCode::ENOTSUP,
                "Extent tree depth {} exceeds {}",
                header.depth,
                EXT4_EXTENT_MAX_DEPTH
            );
        }
        Ok(header)
    }

    pub fn is_leaf(&self) -> bool {
        self.depth == 0
    }
}

/// A leaf entry: `len` blocks starting at logical block `first_block` are
/// stored at physical block `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub first_block: LBlockId,
    len: u16,
    start: PBlockId,
}

impl Extent {
    pub fn new(first_block: LBlockId, start: PBlockId, len: u16) -> Self {
        Self {
            first_block,
            len,
            start,
        }
    }

    /// Decode a leaf entry. Physical starts beyond 32 bits are refused.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let start_hi = read_u16(bytes, 6);
        if start_hi != 0 {
            return_error!(
                ErrCode::ENOTSUP,
                "Extent addresses a block above 2^32 (high word {:#x})",
                start_hi
            );
        }
        Ok(Self {
            first_block: read_u32(bytes, 0),
            len: read_u16(bytes, 4),
            start: read_u32(bytes, 8) as PBlockId,
        })
    }

    pub fn start_pblock(&self) -> PBlockId {
        self.start
    }

    /// An extent longer than `EXT_INIT_MAX_LEN` is allocated but not yet
    /// written; its blocks read as zeros.
    pub fn is_unwritten(&self) -> bool {
        self.len > EXT_INIT_MAX_LEN
    }

    /// Number of blocks covered
    pub fn actual_len(&self) -> u16 {
        if self.is_unwritten() {
            self.len - EXT_INIT_MAX_LEN
        } else {
            self.len
        }
    }

    pub fn contains(&self, lblock: LBlockId) -> bool {
        lblock >= self.first_block && lblock - self.first_block < self.actual_len() as u32
    }
}

/// An inner entry: logical blocks from `first_block` onwards are described
/// by the node stored in block `leaf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentIndex {
    pub first_block: LBlockId,
    leaf: PBlockId,
}

impl ExtentIndex {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let leaf_hi = read_u16(bytes, 8);
        if leaf_hi != 0 {
            return_error!(
                ErrCode::ENOTSUP,
                "Extent index points above 2^32 (high word {:#x})",
                leaf_hi
            );
        }
        Ok(Self {
            first_block: read_u32(bytes, 0),
            leaf: read_u32(bytes, 4) as PBlockId,
        })
    }

    pub fn leaf(&self) -> PBlockId {
        self.leaf
    }
}

/// A borrowed view over one extent tree node
#[derive(Debug, Clone, Copy)]
pub struct ExtentNode<'a> {
    header: ExtentHeader,
    raw: &'a [u8],
}

impl<'a> ExtentNode<'a> {
    pub fn from_bytes(raw: &'a [u8]) -> Result<Self> {
        Ok(Self {
            header: ExtentHeader::from_bytes(raw)?,
            raw,
        })
    }

    pub fn header(&self) -> &ExtentHeader {
        &self.header
    }

    fn entry(&self, index: usize) -> &'a [u8] {
        let start = (index + 1) * EXTENT_ENTRY_SIZE;
        &self.raw[start..start + EXTENT_ENTRY_SIZE]
    }

    fn entry_first_block(&self, index: usize) -> LBlockId {
        read_u32(self.entry(index), 0)
    }

    pub fn extent_at(&self, index: usize) -> Result<Extent> {
        Extent::from_bytes(self.entry(index))
    }

    pub fn extent_index_at(&self, index: usize) -> Result<ExtentIndex> {
        ExtentIndex::from_bytes(self.entry(index))
    }

    /// Bisect for the last entry whose first block is `<= lblock`.
    /// `None` when `lblock` precedes every entry or the node is empty.
    pub fn search(&self, lblock: LBlockId) -> Option<usize> {
        let count = self.header.entries_count as usize;
        if count == 0 || self.entry_first_block(0) > lblock {
            return None;
        }
        let (mut l, mut r) = (1usize, count);
        while l < r {
            let m = l + (r - l) / 2;
            if lblock < self.entry_first_block(m) {
                r = m;
            } else {
                l = m + 1;
            }
        }
        Some(l - 1)
    }

    /// Leaf lookup: the extent covering `lblock`, if any
    pub fn extent_search(&self, lblock: LBlockId) -> Result<Option<Extent>> {
        match self.search(lblock) {
            Some(i) => {
                let ex = self.extent_at(i)?;
                Ok(ex.contains(lblock).then_some(ex))
            }
            None => Ok(None),
        }
    }

    /// Inner lookup: the child subtree that would cover `lblock`
    pub fn extent_index_search(&self, lblock: LBlockId) -> Result<Option<ExtentIndex>> {
        self.search(lblock)
            .map(|i| self.extent_index_at(i))
            .transpose()
    }
}
