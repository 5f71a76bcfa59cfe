//! Classic block mapping through direct and indirect pointers.
//!
//! Slots 0..12 of `i_block` point at data directly. Slot 12 points at a
//! block of `N = block_size / 4` pointers, slot 13 at a block of pointers
//! to such blocks, slot 14 adds one more level.

use super::Ext2;
use crate::constants::*;
use crate::ext2_defs::*;
use crate::prelude::*;
use crate::return_error;

/// Where a logical block lives in the pointer tree: the `i_block` slot to
/// start from, then one index per level of indirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct IndirectPath {
    pub slot: usize,
    pub levels: usize,
    pub offsets: [usize; 3],
}

impl IndirectPath {
    /// Split `iblock` into a pointer path. Fails with `EFBIG` past the
    /// triple-indirect range.
    pub fn new(block_size: usize, iblock: LBlockId) -> Result<Self> {
        let per_block = (block_size / 4) as u64;
        let mut rest = iblock as u64;
        if rest < EXT2_NDIR_BLOCKS as u64 {
            return Ok(Self {
                slot: rest as usize,
                levels: 0,
                offsets: [0; 3],
            });
        }
        rest -= EXT2_NDIR_BLOCKS as u64;
        let mut span = 1u64;
        for levels in 1..=3 {
            span *= per_block;
            if rest < span {
                let mut offsets = [0; 3];
                let mut per = span;
                for offset in offsets.iter_mut().take(levels) {
                    per /= per_block;
                    *offset = (rest / per) as usize;
                    rest %= per;
                }
                return Ok(Self {
                    slot: EXT2_IND_BLOCK + levels - 1,
                    levels,
                    offsets,
                });
            }
            rest -= span;
        }
        return_error!(
            ErrCode::EFBIG,
            "Logical block {} beyond the triple-indirect range",
            iblock
        )
    }
}

impl Ext2 {
    /// Follow the pointer path of `iblock`, one block read per level.
    pub(super) fn indirect_get_pblock(
        &self,
        inode_ref: &InodeRef,
        iblock: LBlockId,
    ) -> Result<PBlockId> {
        let path = IndirectPath::new(self.block_size(), iblock)?;
        let mut pblock = inode_ref.inode.block_ptr(path.slot);
        for &offset in &path.offsets[..path.levels] {
            if pblock == 0 {
                break;
            }
            let block = self.read_block(pblock as PBlockId)?;
            pblock = block.pointer_at(offset);
        }
        if pblock == 0 {
            return_error!(
                ErrCode::ENODATA,
                "Inode {} has no block at {}",
                inode_ref.id,
                iblock
            );
        }
        Ok(pblock as PBlockId)
    }
}
