//! # The Block Group Descriptor
//!
//! Each block group is described by one descriptor in the table that follows
//! the superblock. A descriptor locates the group's block bitmap, inode
//! bitmap and inode table, and carries the group's free counters.
//!
//! | Super Block | Group Descriptors | Block Bitmap | Inode Bitmap | Inode Table | Data Blocks |
//!
//! Descriptors are 32 bytes unless the volume has the 64BIT feature, in which
//! case the superblock's `desc_size` gives the stride and the upper halves of
//! the fields live in bytes 32..64.

use super::layout::*;
use super::SuperBlock;
use crate::constants::*;
use crate::prelude::*;
use crate::return_error;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockGroupDesc {
    block_bitmap: PBlockId,
    inode_bitmap: PBlockId,
    inode_table: PBlockId,
    free_blocks_count: u32,
    free_inodes_count: u32,
    used_dirs_count: u32,
}

impl BlockGroupDesc {
    /// Decode one descriptor. `bytes` must hold at least `desc_size` bytes.
    pub fn from_bytes(bytes: &[u8], desc_size: u16) -> Result<Self> {
        if bytes.len() < desc_size as usize || desc_size < EXT2_MIN_DESC_SIZE {
            return_error!(
                ErrCode::EINVAL,
                "Group descriptor region of {} bytes, expected {}",
                bytes.len(),
                desc_size
            );
        }
        let mut desc = Self {
            block_bitmap: read_u32(bytes, 0) as PBlockId,
            inode_bitmap: read_u32(bytes, 4) as PBlockId,
            inode_table: read_u32(bytes, 8) as PBlockId,
            free_blocks_count: read_u16(bytes, 12) as u32,
            free_inodes_count: read_u16(bytes, 14) as u32,
            used_dirs_count: read_u16(bytes, 16) as u32,
        };
        if desc_size >= 64 {
            desc.block_bitmap |= (read_u32(bytes, 32) as PBlockId) << 32;
            desc.inode_bitmap |= (read_u32(bytes, 36) as PBlockId) << 32;
            desc.inode_table |= (read_u32(bytes, 40) as PBlockId) << 32;
            desc.free_blocks_count |= (read_u16(bytes, 44) as u32) << 16;
            desc.free_inodes_count |= (read_u16(bytes, 46) as u32) << 16;
            desc.used_dirs_count |= (read_u16(bytes, 48) as u32) << 16;
        }
        Ok(desc)
    }

    /// Decode `count` descriptors laid out back to back at the superblock's
    /// descriptor stride.
    pub fn table_from_bytes(bytes: &[u8], sb: &SuperBlock, count: u32) -> Result<Vec<Self>> {
        let stride = sb.desc_size() as usize;
        (0..count as usize)
            .map(|i| {
                let start = i * stride;
                match bytes.get(start..start + stride) {
                    Some(raw) => Self::from_bytes(raw, sb.desc_size()),
                    None => Err(Ext2Error::with_message(
                        ErrCode::EINVAL,
                        format!("Group descriptor table truncated at group {}", i),
                    )),
                }
            })
            .collect()
    }

    pub fn block_bitmap_block(&self) -> PBlockId {
        self.block_bitmap
    }

    pub fn inode_bitmap_block(&self) -> PBlockId {
        self.inode_bitmap
    }

    pub fn inode_table_first_block(&self) -> PBlockId {
        self.inode_table
    }

    pub fn free_blocks_count(&self) -> u32 {
        self.free_blocks_count
    }

    pub fn free_inodes_count(&self) -> u32 {
        self.free_inodes_count
    }

    pub fn used_dirs_count(&self) -> u32 {
        self.used_dirs_count
    }
}
