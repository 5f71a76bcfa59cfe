#![allow(unused)]

use crate::prelude::*;

/// Byte offset of the primary superblock on the volume
pub const BASE_OFFSET: usize = 1024;
pub const SUPERBLOCK_SIZE: usize = 1024;
pub const EXT2_SUPER_MAGIC: u16 = 0xEF53;
pub const EXT2_MIN_BLOCK_SIZE: usize = 1024;
/// Largest block size the format allows (64 KiB)
pub const EXT2_MAX_BLOCK_LOG_SIZE: u32 = 6;

pub const EXT2_GOOD_OLD_REV: u32 = 0;
pub const EXT2_DYNAMIC_REV: u32 = 1;
pub const EXT2_GOOD_OLD_FIRST_INO: u32 = 11;
pub const EXT2_GOOD_OLD_INODE_SIZE: u16 = 128;

pub const EXT2_VALID_FS: u16 = 1;
pub const EXT2_ERROR_FS: u16 = 2;

pub const EXT2_MIN_DESC_SIZE: u16 = 32;
pub const EXT4_MAX_DESC_SIZE: u16 = 1024;

/// The inode number of root inode
pub const EXT2_ROOT_INO: InodeId = 2;

/// Number of direct block pointers in an inode
pub const EXT2_NDIR_BLOCKS: usize = 12;
pub const EXT2_IND_BLOCK: usize = 12;
pub const EXT2_DIND_BLOCK: usize = 13;
pub const EXT2_TIND_BLOCK: usize = 14;
pub const EXT2_N_BLOCKS: usize = 15;
/// Size of the block pointer area (`i_block`) in bytes
pub const EXT2_BLOCK_AREA_SIZE: usize = EXT2_N_BLOCKS * 4;

/// Blocks preallocated after a successful block allocation
pub const EXT2_PREALLOC_BLOCK: u32 = 7;

pub const EXT4_INODE_FLAG_INDEX: u32 = 0x0000_1000;
pub const EXT4_INODE_FLAG_HUGE_FILE: u32 = 0x0004_0000;
pub const EXT4_INODE_FLAG_EXTENTS: u32 = 0x0008_0000;
pub const EXT4_INODE_FLAG_INLINE_DATA: u32 = 0x1000_0000;

pub const EXT4_EXTENT_MAGIC: u16 = 0xF30A;
pub const EXT_INIT_MAX_LEN: u16 = 32768;
/// The extent tree can be at most 5 levels deep
pub const EXT4_EXTENT_MAX_DEPTH: u16 = 5;

/// Maximum bytes in a file name
pub const NAME_MAX: usize = 255;

/// Fast symlinks keep their target inline when shorter than this
pub const EXT2_FAST_SYMLINK_MAX: u64 = 60;

pub const DEFAULT_CACHE_CAPACITY: usize = 256;
