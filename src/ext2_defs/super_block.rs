//! # The Superblock
//!
//! The superblock records various information about the enclosing filesystem,
//! such as block counts, inode counts, supported features, maintenance
//! information, and more.
//!
//! The primary superblock sits at byte offset 1024 of the volume regardless of
//! the block size. It is parsed once at mount and never mutated afterwards.

use super::layout::*;
use crate::constants::*;
use crate::prelude::*;
use crate::return_error;
use bitflags::bitflags;

bitflags! {
    /// Incompatible feature set. A driver that does not understand one of
    /// these must refuse to mount.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FeatureIncompat: u32 {
        const COMPRESSION = 0x0001;
        const FILETYPE = 0x0002;
        const RECOVER = 0x0004;
        const JOURNAL_DEV = 0x0008;
        const META_BG = 0x0010;
        const EXTENTS = 0x0040;
        const BIT64 = 0x0080;
        const MMP = 0x0100;
        const FLEX_BG = 0x0200;
        const EA_INODE = 0x0400;
        const DIRDATA = 0x1000;
        const CSUM_SEED = 0x2000;
        const LARGEDIR = 0x4000;
        const INLINE_DATA = 0x8000;
        const ENCRYPT = 0x10000;
    }
}

bitflags! {
    /// Readonly-compatible feature set. A driver that does not understand
    /// one of these may still mount read-only.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FeatureRoCompat: u32 {
        const SPARSE_SUPER = 0x0001;
        const LARGE_FILE = 0x0002;
        const BTREE_DIR = 0x0004;
        const HUGE_FILE = 0x0008;
        const GDT_CSUM = 0x0010;
        const DIR_NLINK = 0x0020;
        const EXTRA_ISIZE = 0x0040;
        const QUOTA = 0x0100;
        const BIGALLOC = 0x0200;
        const METADATA_CSUM = 0x0400;
    }
}

impl FeatureIncompat {
    /// Incompatible features this driver can read
    pub const SUPPORTED: Self = Self::FILETYPE
        .union(Self::EXTENTS)
        .union(Self::BIT64)
        .union(Self::FLEX_BG);
}

impl FeatureRoCompat {
    /// Readonly-compatible features that do not affect how data is read
    pub const SUPPORTED: Self = Self::SPARSE_SUPER
        .union(Self::LARGE_FILE)
        .union(Self::HUGE_FILE)
        .union(Self::DIR_NLINK)
        .union(Self::EXTRA_ISIZE);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    inodes_count: u32,
    blocks_count: u32,
    reserved_blocks_count: u32,
    free_blocks_count: u32,
    free_inodes_count: u32,
    first_data_block: u32,
    log_block_size: u32,
    log_frag_size: u32,
    blocks_per_group: u32,
    frags_per_group: u32,
    inodes_per_group: u32,
    mount_time: u32,
    write_time: u32,
    mount_count: u16,
    max_mount_count: u16,
    magic: u16,
    state: u16,
    errors: u16,
    minor_rev_level: u16,
    last_check_time: u32,
    check_interval: u32,
    creator_os: u32,
    rev_level: u32,
    // Dynamic revision only
    first_inode: u32,
    inode_size: u16,
    block_group_nr: u16,
    features_compatible: u32,
    features_incompatible: u32,
    features_read_only: u32,
    uuid: [u8; 16],
    volume_name: [u8; 16],
    desc_size: u16,
}

impl SuperBlock {
    /// Decode the 1024-byte superblock region.
    ///
    /// Fails with `EINVAL` if the magic number is wrong or the geometry is
    /// self-contradictory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SUPERBLOCK_SIZE {
            return_error!(
                ErrCode::EINVAL,
                "Superblock region too short: {} bytes",
                bytes.len()
            );
        }
        let magic = read_u16(bytes, 56);
        if magic != EXT2_SUPER_MAGIC {
            return_error!(
                ErrCode::EINVAL,
                "Not an ext2 superblock (bad magic {:#06x})",
                magic
            );
        }
        let rev_level = read_u32(bytes, 76);
        let dynamic = rev_level >= EXT2_DYNAMIC_REV;
        let features_incompatible = if dynamic { read_u32(bytes, 96) } else { 0 };
        let sb = Self {
            inodes_count: read_u32(bytes, 0),
            blocks_count: read_u32(bytes, 4),
            reserved_blocks_count: read_u32(bytes, 8),
            free_blocks_count: read_u32(bytes, 12),
            free_inodes_count: read_u32(bytes, 16),
            first_data_block: read_u32(bytes, 20),
            log_block_size: read_u32(bytes, 24),
            log_frag_size: read_u32(bytes, 28),
            blocks_per_group: read_u32(bytes, 32),
            frags_per_group: read_u32(bytes, 36),
            inodes_per_group: read_u32(bytes, 40),
            mount_time: read_u32(bytes, 44),
            write_time: read_u32(bytes, 48),
            mount_count: read_u16(bytes, 52),
            max_mount_count: read_u16(bytes, 54),
            magic,
            state: read_u16(bytes, 58),
            errors: read_u16(bytes, 60),
            minor_rev_level: read_u16(bytes, 62),
            last_check_time: read_u32(bytes, 64),
            check_interval: read_u32(bytes, 68),
            creator_os: read_u32(bytes, 72),
            rev_level,
            first_inode: if dynamic {
                read_u32(bytes, 84)
            } else {
                EXT2_GOOD_OLD_FIRST_INO
            },
            inode_size: if dynamic {
                read_u16(bytes, 88)
            } else {
                EXT2_GOOD_OLD_INODE_SIZE
            },
            block_group_nr: if dynamic { read_u16(bytes, 90) } else { 0 },
            features_compatible: if dynamic { read_u32(bytes, 92) } else { 0 },
            features_incompatible,
            features_read_only: if dynamic { read_u32(bytes, 100) } else { 0 },
            uuid: read_array(bytes, 104),
            volume_name: read_array(bytes, 120),
            desc_size: if features_incompatible & FeatureIncompat::BIT64.bits() != 0 {
                read_u16(bytes, 254)
            } else {
                EXT2_MIN_DESC_SIZE
            },
        };
        sb.check_geometry()?;
        Ok(sb)
    }

    fn check_geometry(&self) -> Result<()> {
        if self.log_block_size > EXT2_MAX_BLOCK_LOG_SIZE {
            return_error!(
                ErrCode::EINVAL,
                "Block size log {} out of range",
                self.log_block_size
            );
        }
        let frag_log = self.log_frag_size as i32;
        if frag_log.unsigned_abs() > EXT2_MAX_BLOCK_LOG_SIZE {
            return_error!(ErrCode::EINVAL, "Fragment size log {} out of range", frag_log);
        }
        if self.blocks_per_group == 0 || self.inodes_per_group == 0 {
            return_error!(ErrCode::EINVAL, "Zero blocks or inodes per group");
        }
        if self.blocks_per_group as usize > self.block_size() * 8
            || self.inodes_per_group as usize > self.block_size() * 8
        {
            return_error!(
                ErrCode::EINVAL,
                "Group does not fit one bitmap block: {} blocks, {} inodes per group",
                self.blocks_per_group,
                self.inodes_per_group
            );
        }
        if self.inode_size < EXT2_GOOD_OLD_INODE_SIZE
            || !self.inode_size.is_power_of_two()
            || self.inode_size as usize > self.block_size()
        {
            return_error!(ErrCode::EINVAL, "Invalid inode size {}", self.inode_size);
        }
        if self.desc_size < EXT2_MIN_DESC_SIZE || self.desc_size > EXT4_MAX_DESC_SIZE {
            return_error!(
                ErrCode::EINVAL,
                "Invalid group descriptor size {}",
                self.desc_size
            );
        }
        if self.first_inode == 0 || self.first_inode > self.inodes_count {
            return_error!(
                ErrCode::EINVAL,
                "First non-reserved inode {} outside 1..={}",
                self.first_inode,
                self.inodes_count
            );
        }
        if self.first_data_block >= self.blocks_count {
            return_error!(
                ErrCode::EINVAL,
                "First data block {} beyond block count {}",
                self.first_data_block,
                self.blocks_count
            );
        }
        Ok(())
    }

    pub fn inodes_count(&self) -> u32 {
        self.inodes_count
    }

    pub fn blocks_count(&self) -> u32 {
        self.blocks_count
    }

    pub fn reserved_blocks_count(&self) -> u32 {
        self.reserved_blocks_count
    }

    pub fn free_blocks_count(&self) -> u32 {
        self.free_blocks_count
    }

    pub fn free_inodes_count(&self) -> u32 {
        self.free_inodes_count
    }

    pub fn first_data_block(&self) -> u32 {
        self.first_data_block
    }

    /// `1024 << log_block_size`
    pub fn block_size(&self) -> usize {
        EXT2_MIN_BLOCK_SIZE << self.log_block_size
    }

    /// Fragment size. The field is signed on disk.
    pub fn frag_size(&self) -> usize {
        let log = self.log_frag_size as i32;
        if log >= 0 {
            EXT2_MIN_BLOCK_SIZE << log
        } else {
            EXT2_MIN_BLOCK_SIZE >> -log
        }
    }

    pub fn blocks_per_group(&self) -> u32 {
        self.blocks_per_group
    }

    pub fn frags_per_group(&self) -> u32 {
        self.frags_per_group
    }

    pub fn inodes_per_group(&self) -> u32 {
        self.inodes_per_group
    }

    pub fn mount_time(&self) -> u32 {
        self.mount_time
    }

    pub fn write_time(&self) -> u32 {
        self.write_time
    }

    pub fn mount_count(&self) -> u16 {
        self.mount_count
    }

    pub fn max_mount_count(&self) -> u16 {
        self.max_mount_count
    }

    pub fn magic(&self) -> u16 {
        self.magic
    }

    pub fn state(&self) -> u16 {
        self.state
    }

    /// Behaviour when detecting errors
    pub fn errors(&self) -> u16 {
        self.errors
    }

    pub fn minor_rev_level(&self) -> u16 {
        self.minor_rev_level
    }

    pub fn last_check_time(&self) -> u32 {
        self.last_check_time
    }

    pub fn check_interval(&self) -> u32 {
        self.check_interval
    }

    pub fn creator_os(&self) -> u32 {
        self.creator_os
    }

    pub fn rev_level(&self) -> u32 {
        self.rev_level
    }

    /// First non-reserved inode
    pub fn first_inode(&self) -> u32 {
        self.first_inode
    }

    /// Size of one inode table record
    pub fn inode_size(&self) -> u16 {
        self.inode_size
    }

    /// Block group that holds this superblock copy
    pub fn block_group_nr(&self) -> u16 {
        self.block_group_nr
    }

    pub fn features_compatible(&self) -> u32 {
        self.features_compatible
    }

    pub fn features_incompatible(&self) -> FeatureIncompat {
        FeatureIncompat::from_bits_retain(self.features_incompatible)
    }

    pub fn features_read_only(&self) -> FeatureRoCompat {
        FeatureRoCompat::from_bits_retain(self.features_read_only)
    }

    pub fn uuid(&self) -> [u8; 16] {
        self.uuid
    }

    pub fn volume_name(&self) -> String {
        let len = self
            .volume_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.volume_name.len());
        String::from_utf8_lossy(&self.volume_name[..len]).into_owned()
    }

    /// Stride between two group descriptors in the descriptor table
    pub fn desc_size(&self) -> u16 {
        self.desc_size
    }

    /// Number of block groups: `ceil(blocks_count / blocks_per_group)`
    pub fn block_groups_count(&self) -> u32 {
        self.blocks_count.div_ceil(self.blocks_per_group)
    }

    /// Number of blocks one group's inode table occupies
    pub fn inode_table_blocks(&self) -> u32 {
        (self.inodes_per_group as usize * self.inode_size as usize).div_ceil(self.block_size())
            as u32
    }

    /// Whether the volume uses extent trees for block mapping
    pub fn has_extents(&self) -> bool {
        self.features_incompatible()
            .contains(FeatureIncompat::EXTENTS)
    }

    /// Whether directory records carry a file type byte
    pub fn has_filetype(&self) -> bool {
        self.features_incompatible()
            .contains(FeatureIncompat::FILETYPE)
    }

    /// Whether regular files use the high 32 bits of the size field
    pub fn has_large_file(&self) -> bool {
        self.features_read_only()
            .contains(FeatureRoCompat::LARGE_FILE)
    }

    /// Whether group `group` holds a backup superblock and descriptor table
    pub fn group_has_super(&self, group: BlockGroupId) -> bool {
        if !self
            .features_read_only()
            .contains(FeatureRoCompat::SPARSE_SUPER)
        {
            return true;
        }
        group <= 1 || is_power_of(group, 3) || is_power_of(group, 5) || is_power_of(group, 7)
    }
}

fn is_power_of(mut n: u32, base: u32) -> bool {
    while n % base == 0 {
        n /= base;
    }
    n == 1
}
