use crate::constants::*;
use crate::ext2_defs::*;
use crate::prelude::*;
use crate::return_error;

mod alloc;
mod cache;
mod dir;
mod entry;
mod extent;
mod high_level;
mod indirect;
mod low_level;
mod rw;

pub use self::alloc::GroupGuard;
pub use cache::BlockCache;
pub use dir::{DirIter, IterState};
pub use entry::{Children, Directory, Entry, File};
pub use low_level::FsStat;

/// Mount-time configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountOptions {
    /// Refuse every mutation, including bitmap allocation
    pub read_only: bool,
    /// Number of blocks the block cache keeps; 0 disables it
    pub cache_capacity: usize,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            read_only: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Per-group allocation state, guarded by the group's lock
#[derive(Debug)]
struct GroupState {
    free_blocks: u32,
    free_inodes: u32,
}

#[derive(Debug)]
pub struct Ext2 {
    block_device: Arc<dyn BlockDevice>,
    super_block: SuperBlock,
    block_groups: Vec<BlockGroupDesc>,
    groups: Vec<spin::Mutex<GroupState>>,
    cache: BlockCache,
    read_only: bool,
}

impl Ext2 {
    /// Opens and loads an Ext2 from the `block_device` with default options.
    pub fn load(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        Self::mount_with(block_device, MountOptions::default())
    }

    /// The primary descriptor table must end inside group 0, which in
    /// turn lies inside the volume.
    fn check_table_bounds(super_block: &SuperBlock, offset: usize, len: usize) -> Result<()> {
        let block_size = super_block.block_size() as u64;
        let first = super_block.first_data_block() as u64;
        let group0_blocks = (super_block.blocks_per_group() as u64)
            .min(super_block.blocks_count() as u64 - first);
        let limit = (first + group0_blocks) * block_size;
        let end = offset as u64 + len as u64;
        if end > limit {
            return_error!(
                ErrCode::EINVAL,
                "Descriptor table of {} bytes at {} overruns group 0 ending at {}",
                len,
                offset,
                limit
            );
        }
        Ok(())
    }

    /// Opens and loads an Ext2 from the `block_device`.
    ///
    /// | Super Block | Group Descriptors | Block Bitmap | Inode Bitmap | Inode Table | Data Blocks |
    ///
    /// Nothing is returned unless the superblock and every group descriptor
    /// decode and agree with each other.
    pub fn mount_with(block_device: Arc<dyn BlockDevice>, options: MountOptions) -> Result<Self> {
        // Load the superblock
        let raw = block_device.read_bytes(BASE_OFFSET, SUPERBLOCK_SIZE)?;
        let super_block = SuperBlock::from_bytes(&raw)?;
        Self::check_features(&super_block)?;
        let read_only = Self::decide_read_only(&super_block, block_device.as_ref(), options);

        // The descriptor table starts in the block after the superblock
        let group_count = super_block.block_groups_count();
        let block_size = super_block.block_size();
        let table_offset = (super_block.first_data_block() as usize + 1) * block_size;
        let table_len = group_count as usize * super_block.desc_size() as usize;
        Self::check_table_bounds(&super_block, table_offset, table_len)?;
        let raw = block_device.read_bytes(table_offset, table_len)?;
        let block_groups = BlockGroupDesc::table_from_bytes(&raw, &super_block, group_count)?;
        for (id, desc) in block_groups.iter().enumerate() {
            Self::check_group(&super_block, id as BlockGroupId, desc)?;
        }

        let groups = block_groups
            .iter()
            .map(|desc| {
                spin::Mutex::new(GroupState {
                    free_blocks: desc.free_blocks_count(),
                    free_inodes: desc.free_inodes_count(),
                })
            })
            .collect();

        info!(
            "Mounted ext2 volume \"{}\": {} blocks of {} bytes, {} inodes, {} groups{}",
            super_block.volume_name(),
            super_block.blocks_count(),
            block_size,
            super_block.inodes_count(),
            group_count,
            if read_only { ", read-only" } else { "" }
        );
        Ok(Self {
            block_device,
            super_block,
            block_groups,
            groups,
            cache: BlockCache::new(options.cache_capacity),
            read_only,
        })
    }

    /// Refuse volumes whose incompatible features change how data is laid out
    fn check_features(sb: &SuperBlock) -> Result<()> {
        let unsupported = sb.features_incompatible() - FeatureIncompat::SUPPORTED;
        if unsupported.contains(FeatureIncompat::RECOVER) {
            return_error!(ErrCode::ENOTSUP, "Journal needs recovery");
        }
        if !unsupported.is_empty() {
            return_error!(
                ErrCode::ENOTSUP,
                "Unsupported incompatible features {:?} ({:#x})",
                unsupported,
                unsupported.bits()
            );
        }
        Ok(())
    }

    fn decide_read_only(sb: &SuperBlock, device: &dyn BlockDevice, options: MountOptions) -> bool {
        if options.read_only {
            return true;
        }
        let unknown_ro = sb.features_read_only() - FeatureRoCompat::SUPPORTED;
        if !unknown_ro.is_empty() {
            info!(
                "Unsupported read-only features {:#x}, mounting read-only",
                unknown_ro.bits()
            );
            return true;
        }
        if sb.state() & EXT2_ERROR_FS != 0 {
            info!("Volume has errors, mounting read-only");
            return true;
        }
        if !device.writable() {
            info!("Device is not writable, mounting read-only");
            return true;
        }
        if sb.state() & EXT2_VALID_FS == 0 {
            warn!("Volume was not cleanly unmounted");
        }
        false
    }

    fn check_group(sb: &SuperBlock, id: BlockGroupId, desc: &BlockGroupDesc) -> Result<()> {
        let blocks = sb.blocks_count() as PBlockId;
        let itable_end = desc.inode_table_first_block() + sb.inode_table_blocks() as PBlockId;
        if desc.block_bitmap_block() >= blocks
            || desc.inode_bitmap_block() >= blocks
            || itable_end > blocks
        {
            return_error!(
                ErrCode::EINVAL,
                "Group {} metadata outside the volume: bitmaps {}/{}, inode table {}",
                id,
                desc.block_bitmap_block(),
                desc.inode_bitmap_block(),
                desc.inode_table_first_block()
            );
        }
        Ok(())
    }

    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    pub fn block_size(&self) -> usize {
        self.super_block.block_size()
    }

    pub fn block_group(&self, id: BlockGroupId) -> Result<&BlockGroupDesc> {
        self.block_groups.get(id as usize).ok_or_else(|| {
            Ext2Error::with_message(ErrCode::EINVAL, format!("No block group {}", id))
        })
    }

    pub fn block_groups_count(&self) -> u32 {
        self.block_groups.len() as u32
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }
}
