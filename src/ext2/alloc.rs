//! Block and inode allocation.
//!
//! Every operation here works on one block group and requires that group's
//! `GroupGuard`, obtained from `Ext2::lock_group`. The guard serialises all
//! bitmap updates and counter changes for the group; operations on
//! different groups may run concurrently.

use super::{Ext2, GroupState};
use crate::constants::*;
use crate::ext2_defs::*;
use crate::prelude::*;
use crate::return_error;

/// Exclusive allocation rights over one block group.
pub struct GroupGuard<'a> {
    group: BlockGroupId,
    state: spin::MutexGuard<'a, GroupState>,
}

impl GroupGuard<'_> {
    pub fn group(&self) -> BlockGroupId {
        self.group
    }

    pub fn free_blocks(&self) -> u32 {
        self.state.free_blocks
    }

    pub fn free_inodes(&self) -> u32 {
        self.state.free_inodes
    }
}

/// Which bitmap of a group an operation touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BitmapKind {
    Block,
    Inode,
}

impl Ext2 {
    /// Take the allocation lock of `group`, spinning until it is free.
    pub fn lock_group(&self, group: BlockGroupId) -> Result<GroupGuard<'_>> {
        let Some(lock) = self.groups.get(group as usize) else {
            return_error!(ErrCode::EINVAL, "No block group {}", group);
        };
        Ok(GroupGuard {
            group,
            state: lock.lock(),
        })
    }

    /// Take the allocation lock of `group` only if nobody holds it.
    pub fn try_lock_group(&self, group: BlockGroupId) -> Option<GroupGuard<'_>> {
        let state = self.groups.get(group as usize)?.try_lock()?;
        Some(GroupGuard { group, state })
    }

    /// Split an absolute block number into its group and the index inside
    /// that group's block bitmap.
    pub fn block_to_group(&self, block: PBlockId) -> Result<(BlockGroupId, u32)> {
        let first = self.super_block.first_data_block() as PBlockId;
        if block < first || block >= self.super_block.blocks_count() as PBlockId {
            return_error!(ErrCode::EINVAL, "Block {} is not a data block", block);
        }
        let rel = block - first;
        let per_group = self.super_block.blocks_per_group() as PBlockId;
        Ok(((rel / per_group) as BlockGroupId, (rel % per_group) as u32))
    }

    /// First block of `group`
    pub fn group_first_block(&self, group: BlockGroupId) -> PBlockId {
        self.super_block.first_data_block() as PBlockId
            + group as PBlockId * self.super_block.blocks_per_group() as PBlockId
    }

    /// Number of blocks in `group`; the last group may be short.
    pub fn blocks_in_group(&self, group: BlockGroupId) -> u32 {
        let end = self.super_block.blocks_count() as PBlockId;
        let start = self.group_first_block(group);
        end.saturating_sub(start)
            .min(self.super_block.blocks_per_group() as PBlockId) as u32
    }

    /// Blocks at the start of `group` that are always metadata: everything up
    /// to the end of its inode table when the table lives inside the group.
    fn group_metadata_prefix(&self, group: BlockGroupId) -> Result<u32> {
        let start = self.group_first_block(group);
        let itable_end = self.block_group(group)?.inode_table_first_block()
            + self.super_block.inode_table_blocks() as PBlockId;
        let len = self.blocks_in_group(group) as PBlockId;
        Ok(if itable_end > start && itable_end <= start + len {
            (itable_end - start) as u32
        } else {
            0
        })
    }

    fn check_guard(&self, guard: &GroupGuard, group: BlockGroupId) -> Result<()> {
        if self.read_only {
            return_error!(ErrCode::EROFS, "Volume is mounted read-only");
        }
        if guard.group != group {
            return_error!(
                ErrCode::EINVAL,
                "Holding the lock of group {} while updating group {}",
                guard.group,
                group
            );
        }
        Ok(())
    }

    /// Load a bitmap block, let `update` change it, and write it back when
    /// `update` reports a change.
    fn update_bitmap<T>(
        &self,
        group: BlockGroupId,
        kind: BitmapKind,
        update: impl FnOnce(&mut Bitmap) -> Result<(T, bool)>,
    ) -> Result<T> {
        let desc = self.block_group(group)?;
        let bitmap_block = match kind {
            BitmapKind::Block => desc.block_bitmap_block(),
            BitmapKind::Inode => desc.inode_bitmap_block(),
        };
        let mut data = self.read_block(bitmap_block)?.to_vec();
        let (out, dirty) = update(&mut Bitmap::new(&mut data))?;
        if dirty {
            self.write_block(bitmap_block, &data)?;
        }
        Ok(out)
    }

    /// Try to claim exactly `block`, plus a preallocation run after it.
    /// Blocks inside the group's metadata prefix are never claimed.
    pub fn test_and_set_block(
        &self,
        guard: &mut GroupGuard,
        block: PBlockId,
    ) -> Result<BlockReservation> {
        let (group, index) = self.block_to_group(block)?;
        self.check_guard(guard, group)?;
        if index < self.group_metadata_prefix(group)? {
            return Ok(BlockReservation::failed(guard.state.free_blocks));
        }
        let limit = self.blocks_in_group(group) as usize;
        let claim = self.update_bitmap(group, BitmapKind::Block, |bmap| {
            let claim = bmap.claim_at(index as usize, limit, EXT2_PREALLOC_BLOCK);
            Ok((claim, claim.is_some()))
        })?;
        Ok(self.finish_block_claim(guard, group, claim))
    }

    /// Claim the first free block of the guarded group beyond its metadata.
    ///
    /// Fails without touching the bitmap when the group has fewer than
    /// `threshold` free blocks. A failed reservation carries the group's
    /// free block count.
    pub fn find_free_blocks(
        &self,
        guard: &mut GroupGuard,
        threshold: u32,
    ) -> Result<BlockReservation> {
        let group = guard.group;
        self.check_guard(guard, group)?;
        if guard.state.free_blocks < threshold.max(1) {
            return Ok(BlockReservation::failed(guard.state.free_blocks));
        }
        let prefix = self.group_metadata_prefix(group)? as usize;
        let limit = self.blocks_in_group(group) as usize;
        let claim = self.update_bitmap(group, BitmapKind::Block, |bmap| {
            let claim = bmap.claim_first_free(prefix, limit, EXT2_PREALLOC_BLOCK);
            Ok((claim, claim.is_some()))
        })?;
        Ok(self.finish_block_claim(guard, group, claim))
    }

    fn finish_block_claim(
        &self,
        guard: &mut GroupGuard,
        group: BlockGroupId,
        claim: Option<Claim>,
    ) -> BlockReservation {
        match claim {
            Some(Claim { index, prealloc }) => {
                let block = self.group_first_block(group) + index as PBlockId;
                guard.state.free_blocks = guard.state.free_blocks.saturating_sub(1 + prealloc);
                debug!(
                    "Allocated block {} (+{} preallocated) in group {}",
                    block, prealloc, group
                );
                BlockReservation::claimed(block, prealloc)
            }
            None => BlockReservation::failed(guard.state.free_blocks),
        }
    }

    /// Release one block. Releasing a free block fails with `EUCLEAN`,
    /// releasing one of the group's metadata blocks with `EINVAL`.
    pub fn free_block(&self, guard: &mut GroupGuard, block: PBlockId) -> Result<()> {
        let (group, index) = self.block_to_group(block)?;
        self.check_guard(guard, group)?;
        if index < self.group_metadata_prefix(group)? {
            return_error!(
                ErrCode::EINVAL,
                "Block {} is metadata of group {} and cannot be freed",
                block,
                group
            );
        }
        self.update_bitmap(group, BitmapKind::Block, |bmap| {
            bmap.free_bit(index as usize)?;
            Ok(((), true))
        })?;
        guard.state.free_blocks += 1;
        debug!("Freed block {} in group {}", block, group);
        Ok(())
    }

    /// Claim the first free inode of the guarded group. Reserved inodes at
    /// the start of group 0 are never handed out.
    pub fn find_free_inode(&self, guard: &mut GroupGuard) -> Result<InodeReservation> {
        let group = guard.group;
        self.check_guard(guard, group)?;
        if guard.state.free_inodes == 0 {
            return Ok(InodeReservation::failed(group));
        }
        let prefix = if group == 0 {
            self.super_block.first_inode() as usize - 1
        } else {
            0
        };
        let limit = self.super_block.inodes_per_group() as usize;
        let claim = self.update_bitmap(group, BitmapKind::Inode, |bmap| {
            let claim = bmap.claim_first_free(prefix, limit, 0);
            Ok((claim, claim.is_some()))
        })?;
        Ok(match claim {
            Some(Claim { index, .. }) => {
                guard.state.free_inodes -= 1;
                let reservation = InodeReservation::claimed(group, index as u32);
                debug!(
                    "Allocated inode {} in group {}",
                    reservation.inode_id(self.super_block.inodes_per_group()),
                    group
                );
                reservation
            }
            None => InodeReservation::failed(group),
        })
    }

    /// Release one inode. Releasing a free inode fails with `EUCLEAN`.
    pub fn free_inode(&self, guard: &mut GroupGuard, inode: InodeId) -> Result<()> {
        if inode == 0 || inode > self.super_block.inodes_count() {
            return_error!(ErrCode::EINVAL, "Inode {} out of range", inode);
        }
        let per_group = self.super_block.inodes_per_group();
        let group = (inode - 1) / per_group;
        self.check_guard(guard, group)?;
        let index = ((inode - 1) % per_group) as usize;
        self.update_bitmap(group, BitmapKind::Inode, |bmap| {
            bmap.free_bit(index)?;
            Ok(((), true))
        })?;
        guard.state.free_inodes += 1;
        debug!("Freed inode {} in group {}", inode, group);
        Ok(())
    }

    /// Allocate an inode, trying `preferred` first and then every other
    /// group in order.
    pub fn alloc_inode(&self, preferred: BlockGroupId) -> Result<InodeId> {
        let count = self.block_groups_count();
        for group in (0..count).map(|i| (preferred % count + i) % count) {
            let mut guard = self.lock_group(group)?;
            let reservation = self.find_free_inode(&mut guard)?;
            if reservation.successful {
                return Ok(reservation.inode_id(self.super_block.inodes_per_group()));
            }
        }
        return_error!(ErrCode::ENOSPC, "No free inode in any group")
    }

    /// Allocate a block run, trying `preferred` first and then every other
    /// group in order.
    pub fn alloc_block(&self, preferred: BlockGroupId) -> Result<BlockReservation> {
        let count = self.block_groups_count();
        for group in (0..count).map(|i| (preferred % count + i) % count) {
            let mut guard = self.lock_group(group)?;
            let reservation = self.find_free_blocks(&mut guard, 1)?;
            if reservation.successful {
                return Ok(reservation);
            }
        }
        return_error!(ErrCode::ENOSPC, "No free block in any group")
    }
}
