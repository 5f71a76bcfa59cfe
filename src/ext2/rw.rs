use super::Ext2;
use crate::constants::*;
use crate::ext2_defs::*;
use crate::prelude::*;
use crate::return_error;

impl Ext2 {
    /// Read a block, from the cache when possible.
    pub(super) fn read_block(&self, block_id: PBlockId) -> Result<Block> {
        if block_id >= self.super_block.blocks_count() as PBlockId {
            return_error!(
                ErrCode::EINVAL,
                "Block {} beyond the end of the volume ({} blocks)",
                block_id,
                self.super_block.blocks_count()
            );
        }
        if let Some(data) = self.cache.get(block_id) {
            return Ok(Block::new(block_id, data));
        }
        let block_size = self.block_size();
        debug!("Read block {}", block_id);
        let data: Arc<[u8]> = self
            .block_device
            .read_bytes(block_id as usize * block_size, block_size)?
            .into();
        self.cache.put(block_id, data.clone());
        Ok(Block::new(block_id, data))
    }

    /// Write a whole block to the device and refresh its cached copy.
    pub(super) fn write_block(&self, block_id: PBlockId, data: &[u8]) -> Result<()> {
        if self.read_only {
            return_error!(ErrCode::EROFS, "Volume is mounted read-only");
        }
        debug!("Write block {}", block_id);
        self.block_device
            .write_offset(block_id as usize * self.block_size(), data)
            .inspect_err(|_| self.cache.invalidate(block_id))?;
        self.cache.put(block_id, Arc::from(data));
        Ok(())
    }

    /// Read an inode from the inode table, return an `InodeRef` that
    /// combines the inode and its id.
    ///
    /// Each block group contains `sb.inodes_per_group` inodes. Because
    /// inode 0 is defined not to exist, the group of an inode is
    /// `(inode_id - 1) / sb.inodes_per_group` and its index in that group's
    /// table is `(inode_id - 1) % sb.inodes_per_group`.
    pub(super) fn read_inode(&self, inode_id: InodeId) -> Result<InodeRef> {
        if inode_id == 0 || inode_id > self.super_block.inodes_count() {
            return_error!(
                ErrCode::EINVAL,
                "Inode {} out of range 1..={}",
                inode_id,
                self.super_block.inodes_count()
            );
        }
        let inodes_per_group = self.super_block.inodes_per_group();
        let group = (inode_id - 1) / inodes_per_group;
        let index = (inode_id - 1) % inodes_per_group;
        let inode_size = self.super_block.inode_size() as usize;
        let block_size = self.block_size();

        let byte_offset = index as usize * inode_size;
        let table = self.block_group(group)?.inode_table_first_block();
        let block = self.read_block(table + (byte_offset / block_size) as PBlockId)?;
        let offset = byte_offset % block_size;
        let inode = Inode::from_bytes(block.read_offset(offset, INODE_RECORD_SIZE))?;
        debug!("Read inode {}: {:?}, size {}", inode_id, inode.kind(), inode.size());
        Ok(InodeRef::new(inode_id, inode))
    }

    /// Read the root inode
    pub(super) fn read_root_inode(&self) -> Result<InodeRef> {
        self.read_inode(EXT2_ROOT_INO)
    }

    /// Map logical block `iblock` of an inode to the physical block holding
    /// it. Unmapped blocks fail with `ENODATA`.
    pub fn resolve_block(&self, inode_ref: &InodeRef, iblock: LBlockId) -> Result<PBlockId> {
        if inode_ref.inode.has_inline_data() {
            return_error!(
                ErrCode::ENOTSUP,
                "Inode {} stores its data inline",
                inode_ref.id
            );
        }
        if inode_ref.inode.uses_extents() {
            self.extent_get_pblock(inode_ref, iblock)
        } else {
            self.indirect_get_pblock(inode_ref, iblock)
        }
    }
}
