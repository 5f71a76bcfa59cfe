//! Low-level operations of Ext2 filesystem.
//!
//! These interfaces are designed and arranged corresponding to FUSE
//! low-level ops: everything is addressed by inode id.
//! Ref: https://libfuse.github.io/doxygen/structfuse__lowlevel__ops.html

use super::{DirIter, Ext2};
use crate::constants::*;
use crate::ext2_defs::*;
use crate::prelude::*;
use crate::return_error;
use core::cmp::min;

/// Space accounting for the whole volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStat {
    pub block_size: u32,
    pub blocks: u64,
    pub free_blocks: u64,
    pub inodes: u32,
    pub free_inodes: u32,
    pub groups: u32,
    pub name_max: u32,
}

impl Ext2 {
    /// Read an inode
    ///
    /// # Params
    ///
    /// * `id` - inode id
    ///
    /// # Return
    ///
    /// An inode reference, combining id and the inode itself
    pub fn inode(&self, id: InodeId) -> Result<InodeRef> {
        self.read_inode(id)
    }

    /// Get the attributes of an inode
    pub fn getattr(&self, id: InodeId) -> Result<FileAttr> {
        let inode = self.read_inode(id)?;
        Ok(FileAttr::from_inode(&inode, self.block_size()))
    }

    /// Read data from a file. This function will read exactly `buf.len()`
    /// bytes unless the end of the file is reached.
    ///
    /// # Params
    ///
    /// * `file` - the inode id of the file
    /// * `offset` - offset to read from
    /// * `buf` - the buffer to store the data
    ///
    /// # Return
    ///
    /// `Ok(usize)` - the actual number of bytes read, 0 at or past the end
    /// of the file
    ///
    /// Unmapped blocks inside the file read as zeros.
    pub fn read(&self, file: InodeId, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let inode_ref = self.read_inode(file)?;
        self.read_inode_data(&inode_ref, offset, buf)
    }

    pub(super) fn read_inode_data(
        &self,
        inode_ref: &InodeRef,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        if inode_ref.inode.is_dir() {
            return_error!(ErrCode::EISDIR, "Inode {} is a directory", inode_ref.id);
        }
        let fsize = inode_ref.inode.size();
        if offset >= fsize || buf.is_empty() {
            return Ok(0);
        }
        // Calc the actual size to read
        let size_to_read = min(buf.len() as u64, fsize - offset) as usize;
        let block_size = self.block_size();

        let mut cursor = 0;
        while cursor < size_to_read {
            let pos = offset + cursor as u64;
            let Ok(iblock) = LBlockId::try_from(pos / block_size as u64) else {
                return_error!(
                    ErrCode::EFBIG,
                    "Offset {} of inode {} beyond the last logical block",
                    pos,
                    inode_ref.id
                );
            };
            let in_block = (pos % block_size as u64) as usize;
            let read_len = min(block_size - in_block, size_to_read - cursor);
            let dst = &mut buf[cursor..cursor + read_len];
            match self.resolve_block(inode_ref, iblock) {
                Ok(pblock) => {
                    let block = self.read_block(pblock)?;
                    dst.copy_from_slice(block.read_offset(in_block, read_len));
                }
                Err(e) if e.code() == ErrCode::ENODATA => dst.fill(0),
                Err(e) => return Err(e),
            }
            cursor += read_len;
        }
        Ok(cursor)
    }

    /// Look up a directory entry by name.
    ///
    /// # Params
    ///
    /// * `parent` - the inode of the directory to look in
    /// * `name` - the name of the entry to look for
    ///
    /// # Return
    ///
    /// `Ok(inode)` - the inode id of the entry
    pub fn lookup(&self, parent: InodeId, name: &str) -> Result<InodeId> {
        let parent = self.read_inode(parent)?;
        if !parent.inode.is_dir() {
            return_error!(ErrCode::ENOTDIR, "Inode {} is not a directory", parent.id);
        }
        self.dir_find_entry(&parent, name).map(|de| de.inode())
    }

    /// Iterate the entries of a directory lazily
    pub fn read_dir(&self, inode: InodeId) -> Result<DirIter<'_>> {
        let inode_ref = self.read_inode(inode)?;
        if !inode_ref.inode.is_dir() {
            return_error!(ErrCode::ENOTDIR, "Inode {} is not a directory", inode);
        }
        Ok(self.dir_iter(inode_ref))
    }

    /// List all directory entries in a directory, `.` and `..` included
    pub fn list(&self, inode: InodeId) -> Result<Vec<DirEntry>> {
        Ok(self.read_dir(inode)?.collect())
    }

    /// Read the target of a symbolic link
    pub fn read_link(&self, inode: InodeId) -> Result<String> {
        let inode_ref = self.read_inode(inode)?;
        if !inode_ref.inode.is_softlink() {
            return_error!(ErrCode::EINVAL, "Inode {} is not a symlink", inode);
        }
        let size = inode_ref.inode.size();
        // a slow target lives in one block, its last byte left for the NUL
        if size >= self.block_size() as u64 {
            return_error!(
                ErrCode::EINVAL,
                "Symlink {} target of {} bytes does not fit a block",
                inode,
                size
            );
        }
        let size = size as usize;
        let target = if inode_ref.inode.is_fast_symlink(self.block_size()) {
            inode_ref.inode.block_area()[..size].to_vec()
        } else {
            let mut buf = vec![0u8; size];
            let n = self.read_inode_data(&inode_ref, 0, &mut buf)?;
            buf.truncate(n);
            buf
        };
        String::from_utf8(target).map_err(|_| {
            Ext2Error::with_message(
                ErrCode::EINVAL,
                format!("Symlink {} target is not UTF-8", inode),
            )
        })
    }

    /// Report volume-wide space usage from the in-memory group counters.
    pub fn statfs(&self) -> FsStat {
        let (free_blocks, free_inodes) = self.groups.iter().fold((0u64, 0u32), |acc, g| {
            let g = g.lock();
            (acc.0 + g.free_blocks as u64, acc.1 + g.free_inodes)
        });
        FsStat {
            block_size: self.block_size() as u32,
            blocks: self.super_block.blocks_count() as u64,
            free_blocks,
            inodes: self.super_block.inodes_count(),
            free_inodes,
            groups: self.block_groups_count(),
            name_max: NAME_MAX as u32,
        }
    }
}
