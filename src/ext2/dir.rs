//! Directory iteration.
//!
//! A directory's data is a byte stream of `size` bytes made of packed
//! records. The iterator walks that stream record by record, fetching a new
//! block only when the walk crosses into it.

use super::Ext2;
use crate::ext2_defs::*;
use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterState {
    BeforeFirst,
    OnEntry,
    Exhausted,
}

/// Lazy walk over the live records of one directory.
///
/// Iteration ends at the directory's size or at the first record whose
/// inode number is 0; that record is never yielded. A block that cannot be
/// read or a record that does not decode also ends iteration, after a
/// warning, so callers see a shortened listing rather than an error.
#[derive(Debug)]
pub struct DirIter<'a> {
    fs: &'a Ext2,
    dir: InodeRef,
    offset: u64,
    current: Option<Block>,
    current_iblock: LBlockId,
    state: IterState,
}

impl<'a> DirIter<'a> {
    pub(super) fn new(fs: &'a Ext2, dir: InodeRef) -> Self {
        Self {
            fs,
            dir,
            offset: 0,
            current: None,
            current_iblock: 0,
            state: IterState::BeforeFirst,
        }
    }

    pub fn state(&self) -> IterState {
        self.state
    }

    /// Byte offset of the next record in the directory stream
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn finish(&mut self) -> Option<DirEntry> {
        self.state = IterState::Exhausted;
        self.current = None;
        None
    }

    fn block_for(&mut self, iblock: LBlockId) -> Result<&Block> {
        let stale = match &self.current {
            Some(_) => self.current_iblock != iblock,
            None => true,
        };
        if stale {
            let pblock = self.fs.resolve_block(&self.dir, iblock)?;
            let block = self.fs.read_block(pblock)?;
            self.current_iblock = iblock;
            self.current = Some(block);
        }
        self.current
            .as_ref()
            .ok_or_else(|| Ext2Error::new(ErrCode::EIO))
    }

    fn advance(&mut self) -> Option<DirEntry> {
        if self.state == IterState::Exhausted || self.offset >= self.dir.inode.size() {
            return self.finish();
        }
        let block_size = self.fs.block_size() as u64;
        let iblock = (self.offset / block_size) as LBlockId;
        let in_block = (self.offset % block_size) as usize;
        let has_filetype = self.fs.super_block.has_filetype();
        let dir_id = self.dir.id;

        let decoded = self
            .block_for(iblock)
            .and_then(|block| DirEntry::from_bytes(&block.data[in_block..], has_filetype));
        let entry = match decoded {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    "Directory {}: stopping at offset {}: {}",
                    dir_id, self.offset, e
                );
                return self.finish();
            }
        };
        if entry.unused() {
            return self.finish();
        }
        trace!(
            "Directory {} record at {}: {} -> {}",
            dir_id,
            self.offset,
            entry.name_lossy(),
            entry.inode()
        );
        self.offset += entry.rec_len() as u64;
        self.state = IterState::OnEntry;
        Some(entry)
    }
}

impl Iterator for DirIter<'_> {
    type Item = DirEntry;

    fn next(&mut self) -> Option<DirEntry> {
        self.advance()
    }
}

impl Ext2 {
    /// Iterate the records of directory `dir`
    pub(super) fn dir_iter(&self, dir: InodeRef) -> DirIter<'_> {
        DirIter::new(self, dir)
    }

    /// Find a directory entry that matches a given name under a parent directory
    pub(super) fn dir_find_entry(&self, dir: &InodeRef, name: &str) -> Result<DirEntry> {
        debug!("Dir find entry: dir {}, name {}", dir.id, name);
        self.dir_iter(dir.clone())
            .find(|entry| entry.compare_name(name))
            .ok_or_else(|| {
                Ext2Error::with_message(
                    ErrCode::ENOENT,
                    format!("No entry {:?} in directory {}", name, dir.id),
                )
            })
    }
}
