//! Entry, file and directory handles over a mounted volume.

use super::{DirIter, Ext2};
use crate::constants::*;
use crate::ext2_defs::*;
use crate::format_error;
use crate::prelude::*;
use crate::return_error;

/// A named object inside a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
    pub inode: InodeId,
}

impl Entry {
    pub fn new(name: String, kind: EntryKind, inode: InodeId) -> Self {
        Self { name, kind, inode }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// An open directory
#[derive(Debug)]
pub struct Directory<'a> {
    fs: &'a Ext2,
    inode: InodeRef,
}

impl<'a> Directory<'a> {
    pub fn id(&self) -> InodeId {
        self.inode.id
    }

    /// Entries of this directory, in on-disk order.
    ///
    /// The kind comes from the record's type byte when the volume stores
    /// one, otherwise from the child's inode.
    pub fn children(&self) -> Children<'a> {
        Children {
            fs: self.fs,
            iter: self.fs.dir_iter(self.inode.clone()),
        }
    }

    /// The child called `name`
    pub fn entry(&self, name: &str) -> Result<Entry> {
        let de = self.fs.dir_find_entry(&self.inode, name)?;
        Ok(self.fs.entry_from_record(&de))
    }
}

/// Iterator returned by `Directory::children`
#[derive(Debug)]
pub struct Children<'a> {
    fs: &'a Ext2,
    iter: DirIter<'a>,
}

impl Iterator for Children<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        let de = self.iter.next()?;
        Some(self.fs.entry_from_record(&de))
    }
}

/// An open regular file or symlink
#[derive(Debug)]
pub struct File<'a> {
    fs: &'a Ext2,
    inode: InodeRef,
}

impl File<'_> {
    pub fn id(&self) -> InodeId {
        self.inode.id
    }

    pub fn size(&self) -> u64 {
        self.inode.inode.size()
    }

    pub fn attr(&self) -> FileAttr {
        FileAttr::from_inode(&self.inode, self.fs.block_size())
    }

    /// Read into `buf` starting at `offset`, returning the number of bytes
    /// read. Reads are clamped at the end of the file.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.fs.read_inode_data(&self.inode, offset, buf)
    }

    /// Read the whole file. A size past the last addressable block is
    /// refused before anything is allocated.
    pub fn read_to_end(&self) -> Result<Vec<u8>> {
        let size = self.size();
        let limit = (LBlockId::MAX as u64 + 1) * self.fs.block_size() as u64;
        let len = match usize::try_from(size) {
            Ok(len) if size <= limit => len,
            _ => return_error!(
                ErrCode::EFBIG,
                "Inode {} size {} cannot be read whole",
                self.id(),
                size
            ),
        };
        let mut buf = Vec::new();
        buf.try_reserve_exact(len).map_err(|_| {
            format_error!(
                ErrCode::ENOMEM,
                "Cannot hold {} bytes of inode {}",
                len,
                self.id()
            )
        })?;
        buf.resize(len, 0);
        let n = self.read(0, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }
}

impl Ext2 {
    /// The root directory's entry. The root inode is always a directory.
    pub fn root_entry(&self) -> Result<Entry> {
        let root = self.read_root_inode()?;
        if !root.inode.is_dir() {
            return_error!(ErrCode::EINVAL, "Root inode is not a directory");
        }
        Ok(Entry::new("/".to_owned(), EntryKind::Directory, EXT2_ROOT_INO))
    }

    pub fn directory(&self, entry: &Entry) -> Result<Directory<'_>> {
        let inode = self.read_inode(entry.inode)?;
        if !inode.inode.is_dir() {
            return_error!(ErrCode::ENOTDIR, "{:?} is not a directory", entry.name);
        }
        Ok(Directory { fs: self, inode })
    }

    pub fn file(&self, entry: &Entry) -> Result<File<'_>> {
        let inode = self.read_inode(entry.inode)?;
        if inode.inode.is_dir() {
            return_error!(ErrCode::EISDIR, "{:?} is a directory", entry.name);
        }
        Ok(File { fs: self, inode })
    }

    fn entry_from_record(&self, de: &DirEntry) -> Entry {
        let kind = match de.file_type().kind() {
            Some(kind) => kind,
            None => match self.read_inode(de.inode()) {
                Ok(inode) => inode.inode.kind(),
                Err(e) => {
                    warn!("Cannot load inode {} for its kind: {}", de.inode(), e);
                    EntryKind::Other
                }
            },
        };
        Entry::new(de.name_lossy(), kind, de.inode())
    }
}
