//! High-level operations of Ext2 filesystem.
//!
//! This module provides path-based operations. An object can be
//! located in the filesystem by its relative or absolute path.
//!
//! Operations such as `read` and `getattr` do not involve file location.
//! They are implemented in the `low_level` module.

use super::{Entry, Ext2};
use crate::constants::*;
use crate::prelude::*;
use crate::return_error;

impl Ext2 {
    /// Look up an object in the filesystem.
    ///
    /// ## Params
    ///
    /// * `root` - The inode id of the root directory for search.
    /// * `path` - The path of the object, relative to `root`.
    ///
    /// ## Return
    ///
    /// `Ok(inode)` - Inode id of the object
    pub fn generic_lookup(&self, root: InodeId, path: &str) -> Result<InodeId> {
        // Search from the given parent inode
        let mut cur = root;
        let search_path = Self::split_path(path);
        // Search recursively
        for name in search_path.iter() {
            cur = self.lookup(cur, name)?;
        }
        Ok(cur)
    }

    /// Resolve an absolute path from the root directory to an entry.
    /// Symbolic links along the way are not followed.
    pub fn open(&self, path: &str) -> Result<Entry> {
        if !path.starts_with('/') {
            return_error!(ErrCode::EINVAL, "Path {:?} is not absolute", path);
        }
        let inode = self.generic_lookup(EXT2_ROOT_INO, path)?;
        let inode_ref = self.read_inode(inode)?;
        let name = Self::split_path(path).pop().unwrap_or_else(|| "/".to_owned());
        Ok(Entry::new(name, inode_ref.inode.kind(), inode))
    }

    /// Split a path into components, dropping empty ones and `.`
    pub(super) fn split_path(path: &str) -> Vec<String> {
        path.split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .map(|s| s.to_string())
            .collect()
    }
}
