use another_ext2::{Entry, EntryKind, InodeId, EXT2_ROOT_INO};
use fuser::{FileAttr, FileType, FUSE_ROOT_ID};
use std::time::{Duration, SystemTime};

/// FUSE numbers the root 1, ext2 numbers it 2. Inode 1 of an ext2 volume
/// holds bad blocks and is never exposed.
pub fn to_ext2_ino(ino: u64) -> InodeId {
    if ino == FUSE_ROOT_ID {
        EXT2_ROOT_INO
    } else {
        ino as InodeId
    }
}

pub fn to_fuse_ino(ino: InodeId) -> u64 {
    if ino == EXT2_ROOT_INO {
        FUSE_ROOT_ID
    } else {
        ino as u64
    }
}

pub fn translate_attr(attr: another_ext2::FileAttr) -> FileAttr {
    FileAttr {
        ino: to_fuse_ino(attr.ino),
        size: attr.size,
        blocks: attr.blocks,
        atime: get_time(attr.atime),
        mtime: get_time(attr.mtime),
        ctime: get_time(attr.ctime),
        crtime: SystemTime::UNIX_EPOCH,
        kind: translate_kind(attr.kind),
        perm: attr.perm,
        nlink: attr.links as u32,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        blksize: attr.blksize,
        flags: 0,
    }
}

pub fn translate_kind(kind: EntryKind) -> FileType {
    match kind {
        EntryKind::File => FileType::RegularFile,
        EntryKind::Directory => FileType::Directory,
        EntryKind::Symlink => FileType::Symlink,
        // devices, fifos and sockets are listed but not otherwise served
        EntryKind::Other => FileType::RegularFile,
    }
}

/// Directory handler for fuse filesystem
pub struct DirHandler {
    pub id: u64,
    pub entries: Vec<Entry>,
}

impl DirHandler {
    pub fn new(id: u64, entries: Vec<Entry>) -> Self {
        Self { id, entries }
    }
}

fn get_time(time: u32) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(time as u64)
}
