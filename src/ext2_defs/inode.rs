//! # The Inode Table Entry
//!
//! The inode table is a linear array of inode records. The table is sized to
//! have enough blocks to store at least `sb.inode_size * sb.inodes_per_group`
//! bytes.
//!
//! The number of the block group containing an inode can be calculated as
//! `(inode_number - 1) / sb.inodes_per_group`, and the offset into the group's
//! table is `(inode_number - 1) % sb.inodes_per_group`. There is no inode 0.
//!
//! Only the first 128 bytes of a record are decoded; anything past that is
//! ignored even when the volume uses larger inode records.

use super::layout::*;
use crate::constants::*;
use crate::prelude::*;
use crate::return_error;
use bitflags::bitflags;

bitflags! {
    #[derive(PartialEq, Eq, Debug, Clone, Copy)]
    pub struct InodeMode: u16 {
        // Permission
        const PERM_MASK = 0xFFF;
        const SET_UID = 0x800;
        const SET_GID = 0x400;
        const STICKY = 0x200;
        const USER_READ = 0x100;
        const USER_WRITE = 0x80;
        const USER_EXEC = 0x40;
        const GROUP_READ = 0x20;
        const GROUP_WRITE = 0x10;
        const GROUP_EXEC = 0x8;
        const OTHER_READ = 0x4;
        const OTHER_WRITE = 0x2;
        const OTHER_EXEC = 0x1;
        // File type
        const TYPE_MASK = 0xF000;
        const FIFO = 0x1000;
        const CHARDEV = 0x2000;
        const DIRECTORY = 0x4000;
        const BLOCKDEV = 0x6000;
        const FILE = 0x8000;
        const SOFTLINK = 0xA000;
        const SOCKET = 0xC000;
    }
}

/// What an inode is, as far as the filesystem façade cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    /// Device nodes, fifos and sockets
    Other,
}

impl InodeMode {
    /// Get permission bits of an inode mode.
    pub fn perm_bits(&self) -> u16 {
        (*self & InodeMode::PERM_MASK).bits()
    }

    /// Classify the mode by its type bits
    pub fn kind(&self) -> EntryKind {
        match *self & InodeMode::TYPE_MASK {
            InodeMode::FILE => EntryKind::File,
            InodeMode::DIRECTORY => EntryKind::Directory,
            InodeMode::SOFTLINK => EntryKind::Symlink,
            _ => EntryKind::Other,
        }
    }
}

/// Size of the decoded part of an inode record
pub const INODE_RECORD_SIZE: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    mode: InodeMode,
    kind: EntryKind,
    uid: u32,
    size: u64,
    atime: u32,
    ctime: u32,
    mtime: u32,
    dtime: u32,
    gid: u32,
    links_count: u16,
    blocks: u64,
    flags: u32,
    block: [u8; EXT2_BLOCK_AREA_SIZE],
    generation: u32,
    file_acl: u64,
}

impl Inode {
    /// Decode an inode record. `bytes` must hold at least 128 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < INODE_RECORD_SIZE {
            return_error!(
                ErrCode::EINVAL,
                "Inode record of {} bytes is too short",
                bytes.len()
            );
        }
        let mode = InodeMode::from_bits_retain(read_u16(bytes, 0));
        let kind = mode.kind();
        let size_lo = read_u32(bytes, 4) as u64;
        // Directories reuse the high size word as an ACL pointer on old volumes
        let size = match kind {
            EntryKind::Directory => size_lo,
            _ => size_lo | (read_u32(bytes, 108) as u64) << 32,
        };
        Ok(Self {
            mode,
            kind,
            uid: read_u16(bytes, 2) as u32 | (read_u16(bytes, 120) as u32) << 16,
            size,
            atime: read_u32(bytes, 8),
            ctime: read_u32(bytes, 12),
            mtime: read_u32(bytes, 16),
            dtime: read_u32(bytes, 20),
            gid: read_u16(bytes, 24) as u32 | (read_u16(bytes, 122) as u32) << 16,
            links_count: read_u16(bytes, 26),
            blocks: read_u32(bytes, 28) as u64 | (read_u16(bytes, 116) as u64) << 32,
            flags: read_u32(bytes, 32),
            block: read_array(bytes, 40),
            generation: read_u32(bytes, 100),
            file_acl: read_u32(bytes, 104) as u64 | (read_u16(bytes, 118) as u64) << 32,
        })
    }

    pub fn mode(&self) -> InodeMode {
        self.mode
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_softlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn atime(&self) -> u32 {
        self.atime
    }

    pub fn ctime(&self) -> u32 {
        self.ctime
    }

    pub fn mtime(&self) -> u32 {
        self.mtime
    }

    pub fn dtime(&self) -> u32 {
        self.dtime
    }

    pub fn links_cnt(&self) -> u16 {
        self.links_count
    }

    /// Allocated space in 512-byte sectors, or in filesystem blocks when the
    /// inode carries the HUGE_FILE flag
    pub fn blocks_count(&self) -> u64 {
        self.blocks
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn file_acl(&self) -> u64 {
        self.file_acl
    }

    /// Whether block mapping goes through an extent tree
    pub fn uses_extents(&self) -> bool {
        self.flags & EXT4_INODE_FLAG_EXTENTS != 0
    }

    /// Whether file data is stored inside the inode itself
    pub fn has_inline_data(&self) -> bool {
        self.flags & EXT4_INODE_FLAG_INLINE_DATA != 0
    }

    /// The raw 60-byte `i_block` area: block pointers or an extent tree root
    pub fn block_area(&self) -> &[u8; EXT2_BLOCK_AREA_SIZE] {
        &self.block
    }

    /// Block pointer slot `index` (0..15) of the classic scheme
    pub fn block_ptr(&self, index: usize) -> u32 {
        read_u32(&self.block, index * 4)
    }

    /// A fast symlink keeps its target in `i_block` instead of a data block.
    /// It is recognised by owning no data blocks beyond its xattr block.
    pub fn is_fast_symlink(&self, block_size: usize) -> bool {
        let xattr_sectors = if self.file_acl != 0 {
            block_size as u64 / 512
        } else {
            0
        };
        self.is_softlink()
            && self.size < EXT2_FAST_SYMLINK_MAX
            && self.blocks.saturating_sub(xattr_sectors) == 0
    }
}

/// A combination of an `Inode` and its id
#[derive(Debug, Clone)]
pub struct InodeRef {
    pub id: InodeId,
    pub inode: Inode,
}

impl InodeRef {
    pub fn new(id: InodeId, inode: Inode) -> Self {
        Self { id, inode }
    }
}

/// Attribute snapshot of one inode, shaped for `stat`-like consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttr {
    pub ino: InodeId,
    pub size: u64,
    /// Allocated 512-byte sectors
    pub blocks: u64,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    pub kind: EntryKind,
    pub perm: u16,
    pub links: u16,
    pub uid: u32,
    pub gid: u32,
    pub blksize: u32,
}

impl FileAttr {
    pub fn from_inode(inode: &InodeRef, block_size: usize) -> Self {
        let i = &inode.inode;
        let blocks = if i.flags() & EXT4_INODE_FLAG_HUGE_FILE != 0 {
            i.blocks_count() * (block_size as u64 / 512)
        } else {
            i.blocks_count()
        };
        Self {
            ino: inode.id,
            size: i.size(),
            blocks,
            atime: i.atime(),
            mtime: i.mtime(),
            ctime: i.ctime(),
            kind: i.kind(),
            perm: i.mode().perm_bits(),
            links: i.links_cnt(),
            uid: i.uid(),
            gid: i.gid(),
            blksize: block_size as u32,
        }
    }
}
