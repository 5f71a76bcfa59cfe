//! A directory is a series of data blocks and each block contains a linear
//! array of variable-length directory records:
//!
//! | inode (u32) | rec_len (u16) | name_len (u8) | file_type (u8) | name |
//!
//! `rec_len` is the distance to the next record. A 64 KiB block holding a
//! single record stores its length as 0 or 65535. On volumes without the
//! FILETYPE feature the type byte is the high byte of a 16-bit name length.

use super::layout::*;
use super::EntryKind;
use crate::constants::*;
use crate::format_error;
use crate::prelude::*;
use crate::return_error;

/// Fixed part of a directory record
pub const DIR_ENTRY_HEADER_SIZE: usize = 8;

/// Record length of a record spanning a whole 64 KiB block
const MAX_REC_LEN: u32 = 1 << 16;

/// The type byte stored in a directory record
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Unknown = 0,
    RegularFile = 1,
    Directory = 2,
    CharacterDev = 3,
    BlockDev = 4,
    Fifo = 5,
    Socket = 6,
    SymLink = 7,
}

impl FileType {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::RegularFile,
            2 => Self::Directory,
            3 => Self::CharacterDev,
            4 => Self::BlockDev,
            5 => Self::Fifo,
            6 => Self::Socket,
            7 => Self::SymLink,
            _ => Self::Unknown,
        }
    }

    /// `None` when the record does not say, and the inode must be consulted
    pub fn kind(&self) -> Option<EntryKind> {
        match self {
            Self::Unknown => None,
            Self::RegularFile => Some(EntryKind::File),
            Self::Directory => Some(EntryKind::Directory),
            Self::SymLink => Some(EntryKind::Symlink),
            _ => Some(EntryKind::Other),
        }
    }
}

/// A decoded directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    inode: InodeId,
    rec_len: u32,
    file_type: FileType,
    name: Vec<u8>,
}

impl DirEntry {
    /// Decode the record at the start of `bytes`, where `bytes` runs to the
    /// end of the enclosing block.
    ///
    /// A record whose `rec_len` is too small, is not a multiple of 4, or
    /// runs past the block is malformed. The name of a record with inode 0
    /// is not decoded.
    pub fn from_bytes(bytes: &[u8], has_filetype: bool) -> Result<Self> {
        if bytes.len() < DIR_ENTRY_HEADER_SIZE {
            return_error!(
                ErrCode::EINVAL,
                "Directory record header cut short: {} bytes left in block",
                bytes.len()
            );
        }
        let inode = read_u32(bytes, 0);
        let rec_len = match read_u16(bytes, 4) {
            0 | u16::MAX if bytes.len() >= MAX_REC_LEN as usize => MAX_REC_LEN,
            raw => raw as u32,
        };
        if (rec_len as usize) < DIR_ENTRY_HEADER_SIZE
            || rec_len % 4 != 0
            || rec_len as usize > bytes.len()
        {
            return_error!(
                ErrCode::EINVAL,
                "Directory record length {} invalid with {} bytes left in block",
                rec_len,
                bytes.len()
            );
        }
        if inode == 0 {
            return Ok(Self {
                inode,
                rec_len,
                file_type: FileType::Unknown,
                name: Vec::new(),
            });
        }
        let (name_len, file_type) = if has_filetype {
            (read_u8(bytes, 6) as usize, FileType::from_raw(read_u8(bytes, 7)))
        } else {
            (read_u16(bytes, 6) as usize, FileType::Unknown)
        };
        if name_len == 0 || name_len > NAME_MAX || DIR_ENTRY_HEADER_SIZE + name_len > rec_len as usize
        {
            return_error!(
                ErrCode::EINVAL,
                "Directory record name length {} does not fit record length {}",
                name_len,
                rec_len
            );
        }
        Ok(Self {
            inode,
            rec_len,
            file_type,
            name: bytes[DIR_ENTRY_HEADER_SIZE..DIR_ENTRY_HEADER_SIZE + name_len].to_vec(),
        })
    }

    pub fn name(&self) -> Result<String> {
        String::from_utf8(self.name.clone()).map_err(|_| {
            format_error!(
                ErrCode::EINVAL,
                "Invalid UTF-8 sequence in directory entry name"
            )
        })
    }

    /// The name with invalid UTF-8 replaced
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    pub fn name_bytes(&self) -> &[u8] {
        &self.name
    }

    pub fn compare_name(&self, name: &str) -> bool {
        self.name == name.as_bytes()
    }

    /// Distance to the next directory entry
    pub fn rec_len(&self) -> u32 {
        self.rec_len
    }

    pub fn inode(&self) -> InodeId {
        self.inode
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// Unused directory entries are signified by inode = 0
    pub fn unused(&self) -> bool {
        self.inode == 0
    }
}
