//! A read-only FUSE front end over `Ext2`.
//!
//! lookup getattr readlink open read release opendir readdir releasedir
//! statfs are served from the volume. Requests that would change it are
//! answered with `EROFS`.
//!
//! See `fuse_lowlevel_ops` in C FUSE library for the meaning of each call.
//! https://libfuse.github.io/doxygen/structfuse__lowlevel__ops.html

use super::common::{to_ext2_ino, to_fuse_ino, translate_attr, translate_kind, DirHandler};
use another_ext2::{Entry, EntryKind, ErrCode, Ext2, Ext2Error};
use fuser::{
    FileAttr, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
};
use log::debug;
use std::ffi::{c_int, OsStr};
use std::time::Duration;

type FId = u64;

/// `O_WRONLY | O_RDWR`
const WRITE_ACCESS: i32 = 0o3;

pub struct Ext2FuseFs {
    /// Ext2 filesystem
    fs: Ext2,
    /// Opened directories
    dirs: Vec<DirHandler>,
    /// Next directory handler id
    next_did: FId,
    /// Next file handler id
    next_fid: FId,
}

impl Ext2FuseFs {
    pub fn new(fs: Ext2) -> Self {
        Self {
            fs,
            dirs: Vec::new(),
            next_did: 0,
            next_fid: 0,
        }
    }

    /// Add a directory handler to directory list
    fn add_dir(&mut self, entries: Vec<Entry>) -> FId {
        self.dirs.push(DirHandler::new(self.next_did, entries));
        self.next_did += 1;
        self.next_did - 1
    }

    fn release_dir(&mut self, did: FId) {
        self.dirs.retain(|d| d.id != did);
    }

    fn get_attr(&self, ino: u64) -> Result<FileAttr, Ext2Error> {
        self.fs.getattr(to_ext2_ino(ino)).map(translate_attr)
    }

    fn list_dir(&self, ino: u64) -> Result<Vec<Entry>, Ext2Error> {
        let entry = Entry::new(String::new(), EntryKind::Directory, to_ext2_ino(ino));
        Ok(self.fs.directory(&entry)?.children().collect())
    }
}

impl Filesystem for Ext2FuseFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut fuser::KernelConfig) -> Result<(), c_int> {
        let stat = self.fs.statfs();
        debug!("FUSE init: {} blocks, {} inodes", stat.blocks, stat.inodes);
        Ok(())
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            return reply.error(ErrCode::ENOENT as i32);
        };
        match self
            .fs
            .lookup(to_ext2_ino(parent), name)
            .and_then(|ino| self.fs.getattr(ino))
        {
            Ok(attr) => reply.entry(&get_ttl(), &translate_attr(attr), 0),
            Err(e) => reply.error(e.code() as i32),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match self.get_attr(ino) {
            Ok(attr) => reply.attr(&get_ttl(), &attr),
            Err(e) => reply.error(e.code() as i32),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        match self.fs.read_link(to_ext2_ino(ino)) {
            Ok(target) => reply.data(target.as_bytes()),
            Err(e) => reply.error(e.code() as i32),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        if flags & WRITE_ACCESS != 0 {
            return reply.error(ErrCode::EROFS as i32);
        }
        match self.get_attr(ino) {
            Ok(attr) if attr.kind == fuser::FileType::Directory => {
                reply.error(ErrCode::EISDIR as i32)
            }
            Ok(_) => {
                self.next_fid += 1;
                reply.opened(self.next_fid - 1, 0);
            }
            Err(e) => reply.error(e.code() as i32),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let mut data = vec![0; size as usize];
        match self.fs.read(to_ext2_ino(ino), offset as u64, &mut data) {
            Ok(sz) => reply.data(&data[..sz]),
            Err(e) => reply.error(e.code() as i32),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.list_dir(ino) {
            Ok(entries) => {
                let fh = self.add_dir(entries);
                reply.opened(fh, 0);
            }
            Err(e) => reply.error(e.code() as i32),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(dir) = self.dirs.iter().find(|d| d.id == fh) else {
            return reply.error(ErrCode::ENOENT as i32);
        };
        for (i, entry) in dir.entries.iter().enumerate().skip(offset as usize) {
            let ino = to_fuse_ino(entry.inode);
            if reply.add(ino, (i + 1) as i64, translate_kind(entry.kind), &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        self.release_dir(fh);
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let stat = self.fs.statfs();
        reply.statfs(
            stat.blocks,
            stat.free_blocks,
            stat.free_blocks,
            stat.inodes as u64,
            stat.free_inodes as u64,
            stat.block_size,
            stat.name_max,
            stat.block_size,
        );
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        reply.error(ErrCode::EROFS as i32);
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        reply.error(ErrCode::EROFS as i32);
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        reply.error(ErrCode::EROFS as i32);
    }

    fn unlink(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(ErrCode::EROFS as i32);
    }

    fn rmdir(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(ErrCode::EROFS as i32);
    }
}

fn get_ttl() -> Duration {
    Duration::from_secs(1)
}
