//! Mount an ext2/3/4 image, walk every directory and read every file and
//! symlink in it. Exits with 1 when the image does not mount and with 2
//! when some object could not be read.

use another_ext2::{BlockDevice, EntryKind, ErrCode, Ext2, Ext2Error, MountOptions};
use clap::Parser;
use log::{info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(about = "Walk an ext2 image and read everything in it")]
struct Args {
    /// Path of the image file
    image: String,
    /// Log level of the filesystem driver
    #[arg(long, default_value = "warn")]
    log_level: LevelFilter,
    /// Blocks kept by the block cache, 0 disables it
    #[arg(long, default_value_t = 256)]
    cache_blocks: usize,
}

#[derive(Debug)]
pub struct BlockFile(File);

impl BlockFile {
    pub fn open(path: &str) -> std::io::Result<Self> {
        File::open(path).map(Self)
    }
}

impl BlockDevice for BlockFile {
    fn read_offset(&self, offset: usize, buf: &mut [u8]) -> another_ext2::Result<()> {
        self.0.read_exact_at(buf, offset as u64).map_err(|e| {
            Ext2Error::with_message(ErrCode::EIO, format!("read at {}: {}", offset, e))
        })
    }
}

#[derive(Debug, Default)]
struct Summary {
    dirs: usize,
    files: usize,
    symlinks: usize,
    others: usize,
    bytes: u64,
    failures: usize,
}

fn walk(fs: &Ext2, dir: InodePath, summary: &mut Summary) {
    let InodePath { inode, path } = dir;
    let entry = another_ext2::Entry::new(path.clone(), EntryKind::Directory, inode);
    let children: Vec<_> = match fs.directory(&entry) {
        Ok(d) => d.children().collect(),
        Err(e) => {
            warn!("{}: {}", path, e);
            summary.failures += 1;
            return;
        }
    };
    summary.dirs += 1;
    for child in children {
        if child.name == "." || child.name == ".." {
            continue;
        }
        let child_path = if path == "/" {
            format!("/{}", child.name)
        } else {
            format!("{}/{}", path, child.name)
        };
        match child.kind {
            EntryKind::Directory => walk(
                fs,
                InodePath {
                    inode: child.inode,
                    path: child_path,
                },
                summary,
            ),
            EntryKind::File => match fs.file(&child).and_then(|f| f.read_to_end()) {
                Ok(data) => {
                    summary.files += 1;
                    summary.bytes += data.len() as u64;
                }
                Err(e) => {
                    warn!("{}: {}", child_path, e);
                    summary.failures += 1;
                }
            },
            EntryKind::Symlink => match fs.read_link(child.inode) {
                Ok(target) => {
                    info!("{} -> {}", child_path, target);
                    summary.symlinks += 1;
                }
                Err(e) => {
                    warn!("{}: {}", child_path, e);
                    summary.failures += 1;
                }
            },
            EntryKind::Other => summary.others += 1,
        }
    }
}

struct InodePath {
    inode: u32,
    path: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    SimpleLogger::new().init().unwrap();
    log::set_max_level(args.log_level);

    let device = match BlockFile::open(&args.image) {
        Ok(device) => Arc::new(device),
        Err(e) => {
            eprintln!("cannot open {}: {}", args.image, e);
            return ExitCode::from(1);
        }
    };
    let options = MountOptions {
        cache_capacity: args.cache_blocks,
        ..MountOptions::default()
    };
    let fs = match Ext2::mount_with(device, options) {
        Ok(fs) => fs,
        Err(e) => {
            eprintln!("mount failed: {}", e);
            return ExitCode::from(1);
        }
    };
    let stat = fs.statfs();
    println!(
        "{} blocks of {} bytes ({} free), {} inodes ({} free), {} groups",
        stat.blocks, stat.block_size, stat.free_blocks, stat.inodes, stat.free_inodes, stat.groups
    );

    let mut summary = Summary::default();
    walk(
        &fs,
        InodePath {
            inode: another_ext2::EXT2_ROOT_INO,
            path: "/".to_owned(),
        },
        &mut summary,
    );
    println!(
        "{} directories, {} files ({} bytes), {} symlinks, {} other",
        summary.dirs, summary.files, summary.bytes, summary.symlinks, summary.others
    );
    if summary.failures > 0 {
        println!("{} objects could not be read", summary.failures);
        return ExitCode::from(2);
    }
    ExitCode::SUCCESS
}
