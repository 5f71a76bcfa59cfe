mod block_file;
mod common;
mod fuse_fs;

use another_ext2::{Ext2, MountOptions};
use block_file::BlockFile;
use clap::Parser;
use fuse_fs::Ext2FuseFs;
use fuser::MountOption;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use std::sync::{mpsc, Arc};

#[derive(Parser, Debug)]
#[command(about = "Mount an ext2 image read-only through FUSE")]
struct Args {
    /// Path of the image file
    image: String,
    /// Directory to mount on
    mountpoint: String,
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
    /// Blocks kept by the block cache, 0 disables it
    #[arg(long, default_value_t = 256)]
    cache_blocks: usize,
}

fn main() {
    let args = Args::parse();
    SimpleLogger::new().init().unwrap();
    log::set_max_level(args.log_level);

    info!("Use block file \"{}\"", args.image);
    let block_file = match BlockFile::open(&args.image) {
        Ok(f) => Arc::new(f),
        Err(e) => {
            error!("Cannot open {}: {}", args.image, e);
            std::process::exit(1);
        }
    };
    let options = MountOptions {
        cache_capacity: args.cache_blocks,
        ..MountOptions::default()
    };
    let fs = match Ext2::mount_with(block_file, options) {
        Ok(fs) => Ext2FuseFs::new(fs),
        Err(e) => {
            error!("Load Ext2 filesystem failed: {}", e);
            std::process::exit(1);
        }
    };

    // Mount fs and wait for Ctrl-C
    let mount_options = vec![
        MountOption::RO,
        MountOption::FSName("ext2".to_owned()),
        MountOption::DefaultPermissions,
    ];
    info!("Mount ext2fs to \"{}\"", args.mountpoint);
    let session = match fuser::spawn_mount2(fs, &args.mountpoint, &mount_options) {
        Ok(session) => session,
        Err(e) => {
            error!("Error occured: {:?}", e);
            std::process::exit(1);
        }
    };
    let (tx, rx) = mpsc::channel();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = tx.send(());
    }) {
        error!("Cannot install Ctrl-C handler: {}", e);
    }
    let _ = rx.recv();
    info!("Unmount \"{}\"", args.mountpoint);
    drop(session);
}
