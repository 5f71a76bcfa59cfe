//! A read-mostly ext2/ext3/ext4 filesystem driver in Rust.

#![no_std]

extern crate alloc;

mod constants;
mod error;
mod ext2;
mod ext2_defs;
mod prelude;

pub use constants::{DEFAULT_CACHE_CAPACITY, EXT2_PREALLOC_BLOCK, EXT2_ROOT_INO};
pub use error::*;
pub use ext2::*;
pub use ext2_defs::*;
pub use prelude::{BlockGroupId, InodeId, LBlockId, PBlockId};
