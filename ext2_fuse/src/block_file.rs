use another_ext2::{BlockDevice, ErrCode, Ext2Error, Result};
use std::fs::File;
use std::os::unix::fs::FileExt;

/// An image file used as a read-only block device
#[derive(Debug)]
pub struct BlockFile(File);

impl BlockFile {
    pub fn open(path: &str) -> std::io::Result<Self> {
        File::open(path).map(Self)
    }
}

impl BlockDevice for BlockFile {
    fn read_offset(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.0.read_exact_at(buf, offset as u64).map_err(|e| {
            Ext2Error::with_message(ErrCode::EIO, format!("read at {}: {}", offset, e))
        })
    }
}
