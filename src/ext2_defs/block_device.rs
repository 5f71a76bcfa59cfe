use crate::prelude::*;
use crate::return_error;

/// The storage a volume lives on.
///
/// Reads are synchronous and blocking. A device that cannot be written keeps
/// the default `write_offset`, and the filesystem mounts read-only on it.
pub trait BlockDevice: Send + Sync + Any + Debug {
    /// Fill `buf` with the bytes starting at byte `offset` of the device.
    fn read_offset(&self, offset: usize, buf: &mut [u8]) -> Result<()>;

    /// Write `data` at byte `offset` of the device.
    fn write_offset(&self, offset: usize, data: &[u8]) -> Result<()> {
        let _ = (offset, data);
        return_error!(ErrCode::EROFS, "Device is read-only")
    }

    /// Whether `write_offset` is implemented
    fn writable(&self) -> bool {
        false
    }

    /// Read `len` bytes starting at byte `offset`
    fn read_bytes(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_offset(offset, &mut buf)?;
        Ok(buf)
    }
}
