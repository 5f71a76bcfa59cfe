//! Free-space bitmaps.
//!
//! A bitmap covers one block group: bit `i` lives in byte `i / 8` under mask
//! `1 << (i % 8)` and is set when unit `i` of the group is in use. The same
//! scan-and-claim routine serves block and inode bitmaps; they differ only in
//! the length of the preallocation run requested after the claimed bit.
//!
//! Nothing here locks. Callers hold the owning group's allocation lock for as
//! long as they hold a `Bitmap` over that group's bitmap block.

use crate::prelude::*;
use crate::return_error;

pub struct Bitmap<'a>(&'a mut [u8]);

/// A successful claim: the first bit taken and how many bits directly after
/// it were preallocated along with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub index: usize,
    pub prealloc: u32,
}

impl<'a> Bitmap<'a> {
    pub fn new(bmap: &'a mut [u8]) -> Self {
        Self(bmap)
    }

    pub fn as_raw(&self) -> &[u8] {
        self.0
    }

    /// Number of addressable bits
    pub fn bits(&self) -> usize {
        self.0.len() * 8
    }

    pub fn is_bit_clear(&self, bit: usize) -> bool {
        self.0[bit / 8] & (1 << (bit % 8)) == 0
    }

    pub fn is_bit_set(&self, bit: usize) -> bool {
        !self.is_bit_clear(bit)
    }

    pub fn set_bit(&mut self, bit: usize) {
        self.0[bit / 8] |= 1 << (bit % 8);
    }

    pub fn clear_bit(&mut self, bit: usize) {
        self.0[bit / 8] &= !(1 << (bit % 8));
    }

    /// Find the first clear bit in the range `[start, end)`
    pub fn first_clear_bit(&self, start: usize, end: usize) -> Option<usize> {
        (start..end.min(self.bits())).find(|&i| self.is_bit_clear(i))
    }

    /// Count clear bits in `[0, limit)`
    pub fn count_clear(&self, limit: usize) -> u32 {
        (0..limit.min(self.bits()))
            .filter(|&i| self.is_bit_clear(i))
            .count() as u32
    }

    /// Claim bit `index` if it is clear, then extend the claim over up to
    /// `run` following clear bits below `limit`.
    pub fn claim_at(&mut self, index: usize, limit: usize, run: u32) -> Option<Claim> {
        let limit = limit.min(self.bits());
        if index >= limit || self.is_bit_set(index) {
            return None;
        }
        self.set_bit(index);
        let prealloc = self.extend_run(index + 1, limit, run);
        Some(Claim { index, prealloc })
    }

    /// Claim the first free unit at or after `prefix`.
    ///
    /// Whole free bytes are preferred: the scan starts at the first byte
    /// boundary not below `prefix` and takes the first byte whose 8 bits are
    /// all clear, claiming its first bit plus a run of up to `run` bits. When
    /// no such byte exists the scan falls back to the first clear bit
    /// anywhere in `[prefix, limit)`.
    pub fn claim_first_free(&mut self, prefix: usize, limit: usize, run: u32) -> Option<Claim> {
        let limit = limit.min(self.bits());
        let first_byte = prefix.div_ceil(8);
        let free_byte = (first_byte..limit / 8).find(|&byte| self.0[byte] == 0);
        let index = match free_byte {
            Some(byte) => byte * 8,
            None => self.first_clear_bit(prefix, limit)?,
        };
        self.claim_at(index, limit, run)
    }

    /// Release bit `index`. Releasing a bit that is already clear means the
    /// bitmap and its owner disagree, which is reported as `EUCLEAN`.
    pub fn free_bit(&mut self, index: usize) -> Result<()> {
        if index >= self.bits() {
            return_error!(
                ErrCode::EINVAL,
                "Bit {} outside a {}-bit bitmap",
                index,
                self.bits()
            );
        }
        if self.is_bit_clear(index) {
            error!("Freeing bit {} which is already free", index);
            return_error!(ErrCode::EUCLEAN, "Bit {} is already free", index);
        }
        self.clear_bit(index);
        Ok(())
    }

    fn extend_run(&mut self, start: usize, limit: usize, run: u32) -> u32 {
        let mut taken = 0;
        let mut bit = start;
        while taken < run && bit < limit && self.is_bit_clear(bit) {
            self.set_bit(bit);
            taken += 1;
            bit += 1;
        }
        taken
    }
}

/// Result of a block allocation request.
///
/// On success `block` is the absolute block number of the first claimed
/// block and `prealloc_count` the number of blocks claimed right after it.
/// On failure `free_blocks_count` reports how many blocks the group still
/// has, so the caller can pick another group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReservation {
    pub successful: bool,
    pub block: PBlockId,
    pub prealloc_count: u32,
    pub free_blocks_count: u32,
}

impl BlockReservation {
    pub fn claimed(block: PBlockId, prealloc_count: u32) -> Self {
        Self {
            successful: true,
            block,
            prealloc_count,
            free_blocks_count: 0,
        }
    }

    pub fn failed(free_blocks_count: u32) -> Self {
        Self {
            successful: false,
            block: 0,
            prealloc_count: 0,
            free_blocks_count,
        }
    }
}

/// Result of an inode allocation request. Inodes are never preallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeReservation {
    pub successful: bool,
    /// 0-based index inside the group
    pub index: u32,
    pub group: BlockGroupId,
}

impl InodeReservation {
    pub fn claimed(group: BlockGroupId, index: u32) -> Self {
        Self {
            successful: true,
            index,
            group,
        }
    }

    pub fn failed(group: BlockGroupId) -> Self {
        Self {
            successful: false,
            index: 0,
            group,
        }
    }

    /// 1-based inode number of the reserved inode
    pub fn inode_id(&self, inodes_per_group: u32) -> InodeId {
        self.group * inodes_per_group + self.index + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_then_free_round_trip() {
        let mut raw = [0u8; 16];
        let mut bmap = Bitmap::new(&mut raw);
        for i in [0, 5, 63, 127] {
            let claim = bmap.claim_at(i, 128, 0).unwrap();
            assert_eq!(claim, Claim { index: i, prealloc: 0 });
            assert!(bmap.is_bit_set(i));
            bmap.free_bit(i).unwrap();
            assert!(bmap.is_bit_clear(i));
        }
    }

    #[test]
    fn double_free_is_consistency_error() {
        let mut raw = [0u8; 4];
        let mut bmap = Bitmap::new(&mut raw);
        bmap.claim_at(9, 32, 0).unwrap();
        bmap.free_bit(9).unwrap();
        let err = bmap.free_bit(9).unwrap_err();
        assert_eq!(err.code(), ErrCode::EUCLEAN);
    }

    #[test]
    fn claim_on_used_bit_fails() {
        let mut raw = [0b0000_0100u8, 0];
        let mut bmap = Bitmap::new(&mut raw);
        assert_eq!(bmap.claim_at(2, 16, 7), None);
        assert_eq!(bmap.claim_at(16, 16, 7), None);
    }

    #[test]
    fn prealloc_stops_at_used_bit() {
        // bit 4 in use: claiming bit 1 can only extend over 2 and 3
        let mut raw = [0b0001_0000u8, 0];
        let mut bmap = Bitmap::new(&mut raw);
        let claim = bmap.claim_at(1, 16, 7).unwrap();
        assert_eq!(claim, Claim { index: 1, prealloc: 2 });
        assert_eq!(raw[0], 0b0001_1110);
    }

    #[test]
    fn prealloc_never_exceeds_run_or_limit() {
        let mut raw = [0u8; 4];
        let mut bmap = Bitmap::new(&mut raw);
        let claim = bmap.claim_at(0, 32, 7).unwrap();
        assert_eq!(claim.prealloc, 7);
        assert_eq!(raw[0], 0xFF);
        assert_eq!(raw[1], 0);

        let mut raw = [0u8; 4];
        let mut bmap = Bitmap::new(&mut raw);
        let claim = bmap.claim_at(12, 14, 7).unwrap();
        assert_eq!(claim.prealloc, 1);
        assert_eq!(raw[1], 0b0011_0000);
    }

    #[test]
    fn scan_prefers_whole_free_byte() {
        // byte 1 partly used, byte 2 entirely free
        let mut raw = [0xFF, 0b0000_0001, 0, 0];
        let mut bmap = Bitmap::new(&mut raw);
        let claim = bmap.claim_first_free(0, 32, 7).unwrap();
        assert_eq!(claim, Claim { index: 16, prealloc: 7 });
        assert_eq!(raw[2], 0xFF);
        assert_eq!(raw[1], 0b0000_0001);
    }

    #[test]
    fn scan_for_inode_claims_single_bit() {
        let mut raw = [0xFF, 0, 0, 0];
        let mut bmap = Bitmap::new(&mut raw);
        let claim = bmap.claim_first_free(0, 32, 0).unwrap();
        assert_eq!(claim, Claim { index: 8, prealloc: 0 });
        assert_eq!(raw[1], 0b0000_0001);
    }

    #[test]
    fn scan_falls_back_to_single_bits() {
        let mut raw = [0xFF, 0b1101_1111, 0b0111_1111, 0xFF];
        let mut bmap = Bitmap::new(&mut raw);
        let claim = bmap.claim_first_free(0, 32, 7).unwrap();
        assert_eq!(claim, Claim { index: 13, prealloc: 0 });

        let claim = bmap.claim_first_free(0, 32, 7).unwrap();
        assert_eq!(claim, Claim { index: 23, prealloc: 0 });

        assert_eq!(bmap.claim_first_free(0, 32, 7), None);
    }

    #[test]
    fn scan_skips_metadata_prefix() {
        let mut raw = [0u8; 4];
        let mut bmap = Bitmap::new(&mut raw);
        // prefix 5 rounds up to byte 1 for the whole-byte pass
        let claim = bmap.claim_first_free(5, 32, 7).unwrap();
        assert_eq!(claim.index, 8);
        assert_eq!(raw[0], 0);

        // with every whole byte gone the bit pass still honours the prefix
        let mut raw = [0u8, 0x01, 0xFF, 0xFF];
        let mut bmap = Bitmap::new(&mut raw);
        let claim = bmap.claim_first_free(5, 32, 7).unwrap();
        assert_eq!(claim, Claim { index: 5, prealloc: 2 });
    }

    #[test]
    fn scan_respects_limit() {
        let mut raw = [0xFF, 0b0000_0111, 0, 0];
        let mut bmap = Bitmap::new(&mut raw);
        // bit 11 is the only free bit below the limit; byte 2 is out of reach
        assert_eq!(
            bmap.claim_first_free(0, 12, 7),
            Some(Claim { index: 11, prealloc: 0 })
        );
        assert_eq!(bmap.claim_first_free(0, 12, 7), None);
        assert_eq!(raw[2], 0);
    }

    #[test]
    fn inode_reservation_numbering() {
        let r = InodeReservation::claimed(2, 4);
        assert_eq!(r.inode_id(16), 2 * 16 + 5);
    }
}
