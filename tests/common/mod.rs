//! In-memory ext2 images for integration tests.
//!
//! `ImageBuilder` lays out a small volume the way `mke2fs` would (superblock,
//! descriptor table, per-group bitmaps and inode tables), then lets a test
//! add directories, files and symlinks before rendering the bytes.
#![allow(dead_code)]

use another_ext2::{BlockDevice, ErrCode, Ext2Error, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

pub const ROOT: u32 = 2;
pub const FIRST_INO: u32 = 11;
const INODE_SIZE: usize = 128;
const EXTENT_MAGIC: u16 = 0xF30A;

pub const FT_FILE: u8 = 1;
pub const FT_DIR: u8 = 2;
pub const FT_SYMLINK: u8 = 7;

pub fn init_logger() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = simple_logger::SimpleLogger::new()
            .with_level(log::LevelFilter::Debug)
            .init();
    });
}

pub fn put_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

pub fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

pub fn get_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Deterministic file content
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i % 251) as u8 ^ seed.wrapping_mul(31))
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub block_size: usize,
    pub blocks_count: u32,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    pub filetype: bool,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            block_size: 1024,
            blocks_count: 4096,
            blocks_per_group: 1024,
            inodes_per_group: 64,
            filetype: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct GroupLayout {
    block_bitmap: u32,
    inode_bitmap: u32,
    inode_table: u32,
}

#[derive(Debug, Clone)]
struct DirRecord {
    inode: u32,
    name: String,
    ftype: u8,
}

pub struct ImageBuilder {
    pub geo: Geometry,
    pub extra_incompat: u32,
    pub ro_compat: u32,
    pub state: u16,
    image: Vec<u8>,
    groups: Vec<GroupLayout>,
    next_block: u32,
    next_inode: u32,
    uses_extents: bool,
    dirs: BTreeMap<u32, Vec<DirRecord>>,
    dir_links: BTreeMap<u32, u16>,
}

impl ImageBuilder {
    pub fn new(geo: Geometry) -> Self {
        let mut b = Self {
            geo,
            extra_incompat: 0,
            ro_compat: 0,
            state: 1,
            image: vec![0u8; geo.blocks_count as usize * geo.block_size],
            groups: Vec::new(),
            next_block: 0,
            next_inode: FIRST_INO,
            uses_extents: false,
            dirs: BTreeMap::new(),
            dir_links: BTreeMap::new(),
        };
        b.layout();
        b.mark_inode(1..FIRST_INO);
        b.dirs.insert(
            ROOT,
            vec![
                DirRecord { inode: ROOT, name: ".".into(), ftype: FT_DIR },
                DirRecord { inode: ROOT, name: "..".into(), ftype: FT_DIR },
            ],
        );
        b.dir_links.insert(ROOT, 2);
        b
    }

    pub fn first_data_block(&self) -> u32 {
        if self.geo.block_size == 1024 {
            1
        } else {
            0
        }
    }

    pub fn group_count(&self) -> u32 {
        self.geo.blocks_count.div_ceil(self.geo.blocks_per_group)
    }

    pub fn group_first(&self, g: u32) -> u32 {
        self.first_data_block() + g * self.geo.blocks_per_group
    }

    pub fn group_len(&self, g: u32) -> u32 {
        self.geo
            .blocks_count
            .saturating_sub(self.group_first(g))
            .min(self.geo.blocks_per_group)
    }

    pub fn itable_blocks(&self) -> u32 {
        (self.geo.inodes_per_group as usize * INODE_SIZE).div_ceil(self.geo.block_size) as u32
    }

    pub fn inode_table(&self, g: u32) -> u32 {
        self.groups[g as usize].inode_table
    }

    pub fn block_bitmap(&self, g: u32) -> u32 {
        self.groups[g as usize].block_bitmap
    }

    /// First block the builder hands out for data
    pub fn first_free_block(&self) -> u32 {
        self.next_block
    }

    /// Lay out every group's metadata. A group too small for its own
    /// bitmaps and table gets them placed in group 0.
    fn layout(&mut self) {
        let fdb = self.first_data_block();
        let gdt_blocks = (self.group_count() as usize * 32).div_ceil(self.geo.block_size) as u32;
        let meta_len = 2 + self.itable_blocks();
        let mut spill = fdb + 1 + gdt_blocks;
        for b in fdb..spill {
            self.mark_block(b);
        }
        for g in 0..self.group_count() {
            let start = if g == 0 {
                spill
            } else if self.group_len(g) > meta_len {
                self.group_first(g)
            } else {
                let s = spill;
                spill += meta_len;
                s
            };
            if g == 0 {
                spill += meta_len;
            }
            self.groups.push(GroupLayout {
                block_bitmap: start,
                inode_bitmap: start + 1,
                inode_table: start + 2,
            });
            for b in start..start + meta_len {
                self.mark_block(b);
            }
        }
        // bits past the end of each group stay set, as mke2fs leaves them
        for g in 0..self.group_count() {
            let bitmap = self.groups[g as usize].block_bitmap as usize * self.geo.block_size;
            for bit in self.group_len(g) as usize..self.geo.block_size * 8 {
                self.image[bitmap + bit / 8] |= 1 << (bit % 8);
            }
            let ibitmap = self.groups[g as usize].inode_bitmap as usize * self.geo.block_size;
            for bit in self.geo.inodes_per_group as usize..self.geo.block_size * 8 {
                self.image[ibitmap + bit / 8] |= 1 << (bit % 8);
            }
        }
        self.next_block = spill;
    }

    fn locate_block(&self, block: u32) -> (u32, usize) {
        let rel = block - self.first_data_block();
        (
            rel / self.geo.blocks_per_group,
            (rel % self.geo.blocks_per_group) as usize,
        )
    }

    pub fn mark_block(&mut self, block: u32) {
        let (g, bit) = self.locate_block(block);
        if let Some(layout) = self.groups.get(g as usize) {
            let off = layout.block_bitmap as usize * self.geo.block_size + bit / 8;
            self.image[off] |= 1 << (bit % 8);
        } else {
            // group metadata not laid out yet; the bitmap is written once it is
            let off = self.pending_bitmap_offset(g) + bit / 8;
            self.image[off] |= 1 << (bit % 8);
        }
    }

    /// During layout the bitmap of group 0 always precedes the first mark
    fn pending_bitmap_offset(&self, g: u32) -> usize {
        assert_eq!(g, 0, "early metadata must live in group 0");
        let fdb = self.first_data_block();
        let gdt_blocks = (self.group_count() as usize * 32).div_ceil(self.geo.block_size) as u32;
        (fdb + 1 + gdt_blocks) as usize * self.geo.block_size
    }

    pub fn is_block_used(&self, block: u32) -> bool {
        let (g, bit) = self.locate_block(block);
        let off = self.groups[g as usize].block_bitmap as usize * self.geo.block_size + bit / 8;
        self.image[off] & (1 << (bit % 8)) != 0
    }

    fn mark_inode(&mut self, ids: std::ops::Range<u32>) {
        for id in ids {
            let g = (id - 1) / self.geo.inodes_per_group;
            let bit = ((id - 1) % self.geo.inodes_per_group) as usize;
            let off = self.groups[g as usize].inode_bitmap as usize * self.geo.block_size + bit / 8;
            self.image[off] |= 1 << (bit % 8);
        }
    }

    pub fn alloc_block(&mut self) -> u32 {
        while self.is_block_used(self.next_block) {
            self.next_block += 1;
        }
        let b = self.next_block;
        self.mark_block(b);
        self.next_block += 1;
        b
    }

    /// `len` physically contiguous blocks
    pub fn alloc_run(&mut self, len: u32) -> u32 {
        loop {
            let start = self.next_block;
            if (start..start + len).all(|b| !self.is_block_used(b)) {
                for b in start..start + len {
                    self.mark_block(b);
                }
                self.next_block = start + len;
                return start;
            }
            self.next_block += 1;
        }
    }

    fn alloc_inode(&mut self) -> u32 {
        let id = self.next_inode;
        self.next_inode += 1;
        self.mark_inode(id..id + 1);
        id
    }

    pub fn block_offset(&self, block: u32) -> usize {
        block as usize * self.geo.block_size
    }

    /// Byte offset of inode `id` in the image
    pub fn inode_offset(&self, id: u32) -> usize {
        let g = (id - 1) / self.geo.inodes_per_group;
        let index = ((id - 1) % self.geo.inodes_per_group) as usize;
        self.block_offset(self.groups[g as usize].inode_table) + index * INODE_SIZE
    }

    fn write_block_data(&mut self, block: u32, data: &[u8]) {
        assert!(data.len() <= self.geo.block_size);
        let off = self.block_offset(block);
        self.image[off..off + data.len()].copy_from_slice(data);
    }

    #[allow(clippy::too_many_arguments)]
    fn write_inode(&mut self, id: u32, mode: u16, size: u64, links: u16, blocks: u32, flags: u32, area: &[u8; 60]) {
        let off = self.inode_offset(id);
        let raw = &mut self.image[off..off + INODE_SIZE];
        raw.fill(0);
        put_u16(raw, 0, mode);
        put_u16(raw, 2, 1000);
        put_u32(raw, 4, size as u32);
        put_u32(raw, 8, 1_600_000_000);
        put_u32(raw, 12, 1_600_000_000);
        put_u32(raw, 16, 1_600_000_000);
        put_u16(raw, 24, 1000);
        put_u16(raw, 26, links);
        put_u32(raw, 28, blocks);
        put_u32(raw, 32, flags);
        raw[40..100].copy_from_slice(area);
        put_u32(raw, 108, (size >> 32) as u32);
    }

    fn sectors(&self, blocks: u32) -> u32 {
        blocks * (self.geo.block_size / 512) as u32
    }

    /// Add a raw directory record. `inode` 0 writes an unused record.
    pub fn add_entry(&mut self, parent: u32, inode: u32, name: &str, ftype: u8) {
        self.dirs
            .get_mut(&parent)
            .expect("parent is a directory")
            .push(DirRecord {
                inode,
                name: name.into(),
                ftype,
            });
    }

    pub fn mkdir(&mut self, parent: u32, name: &str) -> u32 {
        let id = self.alloc_inode();
        self.dirs.insert(
            id,
            vec![
                DirRecord { inode: id, name: ".".into(), ftype: FT_DIR },
                DirRecord { inode: parent, name: "..".into(), ftype: FT_DIR },
            ],
        );
        self.dir_links.insert(id, 2);
        *self.dir_links.get_mut(&parent).expect("parent is a directory") += 1;
        self.add_entry(parent, id, name, FT_DIR);
        id
    }

    /// A regular file mapped through direct and indirect pointers
    pub fn add_file(&mut self, parent: u32, name: &str, content: &[u8]) -> u32 {
        let chunks: Vec<(u32, Vec<u8>)> = content
            .chunks(self.geo.block_size)
            .enumerate()
            .map(|(i, c)| (i as u32, c.to_vec()))
            .collect();
        self.add_sparse_file(parent, name, content.len() as u64, &chunks)
    }

    /// A regular file of `size` bytes where only the listed logical blocks
    /// are allocated
    pub fn add_sparse_file(&mut self, parent: u32, name: &str, size: u64, chunks: &[(u32, Vec<u8>)]) -> u32 {
        let id = self.alloc_inode();
        let mut area = [0u32; 15];
        let mut used = 0;
        for (lblock, data) in chunks {
            let pblock = self.alloc_block();
            self.write_block_data(pblock, data);
            used += 1 + self.set_pointer(&mut area, *lblock, pblock);
        }
        let mut raw = [0u8; 60];
        for (i, p) in area.iter().enumerate() {
            put_u32(&mut raw, i * 4, *p);
        }
        let sectors = self.sectors(used);
        self.write_inode(id, 0x81A4, size, 1, sectors, 0, &raw);
        self.add_entry(parent, id, name, FT_FILE);
        id
    }

    /// Point logical block `lblock` at `pblock`, creating indirect blocks on
    /// the way. Returns how many indirect blocks were created.
    fn set_pointer(&mut self, area: &mut [u32; 15], lblock: u32, pblock: u32) -> u32 {
        if lblock < 12 {
            area[lblock as usize] = pblock;
            return 0;
        }
        let n = (self.geo.block_size / 4) as u64;
        let mut rest = (lblock - 12) as u64;
        let mut span = 1u64;
        let mut created = 0;
        for levels in 1..=3usize {
            span *= n;
            if rest < span {
                let slot = 11 + levels;
                if area[slot] == 0 {
                    area[slot] = self.alloc_block();
                    created += 1;
                }
                let mut table = area[slot];
                let mut per = span;
                for level in 0..levels {
                    per /= n;
                    let idx = (rest / per) as usize;
                    rest %= per;
                    let off = self.block_offset(table) + idx * 4;
                    if level + 1 == levels {
                        put_u32(&mut self.image, off, pblock);
                    } else {
                        let mut next = get_u32(&self.image, off);
                        if next == 0 {
                            next = self.alloc_block();
                            created += 1;
                            put_u32(&mut self.image, off, next);
                        }
                        table = next;
                    }
                }
                return created;
            }
            rest -= span;
        }
        panic!("logical block {} too large", lblock);
    }

    /// A regular file mapped by an extent tree. `runs` are `(logical, len)`
    /// pairs, each stored contiguously. With `leaves == 0` the extents sit
    /// in the inode; otherwise they are spread over that many leaf blocks
    /// below a depth-1 root.
    pub fn add_extent_file(&mut self, parent: u32, name: &str, content: &[u8], runs: &[(u32, u16)], leaves: usize) -> u32 {
        self.uses_extents = true;
        let bs = self.geo.block_size;
        let id = self.alloc_inode();
        let mut extents = Vec::new();
        let mut used = 0;
        for &(logical, len) in runs {
            let start = self.alloc_run(len as u32);
            used += len as u32;
            for i in 0..len as u32 {
                let from = (logical + i) as usize * bs;
                if from < content.len() {
                    let to = (from + bs).min(content.len());
                    let data = content[from..to].to_vec();
                    self.write_block_data(start + i, &data);
                }
            }
            extents.push((logical, len, start));
        }
        let mut area = [0u8; 60];
        if leaves == 0 {
            assert!(extents.len() <= 4);
            write_extent_node(&mut area, 4, 0, &extents_bytes(&extents));
        } else {
            let per_leaf = extents.len().div_ceil(leaves);
            let mut index = Vec::new();
            for chunk in extents.chunks(per_leaf) {
                let leaf = self.alloc_block();
                used += 1;
                let mut node = vec![0u8; bs];
                write_extent_node(&mut node, ((bs - 12) / 12) as u16, 0, &extents_bytes(chunk));
                self.write_block_data(leaf, &node);
                index.push((chunk[0].0, leaf));
            }
            assert!(index.len() <= 4);
            let mut entries = Vec::new();
            for (first, leaf) in index {
                let mut e = [0u8; 12];
                put_u32(&mut e, 0, first);
                put_u32(&mut e, 4, leaf);
                entries.push(e);
            }
            write_extent_node(&mut area, 4, 1, &entries);
        }
        let sectors = self.sectors(used);
        self.write_inode(id, 0x81A4, content.len() as u64, 1, sectors, 0x80000, &area);
        self.add_entry(parent, id, name, FT_FILE);
        id
    }

    pub fn add_symlink(&mut self, parent: u32, name: &str, target: &str) -> u32 {
        let id = self.alloc_inode();
        let mut area = [0u8; 60];
        let blocks = if target.len() < 60 {
            area[..target.len()].copy_from_slice(target.as_bytes());
            0
        } else {
            let b = self.alloc_block();
            self.write_block_data(b, target.as_bytes());
            put_u32(&mut area, 0, b);
            self.sectors(1)
        };
        self.write_inode(id, 0xA1FF, target.len() as u64, 1, blocks, 0, &area);
        self.add_entry(parent, id, name, FT_SYMLINK);
        id
    }

    fn render_dirs(&mut self) {
        let bs = self.geo.block_size;
        let dirs = std::mem::take(&mut self.dirs);
        for (id, records) in &dirs {
            let mut blocks: Vec<Vec<u8>> = vec![Vec::new()];
            for rec in records {
                let len = (8 + rec.name.len()).div_ceil(4) * 4;
                if blocks.last().map_or(0, |b| b.len()) + len > bs {
                    blocks.push(Vec::new());
                }
                let cur = blocks.last_mut().expect("at least one block");
                let start = cur.len();
                cur.resize(start + len, 0);
                put_u32(cur, start, rec.inode);
                put_u16(cur, start + 4, len as u16);
                cur[start + 6] = rec.name.len() as u8;
                cur[start + 7] = if self.geo.filetype { rec.ftype } else { 0 };
                cur[start + 8..start + 8 + rec.name.len()].copy_from_slice(rec.name.as_bytes());
            }
            let mut area = [0u8; 60];
            assert!(blocks.len() <= 12, "directory too large for the builder");
            for (i, mut data) in blocks.iter().cloned().enumerate() {
                // stretch the last record to the end of the block
                let last = last_record_offset(&data);
                let stretched = (bs - last) as u16;
                put_u16(&mut data, last + 4, stretched);
                data.resize(bs, 0);
                let b = self.alloc_block();
                self.write_block_data(b, &data);
                put_u32(&mut area, i * 4, b);
            }
            let links = self.dir_links[id];
            let sectors = self.sectors(blocks.len() as u32);
            self.write_inode(*id, 0x41ED, (blocks.len() * bs) as u64, links, sectors, 0, &area);
        }
        self.dirs = dirs;
    }

    fn count_clear(&self, block: u32, bits: u32) -> u32 {
        let off = self.block_offset(block);
        (0..bits as usize)
            .filter(|&i| self.image[off + i / 8] & (1 << (i % 8)) == 0)
            .count() as u32
    }

    pub fn build(mut self) -> Vec<u8> {
        self.render_dirs();
        let bs = self.geo.block_size;
        let mut free_blocks = 0;
        let mut free_inodes = 0;
        let gdt = self.block_offset(self.first_data_block() + 1);
        for g in 0..self.group_count() {
            let layout = self.groups[g as usize];
            let fb = self.count_clear(layout.block_bitmap, self.group_len(g));
            let fi = self.count_clear(layout.inode_bitmap, self.geo.inodes_per_group);
            free_blocks += fb;
            free_inodes += fi;
            let off = gdt + g as usize * 32;
            put_u32(&mut self.image, off, layout.block_bitmap);
            put_u32(&mut self.image, off + 4, layout.inode_bitmap);
            put_u32(&mut self.image, off + 8, layout.inode_table);
            put_u16(&mut self.image, off + 12, fb as u16);
            put_u16(&mut self.image, off + 14, fi as u16);
            put_u16(&mut self.image, off + 16, if g == 0 { self.dirs.len() as u16 } else { 0 });
        }

        let geo = self.geo;
        let fdb = self.first_data_block();
        let group_count = self.group_count();
        let mut incompat = self.extra_incompat;
        if geo.filetype {
            incompat |= 0x2;
        }
        if self.uses_extents {
            incompat |= 0x40;
        }
        let sb = &mut self.image[1024..2048];
        put_u32(sb, 0, geo.inodes_per_group * group_count);
        put_u32(sb, 4, geo.blocks_count);
        put_u32(sb, 12, free_blocks);
        put_u32(sb, 16, free_inodes);
        put_u32(sb, 20, fdb);
        put_u32(sb, 24, (bs / 1024).trailing_zeros());
        put_u32(sb, 28, (bs / 1024).trailing_zeros());
        put_u32(sb, 32, geo.blocks_per_group);
        put_u32(sb, 36, geo.blocks_per_group);
        put_u32(sb, 40, geo.inodes_per_group);
        put_u16(sb, 56, 0xEF53);
        put_u16(sb, 58, self.state);
        put_u16(sb, 60, 1);
        put_u32(sb, 76, 1);
        put_u32(sb, 84, FIRST_INO);
        put_u16(sb, 88, INODE_SIZE as u16);
        put_u32(sb, 96, incompat);
        put_u32(sb, 100, self.ro_compat);
        sb[120..127].copy_from_slice(b"builder");
        self.image
    }
}

fn extents_bytes(extents: &[(u32, u16, u32)]) -> Vec<[u8; 12]> {
    extents
        .iter()
        .map(|&(logical, len, start)| {
            let mut e = [0u8; 12];
            put_u32(&mut e, 0, logical);
            put_u16(&mut e, 4, len);
            put_u32(&mut e, 8, start);
            e
        })
        .collect()
}

fn write_extent_node(buf: &mut [u8], max: u16, depth: u16, entries: &[[u8; 12]]) {
    put_u16(buf, 0, EXTENT_MAGIC);
    put_u16(buf, 2, entries.len() as u16);
    put_u16(buf, 4, max);
    put_u16(buf, 6, depth);
    for (i, e) in entries.iter().enumerate() {
        buf[12 + i * 12..24 + i * 12].copy_from_slice(e);
    }
}

fn last_record_offset(block: &[u8]) -> usize {
    let mut off = 0;
    loop {
        let len = u16::from_le_bytes([block[off + 4], block[off + 5]]) as usize;
        if off + len >= block.len() {
            return off;
        }
        off += len;
    }
}

/// A block device backed by a byte vector.
pub struct MemDevice {
    data: Mutex<Vec<u8>>,
    writable: bool,
    reads: AtomicUsize,
    failing: Mutex<Option<(usize, usize)>>,
}

impl MemDevice {
    pub fn new(data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(data),
            writable: false,
            reads: AtomicUsize::new(0),
            failing: Mutex::new(None),
        })
    }

    pub fn new_writable(data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(data),
            writable: true,
            reads: AtomicUsize::new(0),
            failing: Mutex::new(None),
        })
    }

    /// Number of `read_offset` calls so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Make reads touching `[offset, offset + len)` fail with `EIO`
    pub fn fail_reads(&self, offset: usize, len: usize) {
        *self.failing.lock().unwrap() = Some((offset, offset + len));
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

impl std::fmt::Debug for MemDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemDevice")
            .field("len", &self.data.lock().unwrap().len())
            .field("writable", &self.writable)
            .finish()
    }
}

impl BlockDevice for MemDevice {
    fn read_offset(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some((start, end)) = *self.failing.lock().unwrap() {
            if offset < end && offset + buf.len() > start {
                return Err(Ext2Error::with_msg_str(ErrCode::EIO, "injected read failure"));
            }
        }
        let data = self.data.lock().unwrap();
        let src = data
            .get(offset..offset + buf.len())
            .ok_or_else(|| Ext2Error::with_msg_str(ErrCode::EIO, "read past end of device"))?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write_offset(&self, offset: usize, data: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(Ext2Error::new(ErrCode::EROFS));
        }
        let mut image = self.data.lock().unwrap();
        image
            .get_mut(offset..offset + data.len())
            .ok_or_else(|| Ext2Error::with_msg_str(ErrCode::EIO, "write past end of device"))?
            .copy_from_slice(data);
        Ok(())
    }

    fn writable(&self) -> bool {
        self.writable
    }
}
