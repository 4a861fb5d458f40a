#![forbid(unsafe_code)]
//! Per-file extent mapping: file offsets onto allocated blocks.
//!
//! An [`ExtentMap`] maps block-aligned file offsets to extents owned by this
//! file. Gaps are sparse regions that read as zeros. One extent covers one
//! block; a write touches only the blocks under it, and a write into a hole
//! reserves every missing block before committing any of them, so running
//! out of space leaves the map unchanged.

use sfs_error::Result;
use sfs_store::{BlockStore, Extent};
use sfs_types::{block_floor, block_offset, BLOCK_SIZE};
use std::collections::BTreeMap;

/// Extent-backed byte range of a single regular file.
#[derive(Debug, Default)]
pub struct ExtentMap {
    /// Block-aligned file offset → extent covering that block.
    extents: BTreeMap<u64, Extent>,
    /// Logical file size. May exceed the highest extent (sparse tail) and is
    /// the truncate length after a shrink into a gap.
    size: u64,
    /// Bytes of backing store held, always a multiple of the block size.
    allocated: u64,
}

impl ExtentMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Logical file size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// 512-byte units backing this file, as reported in `st_blocks`.
    #[must_use]
    pub fn blocks(&self) -> u64 {
        self.allocated / 512
    }

    /// Number of live extents.
    #[must_use]
    pub fn extent_count(&self) -> usize {
        self.extents.len()
    }

    /// Write `data` at `offset`, allocating blocks for any uncovered range.
    ///
    /// Grows the file size to at least `offset + data.len()`. All blocks the
    /// write needs are reserved up front; on `NoSpace` nothing is mutated.
    pub fn write(&mut self, store: &dyn BlockStore, offset: u64, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| sfs_error::FsError::InvalidArgument("write end overflows".into()))?;

        // Reserve every missing block before committing any of them.
        let mut missing = Vec::new();
        let mut block = block_floor(offset);
        while block < end {
            if !self.extents.contains_key(&block) {
                missing.push(block);
            }
            block += u64::from(BLOCK_SIZE);
        }
        let mut reservations = Vec::with_capacity(missing.len());
        for _ in &missing {
            match store.reserve(BLOCK_SIZE) {
                Ok(reservation) => reservations.push(reservation),
                Err(err) => {
                    for reservation in reservations {
                        store.cancel(reservation);
                    }
                    return Err(err);
                }
            }
        }
        for (block, reservation) in missing.into_iter().zip(reservations) {
            let extent = store.commit(reservation);
            self.extents.insert(block, extent);
            self.allocated += u64::from(BLOCK_SIZE);
        }

        // Copy, block by block. Commit zero-fills, so a partial write into a
        // fresh block leaves the rest of the block reading as zeros.
        let mut written = 0_usize;
        let mut pos = offset;
        while written < data.len() {
            let block = block_floor(pos);
            let in_block = block_offset(pos);
            let chunk = ((BLOCK_SIZE - in_block) as usize).min(data.len() - written);
            let extent = self.extents.get(&block).expect("block allocated above");
            store.write(extent, in_block, &data[written..written + chunk]);
            written += chunk;
            pos += chunk as u64;
        }

        self.size = self.size.max(end);
        Ok(data.len())
    }

    /// Read up to `len` bytes at `offset`.
    ///
    /// Returns `min(len, size - offset)` bytes; sparse ranges come back as
    /// zeros, and reads at or past the file size return an empty buffer.
    #[must_use]
    pub fn read(&self, store: &dyn BlockStore, offset: u64, len: u32) -> Vec<u8> {
        if offset >= self.size {
            return Vec::new();
        }
        let len = u64::from(len).min(self.size - offset);
        let len = usize::try_from(len).expect("read length fits usize");
        let mut out = vec![0_u8; len];

        let mut filled = 0_usize;
        let mut pos = offset;
        while filled < len {
            let block = block_floor(pos);
            let in_block = block_offset(pos);
            let chunk = ((BLOCK_SIZE - in_block) as usize).min(len - filled);
            if let Some(extent) = self.extents.get(&block) {
                store.read(extent, in_block, &mut out[filled..filled + chunk]);
            }
            filled += chunk;
            pos += chunk as u64;
        }
        out
    }

    /// Set the file size to `new_size`.
    ///
    /// Shrinking frees every extent past the new end and zero-pads the tail
    /// of a straddled block, so growing back over it reads zeros. Growing
    /// only raises the size; the new range stays sparse.
    pub fn truncate(&mut self, store: &dyn BlockStore, new_size: u64) {
        if new_size < self.size {
            let boundary = sfs_types::block_ceil(new_size);
            let dead = self.extents.split_off(&boundary);
            for extent in dead.values() {
                store.free(extent);
                self.allocated -= u64::from(BLOCK_SIZE);
            }
            let tail = block_offset(new_size);
            if tail != 0 {
                if let Some(extent) = self.extents.get(&block_floor(new_size)) {
                    let zeros = vec![0_u8; (extent.len - tail) as usize];
                    store.write(extent, tail, &zeros);
                }
            }
        }
        self.size = new_size;
    }

    /// Free every extent and reset to an empty file.
    pub fn clear(&mut self, store: &dyn BlockStore) {
        for extent in self.extents.values() {
            store.free(extent);
        }
        self.extents.clear();
        self.allocated = 0;
        self.size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfs_store::HeapStore;

    const BS: u64 = BLOCK_SIZE as u64;

    fn store(blocks: u64) -> HeapStore {
        HeapStore::new(blocks * BS)
    }

    #[test]
    fn write_read_roundtrip() {
        let store = store(16);
        let mut map = ExtentMap::new();
        map.write(&store, 0, b"hello").unwrap();
        assert_eq!(map.size(), 5);
        assert_eq!(map.blocks(), 8); // one whole block backs the tail
        assert_eq!(map.read(&store, 0, 5), b"hello");
    }

    #[test]
    fn read_past_size_is_empty_and_short_reads_clamp() {
        let store = store(16);
        let mut map = ExtentMap::new();
        map.write(&store, 0, b"hello").unwrap();
        assert!(map.read(&store, 5, 10).is_empty());
        assert!(map.read(&store, 100, 1).is_empty());
        assert_eq!(map.read(&store, 3, 100), b"lo");
    }

    #[test]
    fn sparse_read_returns_zeros() {
        let store = store(16);
        let mut map = ExtentMap::new();
        let offset = 1024 * 1024;
        map.write(&store, offset, b"x").unwrap();

        assert_eq!(map.size(), offset + 1);
        // One backing block, not 257.
        assert_eq!(map.extent_count(), 1);
        assert_eq!(map.blocks(), 8);

        let head = map.read(&store, 0, BLOCK_SIZE * 2);
        assert_eq!(head.len(), (BLOCK_SIZE * 2) as usize);
        assert!(head.iter().all(|&b| b == 0));
        assert_eq!(map.read(&store, offset, 1), b"x");
    }

    #[test]
    fn partial_block_write_zero_fills_surroundings() {
        let store = store(16);
        let mut map = ExtentMap::new();
        map.write(&store, 100, b"mid").unwrap();
        let full = map.read(&store, 0, 103);
        assert!(full[..100].iter().all(|&b| b == 0));
        assert_eq!(&full[100..], b"mid");
    }

    #[test]
    fn write_spanning_blocks() {
        let store = store(16);
        let mut map = ExtentMap::new();
        let data: Vec<u8> = (0..=255).cycle().take(3 * BLOCK_SIZE as usize).collect();
        map.write(&store, BS - 7, &data).unwrap();
        assert_eq!(map.extent_count(), 4);
        assert_eq!(map.read(&store, BS - 7, data.len() as u32), data);
    }

    #[test]
    fn overwrite_in_place_keeps_allocation() {
        let store = store(16);
        let mut map = ExtentMap::new();
        map.write(&store, 0, &[1_u8; 4096]).unwrap();
        let before = store.used_bytes();
        map.write(&store, 0, &[2_u8; 4096]).unwrap();
        assert_eq!(store.used_bytes(), before);
        assert_eq!(map.read(&store, 0, 4), [2, 2, 2, 2]);
    }

    #[test]
    fn truncate_shrink_frees_and_zero_pads() {
        let store = store(16);
        let mut map = ExtentMap::new();
        map.write(&store, 0, &[7_u8; 3 * 4096]).unwrap();
        assert_eq!(map.blocks(), 24);

        map.truncate(&store, 1);
        assert_eq!(map.size(), 1);
        assert_eq!(map.extent_count(), 1);
        assert_eq!(map.blocks(), 8);
        assert_eq!(store.used_bytes(), BS);

        // Growing back over the truncated tail reads zeros, not stale bytes.
        map.truncate(&store, 4096);
        let tail = map.read(&store, 1, 4095);
        assert!(tail.iter().all(|&b| b == 0));
        assert_eq!(map.read(&store, 0, 1), [7]);
    }

    #[test]
    fn truncate_to_zero_frees_everything() {
        let store = store(16);
        let mut map = ExtentMap::new();
        map.write(&store, 0, &[9_u8; 2 * 4096]).unwrap();
        map.truncate(&store, 0);
        assert_eq!(map.size(), 0);
        assert_eq!(map.extent_count(), 0);
        assert_eq!(store.used_bytes(), 0);
    }

    #[test]
    fn truncate_grow_is_sparse() {
        let store = store(16);
        let mut map = ExtentMap::new();
        map.write(&store, 0, b"abc").unwrap();
        map.truncate(&store, 10 * BS);
        assert_eq!(map.size(), 10 * BS);
        assert_eq!(map.extent_count(), 1);
        let read = map.read(&store, 3, 100);
        assert!(read.iter().all(|&b| b == 0));
    }

    #[test]
    fn truncate_into_gap_keeps_explicit_length() {
        let store = store(16);
        let mut map = ExtentMap::new();
        map.write(&store, 8 * BS, b"far").unwrap();
        map.truncate(&store, 2 * BS + 17);
        assert_eq!(map.size(), 2 * BS + 17);
        assert_eq!(map.extent_count(), 0);
    }

    #[test]
    fn no_space_leaves_map_untouched() {
        let store = store(2);
        let mut map = ExtentMap::new();
        map.write(&store, 0, &[1_u8; 4096]).unwrap();

        // Needs two fresh blocks but only one remains.
        let err = map.write(&store, BS, &[2_u8; 2 * 4096]).unwrap_err();
        assert!(matches!(err, sfs_error::FsError::NoSpace));
        assert_eq!(map.size(), BS);
        assert_eq!(map.extent_count(), 1);
        // The failed write returned its reservation.
        assert_eq!(store.used_bytes(), BS);
        assert!(map.write(&store, BS, &[2_u8; 4096]).is_ok());
    }

    #[test]
    fn clear_releases_all_store_bytes() {
        let store = store(16);
        let mut map = ExtentMap::new();
        map.write(&store, 0, &[3_u8; 5 * 4096]).unwrap();
        map.clear(&store);
        assert_eq!(store.used_bytes(), 0);
        assert_eq!(map.size(), 0);
    }
}
