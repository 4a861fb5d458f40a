//! Process-wide inode table: authoritative owner of every inode.

use crate::inode::Inode;
use sfs_error::{FsError, Result};
use sfs_types::InodeNumber;
use std::collections::HashMap;

/// Maps inode numbers to inodes and mints fresh numbers.
///
/// Numbers come from a monotonic counter starting at 2 (1 is the root) and
/// are never reused while the process lives, so a stale number from the
/// kernel can only miss, never alias.
#[derive(Debug)]
pub struct InodeTable {
    map: HashMap<u64, Inode>,
    next: u64,
}

impl InodeTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            next: 2,
        }
    }

    /// Mint a fresh inode number.
    pub fn allocate_ino(&mut self) -> InodeNumber {
        let ino = InodeNumber(self.next);
        self.next += 1;
        ino
    }

    /// Insert an inode under its own number.
    pub fn insert(&mut self, inode: Inode) {
        self.map.insert(inode.ino.0, inode);
    }

    /// Resolve a number the bridge handed us. A miss is a protocol
    /// violation, not a name-lookup failure.
    pub fn get(&self, ino: InodeNumber) -> Result<&Inode> {
        self.map
            .get(&ino.0)
            .ok_or_else(|| FsError::BadRequest(format!("unknown inode {ino}")))
    }

    pub fn get_mut(&mut self, ino: InodeNumber) -> Result<&mut Inode> {
        self.map
            .get_mut(&ino.0)
            .ok_or_else(|| FsError::BadRequest(format!("unknown inode {ino}")))
    }

    /// Non-erroring variant for cleanup paths that tolerate absence.
    pub fn peek_mut(&mut self, ino: InodeNumber) -> Option<&mut Inode> {
        self.map.get_mut(&ino.0)
    }

    pub fn remove(&mut self, ino: InodeNumber) -> Option<Inode> {
        self.map.remove(&ino.0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Inode> + '_ {
        self.map.drain().map(|(_, inode)| inode)
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
