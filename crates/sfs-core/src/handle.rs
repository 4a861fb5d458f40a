//! Open-file handles: per-open state and the handle table.

use sfs_error::{FsError, Result};
use sfs_types::{HandleId, InodeNumber};
use std::collections::HashMap;

/// State captured when a file is opened.
///
/// The read/write grants are a snapshot of the access check made at open
/// time; a later chmod does not revoke them. `append` redirects every write
/// offset to the current end of file under the filesystem lock.
#[derive(Debug, Clone, Copy)]
pub struct FileHandle {
    pub ino: InodeNumber,
    pub read: bool,
    pub write: bool,
    pub append: bool,
}

/// Live handles keyed by the id handed to the kernel in `fh`.
#[derive(Debug)]
pub struct HandleTable {
    map: HashMap<u64, FileHandle>,
    next: u64,
}

impl HandleTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            next: 1,
        }
    }

    pub fn insert(&mut self, handle: FileHandle) -> HandleId {
        let id = HandleId(self.next);
        self.next += 1;
        self.map.insert(id.0, handle);
        id
    }

    /// Resolve a handle id from the bridge; a miss is a protocol violation.
    pub fn get(&self, id: HandleId) -> Result<FileHandle> {
        self.map
            .get(&id.0)
            .copied()
            .ok_or_else(|| FsError::BadRequest(format!("unknown handle {id}")))
    }

    pub fn remove(&mut self, id: HandleId) -> Result<FileHandle> {
        self.map
            .remove(&id.0)
            .ok_or_else(|| FsError::BadRequest(format!("unknown handle {id}")))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = FileHandle> + '_ {
        self.map.drain().map(|(_, handle)| handle)
    }
}
