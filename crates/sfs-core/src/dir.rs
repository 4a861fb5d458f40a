//! Directory index: ordered name → inode mapping plus the parent pointer.

use sfs_error::{FsError, Result};
use sfs_types::{FileKind, InodeNumber, NAME_MAX};
use std::collections::BTreeMap;

/// Per-directory name table.
///
/// Entries are byte strings ordered lexicographically, which fixes the
/// enumeration order: the same directory state always lists the same way.
/// `.` and `..` are synthesized during enumeration, never stored; the parent
/// pointer is an inode number so the graph stays acyclic ownership-wise.
#[derive(Debug)]
pub struct DirIndex {
    parent: InodeNumber,
    entries: BTreeMap<Vec<u8>, InodeNumber>,
}

impl DirIndex {
    #[must_use]
    pub fn new(parent: InodeNumber) -> Self {
        Self {
            parent,
            entries: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn parent(&self) -> InodeNumber {
        self.parent
    }

    pub fn set_parent(&mut self, parent: InodeNumber) {
        self.parent = parent;
    }

    #[must_use]
    pub fn get(&self, name: &[u8]) -> Option<InodeNumber> {
        self.entries.get(name).copied()
    }

    /// Add an entry. Fails with `Exists` if the name is already present.
    pub fn insert(&mut self, name: Vec<u8>, ino: InodeNumber) -> Result<()> {
        match self.entries.entry(name) {
            std::collections::btree_map::Entry::Occupied(_) => Err(FsError::Exists),
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(ino);
                Ok(())
            }
        }
    }

    pub fn remove(&mut self, name: &[u8]) -> Option<InodeNumber> {
        self.entries.remove(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], InodeNumber)> {
        self.entries.iter().map(|(name, ino)| (name.as_slice(), *ino))
    }
}

/// One `readdir` entry; `offset` is the resume cookie for the entry *after*
/// this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: InodeNumber,
    pub offset: u64,
    pub kind: FileKind,
    pub name: Vec<u8>,
}

/// Validate a directory entry name for storage.
///
/// `.` and `..` are legal path components but never stored; callers decide
/// how to treat them before validating.
pub fn validate_name(name: &[u8]) -> Result<()> {
    if name.is_empty() {
        return Err(FsError::InvalidArgument("empty name".into()));
    }
    if name.len() > NAME_MAX {
        return Err(FsError::NameTooLong);
    }
    if name.contains(&b'/') || name.contains(&0) {
        return Err(FsError::InvalidArgument(
            "name contains '/' or NUL".into(),
        ));
    }
    Ok(())
}

/// Whether `name` is one of the synthetic `.` / `..` entries.
#[must_use]
pub fn is_dot_name(name: &[u8]) -> bool {
    name == b"." || name == b".."
}
