//! Inode: stat attributes, reference counts, and the per-type payload.

use crate::dir::DirIndex;
use sfs_error::{FsError, Result};
use sfs_extent::ExtentMap;
use sfs_types::{
    mode_is_dir, mode_is_regular, mode_is_symlink, FileKind, InodeNumber, BLOCK_SIZE, S_IFLNK,
    S_IFMT, S_IFREG,
};
use std::time::SystemTime;

/// Type-specific payload of an inode.
///
/// Metadata-only nodes (FIFOs, sockets, devices from `mknod`) carry a
/// `Regular` payload that never allocates; their real type lives in `mode`
/// and `rdev`.
#[derive(Debug)]
pub enum InodeKind {
    Regular(ExtentMap),
    Directory(DirIndex),
    Symlink(Vec<u8>),
}

/// A file, directory, or symlink node.
///
/// Two counters drive lifetime, with distinct decrement sources: `krefs`
/// counts lookups the kernel has not yet forgotten (controls metadata
/// visibility by inode number), `open_count` counts live handles (controls
/// data survival after unlink). Name entries in parent directories are the
/// third leg; see the facade's reap rule.
#[derive(Debug)]
pub struct Inode {
    pub ino: InodeNumber,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub rdev: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub crtime: SystemTime,
    pub krefs: u64,
    pub open_count: u64,
    pub kind: InodeKind,
}

impl Inode {
    /// Regular file (or metadata-only special node). `nlink` starts at 1.
    #[must_use]
    pub fn new_regular(
        ino: InodeNumber,
        mode: u32,
        uid: u32,
        gid: u32,
        rdev: u32,
        now: SystemTime,
    ) -> Self {
        let mode = if mode & S_IFMT == 0 { mode | S_IFREG } else { mode };
        Self {
            ino,
            mode,
            uid,
            gid,
            nlink: 1,
            rdev,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            krefs: 0,
            open_count: 0,
            kind: InodeKind::Regular(ExtentMap::new()),
        }
    }

    /// Directory with `nlink = 2` (its own `.` plus the parent entry).
    #[must_use]
    pub fn new_directory(
        ino: InodeNumber,
        mode: u32,
        uid: u32,
        gid: u32,
        parent: InodeNumber,
        now: SystemTime,
    ) -> Self {
        Self {
            ino,
            mode,
            uid,
            gid,
            nlink: 2,
            rdev: 0,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            krefs: 0,
            open_count: 0,
            kind: InodeKind::Directory(DirIndex::new(parent)),
        }
    }

    /// Symlink storing `target` verbatim; mode is always `0777`.
    #[must_use]
    pub fn new_symlink(
        ino: InodeNumber,
        target: Vec<u8>,
        uid: u32,
        gid: u32,
        now: SystemTime,
    ) -> Self {
        Self {
            ino,
            mode: S_IFLNK | 0o777,
            uid,
            gid,
            nlink: 1,
            rdev: 0,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            krefs: 0,
            open_count: 0,
            kind: InodeKind::Symlink(target),
        }
    }

    #[must_use]
    pub fn is_regular(&self) -> bool {
        mode_is_regular(self.mode)
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        mode_is_dir(self.mode)
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        mode_is_symlink(self.mode)
    }

    /// Logical size: extent-map size for files, one block for directories,
    /// target length for symlinks.
    #[must_use]
    pub fn size(&self) -> u64 {
        match &self.kind {
            InodeKind::Regular(map) => map.size(),
            InodeKind::Directory(_) => u64::from(BLOCK_SIZE),
            InodeKind::Symlink(target) => target.len() as u64,
        }
    }

    /// Directory index of this inode, or `ENOTDIR`.
    pub fn dir(&self) -> Result<&DirIndex> {
        match &self.kind {
            InodeKind::Directory(dir) => Ok(dir),
            _ => Err(FsError::NotDirectory),
        }
    }

    pub fn dir_mut(&mut self) -> Result<&mut DirIndex> {
        match &mut self.kind {
            InodeKind::Directory(dir) => Ok(dir),
            _ => Err(FsError::NotDirectory),
        }
    }

    /// Extent map of this inode, or the type-mismatch error for its kind.
    pub fn data(&self) -> Result<&ExtentMap> {
        match &self.kind {
            InodeKind::Regular(map) => Ok(map),
            InodeKind::Directory(_) => Err(FsError::IsDirectory),
            InodeKind::Symlink(_) => Err(FsError::InvalidArgument("not a regular file".into())),
        }
    }

    pub fn data_mut(&mut self) -> Result<&mut ExtentMap> {
        match &mut self.kind {
            InodeKind::Regular(map) => Ok(map),
            InodeKind::Directory(_) => Err(FsError::IsDirectory),
            InodeKind::Symlink(_) => Err(FsError::InvalidArgument("not a regular file".into())),
        }
    }

    /// Stat view handed back to the kernel bridge.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // perm bits fit u16
    pub fn attr(&self) -> InodeAttr {
        let blocks = match &self.kind {
            InodeKind::Regular(map) => map.blocks(),
            _ => 0,
        };
        InodeAttr {
            ino: self.ino,
            size: self.size(),
            blocks,
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
            crtime: self.crtime,
            kind: FileKind::from_mode(self.mode),
            perm: (self.mode & 0o7777) as u16,
            nlink: self.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: self.rdev,
            blksize: BLOCK_SIZE,
        }
    }
}

/// Plain-data stat block returned by every entry point that reports an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeAttr {
    pub ino: InodeNumber,
    pub size: u64,
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub crtime: SystemTime,
    pub kind: FileKind,
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub blksize: u32,
}
