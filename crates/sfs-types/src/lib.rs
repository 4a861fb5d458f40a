#![forbid(unsafe_code)]
//! Shared identifier newtypes and POSIX constants for scratchfs.
//!
//! Everything here is plain data: typed wrappers that keep inode numbers,
//! heap node ids, and file-handle ids from being mixed up, plus the mode
//! and access-mask constants the permission layer interprets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Filesystem block size in bytes. Extents are carved in units of this size.
pub const BLOCK_SIZE: u32 = 4096;

/// Maximum length of a single directory entry name, in bytes.
pub const NAME_MAX: usize = 255;

/// Inode number (64-bit, never reused during the life of the process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InodeNumber(pub u64);

impl InodeNumber {
    /// The root directory. Created at mount time, never reaped.
    pub const ROOT: Self = Self(1);
}

/// Identifier of a backing memory heap.
///
/// The RAM baseline uses a single node; the id exists so extents stay
/// addressable when the store is backed by more than one heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Open-file handle id, as handed to the kernel in `fh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HandleId(pub u64);

impl fmt::Display for InodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── POSIX file mode constants ───────────────────────────────────────────────

/// File type mask (upper 4 bits of mode).
pub const S_IFMT: u32 = 0o170_000;
/// Named pipe (FIFO).
pub const S_IFIFO: u32 = 0o010_000;
/// Character device.
pub const S_IFCHR: u32 = 0o020_000;
/// Directory.
pub const S_IFDIR: u32 = 0o040_000;
/// Block device.
pub const S_IFBLK: u32 = 0o060_000;
/// Regular file.
pub const S_IFREG: u32 = 0o100_000;
/// Symbolic link.
pub const S_IFLNK: u32 = 0o120_000;
/// Socket.
pub const S_IFSOCK: u32 = 0o140_000;

/// Set-user-id bit.
pub const S_ISUID: u32 = 0o4000;
/// Set-group-id bit.
pub const S_ISGID: u32 = 0o2000;
/// Sticky bit (restricted deletion on directories).
pub const S_ISVTX: u32 = 0o1000;

// ── Access masks ────────────────────────────────────────────────────────────

/// Read permission request bit.
pub const MAY_READ: u32 = 4;
/// Write permission request bit.
pub const MAY_WRITE: u32 = 2;
/// Execute / search permission request bit.
pub const MAY_EXEC: u32 = 1;

// ── File kind ───────────────────────────────────────────────────────────────

/// File type as carried in the high bits of `mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    RegularFile,
    Directory,
    Symlink,
    Fifo,
    CharDevice,
    BlockDevice,
    Socket,
}

impl FileKind {
    /// Decode the type bits of a mode. Unknown patterns decode as a regular
    /// file, matching how a zero-mode `mknod` is treated.
    #[must_use]
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFDIR => Self::Directory,
            S_IFLNK => Self::Symlink,
            S_IFIFO => Self::Fifo,
            S_IFCHR => Self::CharDevice,
            S_IFBLK => Self::BlockDevice,
            S_IFSOCK => Self::Socket,
            _ => Self::RegularFile,
        }
    }
}

/// Whether `mode` names a directory.
#[must_use]
pub fn mode_is_dir(mode: u32) -> bool {
    mode & S_IFMT == S_IFDIR
}

/// Whether `mode` names a regular file.
#[must_use]
pub fn mode_is_regular(mode: u32) -> bool {
    mode & S_IFMT == S_IFREG
}

/// Whether `mode` names a symbolic link.
#[must_use]
pub fn mode_is_symlink(mode: u32) -> bool {
    mode & S_IFMT == S_IFLNK
}

// ── Block arithmetic ────────────────────────────────────────────────────────

/// Round a byte offset down to its containing block boundary.
#[must_use]
pub fn block_floor(offset: u64) -> u64 {
    offset & !u64::from(BLOCK_SIZE - 1)
}

/// Round a byte offset up to the next block boundary.
///
/// Saturates at `u64::MAX & !(BLOCK_SIZE-1)` rather than wrapping.
#[must_use]
pub fn block_ceil(offset: u64) -> u64 {
    let mask = u64::from(BLOCK_SIZE - 1);
    offset.saturating_add(mask) & !mask
}

/// Offset of `offset` within its containing block.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // remainder by BLOCK_SIZE fits in u32
pub fn block_offset(offset: u64) -> u32 {
    (offset & u64::from(BLOCK_SIZE - 1)) as u32
}
