#![forbid(unsafe_code)]
//! scratchfs core: the in-memory inode graph and its request facade.
//!
//! The kernel bridge resolves everything through [`FileSystem`], which owns
//! the inode table, every directory index and extent map, and the open-handle
//! table behind one coarse mutex. Request entry points mirror the low-level
//! kernel protocol: inode numbers in, attributes or errno-mapped errors out,
//! with caller credentials passed explicitly on every call that checks
//! permissions.

mod cred;
mod dir;
mod fs;
mod handle;
mod inode;
mod table;
mod time;

pub use cred::Credentials;
pub use dir::{DirEntry, DirIndex};
pub use fs::{FileSystem, FsConfig, SetAttr, StatVfs, TimeUpdate};
pub use handle::FileHandle;
pub use inode::{Inode, InodeAttr, InodeKind};
pub use time::{Clock, SystemClock};

pub use sfs_types::{FileKind, HandleId, InodeNumber};
