//! Caller credentials and POSIX permission checks.

use sfs_error::{FsError, Result};
use sfs_types::{mode_is_regular, MAY_EXEC, S_ISVTX};

/// Uid/gid of the process issuing a request, as reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
}

impl Credentials {
    pub const ROOT: Self = Self { uid: 0, gid: 0 };

    #[must_use]
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    #[must_use]
    pub fn is_root(self) -> bool {
        self.uid == 0
    }
}

/// Check `mask` (MAY_READ | MAY_WRITE | MAY_EXEC bits) against an inode's
/// mode and ownership.
///
/// Root bypasses everything except execute on a regular file, which still
/// requires at least one execute bit somewhere in the mode. A zero mask is
/// an existence probe and always passes.
pub fn check_access(
    mode: u32,
    owner_uid: u32,
    owner_gid: u32,
    cred: Credentials,
    mask: u32,
) -> Result<()> {
    if mask == 0 {
        return Ok(());
    }
    if cred.is_root() {
        if mask & MAY_EXEC != 0 && mode_is_regular(mode) && mode & 0o111 == 0 {
            return Err(FsError::AccessDenied);
        }
        return Ok(());
    }
    let triplet = if cred.uid == owner_uid {
        (mode >> 6) & 0o7
    } else if cred.gid == owner_gid {
        (mode >> 3) & 0o7
    } else {
        mode & 0o7
    };
    if triplet & mask == mask {
        Ok(())
    } else {
        Err(FsError::AccessDenied)
    }
}

/// Restricted-deletion rule for sticky directories.
///
/// When the parent carries the sticky bit, only root, the directory owner,
/// or the entry's owner may remove or replace the entry.
pub fn check_sticky(
    parent_mode: u32,
    parent_uid: u32,
    target_uid: u32,
    cred: Credentials,
) -> Result<()> {
    if parent_mode & S_ISVTX == 0 {
        return Ok(());
    }
    if cred.is_root() || cred.uid == parent_uid || cred.uid == target_uid {
        Ok(())
    } else {
        Err(FsError::NotPermitted)
    }
}
