#![forbid(unsafe_code)]
//! Error types for scratchfs.
//!
//! Defines `FsError` and a `Result<T>` alias used throughout the workspace.
//! Each variant corresponds to exactly one POSIX errno; the FUSE adapter
//! converts through [`FsError::to_errno()`] when replying to the kernel.

use thiserror::Error;

/// Unified error type for all filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("file exists")]
    Exists,

    #[error("not a directory")]
    NotDirectory,

    #[error("is a directory")]
    IsDirectory,

    #[error("directory not empty")]
    NotEmpty,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("name too long")]
    NameTooLong,

    #[error("no space left on device")]
    NoSpace,

    #[error("permission denied")]
    AccessDenied,

    #[error("operation not permitted")]
    NotPermitted,

    #[error("malformed request: {0}")]
    BadRequest(String),
}

impl FsError {
    /// Convert this error into a POSIX errno suitable for kernel replies.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::NotFound(_) => libc::ENOENT,
            Self::Exists => libc::EEXIST,
            Self::NotDirectory => libc::ENOTDIR,
            Self::IsDirectory => libc::EISDIR,
            Self::NotEmpty => libc::ENOTEMPTY,
            Self::InvalidArgument(_) => libc::EINVAL,
            Self::NameTooLong => libc::ENAMETOOLONG,
            Self::NoSpace => libc::ENOSPC,
            Self::AccessDenied => libc::EACCES,
            Self::NotPermitted => libc::EPERM,
            Self::BadRequest(_) => libc::EFAULT,
        }
    }
}

/// Result alias using `FsError`.
pub type Result<T> = std::result::Result<T, FsError>;
