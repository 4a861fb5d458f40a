//! The filesystem facade: request entry points for the kernel bridge.
//!
//! One coarse mutex guards the whole inode graph — the table, every
//! directory index and extent map, every stat block, and the handle table.
//! Each entry point resolves inode numbers, validates, then mutates, so a
//! failed request leaves no partial state behind. The block store sits
//! outside the lock and is internally synchronized.

use crate::cred::{check_access, check_sticky, Credentials};
use crate::dir::{is_dot_name, validate_name, DirEntry};
use crate::handle::{FileHandle, HandleTable};
use crate::inode::{Inode, InodeAttr, InodeKind};
use crate::table::InodeTable;
use crate::time::{Clock, SystemClock};
use parking_lot::Mutex;
use sfs_error::{FsError, Result};
use sfs_store::{BlockStore, HeapStore};
use sfs_types::{
    mode_is_dir, mode_is_symlink, FileKind, HandleId, InodeNumber, BLOCK_SIZE, MAY_EXEC, MAY_READ,
    MAY_WRITE, NAME_MAX, S_IFDIR, S_IFMT, S_ISGID,
};
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

/// Fixed inode cap reported by statfs. Numbers are minted, not pooled, so
/// this only bounds what `ffree` can report.
const MAX_INODES: u64 = 1 << 20;

// ── Configuration ───────────────────────────────────────────────────────────

/// Mount-time parameters.
#[derive(Debug, Clone)]
pub struct FsConfig {
    /// Capacity of the backing heap in bytes.
    pub capacity_bytes: u64,
    pub root_uid: u32,
    pub root_gid: u32,
    /// Permission bits of the root directory.
    pub root_mode: u32,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 512 << 20,
            root_uid: 0,
            root_gid: 0,
            // Scratch space behaves like /tmp: world-writable, sticky.
            root_mode: 0o1777,
        }
    }
}

// ── Request/response types ──────────────────────────────────────────────────

/// A timestamp update from `setattr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUpdate {
    /// "Set to the current time" — allowed with write access alone.
    Now,
    /// An explicit timestamp — owner or root only.
    At(SystemTime),
}

/// Attribute subset to change; unset fields are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetAttr {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub atime: Option<TimeUpdate>,
    pub mtime: Option<TimeUpdate>,
}

/// Filesystem-level usage report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatVfs {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

// ── Facade ──────────────────────────────────────────────────────────────────

struct Volume {
    inodes: InodeTable,
    handles: HandleTable,
    destroyed: bool,
}

impl Volume {
    fn ensure_live(&self) -> Result<()> {
        if self.destroyed {
            Err(FsError::BadRequest("filesystem was destroyed".into()))
        } else {
            Ok(())
        }
    }
}

/// Snapshot of a parent directory taken while validating an operation.
struct ParentGate {
    mode: u32,
    uid: u32,
    gid: u32,
}

/// The in-memory filesystem. Safe to share across kernel request threads.
pub struct FileSystem {
    store: Arc<dyn BlockStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<Volume>,
}

impl FileSystem {
    /// RAM-backed filesystem with the default clock.
    #[must_use]
    pub fn new(config: &FsConfig) -> Self {
        Self::with_store(
            Arc::new(HeapStore::new(config.capacity_bytes)),
            Arc::new(SystemClock::new()),
            config,
        )
    }

    /// Build over an explicit store and clock.
    pub fn with_store(
        store: Arc<dyn BlockStore>,
        clock: Arc<dyn Clock>,
        config: &FsConfig,
    ) -> Self {
        let now = clock.now();
        let mut inodes = InodeTable::new();
        inodes.insert(Inode::new_directory(
            InodeNumber::ROOT,
            S_IFDIR | (config.root_mode & 0o7777),
            config.root_uid,
            config.root_gid,
            InodeNumber::ROOT,
            now,
        ));
        Self {
            store,
            clock,
            state: Mutex::new(Volume {
                inodes,
                handles: HandleTable::new(),
                destroyed: false,
            }),
        }
    }

    // ── Shared validation helpers ───────────────────────────────────────

    /// Require `parent` to be a directory the caller may act in.
    fn dir_gate(
        vol: &Volume,
        parent: InodeNumber,
        cred: Credentials,
        mask: u32,
    ) -> Result<ParentGate> {
        let inode = vol.inodes.get(parent)?;
        inode.dir()?;
        check_access(inode.mode, inode.uid, inode.gid, cred, mask)?;
        Ok(ParentGate {
            mode: inode.mode,
            uid: inode.uid,
            gid: inode.gid,
        })
    }

    /// Validation shared by every entry-creating operation.
    fn prepare_new_entry(
        vol: &Volume,
        parent: InodeNumber,
        name: &[u8],
        cred: Credentials,
    ) -> Result<ParentGate> {
        if is_dot_name(name) {
            return Err(FsError::Exists);
        }
        validate_name(name)?;
        let gate = Self::dir_gate(vol, parent, cred, MAY_WRITE | MAY_EXEC)?;
        if vol.inodes.get(parent)?.dir()?.get(name).is_some() {
            return Err(FsError::Exists);
        }
        Ok(gate)
    }

    /// Group of a new child: inherited from a setgid parent, else the caller's.
    fn child_gid(gate: &ParentGate, cred: Credentials) -> u32 {
        if gate.mode & S_ISGID != 0 {
            gate.gid
        } else {
            cred.gid
        }
    }

    fn not_found(name: &[u8]) -> FsError {
        FsError::NotFound(String::from_utf8_lossy(name).into_owned())
    }

    /// Drop what nothing references any more.
    ///
    /// Data goes as soon as the inode has no name and no open handle; the
    /// table entry survives as a metadata stub while the kernel still holds
    /// lookups, and goes when `krefs` reaches zero. The root is never reaped.
    fn reap_if_unreferenced(&self, vol: &mut Volume, ino: InodeNumber) {
        if ino == InodeNumber::ROOT {
            return;
        }
        let Some(inode) = vol.inodes.peek_mut(ino) else {
            return;
        };
        if inode.nlink > 0 || inode.open_count > 0 {
            return;
        }
        if let InodeKind::Regular(map) = &mut inode.kind {
            map.clear(&*self.store);
        }
        if inode.krefs == 0 {
            vol.inodes.remove(ino);
        }
    }

    fn open_mode(flags: i32) -> Result<(bool, bool)> {
        match flags & libc::O_ACCMODE {
            libc::O_RDONLY => Ok((true, false)),
            libc::O_WRONLY => Ok((false, true)),
            libc::O_RDWR => Ok((true, true)),
            _ => Err(FsError::InvalidArgument("bad open access mode".into())),
        }
    }

    // ── Name resolution ─────────────────────────────────────────────────

    /// Resolve `name` under `parent`, bump the result's kernel reference,
    /// and return its attributes.
    pub fn lookup(&self, parent: InodeNumber, name: &OsStr, cred: Credentials) -> Result<InodeAttr> {
        let mut vol = self.state.lock();
        vol.ensure_live()?;
        let name = name.as_bytes();
        let target = {
            let inode = vol.inodes.get(parent)?;
            let dir = inode.dir()?;
            check_access(inode.mode, inode.uid, inode.gid, cred, MAY_EXEC)?;
            if name == b"." {
                parent
            } else if name == b".." {
                dir.parent()
            } else {
                validate_name(name)?;
                dir.get(name).ok_or_else(|| Self::not_found(name))?
            }
        };
        let inode = vol.inodes.get_mut(target)?;
        inode.krefs += 1;
        Ok(inode.attr())
    }

    /// Drop `nlookup` kernel references from `ino`.
    pub fn forget(&self, ino: InodeNumber, nlookup: u64) {
        let mut vol = self.state.lock();
        if vol.destroyed {
            return;
        }
        if let Some(inode) = vol.inodes.peek_mut(ino) {
            inode.krefs = inode.krefs.saturating_sub(nlookup);
        }
        self.reap_if_unreferenced(&mut vol, ino);
    }

    pub fn getattr(&self, ino: InodeNumber) -> Result<InodeAttr> {
        let vol = self.state.lock();
        vol.ensure_live()?;
        Ok(vol.inodes.get(ino)?.attr())
    }

    pub fn readlink(&self, ino: InodeNumber) -> Result<Vec<u8>> {
        let vol = self.state.lock();
        vol.ensure_live()?;
        match &vol.inodes.get(ino)?.kind {
            InodeKind::Symlink(target) => Ok(target.clone()),
            _ => Err(FsError::InvalidArgument("not a symlink".into())),
        }
    }

    // ── Entry creation ──────────────────────────────────────────────────

    /// Create a non-directory node. Device/FIFO/socket modes are accepted as
    /// metadata only.
    pub fn mknod(
        &self,
        parent: InodeNumber,
        name: &OsStr,
        mode: u32,
        rdev: u32,
        cred: Credentials,
    ) -> Result<InodeAttr> {
        let mut vol = self.state.lock();
        vol.ensure_live()?;
        let name = name.as_bytes();
        if mode_is_dir(mode) || mode_is_symlink(mode) {
            return Err(FsError::InvalidArgument(
                "mknod cannot create directories or symlinks".into(),
            ));
        }
        let gate = Self::prepare_new_entry(&vol, parent, name, cred)?;
        let now = self.clock.now();
        let ino = vol.inodes.allocate_ino();
        let gid = Self::child_gid(&gate, cred);
        vol.inodes
            .insert(Inode::new_regular(ino, mode, cred.uid, gid, rdev, now));
        let parent_inode = vol.inodes.get_mut(parent)?;
        parent_inode.dir_mut()?.insert(name.to_vec(), ino)?;
        parent_inode.mtime = now;
        parent_inode.ctime = now;
        let child = vol.inodes.get_mut(ino)?;
        child.krefs += 1;
        debug!(%parent, %ino, "mknod");
        Ok(child.attr())
    }

    pub fn mkdir(
        &self,
        parent: InodeNumber,
        name: &OsStr,
        mode: u32,
        cred: Credentials,
    ) -> Result<InodeAttr> {
        let mut vol = self.state.lock();
        vol.ensure_live()?;
        let name = name.as_bytes();
        let gate = Self::prepare_new_entry(&vol, parent, name, cred)?;
        let now = self.clock.now();
        let ino = vol.inodes.allocate_ino();
        let mut child_mode = S_IFDIR | (mode & 0o7777);
        if gate.mode & S_ISGID != 0 {
            child_mode |= S_ISGID;
        }
        let gid = Self::child_gid(&gate, cred);
        vol.inodes
            .insert(Inode::new_directory(ino, child_mode, cred.uid, gid, parent, now));
        let parent_inode = vol.inodes.get_mut(parent)?;
        parent_inode.dir_mut()?.insert(name.to_vec(), ino)?;
        parent_inode.nlink += 1;
        parent_inode.mtime = now;
        parent_inode.ctime = now;
        let child = vol.inodes.get_mut(ino)?;
        child.krefs += 1;
        debug!(%parent, %ino, "mkdir");
        Ok(child.attr())
    }

    pub fn symlink(
        &self,
        target: &OsStr,
        parent: InodeNumber,
        name: &OsStr,
        cred: Credentials,
    ) -> Result<InodeAttr> {
        let mut vol = self.state.lock();
        vol.ensure_live()?;
        let name = name.as_bytes();
        let gate = Self::prepare_new_entry(&vol, parent, name, cred)?;
        let now = self.clock.now();
        let ino = vol.inodes.allocate_ino();
        let gid = Self::child_gid(&gate, cred);
        vol.inodes.insert(Inode::new_symlink(
            ino,
            target.as_bytes().to_vec(),
            cred.uid,
            gid,
            now,
        ));
        let parent_inode = vol.inodes.get_mut(parent)?;
        parent_inode.dir_mut()?.insert(name.to_vec(), ino)?;
        parent_inode.mtime = now;
        parent_inode.ctime = now;
        let child = vol.inodes.get_mut(ino)?;
        child.krefs += 1;
        debug!(%parent, %ino, "symlink");
        Ok(child.attr())
    }

    /// Create a regular file and open it in one step.
    pub fn create(
        &self,
        parent: InodeNumber,
        name: &OsStr,
        mode: u32,
        flags: i32,
        cred: Credentials,
    ) -> Result<(InodeAttr, HandleId)> {
        let mut vol = self.state.lock();
        vol.ensure_live()?;
        let name = name.as_bytes();
        let (read, write) = Self::open_mode(flags)?;
        let append = flags & libc::O_APPEND != 0;
        let gate = Self::prepare_new_entry(&vol, parent, name, cred)?;
        let now = self.clock.now();
        let ino = vol.inodes.allocate_ino();
        let gid = Self::child_gid(&gate, cred);
        vol.inodes
            .insert(Inode::new_regular(ino, mode & 0o7777, cred.uid, gid, 0, now));
        let parent_inode = vol.inodes.get_mut(parent)?;
        parent_inode.dir_mut()?.insert(name.to_vec(), ino)?;
        parent_inode.mtime = now;
        parent_inode.ctime = now;
        let child = vol.inodes.get_mut(ino)?;
        child.krefs += 1;
        child.open_count += 1;
        let attr = child.attr();
        let handle = vol.handles.insert(FileHandle {
            ino,
            read,
            write,
            append,
        });
        debug!(%parent, %ino, "create");
        Ok((attr, handle))
    }

    pub fn link(
        &self,
        ino: InodeNumber,
        newparent: InodeNumber,
        newname: &OsStr,
        cred: Credentials,
    ) -> Result<InodeAttr> {
        let mut vol = self.state.lock();
        vol.ensure_live()?;
        let name = newname.as_bytes();
        {
            let target = vol.inodes.get(ino)?;
            if target.is_directory() {
                return Err(FsError::NotPermitted);
            }
        }
        Self::prepare_new_entry(&vol, newparent, name, cred)?;
        let now = self.clock.now();
        let parent_inode = vol.inodes.get_mut(newparent)?;
        parent_inode.dir_mut()?.insert(name.to_vec(), ino)?;
        parent_inode.mtime = now;
        parent_inode.ctime = now;
        let target = vol.inodes.get_mut(ino)?;
        target.nlink += 1;
        target.ctime = now;
        target.krefs += 1;
        debug!(%newparent, %ino, "link");
        Ok(target.attr())
    }

    // ── Entry removal ───────────────────────────────────────────────────

    pub fn unlink(&self, parent: InodeNumber, name: &OsStr, cred: Credentials) -> Result<()> {
        let mut vol = self.state.lock();
        vol.ensure_live()?;
        let name = name.as_bytes();
        if is_dot_name(name) {
            return Err(FsError::InvalidArgument("cannot unlink . or ..".into()));
        }
        validate_name(name)?;
        let gate = Self::dir_gate(&vol, parent, cred, MAY_WRITE | MAY_EXEC)?;
        let child_ino = vol
            .inodes
            .get(parent)?
            .dir()?
            .get(name)
            .ok_or_else(|| Self::not_found(name))?;
        {
            let child = vol.inodes.get(child_ino)?;
            if child.is_directory() {
                return Err(FsError::IsDirectory);
            }
            check_sticky(gate.mode, gate.uid, child.uid, cred)?;
        }
        let now = self.clock.now();
        let parent_inode = vol.inodes.get_mut(parent)?;
        parent_inode.dir_mut()?.remove(name);
        parent_inode.mtime = now;
        parent_inode.ctime = now;
        let child = vol.inodes.get_mut(child_ino)?;
        child.nlink = child.nlink.saturating_sub(1);
        child.ctime = now;
        self.reap_if_unreferenced(&mut vol, child_ino);
        debug!(%parent, ino = %child_ino, "unlink");
        Ok(())
    }

    pub fn rmdir(&self, parent: InodeNumber, name: &OsStr, cred: Credentials) -> Result<()> {
        let mut vol = self.state.lock();
        vol.ensure_live()?;
        let name = name.as_bytes();
        if is_dot_name(name) {
            return Err(FsError::InvalidArgument("cannot rmdir . or ..".into()));
        }
        validate_name(name)?;
        let gate = Self::dir_gate(&vol, parent, cred, MAY_WRITE | MAY_EXEC)?;
        let child_ino = vol
            .inodes
            .get(parent)?
            .dir()?
            .get(name)
            .ok_or_else(|| Self::not_found(name))?;
        {
            let child = vol.inodes.get(child_ino)?;
            let dir = child.dir()?;
            if !dir.is_empty() {
                return Err(FsError::NotEmpty);
            }
            check_sticky(gate.mode, gate.uid, child.uid, cred)?;
        }
        let now = self.clock.now();
        let parent_inode = vol.inodes.get_mut(parent)?;
        parent_inode.dir_mut()?.remove(name);
        parent_inode.nlink -= 1;
        parent_inode.mtime = now;
        parent_inode.ctime = now;
        let child = vol.inodes.get_mut(child_ino)?;
        child.nlink = 0;
        child.ctime = now;
        self.reap_if_unreferenced(&mut vol, child_ino);
        debug!(%parent, ino = %child_ino, "rmdir");
        Ok(())
    }

    pub fn rename(
        &self,
        parent: InodeNumber,
        name: &OsStr,
        newparent: InodeNumber,
        newname: &OsStr,
        cred: Credentials,
    ) -> Result<()> {
        let mut vol = self.state.lock();
        vol.ensure_live()?;
        let name = name.as_bytes();
        let newname = newname.as_bytes();
        if is_dot_name(name) || is_dot_name(newname) {
            return Err(FsError::InvalidArgument("cannot rename . or ..".into()));
        }
        validate_name(name)?;
        validate_name(newname)?;

        let src_gate = Self::dir_gate(&vol, parent, cred, MAY_WRITE | MAY_EXEC)?;
        let dst_gate = Self::dir_gate(&vol, newparent, cred, MAY_WRITE | MAY_EXEC)?;
        let src_ino = vol
            .inodes
            .get(parent)?
            .dir()?
            .get(name)
            .ok_or_else(|| Self::not_found(name))?;
        let (src_is_dir, src_uid) = {
            let src = vol.inodes.get(src_ino)?;
            (src.is_directory(), src.uid)
        };
        check_sticky(src_gate.mode, src_gate.uid, src_uid, cred)?;

        let dst_ino = vol.inodes.get(newparent)?.dir()?.get(newname);
        if dst_ino == Some(src_ino) {
            // Both names already refer to the same inode.
            return Ok(());
        }
        if let Some(dst) = dst_ino {
            let dst_inode = vol.inodes.get(dst)?;
            check_sticky(dst_gate.mode, dst_gate.uid, dst_inode.uid, cred)?;
            if src_is_dir {
                if !dst_inode.dir()?.is_empty() {
                    return Err(FsError::NotEmpty);
                }
            } else if dst_inode.is_directory() {
                return Err(FsError::IsDirectory);
            }
        }
        if src_is_dir {
            // A directory must not become its own descendant.
            let mut cursor = newparent;
            while cursor != InodeNumber::ROOT {
                if cursor == src_ino {
                    return Err(FsError::InvalidArgument(
                        "destination inside renamed directory".into(),
                    ));
                }
                cursor = vol.inodes.get(cursor)?.dir()?.parent();
            }
        }

        let now = self.clock.now();
        vol.inodes.get_mut(parent)?.dir_mut()?.remove(name);
        if let Some(dst) = dst_ino {
            vol.inodes.get_mut(newparent)?.dir_mut()?.remove(newname);
            let dst_is_dir = {
                let dst_inode = vol.inodes.get_mut(dst)?;
                let is_dir = dst_inode.is_directory();
                if is_dir {
                    dst_inode.nlink = 0;
                } else {
                    dst_inode.nlink = dst_inode.nlink.saturating_sub(1);
                }
                dst_inode.ctime = now;
                is_dir
            };
            if dst_is_dir {
                vol.inodes.get_mut(newparent)?.nlink -= 1;
            }
            self.reap_if_unreferenced(&mut vol, dst);
        }
        vol.inodes
            .get_mut(newparent)?
            .dir_mut()?
            .insert(newname.to_vec(), src_ino)?;
        if src_is_dir {
            if parent != newparent {
                vol.inodes.get_mut(parent)?.nlink -= 1;
                vol.inodes.get_mut(newparent)?.nlink += 1;
            }
            vol.inodes.get_mut(src_ino)?.dir_mut()?.set_parent(newparent);
        }
        {
            let p = vol.inodes.get_mut(parent)?;
            p.mtime = now;
            p.ctime = now;
        }
        if newparent != parent {
            let p = vol.inodes.get_mut(newparent)?;
            p.mtime = now;
            p.ctime = now;
        }
        vol.inodes.get_mut(src_ino)?.ctime = now;
        debug!(%parent, %newparent, ino = %src_ino, "rename");
        Ok(())
    }

    // ── File I/O ────────────────────────────────────────────────────────

    pub fn open(&self, ino: InodeNumber, flags: i32, cred: Credentials) -> Result<HandleId> {
        let mut vol = self.state.lock();
        vol.ensure_live()?;
        let (read, write) = Self::open_mode(flags)?;
        let truncate = flags & libc::O_TRUNC != 0;
        let append = flags & libc::O_APPEND != 0;
        {
            let inode = vol.inodes.get(ino)?;
            if inode.is_directory() {
                return Err(FsError::IsDirectory);
            }
            let mut mask = 0;
            if read {
                mask |= MAY_READ;
            }
            if write || truncate {
                mask |= MAY_WRITE;
            }
            check_access(inode.mode, inode.uid, inode.gid, cred, mask)?;
        }
        let now = self.clock.now();
        let inode = vol.inodes.get_mut(ino)?;
        if truncate && inode.is_regular() {
            inode.data_mut()?.truncate(&*self.store, 0);
            inode.mtime = now;
            inode.ctime = now;
        }
        inode.open_count += 1;
        Ok(vol.handles.insert(FileHandle {
            ino,
            read,
            write,
            append,
        }))
    }

    /// Read through an open handle; updates atime.
    pub fn read(&self, fh: HandleId, offset: u64, size: u32) -> Result<Vec<u8>> {
        let mut vol = self.state.lock();
        vol.ensure_live()?;
        let handle = vol.handles.get(fh)?;
        if !handle.read {
            return Err(FsError::AccessDenied);
        }
        let now = self.clock.now();
        let inode = vol.inodes.get_mut(handle.ino)?;
        let data = inode.data()?.read(&*self.store, offset, size);
        inode.atime = now;
        Ok(data)
    }

    /// Write through an open handle; updates mtime and ctime.
    ///
    /// For `O_APPEND` handles the offset is replaced by the current size
    /// here, under the same lock as the write, so concurrent appenders
    /// never overwrite each other.
    pub fn write(&self, fh: HandleId, offset: u64, data: &[u8]) -> Result<u32> {
        let mut vol = self.state.lock();
        vol.ensure_live()?;
        let handle = vol.handles.get(fh)?;
        if !handle.write {
            return Err(FsError::AccessDenied);
        }
        let now = self.clock.now();
        let inode = vol.inodes.get_mut(handle.ino)?;
        let offset = if handle.append {
            inode.data()?.size()
        } else {
            offset
        };
        let written = inode.data_mut()?.write(&*self.store, offset, data)?;
        inode.mtime = now;
        inode.ctime = now;
        u32::try_from(written)
            .map_err(|_| FsError::InvalidArgument("write larger than 4 GiB".into()))
    }

    /// Close a handle. The last close of an unlinked file frees its data.
    pub fn release(&self, fh: HandleId) -> Result<()> {
        let mut vol = self.state.lock();
        if vol.destroyed {
            return Ok(());
        }
        let handle = vol.handles.remove(fh)?;
        if let Some(inode) = vol.inodes.peek_mut(handle.ino) {
            inode.open_count = inode.open_count.saturating_sub(1);
        }
        self.reap_if_unreferenced(&mut vol, handle.ino);
        Ok(())
    }

    // ── Attributes ──────────────────────────────────────────────────────

    pub fn setattr(
        &self,
        ino: InodeNumber,
        fh: Option<HandleId>,
        set: SetAttr,
        cred: Credentials,
    ) -> Result<InodeAttr> {
        let mut vol = self.state.lock();
        vol.ensure_live()?;
        let handle = match fh {
            Some(id) => {
                let handle = vol.handles.get(id)?;
                if handle.ino != ino {
                    return Err(FsError::BadRequest("handle does not match inode".into()));
                }
                Some(handle)
            }
            None => None,
        };
        let (mode, uid, gid, is_regular, is_directory) = {
            let inode = vol.inodes.get(ino)?;
            (
                inode.mode,
                inode.uid,
                inode.gid,
                inode.is_regular(),
                inode.is_directory(),
            )
        };
        let owner = cred.is_root() || cred.uid == uid;

        if set.mode.is_some() && !owner {
            return Err(FsError::NotPermitted);
        }
        if let Some(new_uid) = set.uid {
            // Handing a file to another user is root's call alone.
            if new_uid != uid && !cred.is_root() {
                return Err(FsError::NotPermitted);
            }
            if !owner {
                return Err(FsError::NotPermitted);
            }
        }
        if set.gid.is_some() && !owner {
            return Err(FsError::NotPermitted);
        }
        if set.size.is_some() {
            if is_directory {
                return Err(FsError::IsDirectory);
            }
            if !is_regular {
                return Err(FsError::InvalidArgument("cannot truncate this node".into()));
            }
            match handle {
                Some(h) if h.write => {}
                Some(_) => return Err(FsError::AccessDenied),
                None => check_access(mode, uid, gid, cred, MAY_WRITE)?,
            }
        }
        if set.atime.is_some() || set.mtime.is_some() {
            let explicit = matches!(set.atime, Some(TimeUpdate::At(_)))
                || matches!(set.mtime, Some(TimeUpdate::At(_)));
            if explicit {
                if !owner {
                    return Err(FsError::NotPermitted);
                }
            } else if !owner {
                check_access(mode, uid, gid, cred, MAY_WRITE)?;
            }
        }

        let now = self.clock.now();
        let inode = vol.inodes.get_mut(ino)?;
        if let Some(new_mode) = set.mode {
            inode.mode = (inode.mode & S_IFMT) | (new_mode & 0o7777);
        }
        if let Some(new_uid) = set.uid {
            inode.uid = new_uid;
        }
        if let Some(new_gid) = set.gid {
            inode.gid = new_gid;
        }
        if let Some(size) = set.size {
            inode.data_mut()?.truncate(&*self.store, size);
            inode.mtime = now;
        }
        match set.atime {
            Some(TimeUpdate::Now) => inode.atime = now,
            Some(TimeUpdate::At(t)) => inode.atime = t,
            None => {}
        }
        match set.mtime {
            Some(TimeUpdate::Now) => inode.mtime = now,
            Some(TimeUpdate::At(t)) => inode.mtime = t,
            None => {}
        }
        inode.ctime = now;
        Ok(inode.attr())
    }

    pub fn access(&self, ino: InodeNumber, mask: u32, cred: Credentials) -> Result<()> {
        let vol = self.state.lock();
        vol.ensure_live()?;
        let inode = vol.inodes.get(ino)?;
        check_access(inode.mode, inode.uid, inode.gid, cred, mask & 0o7)
    }

    // ── Directories ─────────────────────────────────────────────────────

    pub fn opendir(&self, ino: InodeNumber, _flags: i32, cred: Credentials) -> Result<()> {
        let vol = self.state.lock();
        vol.ensure_live()?;
        let inode = vol.inodes.get(ino)?;
        inode.dir()?;
        check_access(inode.mode, inode.uid, inode.gid, cred, MAY_READ)
    }

    pub fn releasedir(&self, ino: InodeNumber) -> Result<()> {
        let vol = self.state.lock();
        if vol.destroyed {
            return Ok(());
        }
        vol.inodes.get(ino).map(|_| ())
    }

    /// List a directory from `offset` on.
    ///
    /// `.` and `..` come first, then entries in stored (byte-lexicographic)
    /// order; the same directory state always produces the same sequence,
    /// so a resume offset from an earlier call stays valid.
    pub fn readdir(&self, ino: InodeNumber, offset: u64) -> Result<Vec<DirEntry>> {
        let mut vol = self.state.lock();
        vol.ensure_live()?;
        let listing = {
            let inode = vol.inodes.get(ino)?;
            let dir = inode.dir()?;
            let mut all = Vec::with_capacity(dir.len() + 2);
            all.push(DirEntry {
                ino,
                offset: 1,
                kind: FileKind::Directory,
                name: b".".to_vec(),
            });
            all.push(DirEntry {
                ino: dir.parent(),
                offset: 2,
                kind: FileKind::Directory,
                name: b"..".to_vec(),
            });
            for (index, (name, child)) in dir.iter().enumerate() {
                let kind = vol
                    .inodes
                    .get(child)
                    .map(|c| FileKind::from_mode(c.mode))
                    .unwrap_or(FileKind::RegularFile);
                all.push(DirEntry {
                    ino: child,
                    offset: (index + 3) as u64,
                    kind,
                    name: name.to_vec(),
                });
            }
            all
        };
        let now = self.clock.now();
        vol.inodes.get_mut(ino)?.atime = now;
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        Ok(listing.into_iter().skip(skip).collect())
    }

    // ── Filesystem-level ────────────────────────────────────────────────

    pub fn statfs(&self) -> Result<StatVfs> {
        let vol = self.state.lock();
        vol.ensure_live()?;
        let block = u64::from(BLOCK_SIZE);
        let blocks = self.store.total_bytes() / block;
        let used = self.store.used_bytes() / block;
        let bfree = blocks.saturating_sub(used);
        Ok(StatVfs {
            blocks,
            bfree,
            bavail: bfree,
            files: MAX_INODES,
            ffree: MAX_INODES.saturating_sub(vol.inodes.len() as u64),
            bsize: BLOCK_SIZE,
            namelen: u32::try_from(NAME_MAX).unwrap_or(255),
            frsize: BLOCK_SIZE,
        })
    }

    /// Tear the volume down: release every handle, free every extent, and
    /// refuse all further requests.
    pub fn destroy(&self) {
        let mut vol = self.state.lock();
        if vol.destroyed {
            return;
        }
        vol.destroyed = true;
        for _ in vol.handles.drain() {}
        for mut inode in vol.inodes.drain() {
            if let InodeKind::Regular(map) = &mut inode.kind {
                map.clear(&*self.store);
            }
        }
        debug!("destroy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fs() -> FileSystem {
        FileSystem::new(&FsConfig {
            capacity_bytes: 64 << 20,
            ..FsConfig::default()
        })
    }

    const USER: Credentials = Credentials { uid: 1000, gid: 1000 };

    #[test]
    fn root_attributes() {
        let fs = fs();
        let attr = fs.getattr(InodeNumber::ROOT).unwrap();
        assert_eq!(attr.ino, InodeNumber::ROOT);
        assert_eq!(attr.kind, FileKind::Directory);
        assert_eq!(attr.nlink, 2);
        assert_eq!(attr.perm, 0o1777);
    }

    #[test]
    fn root_dot_dot_is_root() {
        let fs = fs();
        let attr = fs
            .lookup(InodeNumber::ROOT, OsStr::new(".."), USER)
            .unwrap();
        assert_eq!(attr.ino, InodeNumber::ROOT);
    }

    #[test]
    fn lookup_missing_name_is_enoent() {
        let fs = fs();
        let err = fs
            .lookup(InodeNumber::ROOT, OsStr::new("ghost"), USER)
            .unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
    }

    #[test]
    fn statfs_reports_capacity() {
        let fs = fs();
        let st = fs.statfs().unwrap();
        assert_eq!(st.bsize, 4096);
        assert_eq!(st.blocks, (64 << 20) / 4096);
        assert_eq!(st.bfree, st.blocks);
        assert_eq!(st.ffree, st.files - 1); // root only
    }

    #[test]
    fn destroy_rejects_further_requests() {
        let fs = fs();
        fs.destroy();
        let err = fs.getattr(InodeNumber::ROOT).unwrap_err();
        assert_eq!(err.to_errno(), libc::EFAULT);
        // Idempotent.
        fs.destroy();
    }

    #[test]
    fn unknown_inode_is_a_protocol_violation() {
        let fs = fs();
        let err = fs.getattr(InodeNumber(999)).unwrap_err();
        assert_eq!(err.to_errno(), libc::EFAULT);
    }
}
