#![forbid(unsafe_code)]
//! End-to-end semantics of the in-memory filesystem, driven through the
//! request facade with explicit caller credentials.
//!
//! Covers the lifecycle corners that make this filesystem interesting:
//! unlink-while-open, kernel forget bookkeeping, rename-over, sticky-bit
//! deletion, directory link counts, and sparse file accounting.

use sfs_core::{
    Credentials, FileSystem, FsConfig, InodeNumber, SetAttr, TimeUpdate,
};
use sfs_error::FsError;
use std::ffi::OsStr;

const ALICE: Credentials = Credentials { uid: 1000, gid: 1000 };
const BOB: Credentials = Credentials { uid: 2001, gid: 2001 };
const ROOT: Credentials = Credentials { uid: 0, gid: 0 };

const CAP_BYTES: u64 = 64 << 20;

fn fs() -> FileSystem {
    FileSystem::new(&FsConfig {
        capacity_bytes: CAP_BYTES,
        ..FsConfig::default()
    })
}

fn n(name: &str) -> &OsStr {
    OsStr::new(name)
}

// ── Write/read round trips ──────────────────────────────────────────────

#[test]
fn write_then_read_round_trip() {
    let fs = fs();
    let (_, fh) = fs
        .create(InodeNumber::ROOT, n("f"), 0o644, libc::O_RDWR, ALICE)
        .unwrap();

    let payloads: [(&[u8], u64); 4] = [
        (b"hello", 0),
        (b"x", 4095),
        (&[0xAA; 10_000], 4096),
        (b"tail", 3 * 4096 + 17),
    ];
    for (data, offset) in payloads {
        fs.write(fh, offset, data).unwrap();
        assert_eq!(
            fs.read(fh, offset, u32::try_from(data.len()).unwrap()).unwrap(),
            data,
            "offset {offset}"
        );
    }
}

#[test]
fn sparse_file_reads_zeros_and_counts_one_block() {
    let fs = fs();
    let (_, fh) = fs
        .create(InodeNumber::ROOT, n("sparse"), 0o644, libc::O_RDWR, ALICE)
        .unwrap();
    let offset = 1024 * 1024;
    fs.write(fh, offset, b"!").unwrap();

    let attr = fs.getattr(fs.lookup(InodeNumber::ROOT, n("sparse"), ALICE).unwrap().ino).unwrap();
    assert_eq!(attr.size, offset + 1);
    // One tail block, not 257 blocks' worth.
    assert_eq!(attr.blocks, 8);

    let head = fs.read(fh, 0, u32::try_from(offset).unwrap()).unwrap();
    assert_eq!(head.len() as u64, offset);
    assert!(head.iter().all(|&b| b == 0));
}

#[test]
fn append_handles_write_at_current_end() {
    let fs = fs();
    let (attr, first) = fs
        .create(
            InodeNumber::ROOT,
            n("log"),
            0o644,
            libc::O_WRONLY | libc::O_APPEND,
            ALICE,
        )
        .unwrap();
    let second = fs
        .open(attr.ino, libc::O_WRONLY | libc::O_APPEND, ALICE)
        .unwrap();

    // Offsets passed by the callers are ignored for append handles.
    fs.write(first, 0, b"one").unwrap();
    fs.write(second, 0, b"two").unwrap();
    fs.write(first, 99, b"three").unwrap();

    let reader = fs.open(attr.ino, libc::O_RDONLY, ALICE).unwrap();
    assert_eq!(fs.read(reader, 0, 64).unwrap(), b"onetwothree");
}

// ── Unlink while open ───────────────────────────────────────────────────

#[test]
fn unlinked_open_file_stays_readable_until_release() {
    let fs = fs();
    let (attr, fh) = fs
        .create(InodeNumber::ROOT, n("doomed"), 0o644, libc::O_RDWR, ALICE)
        .unwrap();
    fs.unlink(InodeNumber::ROOT, n("doomed"), ALICE).unwrap();

    // The name is gone but the handle still works.
    assert!(matches!(
        fs.lookup(InodeNumber::ROOT, n("doomed"), ALICE),
        Err(FsError::NotFound(_))
    ));
    fs.write(fh, 0, b"still alive").unwrap();
    assert_eq!(fs.read(fh, 0, 64).unwrap(), b"still alive");

    let free_before_close = fs.statfs().unwrap().bfree;
    fs.release(fh).unwrap();

    // Last close frees the data even though the kernel still holds the
    // lookup reference from create.
    let st = fs.statfs().unwrap();
    assert!(st.bfree > free_before_close);
    assert_eq!(st.bfree, st.blocks);

    // The metadata stub remains addressable until forgotten.
    assert!(fs.getattr(attr.ino).is_ok());
    fs.forget(attr.ino, 1);
    assert!(matches!(fs.getattr(attr.ino), Err(FsError::BadRequest(_))));
}

#[test]
fn forget_counts_down_lookups() {
    let fs = fs();
    let (attr, fh) = fs
        .create(InodeNumber::ROOT, n("f"), 0o644, libc::O_RDWR, ALICE)
        .unwrap();
    fs.release(fh).unwrap();

    // N extra lookups on top of the reference returned by create.
    for _ in 0..5 {
        fs.lookup(InodeNumber::ROOT, n("f"), ALICE).unwrap();
    }
    fs.unlink(InodeNumber::ROOT, n("f"), ALICE).unwrap();

    // A single batched forget of all but one reference keeps the stub.
    fs.forget(attr.ino, 5);
    assert!(fs.getattr(attr.ino).is_ok());

    // Dropping the final reference makes the inode disappear.
    fs.forget(attr.ino, 1);
    assert!(matches!(fs.getattr(attr.ino), Err(FsError::BadRequest(_))));
}

// ── Directories ─────────────────────────────────────────────────────────

#[test]
fn mkdir_maintains_link_counts() {
    let fs = fs();
    let d = fs.mkdir(InodeNumber::ROOT, n("d"), 0o755, ALICE).unwrap();
    assert_eq!(d.nlink, 2);
    assert_eq!(d.uid, 1000);
    assert_eq!(d.gid, 1000);
    assert_eq!(fs.getattr(InodeNumber::ROOT).unwrap().nlink, 3);

    let e = fs.mkdir(d.ino, n("e"), 0o755, ALICE).unwrap();
    assert_eq!(fs.getattr(d.ino).unwrap().nlink, 3);

    fs.rmdir(d.ino, n("e"), ALICE).unwrap();
    assert_eq!(fs.getattr(d.ino).unwrap().nlink, 2);
    // The removed directory lingers as a stub until the kernel forgets it.
    assert!(fs.getattr(e.ino).is_ok());
    fs.forget(e.ino, 1);
    assert!(matches!(fs.getattr(e.ino), Err(FsError::BadRequest(_))));

    fs.rmdir(InodeNumber::ROOT, n("d"), ALICE).unwrap();
    assert_eq!(fs.getattr(InodeNumber::ROOT).unwrap().nlink, 2);
}

#[test]
fn rmdir_refuses_non_empty_directories() {
    let fs = fs();
    let d = fs.mkdir(InodeNumber::ROOT, n("d"), 0o755, ALICE).unwrap();
    let (_, fh) = fs.create(d.ino, n("f2"), 0o644, libc::O_WRONLY, ALICE).unwrap();
    fs.release(fh).unwrap();

    assert!(matches!(
        fs.rmdir(InodeNumber::ROOT, n("d"), ALICE),
        Err(FsError::NotEmpty)
    ));
    fs.unlink(d.ino, n("f2"), ALICE).unwrap();
    fs.rmdir(InodeNumber::ROOT, n("d"), ALICE).unwrap();
}

#[test]
fn readdir_is_deterministic_and_resumable() {
    let fs = fs();
    let d = fs.mkdir(InodeNumber::ROOT, n("d"), 0o755, ALICE).unwrap();
    for name in ["zeta", "alpha", "mid"] {
        let (_, fh) = fs.create(d.ino, n(name), 0o644, libc::O_WRONLY, ALICE).unwrap();
        fs.release(fh).unwrap();
    }

    let full = fs.readdir(d.ino, 0).unwrap();
    let names: Vec<&[u8]> = full.iter().map(|e| e.name.as_slice()).collect();
    assert_eq!(
        names,
        vec![&b"."[..], b"..", b"alpha", b"mid", b"zeta"]
    );
    assert_eq!(full[0].ino, d.ino);
    assert_eq!(full[1].ino, InodeNumber::ROOT);

    // Same state, same sequence.
    assert_eq!(fs.readdir(d.ino, 0).unwrap(), full);

    // Resuming from an entry's offset yields exactly the entries after it.
    let resumed = fs.readdir(d.ino, full[2].offset).unwrap();
    assert_eq!(resumed, full[3..].to_vec());
    assert!(fs.readdir(d.ino, full.last().unwrap().offset).unwrap().is_empty());
}

// ── Rename ──────────────────────────────────────────────────────────────

#[test]
fn rename_over_existing_file_replaces_atomically() {
    let fs = fs();
    let (a, fh_a) = fs.create(InodeNumber::ROOT, n("a"), 0o644, libc::O_WRONLY, ALICE).unwrap();
    let (b, fh_b) = fs.create(InodeNumber::ROOT, n("b"), 0o644, libc::O_WRONLY, ALICE).unwrap();
    fs.release(fh_a).unwrap();
    fs.release(fh_b).unwrap();

    assert_eq!(fs.lookup(InodeNumber::ROOT, n("b"), ALICE).unwrap().ino, b.ino);
    fs.rename(InodeNumber::ROOT, n("a"), InodeNumber::ROOT, n("b"), ALICE)
        .unwrap();

    // The destination name now resolves to the source inode; the old
    // destination is gone, never a dangling name.
    assert_eq!(fs.lookup(InodeNumber::ROOT, n("b"), ALICE).unwrap().ino, a.ino);
    assert!(matches!(
        fs.lookup(InodeNumber::ROOT, n("a"), ALICE),
        Err(FsError::NotFound(_))
    ));
}

#[test]
fn rename_to_same_inode_is_a_noop() {
    let fs = fs();
    let (f, fh) = fs.create(InodeNumber::ROOT, n("f"), 0o644, libc::O_WRONLY, ALICE).unwrap();
    fs.release(fh).unwrap();
    fs.link(f.ino, InodeNumber::ROOT, n("g"), ALICE).unwrap();

    fs.rename(InodeNumber::ROOT, n("f"), InodeNumber::ROOT, n("g"), ALICE)
        .unwrap();
    // POSIX: both names survive when they are hard links to the same inode.
    assert!(fs.lookup(InodeNumber::ROOT, n("f"), ALICE).is_ok());
    assert!(fs.lookup(InodeNumber::ROOT, n("g"), ALICE).is_ok());
    assert_eq!(fs.getattr(f.ino).unwrap().nlink, 2);
}

#[test]
fn rename_into_own_subtree_is_rejected() {
    let fs = fs();
    let a = fs.mkdir(InodeNumber::ROOT, n("a"), 0o755, ALICE).unwrap();
    let b = fs.mkdir(a.ino, n("b"), 0o755, ALICE).unwrap();

    let err = fs
        .rename(InodeNumber::ROOT, n("a"), b.ino, n("c"), ALICE)
        .unwrap_err();
    assert_eq!(err.to_errno(), libc::EINVAL);

    // Renaming within the same tree level still works.
    fs.rename(a.ino, n("b"), InodeNumber::ROOT, n("b2"), ALICE).unwrap();
    assert_eq!(fs.lookup(InodeNumber::ROOT, n("b2"), ALICE).unwrap().ino, b.ino);
}

#[test]
fn cross_directory_dir_rename_moves_link_counts_and_parent() {
    let fs = fs();
    let src = fs.mkdir(InodeNumber::ROOT, n("src"), 0o755, ALICE).unwrap();
    let dst = fs.mkdir(InodeNumber::ROOT, n("dst"), 0o755, ALICE).unwrap();
    let moved = fs.mkdir(src.ino, n("child"), 0o755, ALICE).unwrap();
    assert_eq!(fs.getattr(src.ino).unwrap().nlink, 3);

    fs.rename(src.ino, n("child"), dst.ino, n("child"), ALICE).unwrap();

    assert_eq!(fs.getattr(src.ino).unwrap().nlink, 2);
    assert_eq!(fs.getattr(dst.ino).unwrap().nlink, 3);
    // `..` of the moved directory follows the move.
    let listing = fs.readdir(moved.ino, 0).unwrap();
    assert_eq!(listing[1].ino, dst.ino);
}

#[test]
fn rename_dir_over_empty_dir_replaces_it() {
    let fs = fs();
    let a = fs.mkdir(InodeNumber::ROOT, n("a"), 0o755, ALICE).unwrap();
    let b = fs.mkdir(InodeNumber::ROOT, n("b"), 0o755, ALICE).unwrap();
    assert_eq!(fs.getattr(InodeNumber::ROOT).unwrap().nlink, 4);

    fs.rename(InodeNumber::ROOT, n("a"), InodeNumber::ROOT, n("b"), ALICE)
        .unwrap();
    assert_eq!(fs.lookup(InodeNumber::ROOT, n("b"), ALICE).unwrap().ino, a.ino);
    assert_eq!(fs.getattr(InodeNumber::ROOT).unwrap().nlink, 3);
    // The replaced directory was reaped once its kernel reference dropped.
    fs.forget(b.ino, 1);
    assert!(matches!(fs.getattr(b.ino), Err(FsError::BadRequest(_))));
}

#[test]
fn rename_dir_over_non_empty_dir_fails() {
    let fs = fs();
    let _a = fs.mkdir(InodeNumber::ROOT, n("a"), 0o755, ALICE).unwrap();
    let b = fs.mkdir(InodeNumber::ROOT, n("b"), 0o755, ALICE).unwrap();
    fs.mkdir(b.ino, n("inner"), 0o755, ALICE).unwrap();

    assert!(matches!(
        fs.rename(InodeNumber::ROOT, n("a"), InodeNumber::ROOT, n("b"), ALICE),
        Err(FsError::NotEmpty)
    ));
}

// ── Sticky bit ──────────────────────────────────────────────────────────

#[test]
fn sticky_directory_restricts_deletion_to_owners() {
    let fs = fs();
    // Root directory is 0o1777 — the /tmp setup.
    let (_, fh) = fs
        .create(InodeNumber::ROOT, n("mine"), 0o666, libc::O_WRONLY, ALICE)
        .unwrap();
    fs.release(fh).unwrap();

    let err = fs.unlink(InodeNumber::ROOT, n("mine"), BOB).unwrap_err();
    assert_eq!(err.to_errno(), libc::EPERM);

    // Rename-over is deletion too.
    let (_, fh) = fs
        .create(InodeNumber::ROOT, n("bobs"), 0o666, libc::O_WRONLY, BOB)
        .unwrap();
    fs.release(fh).unwrap();
    let err = fs
        .rename(InodeNumber::ROOT, n("bobs"), InodeNumber::ROOT, n("mine"), BOB)
        .unwrap_err();
    assert_eq!(err.to_errno(), libc::EPERM);

    fs.unlink(InodeNumber::ROOT, n("mine"), ALICE).unwrap();
    fs.unlink(InodeNumber::ROOT, n("bobs"), ROOT).unwrap();
}

#[test]
fn non_sticky_directory_allows_writable_deletes() {
    let fs = fs();
    let d = fs.mkdir(InodeNumber::ROOT, n("shared"), 0o777, ALICE).unwrap();
    let (_, fh) = fs.create(d.ino, n("f"), 0o644, libc::O_WRONLY, ALICE).unwrap();
    fs.release(fh).unwrap();
    // No sticky bit: write+exec on the parent is enough for anyone.
    fs.unlink(d.ino, n("f"), BOB).unwrap();
}

// ── Links and symlinks ──────────────────────────────────────────────────

#[test]
fn hard_link_shares_data_and_survives_unlink() {
    let fs = fs();
    let (f, fh) = fs
        .create(InodeNumber::ROOT, n("f"), 0o644, libc::O_RDWR, ALICE)
        .unwrap();
    fs.write(fh, 0, b"shared").unwrap();
    fs.release(fh).unwrap();

    let linked = fs.link(f.ino, InodeNumber::ROOT, n("f2"), ALICE).unwrap();
    assert_eq!(linked.ino, f.ino);
    assert_eq!(linked.nlink, 2);

    fs.unlink(InodeNumber::ROOT, n("f"), ALICE).unwrap();
    let attr = fs.lookup(InodeNumber::ROOT, n("f2"), ALICE).unwrap();
    assert_eq!(attr.nlink, 1);

    let fh = fs.open(attr.ino, libc::O_RDONLY, ALICE).unwrap();
    assert_eq!(fs.read(fh, 0, 16).unwrap(), b"shared");
    fs.release(fh).unwrap();
}

#[test]
fn hard_linking_directories_is_refused() {
    let fs = fs();
    let d = fs.mkdir(InodeNumber::ROOT, n("d"), 0o755, ALICE).unwrap();
    let err = fs.link(d.ino, InodeNumber::ROOT, n("d2"), ALICE).unwrap_err();
    assert_eq!(err.to_errno(), libc::EPERM);
}

#[test]
fn symlink_stores_target_verbatim() {
    let fs = fs();
    let s = fs
        .symlink(n("f"), InodeNumber::ROOT, n("s"), ALICE)
        .unwrap();
    assert_eq!(s.perm, 0o777);
    assert_eq!(s.size, 1);
    assert_eq!(fs.readlink(s.ino).unwrap(), b"f");

    let err = fs.readlink(InodeNumber::ROOT).unwrap_err();
    assert_eq!(err.to_errno(), libc::EINVAL);
}

// ── Attributes and permissions ──────────────────────────────────────────

#[test]
fn truncate_through_setattr() {
    let fs = fs();
    let (f, fh) = fs
        .create(InodeNumber::ROOT, n("f"), 0o644, libc::O_RDWR, ALICE)
        .unwrap();
    fs.write(fh, 0, b"hello").unwrap();

    let attr = fs.getattr(f.ino).unwrap();
    assert_eq!(attr.size, 5);
    assert_eq!(attr.blocks, 8);

    let set = SetAttr {
        size: Some(1),
        ..SetAttr::default()
    };
    let attr = fs.setattr(f.ino, Some(fh), set, ALICE).unwrap();
    assert_eq!(attr.size, 1);
    assert_eq!(fs.read(fh, 0, 5).unwrap(), b"h");
}

#[test]
fn chmod_chown_follow_ownership_rules() {
    let fs = fs();
    let (f, fh) = fs
        .create(InodeNumber::ROOT, n("f"), 0o644, libc::O_WRONLY, ALICE)
        .unwrap();
    fs.release(fh).unwrap();

    // Owner may chmod; an unrelated user may not.
    let chmod = SetAttr { mode: Some(0o600), ..SetAttr::default() };
    assert_eq!(fs.setattr(f.ino, None, chmod, ALICE).unwrap().perm, 0o600);
    assert_eq!(
        fs.setattr(f.ino, None, chmod, BOB).unwrap_err().to_errno(),
        libc::EPERM
    );

    // Giving the file away needs root.
    let chown = SetAttr { uid: Some(2001), ..SetAttr::default() };
    assert_eq!(
        fs.setattr(f.ino, None, chown, ALICE).unwrap_err().to_errno(),
        libc::EPERM
    );
    let attr = fs.setattr(f.ino, None, chown, ROOT).unwrap();
    assert_eq!(attr.uid, 2001);

    // chmod preserves the file type bits.
    assert!(fs.getattr(f.ino).unwrap().kind == sfs_core::FileKind::RegularFile);
}

#[test]
fn utimes_now_needs_write_access_explicit_needs_ownership() {
    let fs = fs();
    let (f, fh) = fs
        .create(InodeNumber::ROOT, n("f"), 0o666, libc::O_WRONLY, ALICE)
        .unwrap();
    fs.release(fh).unwrap();

    // Anyone with write access may bump the times to "now".
    let touch = SetAttr {
        atime: Some(TimeUpdate::Now),
        mtime: Some(TimeUpdate::Now),
        ..SetAttr::default()
    };
    assert!(fs.setattr(f.ino, None, touch, BOB).is_ok());

    // Explicit timestamps are owner-only.
    let backdate = SetAttr {
        mtime: Some(TimeUpdate::At(std::time::SystemTime::UNIX_EPOCH)),
        ..SetAttr::default()
    };
    assert_eq!(
        fs.setattr(f.ino, None, backdate, BOB).unwrap_err().to_errno(),
        libc::EPERM
    );
    let attr = fs.setattr(f.ino, None, backdate, ALICE).unwrap();
    assert_eq!(attr.mtime, std::time::SystemTime::UNIX_EPOCH);
}

#[test]
fn open_checks_requested_access_against_mode() {
    let fs = fs();
    let (f, fh) = fs
        .create(InodeNumber::ROOT, n("ro"), 0o444, libc::O_WRONLY, ALICE)
        .unwrap();
    fs.release(fh).unwrap();

    assert_eq!(
        fs.open(f.ino, libc::O_WRONLY, ALICE).unwrap_err().to_errno(),
        libc::EACCES
    );
    // O_TRUNC needs write permission even for a read-mode open.
    assert_eq!(
        fs.open(f.ino, libc::O_RDONLY | libc::O_TRUNC, ALICE)
            .unwrap_err()
            .to_errno(),
        libc::EACCES
    );
    let fh = fs.open(f.ino, libc::O_RDONLY, ALICE).unwrap();
    // Reading through a read-only handle is fine; writing is not.
    assert_eq!(fs.write(fh, 0, b"x").unwrap_err().to_errno(), libc::EACCES);
    fs.release(fh).unwrap();
}

#[test]
fn open_truncate_discards_contents() {
    let fs = fs();
    let (f, fh) = fs
        .create(InodeNumber::ROOT, n("f"), 0o644, libc::O_RDWR, ALICE)
        .unwrap();
    fs.write(fh, 0, b"content").unwrap();
    fs.release(fh).unwrap();

    let fh = fs.open(f.ino, libc::O_RDWR | libc::O_TRUNC, ALICE).unwrap();
    assert_eq!(fs.getattr(f.ino).unwrap().size, 0);
    assert!(fs.read(fh, 0, 16).unwrap().is_empty());
    fs.release(fh).unwrap();
    assert_eq!(fs.statfs().unwrap().bfree, fs.statfs().unwrap().blocks);
}

#[test]
fn access_probes_mode_triplets() {
    let fs = fs();
    let (f, fh) = fs
        .create(InodeNumber::ROOT, n("f"), 0o640, libc::O_WRONLY, ALICE)
        .unwrap();
    fs.release(fh).unwrap();

    assert!(fs.access(f.ino, 0, BOB).is_ok()); // existence
    assert!(fs.access(f.ino, 4, ALICE).is_ok());
    assert_eq!(fs.access(f.ino, 4, BOB).unwrap_err().to_errno(), libc::EACCES);
    assert!(fs.access(f.ino, 6, ROOT).is_ok());
    // Execute on a regular file without any x bit fails even for root.
    assert_eq!(fs.access(f.ino, 1, ROOT).unwrap_err().to_errno(), libc::EACCES);
}

// ── Type mismatches ─────────────────────────────────────────────────────

#[test]
fn directory_and_file_operations_do_not_mix() {
    let fs = fs();
    let d = fs.mkdir(InodeNumber::ROOT, n("d"), 0o755, ALICE).unwrap();
    let (f, fh) = fs
        .create(InodeNumber::ROOT, n("f"), 0o644, libc::O_WRONLY, ALICE)
        .unwrap();
    fs.release(fh).unwrap();

    assert_eq!(
        fs.open(d.ino, libc::O_RDWR, ALICE).unwrap_err().to_errno(),
        libc::EISDIR
    );
    assert_eq!(
        fs.unlink(InodeNumber::ROOT, n("d"), ALICE).unwrap_err().to_errno(),
        libc::EISDIR
    );
    assert_eq!(
        fs.rmdir(InodeNumber::ROOT, n("f"), ALICE).unwrap_err().to_errno(),
        libc::ENOTDIR
    );
    assert_eq!(
        fs.lookup(f.ino, n("x"), ALICE).unwrap_err().to_errno(),
        libc::ENOTDIR
    );
    assert_eq!(
        fs.opendir(f.ino, 0, ALICE).unwrap_err().to_errno(),
        libc::ENOTDIR
    );
    assert!(fs.opendir(d.ino, 0, ALICE).is_ok());
    fs.releasedir(d.ino).unwrap();
}

#[test]
fn mknod_creates_metadata_only_special_nodes() {
    let fs = fs();
    let fifo = fs
        .mknod(
            InodeNumber::ROOT,
            n("pipe"),
            sfs_types::S_IFIFO | 0o644,
            0,
            ALICE,
        )
        .unwrap();
    assert_eq!(fifo.kind, sfs_core::FileKind::Fifo);
    assert_eq!(fifo.nlink, 1);
    assert_eq!(fifo.blocks, 0);
}

#[test]
fn invalid_names_are_rejected() {
    let fs = fs();
    use std::os::unix::ffi::OsStrExt;
    let slashy = OsStr::from_bytes(b"a/b");
    assert_eq!(
        fs.mkdir(InodeNumber::ROOT, slashy, 0o755, ALICE).unwrap_err().to_errno(),
        libc::EINVAL
    );
    let long = "x".repeat(256);
    assert_eq!(
        fs.mkdir(InodeNumber::ROOT, n(&long), 0o755, ALICE).unwrap_err().to_errno(),
        libc::ENAMETOOLONG
    );
    assert_eq!(
        fs.mkdir(InodeNumber::ROOT, n("."), 0o755, ALICE).unwrap_err().to_errno(),
        libc::EEXIST
    );
    assert_eq!(
        fs.unlink(InodeNumber::ROOT, n(".."), ALICE).unwrap_err().to_errno(),
        libc::EINVAL
    );
}

// ── Capacity ────────────────────────────────────────────────────────────

#[test]
fn filling_the_heap_yields_enospc_and_frees_recover() {
    let fs = FileSystem::new(&FsConfig {
        capacity_bytes: 8 * 4096,
        ..FsConfig::default()
    });
    let (f, fh) = fs
        .create(InodeNumber::ROOT, n("big"), 0o644, libc::O_RDWR, ALICE)
        .unwrap();
    fs.write(fh, 0, &[1_u8; 8 * 4096]).unwrap();

    let err = fs.write(fh, 8 * 4096, b"x").unwrap_err();
    assert_eq!(err.to_errno(), libc::ENOSPC);
    // The failed write did not corrupt accounting.
    assert_eq!(fs.statfs().unwrap().bfree, 0);

    let set = SetAttr { size: Some(0), ..SetAttr::default() };
    fs.setattr(f.ino, Some(fh), set, ALICE).unwrap();
    assert_eq!(fs.statfs().unwrap().bfree, 8);
    fs.write(fh, 0, b"again").unwrap();
    fs.release(fh).unwrap();
}

// ── End-to-end scenario ─────────────────────────────────────────────────

#[test]
fn mount_scenario_walkthrough() {
    let fs = fs();

    // mkdir /d — fresh dir reports nlink=2, root picks up a third link.
    let d = fs.mkdir(InodeNumber::ROOT, n("d"), 0o755, ALICE).unwrap();
    assert_eq!(d.nlink, 2);
    assert_eq!(fs.getattr(InodeNumber::ROOT).unwrap().nlink, 3);

    // create /d/f, write "hello": size 5, one block of 512-byte units.
    let (f, fh) = fs.create(d.ino, n("f"), 0o644, libc::O_RDWR, ALICE).unwrap();
    fs.write(fh, 0, b"hello").unwrap();
    let attr = fs.getattr(f.ino).unwrap();
    assert_eq!(attr.size, 5);
    assert_eq!(attr.blocks, 8);

    // truncate to 1 — a 5-byte read returns just "h".
    fs.setattr(
        f.ino,
        Some(fh),
        SetAttr { size: Some(1), ..SetAttr::default() },
        ALICE,
    )
    .unwrap();
    assert_eq!(fs.read(fh, 0, 5).unwrap(), b"h");
    fs.release(fh).unwrap();

    // symlink "f" -> /d/s.
    let s = fs.symlink(n("f"), d.ino, n("s"), ALICE).unwrap();
    assert_eq!(fs.readlink(s.ino).unwrap(), b"f");

    // link /d/f -> /d/f2, drop the original name.
    fs.link(f.ino, d.ino, n("f2"), ALICE).unwrap();
    fs.unlink(d.ino, n("f"), ALICE).unwrap();
    let f2 = fs.lookup(d.ino, n("f2"), ALICE).unwrap();
    assert_eq!(f2.ino, f.ino);
    assert_eq!(f2.nlink, 1);
    let fh = fs.open(f2.ino, libc::O_RDONLY, ALICE).unwrap();
    assert_eq!(fs.read(fh, 0, 8).unwrap(), b"h");
    fs.release(fh).unwrap();

    // rmdir /d while /d/f2 exists fails ENOTEMPTY.
    assert!(matches!(
        fs.rmdir(InodeNumber::ROOT, n("d"), ALICE),
        Err(FsError::NotEmpty)
    ));
}

#[test]
fn destroy_frees_everything_and_refuses_requests() {
    let fs = fs();
    let (f, fh) = fs
        .create(InodeNumber::ROOT, n("f"), 0o644, libc::O_RDWR, ALICE)
        .unwrap();
    fs.write(fh, 0, &[5_u8; 64 * 1024]).unwrap();

    fs.destroy();
    assert_eq!(fs.getattr(f.ino).unwrap_err().to_errno(), libc::EFAULT);
    assert_eq!(fs.read(fh, 0, 16).unwrap_err().to_errno(), libc::EFAULT);
    // release after teardown is tolerated (the bridge drains handles).
    assert!(fs.release(fh).is_ok());
}
