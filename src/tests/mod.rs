#![allow(dead_code)] //suppress warning for these helpers not being used in targets other than the tests

mod fs_tests;
mod net_tests;

use std::path::PathBuf;

use crate::emulator::capsule::Capsule;
use crate::emulator::fdtable::FdObject;
use crate::emulator::rights::*;
use crate::interface;
use crate::interface::types::*;

static SCRATCH_COUNTER: RustAtomicU32 = RustAtomicU32::new(0);

/// A fresh directory under the system temp dir, unique per test.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "capposix-{}-{}-{}",
        name,
        std::process::id(),
        SCRATCH_COUNTER.fetch_add(1, RustAtomicOrdering::Relaxed)
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn open_host_dir(path: &std::path::Path) -> i32 {
    let cpath = interface::null_terminate(path.to_str().unwrap().as_bytes()).unwrap();
    interface::openat(
        libc::AT_FDCWD,
        &cpath,
        libc::O_RDONLY | libc::O_DIRECTORY,
        0,
    )
    .unwrap()
}

/// Seeds the capsule with a directory descriptor carrying full directory
/// rights, the way a launcher would.
pub fn seed_dir(capsule: &Capsule, path: &std::path::Path) -> Fd {
    let host_fd = open_host_dir(path);
    capsule.fdtable.insert(
        FdObject::new(Filetype::Directory, host_fd),
        RIGHTS_DIRECTORY_BASE,
        RIGHTS_DIRECTORY_INHERITING,
    )
}

/// Seeds an arbitrary host descriptor with the rights its type allows.
pub fn seed_host_fd(capsule: &Capsule, host_fd: i32) -> Fd {
    let (filetype, base, inheriting) =
        crate::emulator::rights::determine_type_rights(host_fd).unwrap();
    capsule
        .fdtable
        .insert(FdObject::new(filetype, host_fd), base, inheriting)
}

pub fn iovec(buf: &mut [u8]) -> IoVec {
    IoVec {
        buf: buf.as_mut_ptr(),
        buf_len: buf.len(),
    }
}

pub fn ciovec(buf: &[u8]) -> CIoVec {
    CIoVec {
        buf: buf.as_ptr(),
        buf_len: buf.len(),
    }
}

/// Fdstat requesting the usual rights for a freshly opened data file.
pub fn rw_fdstat() -> Fdstat {
    Fdstat {
        fs_filetype: 0,
        fs_flags: 0,
        fs_rights_base: RIGHT_FD_READ
            | RIGHT_FD_WRITE
            | RIGHT_FD_SEEK
            | RIGHT_FD_TELL
            | RIGHT_FILE_STAT_FGET,
        fs_rights_inheriting: 0,
    }
}

/// Parses serialized directory entries. Returns (cookie, name) pairs for
/// every complete entry and whether a truncated tail was present.
pub fn parse_dirents(buf: &[u8]) -> (Vec<(u64, Vec<u8>)>, bool) {
    use crate::emulator::syscalls::fs_constants::DIRENT_HEADER_SIZE;
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        if pos + DIRENT_HEADER_SIZE > buf.len() {
            return (entries, true);
        }
        let cookie = u64::from_ne_bytes(buf[pos..pos + 8].try_into().unwrap());
        let namlen =
            u32::from_ne_bytes(buf[pos + 16..pos + 20].try_into().unwrap()) as usize;
        pos += DIRENT_HEADER_SIZE;
        if pos + namlen > buf.len() {
            return (entries, true);
        }
        entries.push((cookie, buf[pos..pos + namlen].to_vec()));
        pos += namlen;
    }
    (entries, false)
}
