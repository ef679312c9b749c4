// Type definitions for the host interface layer: aliases over the
// concurrency stack plus the guest-visible wire types that cross the
// syscall boundary.

pub use dashmap::{
    mapref::entry::Entry as RustHashEntry, DashMap as RustHashMap, DashSet as RustHashSet,
};
pub use parking_lot::{Condvar, Mutex, RwLock as RustLock};
pub use std::sync::atomic::{
    AtomicBool as RustAtomicBool, AtomicI32 as RustAtomicI32, AtomicU16 as RustAtomicU16,
    AtomicU32 as RustAtomicU32, AtomicU64 as RustAtomicU64, AtomicUsize as RustAtomicUsize,
    Ordering as RustAtomicOrdering,
};
pub use std::sync::Arc as RustRfc;
pub use std::sync::LazyLock as RustLazyGlobal;

use crate::interface::errnos::Errno;

/// Guest file descriptor number.
pub type Fd = u32;
/// Guest thread identifier.
pub type Tid = u32;
/// Nanoseconds since a clock's epoch.
pub type Timestamp = u64;
/// File size or offset in bytes.
pub type Filesize = u64;
/// Opaque position in a directory stream.
pub type Dircookie = u64;
/// Caller-chosen value passed through poll subscriptions.
pub type Userdata = u64;
/// 64-bit rights bitmask (base or inheriting).
pub type Rights = u64;

/// Written into a received-descriptor slot when the import failed.
pub const INVALID_FD: Fd = Fd::MAX;

/// Guest file types. The discriminants are part of the directory entry
/// wire format, so they are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Filetype {
    Unknown = 0,
    BlockDevice = 16,
    CharacterDevice = 17,
    Directory = 32,
    RegularFile = 96,
    SharedMemory = 112,
    SocketDgram = 128,
    SocketStream = 130,
    SymbolicLink = 144,
}

/// Scatter element for reads. Layout-compatible with the host iovec so
/// vectored host calls can use the guest array directly.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct IoVec {
    pub buf: *mut u8,
    pub buf_len: usize,
}

/// Gather element for writes.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct CIoVec {
    pub buf: *const u8,
    pub buf_len: usize,
}

const _: () = assert!(std::mem::size_of::<IoVec>() == std::mem::size_of::<libc::iovec>());
const _: () = assert!(std::mem::size_of::<CIoVec>() == std::mem::size_of::<libc::iovec>());

/// Directory file descriptor plus lookup flags for path-using syscalls.
#[derive(Debug, Clone, Copy)]
pub struct Lookup {
    pub fd: Fd,
    pub flags: u32,
}

/// Attributes of an open file descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fdstat {
    pub fs_filetype: u8,
    pub fs_flags: u16,
    pub fs_rights_base: Rights,
    pub fs_rights_inheriting: Rights,
}

/// Attributes of a file or directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Filestat {
    pub st_dev: u64,
    pub st_ino: u64,
    pub st_filetype: u8,
    pub st_nlink: u32,
    pub st_size: Filesize,
    pub st_atim: Timestamp,
    pub st_mtim: Timestamp,
    pub st_ctim: Timestamp,
}

/// One wait request handed to poll.
#[derive(Debug, Clone, Copy)]
pub struct Subscription {
    pub userdata: Userdata,
    pub kind: SubscriptionKind,
}

#[derive(Debug, Clone, Copy)]
pub enum SubscriptionKind {
    Clock {
        clock_id: u32,
        timeout: Timestamp,
        precision: Timestamp,
        flags: u16,
    },
    FdRead {
        fd: Fd,
    },
    FdWrite {
        fd: Fd,
    },
    /// Wait for a condition variable word, releasing and reacquiring the
    /// paired lock word. Both point into guest memory.
    Condvar {
        condvar: *mut u32,
        lock: *mut u32,
        condvar_scope: u8,
        lock_scope: u8,
    },
}

/// Event type tags carried in poll results.
pub const EVENTTYPE_CLOCK: u8 = 1;
pub const EVENTTYPE_CONDVAR: u8 = 2;
pub const EVENTTYPE_FD_READ: u8 = 3;
pub const EVENTTYPE_FD_WRITE: u8 = 4;

/// The peer of an fd-read/fd-write subscription has hung up.
pub const EVENT_FD_READWRITE_HANGUP: u16 = 0x0001;

/// One completed wait delivered by poll.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub userdata: Userdata,
    pub error: Option<Errno>,
    pub eventtype: u8,
    /// Bytes available for reading, for fd events.
    pub nbytes: Filesize,
    pub flags: u16,
}

impl Event {
    pub fn new(userdata: Userdata, eventtype: u8) -> Event {
        Event {
            userdata,
            error: None,
            eventtype,
            nbytes: 0,
            flags: 0,
        }
    }

    pub fn error(userdata: Userdata, eventtype: u8, errno: Errno) -> Event {
        Event {
            userdata,
            error: Some(errno),
            eventtype,
            nbytes: 0,
            flags: 0,
        }
    }
}

/// Results of a sock_recv call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecvOut {
    pub ro_datalen: usize,
    pub ro_fdslen: usize,
    pub ro_flags: u16,
}

/// Guest entry point for a spawned thread. The C-unwind ABI lets
/// thread_exit unwind back through the entry frame to the trampoline.
pub type ThreadEntry = extern "C-unwind" fn(tid: Tid, argument: *mut libc::c_void);
