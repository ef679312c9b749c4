//! Descriptor-level system calls.
//!
//! These calls are implementations on the [`Capsule`] struct; each one
//! resolves its descriptor argument against the capsule's table with
//! exactly the rights it needs before touching the host.
//!
//! - [fd_close_syscall](crate::emulator::capsule::Capsule::fd_close_syscall)
//! - [fd_create1_syscall](crate::emulator::capsule::Capsule::fd_create1_syscall)
//! - [fd_create2_syscall](crate::emulator::capsule::Capsule::fd_create2_syscall)
//! - [fd_datasync_syscall](crate::emulator::capsule::Capsule::fd_datasync_syscall)
//! - [fd_dup_syscall](crate::emulator::capsule::Capsule::fd_dup_syscall)
//! - [fd_pread_syscall](crate::emulator::capsule::Capsule::fd_pread_syscall)
//! - [fd_pwrite_syscall](crate::emulator::capsule::Capsule::fd_pwrite_syscall)
//! - [fd_read_syscall](crate::emulator::capsule::Capsule::fd_read_syscall)
//! - [fd_replace_syscall](crate::emulator::capsule::Capsule::fd_replace_syscall)
//! - [fd_seek_syscall](crate::emulator::capsule::Capsule::fd_seek_syscall)
//! - [fd_stat_get_syscall](crate::emulator::capsule::Capsule::fd_stat_get_syscall)
//! - [fd_stat_put_syscall](crate::emulator::capsule::Capsule::fd_stat_put_syscall)
//! - [fd_sync_syscall](crate::emulator::capsule::Capsule::fd_sync_syscall)
//! - [fd_write_syscall](crate::emulator::capsule::Capsule::fd_write_syscall)

#![allow(dead_code)]

use super::fs_constants::*;
use crate::emulator::capsule::Capsule;
use crate::emulator::fdtable::FdObject;
use crate::emulator::rights::*;
use crate::interface;
use crate::interface::errnos::{syscall_error, Errno};
use crate::interface::types::*;

/// Copies the front of a flat buffer back out into a scatter list.
/// Returns the number of bytes distributed, which is at most buf.len().
pub(crate) fn scatter_from_buffer(buf: &[u8], iov: &[IoVec]) -> usize {
    let mut bufoff = 0;
    for vec in iov {
        if bufoff == buf.len() {
            break;
        }
        let len = std::cmp::min(vec.buf_len, buf.len() - bufoff);
        unsafe {
            std::ptr::copy_nonoverlapping(buf.as_ptr().add(bufoff), vec.buf, len);
        }
        bufoff += len;
    }
    bufoff
}

/// Concatenates a gather list into one flat buffer.
pub(crate) fn gather_to_buffer(iov: &[CIoVec]) -> Vec<u8> {
    let total: usize = iov.iter().map(|vec| vec.buf_len).sum();
    let mut buf = Vec::with_capacity(total);
    for vec in iov {
        unsafe {
            buf.extend_from_slice(std::slice::from_raw_parts(vec.buf, vec.buf_len));
        }
    }
    buf
}

impl Capsule {
    pub fn fd_close_syscall(&self, fd: Fd) -> Result<(), Errno> {
        self.fdtable.close(fd)
    }

    /// Creates a descriptor that needs no counterpart in the file system.
    /// Only anonymous shared memory can be created this way.
    pub fn fd_create1_syscall(&self, filetype: u8) -> Result<Fd, Errno> {
        if filetype != Filetype::SharedMemory as u8 {
            return Err(syscall_error(
                Errno::EINVAL,
                "fd_create1",
                "only shared memory descriptors can be created",
            ));
        }
        let nfd = interface::shm_anon()?;
        Ok(self.fdtable.insert(
            FdObject::new(Filetype::SharedMemory, nfd),
            RIGHTS_SHARED_MEMORY_BASE,
            RIGHTS_SHARED_MEMORY_INHERITING,
        ))
    }

    /// Creates a pair of connected socket descriptors.
    pub fn fd_create2_syscall(&self, filetype: u8) -> Result<(Fd, Fd), Errno> {
        let (guest_type, socktype) = if filetype == Filetype::SocketDgram as u8 {
            (Filetype::SocketDgram, libc::SOCK_DGRAM)
        } else if filetype == Filetype::SocketStream as u8 {
            (Filetype::SocketStream, libc::SOCK_STREAM)
        } else {
            return Err(syscall_error(
                Errno::EINVAL,
                "fd_create2",
                "only socket pairs can be created",
            ));
        };
        let (host1, host2) = interface::socketpair(socktype)?;
        Ok(self.fdtable.insert_pair(
            FdObject::new(guest_type, host1),
            FdObject::new(guest_type, host2),
            RIGHTS_SOCKET_BASE,
            RIGHTS_SOCKET_BASE,
            RIGHTS_SOCKET_INHERITING,
        ))
    }

    pub fn fd_datasync_syscall(&self, fd: Fd) -> Result<(), Errno> {
        let fo = self.fdtable.acquire(fd, RIGHT_FD_DATASYNC, 0)?;
        interface::fdatasync(fo.number())
    }

    pub fn fd_dup_syscall(&self, from: Fd) -> Result<Fd, Errno> {
        self.fdtable.dup(from)
    }

    pub fn fd_read_syscall(&self, fd: Fd, iov: &[IoVec]) -> Result<usize, Errno> {
        let fo = self.fdtable.acquire(fd, RIGHT_FD_READ, 0)?;
        interface::readv(fo.number(), iov)
    }

    pub fn fd_write_syscall(&self, fd: Fd, iov: &[CIoVec]) -> Result<usize, Errno> {
        let fo = self.fdtable.acquire(fd, RIGHT_FD_WRITE, 0)?;
        interface::writev(fo.number(), iov)
    }

    pub fn fd_pread_syscall(&self, fd: Fd, iov: &[IoVec], offset: Filesize) -> Result<usize, Errno> {
        if iov.is_empty() {
            return Err(syscall_error(Errno::EINVAL, "fd_pread", "empty scatter list"));
        }
        let fo = self.fdtable.acquire(fd, RIGHT_FD_READ | RIGHT_FD_SEEK, 0)?;

        #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
        {
            interface::preadv(fo.number(), iov, offset)
        }
        #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
        {
            if iov.len() == 1 {
                let buf =
                    unsafe { std::slice::from_raw_parts_mut(iov[0].buf, iov[0].buf_len) };
                return interface::pread(fo.number(), buf, offset);
            }
            // No positional vectored read on this host: read into one
            // flat buffer and redistribute.
            let total: usize = iov.iter().map(|vec| vec.buf_len).sum();
            let mut buf = vec![0u8; total];
            let len = interface::pread(fo.number(), &mut buf, offset)?;
            scatter_from_buffer(&buf[..len], iov);
            Ok(len)
        }
    }

    pub fn fd_pwrite_syscall(
        &self,
        fd: Fd,
        iov: &[CIoVec],
        offset: Filesize,
    ) -> Result<usize, Errno> {
        if iov.is_empty() {
            return Err(syscall_error(Errno::EINVAL, "fd_pwrite", "empty gather list"));
        }
        let fo = self.fdtable.acquire(fd, RIGHT_FD_WRITE | RIGHT_FD_SEEK, 0)?;

        #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
        {
            interface::pwritev(fo.number(), iov, offset)
        }
        #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
        {
            if iov.len() == 1 {
                let buf = unsafe { std::slice::from_raw_parts(iov[0].buf, iov[0].buf_len) };
                return interface::pwrite(fo.number(), buf, offset);
            }
            let buf = gather_to_buffer(iov);
            interface::pwrite(fo.number(), &buf, offset)
        }
    }

    pub fn fd_replace_syscall(&self, from: Fd, to: Fd) -> Result<(), Errno> {
        self.fdtable.replace(from, to)
    }

    pub fn fd_seek_syscall(&self, fd: Fd, offset: i64, whence: u8) -> Result<Filesize, Errno> {
        let nwhence = match whence {
            WHENCE_CUR => libc::SEEK_CUR,
            WHENCE_END => libc::SEEK_END,
            WHENCE_SET => libc::SEEK_SET,
            _ => {
                return Err(syscall_error(Errno::EINVAL, "fd_seek", "unknown whence"));
            }
        };

        // Querying the current offset is a weaker operation than
        // repositioning, so it only needs the tell right.
        let needed = if offset == 0 && whence == WHENCE_CUR {
            RIGHT_FD_TELL
        } else {
            RIGHT_FD_SEEK | RIGHT_FD_TELL
        };
        let fo = self.fdtable.acquire(fd, needed, 0)?;
        interface::lseek(fo.number(), offset, nwhence)
    }

    pub fn fd_stat_get_syscall(&self, fd: Fd) -> Result<Fdstat, Errno> {
        let (fo, base, inheriting) = self.fdtable.acquire_with_rights(fd, 0, 0)?;
        let mut stat = Fdstat {
            fs_filetype: fo.filetype() as u8,
            fs_flags: 0,
            fs_rights_base: base,
            fs_rights_inheriting: inheriting,
        };

        let hostflags = interface::fcntl_getfl(fo.number())?;
        if hostflags & libc::O_APPEND != 0 {
            stat.fs_flags |= FDFLAG_APPEND;
        }
        if hostflags & libc::O_NONBLOCK != 0 {
            stat.fs_flags |= FDFLAG_NONBLOCK;
        }
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
        {
            if hostflags & libc::O_DSYNC != 0 {
                stat.fs_flags |= FDFLAG_DSYNC;
            }
            if hostflags & libc::O_RSYNC != 0 {
                stat.fs_flags |= FDFLAG_RSYNC;
            }
        }
        if hostflags & libc::O_SYNC != 0 {
            stat.fs_flags |= FDFLAG_SYNC;
        }
        Ok(stat)
    }

    pub fn fd_stat_put_syscall(&self, fd: Fd, buf: &Fdstat, flags: u16) -> Result<(), Errno> {
        match flags {
            FDSTAT_FLAGS => {
                let mut hostflags = 0;
                if buf.fs_flags & FDFLAG_APPEND != 0 {
                    hostflags |= libc::O_APPEND;
                }
                if buf.fs_flags & FDFLAG_NONBLOCK != 0 {
                    hostflags |= libc::O_NONBLOCK;
                }
                #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
                {
                    if buf.fs_flags & FDFLAG_DSYNC != 0 {
                        hostflags |= libc::O_DSYNC;
                    }
                    if buf.fs_flags & FDFLAG_RSYNC != 0 {
                        hostflags |= libc::O_RSYNC;
                    }
                }
                #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
                {
                    if buf.fs_flags & (FDFLAG_DSYNC | FDFLAG_RSYNC) != 0 {
                        hostflags |= libc::O_SYNC;
                    }
                }
                if buf.fs_flags & FDFLAG_SYNC != 0 {
                    hostflags |= libc::O_SYNC;
                }

                let fo = self.fdtable.acquire(fd, RIGHT_FD_STAT_PUT_FLAGS, 0)?;
                interface::fcntl_setfl(fo.number(), hostflags)
            }
            FDSTAT_RIGHTS => self
                .fdtable
                .restrict_rights(fd, buf.fs_rights_base, buf.fs_rights_inheriting),
            _ => Err(syscall_error(
                Errno::EINVAL,
                "fd_stat_put",
                "exactly one of flags or rights must be updated",
            )),
        }
    }

    pub fn fd_sync_syscall(&self, fd: Fd) -> Result<(), Errno> {
        let fo = self.fdtable.acquire(fd, RIGHT_FD_SYNC, 0)?;
        interface::fsync(fo.number())
    }
}
