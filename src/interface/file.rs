// Host file plumbing: raw descriptor operations, *at() path operations
// and directory streams. Every wrapper translates the host errno before
// returning.

use std::ffi::{CStr, CString};

use crate::interface::errnos::{get_host_errno, syscall_error, Errno};
use crate::interface::types::{IoVec, CIoVec};

/// Copies a borrowed (pointer, length) pathname into an owned
/// null-terminated string. Interior NUL bytes are invalid in guest paths.
pub fn null_terminate(path: &[u8]) -> Result<CString, Errno> {
    CString::new(path)
        .map_err(|_| syscall_error(Errno::EINVAL, "path", "pathname contains a NUL byte"))
}

fn cvt(ret: libc::c_int) -> Result<libc::c_int, Errno> {
    if ret < 0 {
        Err(get_host_errno())
    } else {
        Ok(ret)
    }
}

fn cvt_len(ret: libc::ssize_t) -> Result<usize, Errno> {
    if ret < 0 {
        Err(get_host_errno())
    } else {
        Ok(ret as usize)
    }
}

pub fn close(fd: i32) {
    unsafe { libc::close(fd) };
}

pub fn fsync(fd: i32) -> Result<(), Errno> {
    cvt(unsafe { libc::fsync(fd) }).map(|_| ())
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub fn fdatasync(fd: i32) -> Result<(), Errno> {
    cvt(unsafe { libc::fdatasync(fd) }).map(|_| ())
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
pub fn fdatasync(fd: i32) -> Result<(), Errno> {
    fsync(fd)
}

pub fn lseek(fd: i32, offset: i64, whence: i32) -> Result<u64, Errno> {
    let ret = unsafe { libc::lseek(fd, offset as libc::off_t, whence) };
    if ret < 0 {
        Err(get_host_errno())
    } else {
        Ok(ret as u64)
    }
}

pub fn ftruncate(fd: i32, size: u64) -> Result<(), Errno> {
    cvt(unsafe { libc::ftruncate(fd, size as libc::off_t) }).map(|_| ())
}

pub fn fcntl_getfl(fd: i32) -> Result<i32, Errno> {
    cvt(unsafe { libc::fcntl(fd, libc::F_GETFL) })
}

pub fn fcntl_setfl(fd: i32, flags: i32) -> Result<(), Errno> {
    cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, flags) }).map(|_| ())
}

/// Bytes currently readable from the descriptor, or zero if the host
/// cannot tell.
pub fn bytes_readable(fd: i32) -> u64 {
    let mut len: libc::c_int = 0;
    if unsafe { libc::ioctl(fd, libc::FIONREAD, &mut len) } == 0 {
        len as u64
    } else {
        0
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub fn fadvise(fd: i32, offset: u64, len: u64, advice: i32) -> Result<(), Errno> {
    let ret = unsafe {
        libc::posix_fadvise(fd, offset as libc::off_t, len as libc::off_t, advice)
    };
    // posix_fadvise returns the error directly instead of via errno.
    if ret != 0 {
        return Err(crate::interface::errnos::convert_host_errno(ret));
    }
    Ok(())
}

// Advisory information can safely be ignored on hosts without fadvise.
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
pub fn fadvise(_fd: i32, _offset: u64, _len: u64, _advice: i32) -> Result<(), Errno> {
    Ok(())
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub fn fallocate(fd: i32, offset: u64, len: u64) -> Result<(), Errno> {
    let ret = unsafe {
        libc::posix_fallocate(fd, offset as libc::off_t, len as libc::off_t)
    };
    if ret != 0 {
        return Err(crate::interface::errnos::convert_host_errno(ret));
    }
    Ok(())
}

// Hosts without posix_fallocate at least get the file grown to size.
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
pub fn fallocate(fd: i32, offset: u64, len: u64) -> Result<(), Errno> {
    let sb = fstat(fd)?;
    if (sb.st_size as u64) < offset + len {
        ftruncate(fd, offset + len)?;
    }
    Ok(())
}

pub fn fstat(fd: i32) -> Result<libc::stat, Errno> {
    let mut sb = unsafe { std::mem::zeroed::<libc::stat>() };
    cvt(unsafe { libc::fstat(fd, &mut sb) })?;
    Ok(sb)
}

pub fn fstatat(dirfd: i32, path: &CStr, follow: bool) -> Result<libc::stat, Errno> {
    let mut sb = unsafe { std::mem::zeroed::<libc::stat>() };
    let flags = if follow { 0 } else { libc::AT_SYMLINK_NOFOLLOW };
    cvt(unsafe { libc::fstatat(dirfd, path.as_ptr(), &mut sb, flags) })?;
    Ok(sb)
}

pub fn futimens(fd: i32, times: &[libc::timespec; 2]) -> Result<(), Errno> {
    cvt(unsafe { libc::futimens(fd, times.as_ptr()) }).map(|_| ())
}

pub fn utimensat(
    dirfd: i32,
    path: &CStr,
    times: &[libc::timespec; 2],
    follow: bool,
) -> Result<(), Errno> {
    let flags = if follow { 0 } else { libc::AT_SYMLINK_NOFOLLOW };
    cvt(unsafe { libc::utimensat(dirfd, path.as_ptr(), times.as_ptr(), flags) }).map(|_| ())
}

pub fn openat(dirfd: i32, path: &CStr, flags: i32, mode: u32) -> Result<i32, Errno> {
    cvt(unsafe { libc::openat(dirfd, path.as_ptr(), flags, mode as libc::c_uint) })
}

pub fn mkdirat(dirfd: i32, path: &CStr, mode: u32) -> Result<(), Errno> {
    cvt(unsafe { libc::mkdirat(dirfd, path.as_ptr(), mode as libc::mode_t) }).map(|_| ())
}

pub fn unlinkat(dirfd: i32, path: &CStr, removedir: bool) -> Result<(), Errno> {
    let flags = if removedir { libc::AT_REMOVEDIR } else { 0 };
    cvt(unsafe { libc::unlinkat(dirfd, path.as_ptr(), flags) }).map(|_| ())
}

pub fn linkat(
    olddirfd: i32,
    oldpath: &CStr,
    newdirfd: i32,
    newpath: &CStr,
    follow: bool,
) -> Result<(), Errno> {
    let flags = if follow { libc::AT_SYMLINK_FOLLOW } else { 0 };
    cvt(unsafe {
        libc::linkat(olddirfd, oldpath.as_ptr(), newdirfd, newpath.as_ptr(), flags)
    })
    .map(|_| ())
}

pub fn renameat(olddirfd: i32, oldpath: &CStr, newdirfd: i32, newpath: &CStr) -> Result<(), Errno> {
    cvt(unsafe { libc::renameat(olddirfd, oldpath.as_ptr(), newdirfd, newpath.as_ptr()) })
        .map(|_| ())
}

pub fn symlinkat(target: &CStr, dirfd: i32, path: &CStr) -> Result<(), Errno> {
    cvt(unsafe { libc::symlinkat(target.as_ptr(), dirfd, path.as_ptr()) }).map(|_| ())
}

pub fn readlinkat(dirfd: i32, path: &CStr, buf: &mut [u8]) -> Result<usize, Errno> {
    cvt_len(unsafe {
        libc::readlinkat(
            dirfd,
            path.as_ptr(),
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
        )
    })
}

/// Reads the entire target of a symbolic link into an owned buffer. The
/// buffer is grown until the target fits with room to spare, so a caller
/// may append a trailing slash.
pub fn readlinkat_alloc(dirfd: i32, path: &CStr) -> Result<Vec<u8>, Errno> {
    let mut len = 32;
    loop {
        let mut buf = vec![0u8; len];
        let ret = readlinkat(dirfd, path, &mut buf)?;
        if ret + 1 < len {
            buf.truncate(ret);
            return Ok(buf);
        }
        len *= 2;
    }
}

pub fn readv(fd: i32, iov: &[IoVec]) -> Result<usize, Errno> {
    cvt_len(unsafe {
        libc::readv(
            fd,
            iov.as_ptr() as *const libc::iovec,
            iov.len() as libc::c_int,
        )
    })
}

pub fn writev(fd: i32, iov: &[CIoVec]) -> Result<usize, Errno> {
    cvt_len(unsafe {
        libc::writev(
            fd,
            iov.as_ptr() as *const libc::iovec,
            iov.len() as libc::c_int,
        )
    })
}

pub fn pread(fd: i32, buf: &mut [u8], offset: u64) -> Result<usize, Errno> {
    cvt_len(unsafe {
        libc::pread(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            offset as libc::off_t,
        )
    })
}

pub fn pwrite(fd: i32, buf: &[u8], offset: u64) -> Result<usize, Errno> {
    cvt_len(unsafe {
        libc::pwrite(
            fd,
            buf.as_ptr() as *const libc::c_void,
            buf.len(),
            offset as libc::off_t,
        )
    })
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub fn preadv(fd: i32, iov: &[IoVec], offset: u64) -> Result<usize, Errno> {
    cvt_len(unsafe {
        libc::preadv(
            fd,
            iov.as_ptr() as *const libc::iovec,
            iov.len() as libc::c_int,
            offset as libc::off_t,
        )
    })
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub fn pwritev(fd: i32, iov: &[CIoVec], offset: u64) -> Result<usize, Errno> {
    cvt_len(unsafe {
        libc::pwritev(
            fd,
            iov.as_ptr() as *const libc::iovec,
            iov.len() as libc::c_int,
            offset as libc::off_t,
        )
    })
}

pub fn isatty(fd: i32) -> bool {
    unsafe { libc::isatty(fd) == 1 }
}

pub fn host_poll(pfds: &mut [libc::pollfd], timeout: i32) -> Result<usize, Errno> {
    let ret = unsafe { libc::poll(pfds.as_mut_ptr(), pfds.len() as libc::nfds_t, timeout) };
    if ret < 0 {
        Err(get_host_errno())
    } else {
        Ok(ret as usize)
    }
}

// readdir reports end-of-stream and failure the same way; errno must be
// cleared first to tell them apart.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn clear_host_errno() {
    unsafe { *libc::__errno_location() = 0 };
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn clear_host_errno() {
    unsafe { *libc::__error() = 0 };
}

/// One entry read from a directory stream.
pub struct HostDirent {
    pub ino: u64,
    pub kind: u8,
    pub name: Vec<u8>,
    /// Stream position after this entry; usable as a seek cookie.
    pub next_pos: u64,
}

/// An open directory stream. Once a descriptor has been promoted to a
/// stream, closing the stream is what closes the descriptor.
pub struct DirStream {
    dirp: *mut libc::DIR,
}

// The stream is only ever used under the owning object's mutex.
unsafe impl Send for DirStream {}

impl DirStream {
    /// Takes ownership of the descriptor. On failure the descriptor is
    /// still owned by the caller.
    pub fn from_fd(fd: i32) -> Result<DirStream, Errno> {
        let dirp = unsafe { libc::fdopendir(fd) };
        if dirp.is_null() {
            return Err(get_host_errno());
        }
        Ok(DirStream { dirp })
    }

    pub fn rewind(&mut self) {
        unsafe { libc::rewinddir(self.dirp) };
    }

    pub fn seek(&mut self, pos: u64) {
        unsafe { libc::seekdir(self.dirp, pos as libc::c_long) };
    }

    /// Reads the next entry. Ok(None) marks the end of the stream.
    pub fn next_entry(&mut self) -> Result<Option<HostDirent>, Errno> {
        clear_host_errno();
        let de = unsafe { libc::readdir(self.dirp) };
        if de.is_null() {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            if errno == 0 {
                return Ok(None);
            }
            return Err(crate::interface::errnos::convert_host_errno(errno));
        }
        let de = unsafe { &*de };
        let name = unsafe { CStr::from_ptr(de.d_name.as_ptr()) }
            .to_bytes()
            .to_vec();
        let next_pos = unsafe { libc::telldir(self.dirp) } as u64;
        Ok(Some(HostDirent {
            ino: de.d_ino,
            kind: de.d_type,
            name,
            next_pos,
        }))
    }
}

impl Drop for DirStream {
    fn drop(&mut self) {
        unsafe { libc::closedir(self.dirp) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_terminate_rejects_interior_nul() {
        assert!(null_terminate(b"a/b").is_ok());
        assert_eq!(null_terminate(b"a\0b"), Err(Errno::EINVAL));
    }

    #[test]
    fn readlink_alloc_grows() {
        let dir = std::env::temp_dir().join(format!("capposix-rl-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let target: String = std::iter::repeat('x').take(100).collect();
        let link = dir.join("longlink");
        let _ = std::fs::remove_file(&link);
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let cpath = null_terminate(link.to_str().unwrap().as_bytes()).unwrap();
        let contents = readlinkat_alloc(libc::AT_FDCWD, &cpath).unwrap();
        assert_eq!(contents, target.as_bytes());
        std::fs::remove_file(&link).unwrap();
    }
}
