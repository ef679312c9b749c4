// Host socket plumbing: socketpairs, shutdown, and the ancillary-data
// encoding used to pass descriptors over stream sockets.

use std::ffi::CString;

use crate::interface::errnos::{get_host_errno, Errno};
use crate::interface::types::{CIoVec, IoVec};

pub fn socketpair(socktype: i32) -> Result<(i32, i32), Errno> {
    let mut fds = [0i32; 2];
    if unsafe { libc::socketpair(libc::AF_UNIX, socktype, 0, fds.as_mut_ptr()) } < 0 {
        return Err(get_host_errno());
    }
    Ok((fds[0], fds[1]))
}

pub fn pipe() -> Result<(i32, i32), Errno> {
    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(get_host_errno());
    }
    Ok((fds[0], fds[1]))
}

pub fn shutdown(fd: i32, how: i32) -> Result<(), Errno> {
    if unsafe { libc::shutdown(fd, how) } < 0 {
        return Err(get_host_errno());
    }
    Ok(())
}

/// Queries the host socket type (SOCK_STREAM / SOCK_DGRAM).
pub fn sock_type(fd: i32) -> Result<i32, Errno> {
    let mut socktype: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let ret = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_TYPE,
            &mut socktype as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };
    if ret < 0 {
        return Err(get_host_errno());
    }
    Ok(socktype)
}

/// Creates an anonymous shared memory object. The name is unlinked
/// immediately, so only the descriptor refers to it.
pub fn shm_anon() -> Result<i32, Errno> {
    loop {
        let mut nonce = [0u8; 4];
        crate::interface::misc::random_buf(&mut nonce);
        let name = CString::new(format!("/anon{}", u32::from_ne_bytes(nonce))).unwrap();
        let fd = unsafe {
            libc::shm_open(
                name.as_ptr(),
                libc::O_RDWR | libc::O_EXCL | libc::O_CREAT,
                0o700 as libc::mode_t,
            )
        };
        if fd < 0 {
            let errno = get_host_errno();
            if errno == Errno::EEXIST {
                continue;
            }
            return Err(errno);
        }
        unsafe { libc::shm_unlink(name.as_ptr()) };
        return Ok(fd);
    }
}

fn empty_msghdr() -> libc::msghdr {
    unsafe { std::mem::zeroed::<libc::msghdr>() }
}

/// Sends the gather list with an SCM_RIGHTS header carrying the host
/// descriptor numbers. The caller is responsible for keeping those
/// descriptors alive across the call.
pub fn send_with_fds(sock: i32, iov: &[CIoVec], fds: &[i32]) -> Result<usize, Errno> {
    let mut hdr = empty_msghdr();
    hdr.msg_iov = iov.as_ptr() as *mut libc::iovec;
    hdr.msg_iovlen = iov.len() as _;

    let mut control = Vec::new();
    if !fds.is_empty() {
        let payload = fds.len() * std::mem::size_of::<i32>();
        control = vec![0u8; unsafe { libc::CMSG_SPACE(payload as u32) } as usize];
        hdr.msg_control = control.as_mut_ptr() as *mut libc::c_void;
        hdr.msg_controllen = control.len() as _;

        unsafe {
            let chdr = libc::CMSG_FIRSTHDR(&hdr);
            (*chdr).cmsg_len = libc::CMSG_LEN(payload as u32) as _;
            (*chdr).cmsg_level = libc::SOL_SOCKET;
            (*chdr).cmsg_type = libc::SCM_RIGHTS;
            std::ptr::copy_nonoverlapping(
                fds.as_ptr() as *const u8,
                libc::CMSG_DATA(chdr),
                payload,
            );
        }
    }

    let len = unsafe { libc::sendmsg(sock, &hdr, 0) };
    drop(control);
    if len < 0 {
        return Err(get_host_errno());
    }
    Ok(len as usize)
}

/// Receives into the scatter list, collecting up to max_fds descriptors
/// from SCM_RIGHTS headers. Returns (bytes received, host descriptors,
/// host msg_flags).
pub fn recv_with_fds(
    sock: i32,
    iov: &[IoVec],
    max_fds: usize,
    flags: i32,
) -> Result<(usize, Vec<i32>, i32), Errno> {
    let mut hdr = empty_msghdr();
    hdr.msg_iov = iov.as_ptr() as *mut libc::iovec;
    hdr.msg_iovlen = iov.len() as _;

    let mut control = Vec::new();
    if max_fds > 0 {
        let payload = max_fds * std::mem::size_of::<i32>();
        control = vec![0u8; unsafe { libc::CMSG_SPACE(payload as u32) } as usize];
        hdr.msg_control = control.as_mut_ptr() as *mut libc::c_void;
        hdr.msg_controllen = control.len() as _;
    }

    let len = unsafe { libc::recvmsg(sock, &mut hdr, flags) };
    if len < 0 {
        return Err(get_host_errno());
    }

    let mut fds = Vec::new();
    unsafe {
        let mut chdr = libc::CMSG_FIRSTHDR(&hdr);
        while !chdr.is_null() {
            if (*chdr).cmsg_level == libc::SOL_SOCKET && (*chdr).cmsg_type == libc::SCM_RIGHTS {
                let count = ((*chdr).cmsg_len as usize - libc::CMSG_LEN(0) as usize)
                    / std::mem::size_of::<i32>();
                for i in 0..count {
                    let mut nfd: i32 = 0;
                    std::ptr::copy_nonoverlapping(
                        libc::CMSG_DATA(chdr).add(i * std::mem::size_of::<i32>()),
                        &mut nfd as *mut i32 as *mut u8,
                        std::mem::size_of::<i32>(),
                    );
                    fds.push(nfd);
                }
            }
            chdr = libc::CMSG_NXTHDR(&hdr, chdr);
        }
    }
    drop(control);
    Ok((len as usize, fds, hdr.msg_flags))
}
