// Socket system calls. The interesting part is descriptor passing:
// attached descriptors travel as ancillary data, and received ones are
// re-probed and installed like any other import.

use super::net_constants::*;
use crate::emulator::capsule::Capsule;
use crate::emulator::fdtable::insert_host_fd;
use crate::emulator::rights::*;
use crate::interface;
use crate::interface::errnos::{syscall_error, Errno};
use crate::interface::types::*;

impl Capsule {
    pub fn sock_recv_syscall(
        &self,
        sock: Fd,
        ri_data: &[IoVec],
        ri_fds: &mut [Fd],
        ri_flags: u16,
    ) -> Result<RecvOut, Errno> {
        let mut nflags = 0;
        if ri_flags & SOCK_RECV_PEEK != 0 {
            nflags |= libc::MSG_PEEK;
        }
        if ri_flags & SOCK_RECV_WAITALL != 0 {
            nflags |= libc::MSG_WAITALL;
        }

        let fo = self.fdtable.acquire(sock, RIGHT_FD_READ, 0)?;
        let (datalen, host_fds, msg_flags) =
            interface::recv_with_fds(fo.number(), ri_data, ri_fds.len(), nflags)?;
        drop(fo);

        // Install the received descriptors. A descriptor that cannot be
        // classified is closed and reported as invalid rather than
        // failing the whole receive.
        let mut fdslen = 0;
        for nfd in host_fds {
            if fdslen == ri_fds.len() {
                interface::close(nfd);
                continue;
            }
            ri_fds[fdslen] = match crate::emulator::rights::determine_type_rights(nfd) {
                Ok((filetype, base, inheriting)) => {
                    insert_host_fd(&self.fdtable, nfd, filetype, base, inheriting)
                }
                Err(_) => {
                    interface::close(nfd);
                    INVALID_FD
                }
            };
            fdslen += 1;
        }

        let mut out = RecvOut {
            ro_datalen: datalen,
            ro_fdslen: fdslen,
            ro_flags: 0,
        };
        if msg_flags & libc::MSG_CTRUNC != 0 {
            out.ro_flags |= SOCK_RECV_FDS_TRUNCATED;
        }
        if msg_flags & libc::MSG_TRUNC != 0 {
            out.ro_flags |= SOCK_RECV_DATA_TRUNCATED;
        }
        Ok(out)
    }

    pub fn sock_send_syscall(
        &self,
        sock: Fd,
        si_data: &[CIoVec],
        si_fds: &[Fd],
    ) -> Result<usize, Errno> {
        // References to the attached descriptors are taken under one
        // shared lock and held across the host send, so a concurrent
        // close cannot invalidate the numbers in flight.
        let fos = self.fdtable.acquire_many(si_fds, 0)?;
        let mut host_fds = Vec::with_capacity(fos.len());
        for fo in &fos {
            if fo.is_virtual() {
                return Err(syscall_error(
                    Errno::EBADF,
                    "sock_send",
                    "descriptor has no host number to transmit",
                ));
            }
            host_fds.push(fo.number());
        }

        let fo = self.fdtable.acquire(sock, RIGHT_FD_WRITE, 0)?;
        let len = interface::send_with_fds(fo.number(), si_data, &host_fds)?;
        drop(fo);
        drop(fos);
        Ok(len)
    }

    pub fn sock_shutdown_syscall(&self, sock: Fd, how: u8) -> Result<(), Errno> {
        let nhow = match how {
            SHUT_RD => libc::SHUT_RD,
            SHUT_WR => libc::SHUT_WR,
            x if x == SHUT_RD | SHUT_WR => libc::SHUT_RDWR,
            _ => {
                return Err(syscall_error(
                    Errno::EINVAL,
                    "sock_shutdown",
                    "unknown shutdown direction",
                ))
            }
        };
        let fo = self.fdtable.acquire(sock, RIGHT_SOCK_SHUTDOWN, 0)?;
        interface::shutdown(fo.number(), nhow)
    }
}
