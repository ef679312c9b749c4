#[cfg(test)]
pub mod net_tests {
    use super::super::*;
    use crate::emulator::capsule::Capsule;
    use crate::emulator::syscalls::net_constants::*;
    use crate::interface::errnos::Errno;
    use crate::interface::types::*;

    #[test]
    pub fn ut_cap_net_send_recv_data() {
        let capsule = Capsule::new();
        let (a, b) = capsule
            .fd_create2_syscall(Filetype::SocketStream as u8)
            .unwrap();

        assert_eq!(
            capsule.sock_send_syscall(a, &[ciovec(b"hello")], &[]),
            Ok(5)
        );

        let mut buf = [0u8; 8];
        let mut no_fds: [Fd; 0] = [];
        let out = capsule
            .sock_recv_syscall(b, &[iovec(&mut buf)], &mut no_fds, 0)
            .unwrap();
        assert_eq!(out.ro_datalen, 5);
        assert_eq!(out.ro_fdslen, 0);
        assert_eq!(out.ro_flags, 0);
        assert_eq!(&buf[..5], b"hello");

        capsule.fd_close_syscall(a).unwrap();
        capsule.fd_close_syscall(b).unwrap();
    }

    #[test]
    pub fn ut_cap_net_recv_peek_leaves_data() {
        let capsule = Capsule::new();
        let (a, b) = capsule
            .fd_create2_syscall(Filetype::SocketStream as u8)
            .unwrap();
        capsule.sock_send_syscall(a, &[ciovec(b"twice")], &[]).unwrap();

        let mut buf = [0u8; 5];
        let mut no_fds: [Fd; 0] = [];
        let peeked = capsule
            .sock_recv_syscall(b, &[iovec(&mut buf)], &mut no_fds, SOCK_RECV_PEEK)
            .unwrap();
        assert_eq!(peeked.ro_datalen, 5);
        let read = capsule
            .sock_recv_syscall(b, &[iovec(&mut buf)], &mut no_fds, 0)
            .unwrap();
        assert_eq!(read.ro_datalen, 5);

        capsule.fd_close_syscall(a).unwrap();
        capsule.fd_close_syscall(b).unwrap();
    }

    #[test]
    pub fn ut_cap_net_descriptor_passing_round_trip() {
        let capsule = Capsule::new();
        let (a, b) = capsule
            .fd_create2_syscall(Filetype::SocketStream as u8)
            .unwrap();
        // The payload descriptor is a datagram socket so the type is
        // distinguishable after the trip.
        let (c, c_peer) = capsule
            .fd_create2_syscall(Filetype::SocketDgram as u8)
            .unwrap();

        assert_eq!(capsule.sock_send_syscall(a, &[ciovec(b"!")], &[c]), Ok(1));

        let mut buf = [0u8; 1];
        let mut slots: [Fd; 1] = [0];
        let out = capsule
            .sock_recv_syscall(b, &[iovec(&mut buf)], &mut slots, 0)
            .unwrap();
        assert_eq!(out.ro_datalen, 1);
        assert_eq!(out.ro_fdslen, 1);
        assert_eq!(out.ro_flags, 0);

        let imported = slots[0];
        assert_ne!(imported, INVALID_FD);
        assert_ne!(imported, c, "import allocates a fresh guest number");
        let stat = capsule.fd_stat_get_syscall(imported).unwrap();
        assert_eq!(stat.fs_filetype, Filetype::SocketDgram as u8);

        // The imported end is live: data written there arrives at the
        // original peer.
        capsule
            .sock_send_syscall(imported, &[ciovec(b"via-imported")], &[])
            .unwrap();
        let mut peer_buf = [0u8; 16];
        let mut no_fds: [Fd; 0] = [];
        let peer_out = capsule
            .sock_recv_syscall(c_peer, &[iovec(&mut peer_buf)], &mut no_fds, 0)
            .unwrap();
        assert_eq!(peer_out.ro_datalen, 12);

        for fd in [a, b, c, c_peer, imported] {
            capsule.fd_close_syscall(fd).unwrap();
        }
    }

    #[test]
    pub fn ut_cap_net_send_requires_write_right() {
        let capsule = Capsule::new();
        let (a, b) = capsule
            .fd_create2_syscall(Filetype::SocketStream as u8)
            .unwrap();
        capsule.sock_shutdown_syscall(a, SHUT_WR).unwrap();

        // After shutting down the write side the peer reads end-of-file.
        let mut buf = [0u8; 4];
        let mut no_fds: [Fd; 0] = [];
        let out = capsule
            .sock_recv_syscall(b, &[iovec(&mut buf)], &mut no_fds, 0)
            .unwrap();
        assert_eq!(out.ro_datalen, 0);

        assert_eq!(
            capsule.sock_shutdown_syscall(a, 7).unwrap_err(),
            Errno::EINVAL
        );
        assert_eq!(
            capsule.sock_send_syscall(9999, &[ciovec(b"x")], &[]),
            Err(Errno::EBADF)
        );

        capsule.fd_close_syscall(a).unwrap();
        capsule.fd_close_syscall(b).unwrap();
    }

    #[test]
    pub fn ut_cap_net_send_with_missing_attachment_fails_early() {
        let capsule = Capsule::new();
        let (a, b) = capsule
            .fd_create2_syscall(Filetype::SocketStream as u8)
            .unwrap();

        assert_eq!(
            capsule.sock_send_syscall(a, &[ciovec(b"x")], &[4242]),
            Err(Errno::EBADF)
        );

        // Nothing was transmitted: after closing the sender, the peer
        // sees a clean end-of-file instead of buffered data.
        capsule.fd_close_syscall(a).unwrap();
        let mut buf = [0u8; 1];
        let mut no_fds: [Fd; 0] = [];
        let out = capsule
            .sock_recv_syscall(b, &[iovec(&mut buf)], &mut no_fds, 0)
            .unwrap();
        assert_eq!(out.ro_datalen, 0);
        capsule.fd_close_syscall(b).unwrap();
    }
}
