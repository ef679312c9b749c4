// Guest error numbers and translation from host error numbers.
//
// The guest ABI exposes a fixed set of POSIX-derived error kinds plus
// ENOTCAPABLE for capability denials. Host errnos are mapped through the
// dense table in convert_host_errno; anything the table does not know
// becomes ENOSYS.

use std::io;

pub use Errno::*;

/// Error kinds visible to the guest. The discriminants are the guest ABI
/// values and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Errno {
    E2BIG = 1,
    EACCES = 2,
    EADDRINUSE = 3,
    EADDRNOTAVAIL = 4,
    EAFNOSUPPORT = 5,
    EAGAIN = 6,
    EALREADY = 7,
    EBADF = 8,
    EBADMSG = 9,
    EBUSY = 10,
    ECANCELED = 11,
    ECHILD = 12,
    ECONNABORTED = 13,
    ECONNREFUSED = 14,
    ECONNRESET = 15,
    EDEADLK = 16,
    EDESTADDRREQ = 17,
    EDOM = 18,
    EDQUOT = 19,
    EEXIST = 20,
    EFAULT = 21,
    EFBIG = 22,
    EHOSTUNREACH = 23,
    EIDRM = 24,
    EILSEQ = 25,
    EINPROGRESS = 26,
    EINTR = 27,
    EINVAL = 28,
    EIO = 29,
    EISCONN = 30,
    EISDIR = 31,
    ELOOP = 32,
    EMFILE = 33,
    EMLINK = 34,
    EMSGSIZE = 35,
    EMULTIHOP = 36,
    ENAMETOOLONG = 37,
    ENETDOWN = 38,
    ENETRESET = 39,
    ENETUNREACH = 40,
    ENFILE = 41,
    ENOBUFS = 42,
    ENODEV = 43,
    ENOENT = 44,
    ENOEXEC = 45,
    ENOLCK = 46,
    ENOLINK = 47,
    ENOMEM = 48,
    ENOMSG = 49,
    ENOPROTOOPT = 50,
    ENOSPC = 51,
    ENOSYS = 52,
    ENOTCONN = 53,
    ENOTDIR = 54,
    ENOTEMPTY = 55,
    ENOTRECOVERABLE = 56,
    ENOTSOCK = 57,
    ENOTSUP = 58,
    ENOTTY = 59,
    ENXIO = 60,
    EOVERFLOW = 61,
    EOWNERDEAD = 62,
    EPERM = 63,
    EPIPE = 64,
    EPROTO = 65,
    EPROTONOSUPPORT = 66,
    EPROTOTYPE = 67,
    ERANGE = 68,
    EROFS = 69,
    ESPIPE = 70,
    ESRCH = 71,
    ESTALE = 72,
    ETIMEDOUT = 73,
    ETXTBSY = 74,
    EXDEV = 75,
    /// Capability denial: the descriptor lacks a required right.
    ENOTCAPABLE = 76,
}

impl Errno {
    pub fn from_discriminant(discriminant: u16) -> Result<Self, ()> {
        if (1..=76).contains(&discriminant) {
            // Discriminants are dense, so the transmute is total over the range.
            Ok(unsafe { std::mem::transmute::<u16, Errno>(discriminant) })
        } else {
            Err(())
        }
    }
}

/// Central construction point for syscall failures. Logging here gives
/// every rights check and argument rejection an observable trace without
/// the syscalls having to carry their own logging.
pub fn syscall_error(errno: Errno, syscall: &str, message: &str) -> Errno {
    log::debug!("{}: {:?}: {}", syscall, errno, message);
    errno
}

/// Translates a host error number to a guest error kind.
pub fn convert_host_errno(error: i32) -> Errno {
    match error {
        libc::E2BIG => E2BIG,
        libc::EACCES => EACCES,
        libc::EADDRINUSE => EADDRINUSE,
        libc::EADDRNOTAVAIL => EADDRNOTAVAIL,
        libc::EAFNOSUPPORT => EAFNOSUPPORT,
        libc::EAGAIN => EAGAIN,
        libc::EALREADY => EALREADY,
        libc::EBADF => EBADF,
        libc::EBADMSG => EBADMSG,
        libc::EBUSY => EBUSY,
        libc::ECANCELED => ECANCELED,
        libc::ECHILD => ECHILD,
        libc::ECONNABORTED => ECONNABORTED,
        libc::ECONNREFUSED => ECONNREFUSED,
        libc::ECONNRESET => ECONNRESET,
        libc::EDEADLK => EDEADLK,
        libc::EDESTADDRREQ => EDESTADDRREQ,
        libc::EDOM => EDOM,
        libc::EDQUOT => EDQUOT,
        libc::EEXIST => EEXIST,
        libc::EFAULT => EFAULT,
        libc::EFBIG => EFBIG,
        libc::EHOSTUNREACH => EHOSTUNREACH,
        libc::EIDRM => EIDRM,
        libc::EILSEQ => EILSEQ,
        libc::EINPROGRESS => EINPROGRESS,
        libc::EINTR => EINTR,
        libc::EINVAL => EINVAL,
        libc::EIO => EIO,
        libc::EISCONN => EISCONN,
        libc::EISDIR => EISDIR,
        libc::ELOOP => ELOOP,
        libc::EMFILE => EMFILE,
        libc::EMLINK => EMLINK,
        libc::EMSGSIZE => EMSGSIZE,
        libc::EMULTIHOP => EMULTIHOP,
        libc::ENAMETOOLONG => ENAMETOOLONG,
        libc::ENETDOWN => ENETDOWN,
        libc::ENETRESET => ENETRESET,
        libc::ENETUNREACH => ENETUNREACH,
        libc::ENFILE => ENFILE,
        libc::ENOBUFS => ENOBUFS,
        libc::ENODEV => ENODEV,
        libc::ENOENT => ENOENT,
        libc::ENOEXEC => ENOEXEC,
        libc::ENOLCK => ENOLCK,
        libc::ENOLINK => ENOLINK,
        libc::ENOMEM => ENOMEM,
        libc::ENOMSG => ENOMSG,
        libc::ENOPROTOOPT => ENOPROTOOPT,
        libc::ENOSPC => ENOSPC,
        libc::ENOSYS => ENOSYS,
        libc::ENOTCONN => ENOTCONN,
        libc::ENOTDIR => ENOTDIR,
        libc::ENOTEMPTY => ENOTEMPTY,
        libc::ENOTRECOVERABLE => ENOTRECOVERABLE,
        libc::ENOTSOCK => ENOTSOCK,
        // EOPNOTSUPP and ENOTSUP share a value on Linux; both map here.
        libc::ENOTSUP => ENOTSUP,
        libc::ENOTTY => ENOTTY,
        libc::ENXIO => ENXIO,
        libc::EOVERFLOW => EOVERFLOW,
        libc::EOWNERDEAD => EOWNERDEAD,
        libc::EPERM => EPERM,
        libc::EPIPE => EPIPE,
        libc::EPROTO => EPROTO,
        libc::EPROTONOSUPPORT => EPROTONOSUPPORT,
        libc::EPROTOTYPE => EPROTOTYPE,
        libc::ERANGE => ERANGE,
        libc::EROFS => EROFS,
        libc::ESPIPE => ESPIPE,
        libc::ESRCH => ESRCH,
        libc::ESTALE => ESTALE,
        libc::ETIMEDOUT => ETIMEDOUT,
        libc::ETXTBSY => ETXTBSY,
        libc::EXDEV => EXDEV,
        _ => ENOSYS,
    }
}

/// Fetches and translates the calling thread's host errno.
pub fn get_host_errno() -> Errno {
    convert_host_errno(io::Error::last_os_error().raw_os_error().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminant_round_trip() {
        assert_eq!(Errno::from_discriminant(8), Ok(EBADF));
        assert_eq!(Errno::from_discriminant(76), Ok(ENOTCAPABLE));
        assert_eq!(Errno::from_discriminant(0), Err(()));
        assert_eq!(Errno::from_discriminant(77), Err(()));
    }

    #[test]
    fn host_translation() {
        assert_eq!(convert_host_errno(libc::EBADF), EBADF);
        assert_eq!(convert_host_errno(libc::EWOULDBLOCK), EAGAIN);
        assert_eq!(convert_host_errno(libc::EOPNOTSUPP), ENOTSUP);
        assert_eq!(convert_host_errno(0), ENOSYS);
        assert_eq!(convert_host_errno(9999), ENOSYS);
    }
}
