// The rights model: one bit per guest operation, and for every guest
// file type the maximum set of rights a descriptor of that type can
// carry. Rights only ever shrink after a descriptor is created.

use crate::interface;
use crate::interface::errnos::{syscall_error, Errno};
use crate::interface::types::{Filetype, Rights};

pub const RIGHT_FD_DATASYNC: Rights = 1 << 0;
pub const RIGHT_FD_READ: Rights = 1 << 1;
pub const RIGHT_FD_SEEK: Rights = 1 << 2;
pub const RIGHT_FD_STAT_PUT_FLAGS: Rights = 1 << 3;
pub const RIGHT_FD_SYNC: Rights = 1 << 4;
pub const RIGHT_FD_TELL: Rights = 1 << 5;
pub const RIGHT_FD_WRITE: Rights = 1 << 6;
pub const RIGHT_FILE_ADVISE: Rights = 1 << 7;
pub const RIGHT_FILE_ALLOCATE: Rights = 1 << 8;
pub const RIGHT_FILE_CREATE_DIRECTORY: Rights = 1 << 9;
pub const RIGHT_FILE_CREATE_FILE: Rights = 1 << 10;
pub const RIGHT_FILE_LINK_SOURCE: Rights = 1 << 11;
pub const RIGHT_FILE_LINK_TARGET: Rights = 1 << 12;
pub const RIGHT_FILE_OPEN: Rights = 1 << 13;
pub const RIGHT_FILE_READDIR: Rights = 1 << 14;
pub const RIGHT_FILE_READLINK: Rights = 1 << 15;
pub const RIGHT_FILE_RENAME_SOURCE: Rights = 1 << 16;
pub const RIGHT_FILE_RENAME_TARGET: Rights = 1 << 17;
pub const RIGHT_FILE_STAT_FGET: Rights = 1 << 18;
pub const RIGHT_FILE_STAT_FPUT_SIZE: Rights = 1 << 19;
pub const RIGHT_FILE_STAT_FPUT_TIMES: Rights = 1 << 20;
pub const RIGHT_FILE_STAT_GET: Rights = 1 << 21;
pub const RIGHT_FILE_STAT_PUT_TIMES: Rights = 1 << 22;
pub const RIGHT_FILE_SYMLINK: Rights = 1 << 23;
pub const RIGHT_FILE_UNLINK: Rights = 1 << 24;
pub const RIGHT_MEM_MAP: Rights = 1 << 25;
pub const RIGHT_MEM_MAP_EXEC: Rights = 1 << 26;
pub const RIGHT_POLL_FD_READWRITE: Rights = 1 << 27;
pub const RIGHT_SOCK_SHUTDOWN: Rights = 1 << 28;

pub const RIGHTS_REGULAR_FILE_BASE: Rights = RIGHT_FD_DATASYNC
    | RIGHT_FD_READ
    | RIGHT_FD_SEEK
    | RIGHT_FD_STAT_PUT_FLAGS
    | RIGHT_FD_SYNC
    | RIGHT_FD_TELL
    | RIGHT_FD_WRITE
    | RIGHT_FILE_ADVISE
    | RIGHT_FILE_ALLOCATE
    | RIGHT_FILE_STAT_FGET
    | RIGHT_FILE_STAT_FPUT_SIZE
    | RIGHT_FILE_STAT_FPUT_TIMES
    | RIGHT_MEM_MAP
    | RIGHT_MEM_MAP_EXEC
    | RIGHT_POLL_FD_READWRITE;
pub const RIGHTS_REGULAR_FILE_INHERITING: Rights = 0;

pub const RIGHTS_DIRECTORY_BASE: Rights = RIGHT_FD_STAT_PUT_FLAGS
    | RIGHT_FD_SYNC
    | RIGHT_FILE_ADVISE
    | RIGHT_FILE_CREATE_DIRECTORY
    | RIGHT_FILE_CREATE_FILE
    | RIGHT_FILE_LINK_SOURCE
    | RIGHT_FILE_LINK_TARGET
    | RIGHT_FILE_OPEN
    | RIGHT_FILE_READDIR
    | RIGHT_FILE_READLINK
    | RIGHT_FILE_RENAME_SOURCE
    | RIGHT_FILE_RENAME_TARGET
    | RIGHT_FILE_STAT_FGET
    | RIGHT_FILE_STAT_FPUT_TIMES
    | RIGHT_FILE_STAT_GET
    | RIGHT_FILE_STAT_PUT_TIMES
    | RIGHT_FILE_SYMLINK
    | RIGHT_FILE_UNLINK
    | RIGHT_POLL_FD_READWRITE;
pub const RIGHTS_DIRECTORY_INHERITING: Rights = RIGHTS_DIRECTORY_BASE | RIGHTS_REGULAR_FILE_BASE;

pub const RIGHTS_BLOCK_DEVICE_BASE: Rights = RIGHTS_REGULAR_FILE_BASE;
pub const RIGHTS_BLOCK_DEVICE_INHERITING: Rights = 0;

pub const RIGHTS_CHARACTER_DEVICE_BASE: Rights = RIGHTS_REGULAR_FILE_BASE;
pub const RIGHTS_CHARACTER_DEVICE_INHERITING: Rights = 0;

pub const RIGHTS_TTY_BASE: Rights =
    RIGHT_FD_READ | RIGHT_FD_STAT_PUT_FLAGS | RIGHT_FD_WRITE | RIGHT_POLL_FD_READWRITE;
pub const RIGHTS_TTY_INHERITING: Rights = 0;

pub const RIGHTS_SOCKET_BASE: Rights = RIGHT_FD_READ
    | RIGHT_FD_STAT_PUT_FLAGS
    | RIGHT_FD_WRITE
    | RIGHT_POLL_FD_READWRITE
    | RIGHT_SOCK_SHUTDOWN;
pub const RIGHTS_SOCKET_INHERITING: Rights = 0;

pub const RIGHTS_SHARED_MEMORY_BASE: Rights = RIGHT_FD_READ
    | RIGHT_FD_WRITE
    | RIGHT_FILE_STAT_FGET
    | RIGHT_FILE_STAT_FPUT_SIZE
    | RIGHT_MEM_MAP
    | RIGHT_MEM_MAP_EXEC;
pub const RIGHTS_SHARED_MEMORY_INHERITING: Rights = 0;

/// Probes a host descriptor and returns the guest file type together
/// with the maximum rights that type permits. Read/write rights are
/// stripped when the host access mode excludes them.
pub fn determine_type_rights(host_fd: i32) -> Result<(Filetype, Rights, Rights), Errno> {
    let sb = interface::fstat(host_fd)?;
    let (filetype, mut base, inheriting) = match sb.st_mode & libc::S_IFMT {
        libc::S_IFBLK => (
            Filetype::BlockDevice,
            RIGHTS_BLOCK_DEVICE_BASE,
            RIGHTS_BLOCK_DEVICE_INHERITING,
        ),
        libc::S_IFCHR => {
            if interface::isatty(host_fd) {
                (Filetype::CharacterDevice, RIGHTS_TTY_BASE, RIGHTS_TTY_INHERITING)
            } else {
                (
                    Filetype::CharacterDevice,
                    RIGHTS_CHARACTER_DEVICE_BASE,
                    RIGHTS_CHARACTER_DEVICE_INHERITING,
                )
            }
        }
        libc::S_IFDIR => (
            Filetype::Directory,
            RIGHTS_DIRECTORY_BASE,
            RIGHTS_DIRECTORY_INHERITING,
        ),
        libc::S_IFREG => (
            Filetype::RegularFile,
            RIGHTS_REGULAR_FILE_BASE,
            RIGHTS_REGULAR_FILE_INHERITING,
        ),
        libc::S_IFSOCK => {
            let filetype = match interface::sock_type(host_fd)? {
                libc::SOCK_DGRAM => Filetype::SocketDgram,
                libc::SOCK_STREAM => Filetype::SocketStream,
                _ => {
                    return Err(syscall_error(
                        Errno::EINVAL,
                        "determine_type_rights",
                        "socket type cannot be expressed to the guest",
                    ))
                }
            };
            (filetype, RIGHTS_SOCKET_BASE, RIGHTS_SOCKET_INHERITING)
        }
        // Pipes are presented to the guest as stream sockets.
        libc::S_IFIFO => (
            Filetype::SocketStream,
            RIGHTS_SOCKET_BASE,
            RIGHTS_SOCKET_INHERITING,
        ),
        _ => {
            return Err(syscall_error(
                Errno::EINVAL,
                "determine_type_rights",
                "host mode has no guest file type",
            ))
        }
    };

    match interface::fcntl_getfl(host_fd).unwrap_or(0) & libc::O_ACCMODE {
        libc::O_RDONLY => base &= !RIGHT_FD_WRITE,
        libc::O_WRONLY => base &= !RIGHT_FD_READ,
        _ => {}
    }
    Ok((filetype, base, inheriting))
}
