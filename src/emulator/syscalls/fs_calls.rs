// File system related system calls: everything that takes a pathname
// lease, plus the filestat calls on plain descriptors.

#![allow(dead_code)]

use super::fs_constants::*;
use crate::emulator::capsule::Capsule;
use crate::emulator::fdtable::insert_host_fd;
use crate::emulator::pathres::{path_get, path_get_nofollow};
use crate::emulator::rights::*;
use crate::interface;
use crate::interface::errnos::{syscall_error, Errno};
use crate::interface::types::*;

/// Converts a host stat structure into a guest filestat. The caller
/// fills in st_filetype, which the host mode alone cannot always name.
fn convert_stat(sb: &libc::stat) -> Filestat {
    Filestat {
        st_dev: sb.st_dev as u64,
        st_ino: sb.st_ino as u64,
        st_filetype: Filetype::Unknown as u8,
        st_nlink: sb.st_nlink as u32,
        st_size: sb.st_size as Filesize,
        st_atim: interface::convert_timespec(&libc::timespec {
            tv_sec: sb.st_atime,
            tv_nsec: sb.st_atime_nsec,
        }),
        st_mtim: interface::convert_timespec(&libc::timespec {
            tv_sec: sb.st_mtime,
            tv_nsec: sb.st_mtime_nsec,
        }),
        st_ctim: interface::convert_timespec(&libc::timespec {
            tv_sec: sb.st_ctime,
            tv_nsec: sb.st_ctime_nsec,
        }),
    }
}

/// Guest file type from a host mode, for stat results. Sockets cannot be
/// told apart by mode alone, so both kinds report as stream sockets.
fn filetype_from_mode(mode: libc::mode_t) -> u8 {
    (match mode & libc::S_IFMT {
        libc::S_IFBLK => Filetype::BlockDevice,
        libc::S_IFCHR => Filetype::CharacterDevice,
        libc::S_IFDIR => Filetype::Directory,
        libc::S_IFIFO => Filetype::SocketStream,
        libc::S_IFLNK => Filetype::SymbolicLink,
        libc::S_IFREG => Filetype::RegularFile,
        libc::S_IFSOCK => Filetype::SocketStream,
        _ => Filetype::Unknown,
    }) as u8
}

/// Builds the futimens/utimensat argument pair from a guest filestat and
/// its flags.
fn convert_utimens_arguments(fs: &Filestat, flags: u16) -> [libc::timespec; 2] {
    let omitted = libc::timespec {
        tv_sec: 0,
        tv_nsec: libc::UTIME_OMIT,
    };
    let now = libc::timespec {
        tv_sec: 0,
        tv_nsec: libc::UTIME_NOW,
    };
    let mut ts = [omitted; 2];
    if flags & FILESTAT_ATIM_NOW != 0 {
        ts[0] = now;
    } else if flags & FILESTAT_ATIM != 0 {
        ts[0] = interface::convert_timestamp(fs.st_atim);
    }
    if flags & FILESTAT_MTIM_NOW != 0 {
        ts[1] = now;
    } else if flags & FILESTAT_MTIM != 0 {
        ts[1] = interface::convert_timestamp(fs.st_mtim);
    }
    ts
}

fn convert_advice(advice: u8) -> Option<libc::c_int> {
    match advice {
        ADVICE_DONTNEED => Some(libc::POSIX_FADV_DONTNEED),
        ADVICE_NOREUSE => Some(libc::POSIX_FADV_NOREUSE),
        ADVICE_NORMAL => Some(libc::POSIX_FADV_NORMAL),
        ADVICE_RANDOM => Some(libc::POSIX_FADV_RANDOM),
        ADVICE_SEQUENTIAL => Some(libc::POSIX_FADV_SEQUENTIAL),
        ADVICE_WILLNEED => Some(libc::POSIX_FADV_WILLNEED),
        _ => None,
    }
}

/// Appends bytes to the output buffer, truncating at the end. Truncated
/// entries are how readdir tells the caller the buffer filled up.
fn readdir_put(buf: &mut [u8], bufused: &mut usize, elem: &[u8]) {
    let avail = buf.len() - *bufused;
    let len = std::cmp::min(elem.len(), avail);
    buf[*bufused..*bufused + len].copy_from_slice(&elem[..len]);
    *bufused += len;
}

fn filetype_from_dirent(kind: u8) -> u8 {
    (match kind {
        libc::DT_BLK => Filetype::BlockDevice,
        libc::DT_CHR => Filetype::CharacterDevice,
        libc::DT_DIR => Filetype::Directory,
        libc::DT_FIFO => Filetype::SocketStream,
        libc::DT_LNK => Filetype::SymbolicLink,
        libc::DT_REG => Filetype::RegularFile,
        // Not necessarily a stream socket, but as close as it gets.
        libc::DT_SOCK => Filetype::SocketStream,
        _ => Filetype::Unknown,
    }) as u8
}

impl Capsule {
    pub fn file_advise_syscall(
        &self,
        fd: Fd,
        offset: Filesize,
        len: Filesize,
        advice: u8,
    ) -> Result<(), Errno> {
        let nadvice = convert_advice(advice).ok_or_else(|| {
            syscall_error(Errno::EINVAL, "file_advise", "unknown advice value")
        })?;
        let fo = self.fdtable.acquire(fd, RIGHT_FILE_ADVISE, 0)?;
        interface::fadvise(fo.number(), offset, len, nadvice)
    }

    pub fn file_allocate_syscall(&self, fd: Fd, offset: Filesize, len: Filesize) -> Result<(), Errno> {
        let fo = self.fdtable.acquire(fd, RIGHT_FILE_ALLOCATE, 0)?;
        interface::fallocate(fo.number(), offset, len)
    }

    /// Creates a directory. Other file types cannot be created by this
    /// call; files come from file_open with O_CREAT.
    pub fn file_create_syscall(&self, dirfd: Fd, path: &[u8], filetype: u8) -> Result<(), Errno> {
        if filetype != Filetype::Directory as u8 {
            return Err(syscall_error(
                Errno::EINVAL,
                "file_create",
                "only directories can be created",
            ));
        }
        let pa = path_get_nofollow(
            &self.fdtable,
            dirfd,
            path,
            RIGHT_FILE_CREATE_DIRECTORY,
            0,
            true,
        )?;
        interface::mkdirat(pa.fd(), pa.leaf(), 0o777)
    }

    pub fn file_link_syscall(
        &self,
        dirfd1: Lookup,
        path1: &[u8],
        dirfd2: Fd,
        path2: &[u8],
    ) -> Result<(), Errno> {
        let pa1 = path_get(&self.fdtable, dirfd1, path1, RIGHT_FILE_LINK_SOURCE, 0, false)?;
        let pa2 = path_get_nofollow(&self.fdtable, dirfd2, path2, RIGHT_FILE_LINK_TARGET, 0, true)?;

        let mut ret = interface::linkat(pa1.fd(), pa1.leaf(), pa2.fd(), pa2.leaf(), pa1.follow());
        if ret == Err(Errno::ENOTSUP) && !pa1.follow() {
            // Some hosts refuse hard links to symbolic links. Duplicate
            // the symbolic link instead.
            if let Ok(target) = interface::readlinkat_alloc(pa1.fd(), pa1.leaf()) {
                let target = interface::null_terminate(&target)?;
                ret = interface::symlinkat(&target, pa2.fd(), pa2.leaf());
            }
        }
        ret
    }

    pub fn file_open_syscall(
        &self,
        dirfd: Lookup,
        path: &[u8],
        oflags: u16,
        fds: &Fdstat,
    ) -> Result<Fd, Errno> {
        // Rights that should be installed on the new file descriptor.
        let rights_base = fds.fs_rights_base;
        let rights_inheriting = fds.fs_rights_inheriting;

        // Which open() mode satisfies the needed rights.
        let read =
            rights_base & (RIGHT_FD_READ | RIGHT_FILE_READDIR | RIGHT_MEM_MAP_EXEC) != 0;
        let write = rights_base
            & (RIGHT_FD_DATASYNC
                | RIGHT_FD_WRITE
                | RIGHT_FILE_ALLOCATE
                | RIGHT_FILE_STAT_FPUT_SIZE)
            != 0;
        let mut noflags = if write {
            if read {
                libc::O_RDWR
            } else {
                libc::O_WRONLY
            }
        } else {
            libc::O_RDONLY
        };

        // Which rights are needed on the directory file descriptor.
        let mut needed_base = RIGHT_FILE_OPEN;
        let mut needed_inheriting = rights_base | rights_inheriting;

        if oflags & O_CREAT != 0 {
            noflags |= libc::O_CREAT;
            needed_base |= RIGHT_FILE_CREATE_FILE;
        }
        if oflags & O_DIRECTORY != 0 {
            noflags |= libc::O_DIRECTORY;
        }
        if oflags & O_EXCL != 0 {
            noflags |= libc::O_EXCL;
        }
        if oflags & O_TRUNC != 0 {
            noflags |= libc::O_TRUNC;
            needed_inheriting |= RIGHT_FILE_STAT_FPUT_SIZE;
        }

        if fds.fs_flags & FDFLAG_APPEND != 0 {
            noflags |= libc::O_APPEND;
        }
        if fds.fs_flags & FDFLAG_NONBLOCK != 0 {
            noflags |= libc::O_NONBLOCK;
        }
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
        {
            if fds.fs_flags & FDFLAG_DSYNC != 0 {
                noflags |= libc::O_DSYNC;
                needed_inheriting |= RIGHT_FD_DATASYNC;
            }
            if fds.fs_flags & FDFLAG_RSYNC != 0 {
                noflags |= libc::O_RSYNC;
                needed_inheriting |= RIGHT_FD_SYNC;
            }
        }
        #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
        {
            if fds.fs_flags & (FDFLAG_DSYNC | FDFLAG_RSYNC) != 0 {
                noflags |= libc::O_SYNC;
                needed_inheriting |= RIGHT_FD_SYNC;
            }
        }
        if fds.fs_flags & FDFLAG_SYNC != 0 {
            noflags |= libc::O_SYNC;
            needed_inheriting |= RIGHT_FD_SYNC;
        }
        if write && noflags & (libc::O_APPEND | libc::O_TRUNC) == 0 {
            needed_inheriting |= RIGHT_FD_SEEK;
        }

        let pa = path_get(
            &self.fdtable,
            dirfd,
            path,
            needed_base,
            needed_inheriting,
            oflags & O_CREAT != 0,
        )?;
        if !pa.follow() {
            noflags |= libc::O_NOFOLLOW;
        }

        let nfd = match interface::openat(pa.fd(), pa.leaf(), noflags, 0o777) {
            Ok(nfd) => nfd,
            Err(Errno::ENXIO) => {
                // Some hosts report ENXIO when opening a socket.
                return match interface::fstatat(pa.fd(), pa.leaf(), pa.follow()) {
                    Ok(sb) if sb.st_mode & libc::S_IFMT == libc::S_IFSOCK => {
                        Err(syscall_error(
                            Errno::ENOTSUP,
                            "file_open",
                            "sockets cannot be opened by path",
                        ))
                    }
                    _ => Err(Errno::ENXIO),
                };
            }
            // Hosts that misreport EMLINK when O_NOFOLLOW hits a symlink.
            Err(Errno::EMLINK) if !pa.follow() => return Err(Errno::ELOOP),
            Err(e) => return Err(e),
        };
        drop(pa);

        // Trim the requested rights down to what the opened file's type
        // can actually support.
        let (filetype, max_base, max_inheriting) =
            match crate::emulator::rights::determine_type_rights(nfd) {
                Ok(probe) => probe,
                Err(e) => {
                    interface::close(nfd);
                    return Err(e);
                }
            };
        Ok(insert_host_fd(
            &self.fdtable,
            nfd,
            filetype,
            rights_base & max_base,
            rights_inheriting & max_inheriting,
        ))
    }

    /// Reads directory entries into the caller's buffer, each serialised
    /// as a 24-byte header followed by the name. The last entry is
    /// truncated rather than dropped when the buffer runs out.
    pub fn file_readdir_syscall(
        &self,
        fd: Fd,
        buf: &mut [u8],
        cookie: Dircookie,
    ) -> Result<usize, Errno> {
        let fo = self.fdtable.acquire(fd, RIGHT_FILE_READDIR, 0)?;
        let mut dir = fo.directory().lock();

        // Create a directory stream if none has been opened yet. From
        // here on the stream owns the host descriptor.
        if dir.handle.is_none() {
            dir.handle = Some(interface::DirStream::from_fd(fo.number())?);
            dir.offset = DIRCOOKIE_START;
        }
        let crate::emulator::fdtable::DirState { handle, offset } = &mut *dir;
        let stream = handle.as_mut().expect("stream was just created");

        // Seek if the requested cookie does not match the cached cursor.
        if *offset != cookie {
            if cookie == DIRCOOKIE_START {
                stream.rewind();
            } else {
                stream.seek(cookie);
            }
            *offset = cookie;
        }

        let mut bufused = 0;
        while bufused < buf.len() {
            let entry = match stream.next_entry() {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    // A host error after some entries were written still
                    // counts as progress; it resurfaces on the next call.
                    if bufused > 0 {
                        break;
                    }
                    return Err(e);
                }
            };
            *offset = entry.next_pos;

            let mut header = [0u8; DIRENT_HEADER_SIZE];
            header[0..8].copy_from_slice(&entry.next_pos.to_ne_bytes());
            header[8..16].copy_from_slice(&entry.ino.to_ne_bytes());
            header[16..20].copy_from_slice(&(entry.name.len() as u32).to_ne_bytes());
            header[20] = filetype_from_dirent(entry.kind);
            readdir_put(buf, &mut bufused, &header);
            readdir_put(buf, &mut bufused, &entry.name);
        }
        Ok(bufused)
    }

    pub fn file_readlink_syscall(&self, fd: Fd, path: &[u8], buf: &mut [u8]) -> Result<usize, Errno> {
        let pa = path_get_nofollow(&self.fdtable, fd, path, RIGHT_FILE_READLINK, 0, false)?;

        // Some hosts insist on a positive buffer size where POSIX does
        // not; a scratch byte keeps them happy.
        let mut fakebuf = [0u8; 1];
        let len = if buf.is_empty() {
            interface::readlinkat(pa.fd(), pa.leaf(), &mut fakebuf)?
        } else {
            interface::readlinkat(pa.fd(), pa.leaf(), buf)?
        };
        Ok(std::cmp::min(len, buf.len()))
    }

    pub fn file_rename_syscall(
        &self,
        oldfd: Fd,
        old: &[u8],
        newfd: Fd,
        new: &[u8],
    ) -> Result<(), Errno> {
        let pa1 = path_get_nofollow(&self.fdtable, oldfd, old, RIGHT_FILE_RENAME_SOURCE, 0, true)?;
        let pa2 = path_get_nofollow(&self.fdtable, newfd, new, RIGHT_FILE_RENAME_TARGET, 0, true)?;
        match interface::renameat(pa1.fd(), pa1.leaf(), pa2.fd(), pa2.leaf()) {
            // Hosts report EBUSY in cases where EINVAL is better suited.
            Err(Errno::EBUSY) => Err(Errno::EINVAL),
            other => other,
        }
    }

    pub fn file_stat_fget_syscall(&self, fd: Fd) -> Result<Filestat, Errno> {
        let fo = self.fdtable.acquire(fd, RIGHT_FILE_STAT_FGET, 0)?;
        let sb = interface::fstat(fo.number())?;
        let mut buf = convert_stat(&sb);
        buf.st_filetype = fo.filetype() as u8;
        Ok(buf)
    }

    pub fn file_stat_fput_syscall(&self, fd: Fd, buf: &Filestat, flags: u16) -> Result<(), Errno> {
        const TIME_FLAGS: u16 =
            FILESTAT_ATIM | FILESTAT_ATIM_NOW | FILESTAT_MTIM | FILESTAT_MTIM_NOW;
        if flags & FILESTAT_SIZE != 0 {
            if flags & !FILESTAT_SIZE != 0 {
                return Err(syscall_error(
                    Errno::EINVAL,
                    "file_stat_fput",
                    "size cannot be combined with other fields",
                ));
            }
            let fo = self.fdtable.acquire(fd, RIGHT_FILE_STAT_FPUT_SIZE, 0)?;
            interface::ftruncate(fo.number(), buf.st_size)
        } else if flags & TIME_FLAGS != 0 {
            if flags & !TIME_FLAGS != 0 {
                return Err(syscall_error(
                    Errno::EINVAL,
                    "file_stat_fput",
                    "unknown filestat flags",
                ));
            }
            let fo = self.fdtable.acquire(fd, RIGHT_FILE_STAT_FPUT_TIMES, 0)?;
            interface::futimens(fo.number(), &convert_utimens_arguments(buf, flags))
        } else {
            Err(syscall_error(
                Errno::EINVAL,
                "file_stat_fput",
                "no fields selected",
            ))
        }
    }

    pub fn file_stat_get_syscall(&self, dirfd: Lookup, path: &[u8]) -> Result<Filestat, Errno> {
        let pa = path_get(&self.fdtable, dirfd, path, RIGHT_FILE_STAT_GET, 0, false)?;
        let sb = interface::fstatat(pa.fd(), pa.leaf(), pa.follow())?;
        let mut buf = convert_stat(&sb);
        buf.st_filetype = filetype_from_mode(sb.st_mode);
        Ok(buf)
    }

    pub fn file_stat_put_syscall(
        &self,
        dirfd: Lookup,
        path: &[u8],
        buf: &Filestat,
        flags: u16,
    ) -> Result<(), Errno> {
        const TIME_FLAGS: u16 =
            FILESTAT_ATIM | FILESTAT_ATIM_NOW | FILESTAT_MTIM | FILESTAT_MTIM_NOW;
        if flags & !TIME_FLAGS != 0 {
            return Err(syscall_error(
                Errno::EINVAL,
                "file_stat_put",
                "only timestamps can be changed by path",
            ));
        }
        let pa = path_get(&self.fdtable, dirfd, path, RIGHT_FILE_STAT_PUT_TIMES, 0, false)?;
        interface::utimensat(
            pa.fd(),
            pa.leaf(),
            &convert_utimens_arguments(buf, flags),
            pa.follow(),
        )
    }

    pub fn file_symlink_syscall(&self, path1: &[u8], fd: Fd, path2: &[u8]) -> Result<(), Errno> {
        let target = interface::null_terminate(path1)?;
        let pa = path_get_nofollow(&self.fdtable, fd, path2, RIGHT_FILE_SYMLINK, 0, true)?;
        interface::symlinkat(&target, pa.fd(), pa.leaf())
    }

    pub fn file_unlink_syscall(&self, fd: Fd, path: &[u8], flags: u16) -> Result<(), Errno> {
        let pa = path_get_nofollow(&self.fdtable, fd, path, RIGHT_FILE_UNLINK, 0, true)?;
        match interface::unlinkat(pa.fd(), pa.leaf(), flags & UNLINK_REMOVEDIR != 0) {
            // Hosts report EISDIR where POSIX requires EPERM.
            Err(Errno::EISDIR) => Err(Errno::EPERM),
            other => other,
        }
    }
}
