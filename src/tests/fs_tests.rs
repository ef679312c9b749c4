#[cfg(test)]
pub mod fs_tests {
    use super::super::*;
    use crate::emulator::capsule::Capsule;
    use crate::emulator::rights::*;
    use crate::emulator::syscalls::fs_constants::*;
    use crate::interface;
    use crate::interface::errnos::Errno;
    use crate::interface::types::*;

    fn lookup(fd: Fd) -> Lookup {
        Lookup { fd, flags: 0 }
    }

    fn lookup_follow(fd: Fd) -> Lookup {
        Lookup {
            fd,
            flags: LOOKUP_SYMLINK_FOLLOW,
        }
    }

    #[test]
    pub fn ut_cap_fs_escape_blocked() {
        let dir = scratch_dir("escape");
        std::fs::write(dir.parent().unwrap().join("outside-escape"), b"secret").unwrap();
        let capsule = Capsule::new();
        let dirfd = seed_dir(&capsule, &dir);

        // Neither dot-dot nor absolute paths may leave the directory.
        assert_eq!(
            capsule
                .file_open_syscall(lookup(dirfd), b"../outside-escape", 0, &rw_fdstat())
                .unwrap_err(),
            Errno::ENOTCAPABLE
        );
        assert_eq!(
            capsule
                .file_stat_get_syscall(lookup(dirfd), b"../outside-escape")
                .unwrap_err(),
            Errno::ENOTCAPABLE
        );
        assert_eq!(
            capsule
                .file_stat_get_syscall(lookup(dirfd), b"/etc/passwd")
                .unwrap_err(),
            Errno::ENOTCAPABLE
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_dotdot_inside_stays_inside() {
        let dir = scratch_dir("dotdot");
        std::fs::create_dir(dir.join("a")).unwrap();
        std::fs::write(dir.join("b"), b"payload").unwrap();
        let capsule = Capsule::new();
        let dirfd = seed_dir(&capsule, &dir);

        // "a/../b" normalises to "b" without ever passing the root.
        let stat = capsule
            .file_stat_get_syscall(lookup(dirfd), b"a/../b")
            .unwrap();
        assert_eq!(stat.st_filetype, Filetype::RegularFile as u8);
        assert_eq!(stat.st_size, 7);

        assert_eq!(
            capsule
                .file_stat_get_syscall(lookup(dirfd), b"../b")
                .unwrap_err(),
            Errno::ENOTCAPABLE
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_symlink_out_blocked() {
        let dir = scratch_dir("symout");
        std::fs::write(dir.parent().unwrap().join("outside-symout"), b"x").unwrap();
        std::os::unix::fs::symlink("../outside-symout", dir.join("sneaky")).unwrap();
        std::os::unix::fs::symlink("/etc/passwd", dir.join("blatant")).unwrap();
        let capsule = Capsule::new();
        let dirfd = seed_dir(&capsule, &dir);

        assert_eq!(
            capsule
                .file_stat_get_syscall(lookup_follow(dirfd), b"sneaky")
                .unwrap_err(),
            Errno::ENOTCAPABLE
        );
        assert_eq!(
            capsule
                .file_stat_get_syscall(lookup_follow(dirfd), b"blatant")
                .unwrap_err(),
            Errno::ENOTCAPABLE
        );

        // Without following, the link itself is visible.
        let stat = capsule
            .file_stat_get_syscall(lookup(dirfd), b"sneaky")
            .unwrap();
        assert_eq!(stat.st_filetype, Filetype::SymbolicLink as u8);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_symlink_inside_followed() {
        let dir = scratch_dir("symin");
        std::fs::create_dir(dir.join("sub")).unwrap();
        std::fs::write(dir.join("sub/data"), b"linked").unwrap();
        std::os::unix::fs::symlink("sub/data", dir.join("alias")).unwrap();
        let capsule = Capsule::new();
        let dirfd = seed_dir(&capsule, &dir);

        let fd = capsule
            .file_open_syscall(lookup_follow(dirfd), b"alias", 0, &rw_fdstat())
            .unwrap();
        let mut buf = [0u8; 6];
        assert_eq!(capsule.fd_read_syscall(fd, &[iovec(&mut buf)]), Ok(6));
        assert_eq!(&buf, b"linked");
        capsule.fd_close_syscall(fd).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_symlink_cycle_detected() {
        let dir = scratch_dir("cycle");
        std::os::unix::fs::symlink("b", dir.join("a")).unwrap();
        std::os::unix::fs::symlink("a", dir.join("b")).unwrap();
        let capsule = Capsule::new();
        let dirfd = seed_dir(&capsule, &dir);

        assert_eq!(
            capsule
                .file_open_syscall(lookup_follow(dirfd), b"a", 0, &rw_fdstat())
                .unwrap_err(),
            Errno::ELOOP
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_trailing_slash_requires_directory() {
        let dir = scratch_dir("slash");
        std::fs::write(dir.join("plain"), b"x").unwrap();
        let capsule = Capsule::new();
        let dirfd = seed_dir(&capsule, &dir);

        assert_eq!(
            capsule
                .file_stat_get_syscall(lookup(dirfd), b"plain/")
                .unwrap_err(),
            Errno::ENOTDIR
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_interior_nul_rejected() {
        let dir = scratch_dir("nul");
        let capsule = Capsule::new();
        let dirfd = seed_dir(&capsule, &dir);
        assert_eq!(
            capsule
                .file_stat_get_syscall(lookup(dirfd), b"a\0b")
                .unwrap_err(),
            Errno::EINVAL
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_open_create_write_read() {
        let dir = scratch_dir("openrw");
        let capsule = Capsule::new();
        let dirfd = seed_dir(&capsule, &dir);

        let fd = capsule
            .file_open_syscall(lookup(dirfd), b"fresh", O_CREAT, &rw_fdstat())
            .unwrap();
        assert_eq!(capsule.fd_write_syscall(fd, &[ciovec(b"hello world!")]), Ok(12));
        assert_eq!(capsule.fd_seek_syscall(fd, 0, WHENCE_SET), Ok(0));
        let mut buf = [0u8; 12];
        assert_eq!(capsule.fd_read_syscall(fd, &[iovec(&mut buf)]), Ok(12));
        assert_eq!(&buf, b"hello world!");
        capsule.fd_close_syscall(fd).unwrap();

        // Exclusive creation of an existing file fails.
        assert_eq!(
            capsule
                .file_open_syscall(lookup(dirfd), b"fresh", O_CREAT | O_EXCL, &rw_fdstat())
                .unwrap_err(),
            Errno::EEXIST
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_open_rights_capped_by_type() {
        let dir = scratch_dir("caps");
        let capsule = Capsule::new();
        let dirfd = seed_dir(&capsule, &dir);

        // Ask for directory rights on a regular file; the probe caps the
        // stored rights at what the type supports.
        let mut fdstat = rw_fdstat();
        fdstat.fs_rights_base |= RIGHT_FILE_READDIR;
        let fd = capsule
            .file_open_syscall(lookup(dirfd), b"f", O_CREAT, &fdstat)
            .unwrap();
        let stat = capsule.fd_stat_get_syscall(fd).unwrap();
        assert_eq!(stat.fs_rights_base & RIGHT_FILE_READDIR, 0);
        assert_ne!(stat.fs_rights_base & RIGHT_FD_READ, 0);
        capsule.fd_close_syscall(fd).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_open_needs_open_right() {
        let dir = scratch_dir("noopen");
        std::fs::write(dir.join("f"), b"x").unwrap();
        let capsule = Capsule::new();
        let host_fd = open_host_dir(&dir);
        let dirfd = capsule.fdtable.insert(
            crate::emulator::fdtable::FdObject::new(Filetype::Directory, host_fd),
            RIGHTS_DIRECTORY_BASE & !RIGHT_FILE_OPEN,
            RIGHTS_DIRECTORY_INHERITING,
        );

        assert_eq!(
            capsule
                .file_open_syscall(lookup(dirfd), b"f", 0, &rw_fdstat())
                .unwrap_err(),
            Errno::ENOTCAPABLE
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_create_and_unlink_directory() {
        let dir = scratch_dir("mkdir");
        let capsule = Capsule::new();
        let dirfd = seed_dir(&capsule, &dir);

        capsule
            .file_create_syscall(dirfd, b"d", Filetype::Directory as u8)
            .unwrap();
        let stat = capsule.file_stat_get_syscall(lookup(dirfd), b"d").unwrap();
        assert_eq!(stat.st_filetype, Filetype::Directory as u8);

        // Removing a directory without the removedir flag is refused
        // with EPERM even on hosts that report EISDIR.
        assert_eq!(
            capsule.file_unlink_syscall(dirfd, b"d", 0).unwrap_err(),
            Errno::EPERM
        );
        capsule
            .file_unlink_syscall(dirfd, b"d", UNLINK_REMOVEDIR)
            .unwrap();
        assert_eq!(
            capsule
                .file_stat_get_syscall(lookup(dirfd), b"d")
                .unwrap_err(),
            Errno::ENOENT
        );

        assert_eq!(
            capsule
                .file_create_syscall(dirfd, b"f", Filetype::RegularFile as u8)
                .unwrap_err(),
            Errno::EINVAL
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_rename_and_link() {
        let dir = scratch_dir("renln");
        std::fs::write(dir.join("one"), b"payload").unwrap();
        let capsule = Capsule::new();
        let dirfd = seed_dir(&capsule, &dir);

        capsule
            .file_rename_syscall(dirfd, b"one", dirfd, b"two")
            .unwrap();
        assert_eq!(
            capsule
                .file_stat_get_syscall(lookup(dirfd), b"one")
                .unwrap_err(),
            Errno::ENOENT
        );

        capsule
            .file_link_syscall(lookup(dirfd), b"two", dirfd, b"three")
            .unwrap();
        let stat = capsule
            .file_stat_get_syscall(lookup(dirfd), b"three")
            .unwrap();
        assert_eq!(stat.st_nlink, 2);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_symlink_and_readlink() {
        let dir = scratch_dir("readlink");
        let capsule = Capsule::new();
        let dirfd = seed_dir(&capsule, &dir);

        capsule
            .file_symlink_syscall(b"some/target", dirfd, b"link")
            .unwrap();

        let mut buf = [0u8; 32];
        let len = capsule
            .file_readlink_syscall(dirfd, b"link", &mut buf)
            .unwrap();
        assert_eq!(&buf[..len], b"some/target");

        // A zero-length buffer reports zero bytes instead of failing.
        assert_eq!(
            capsule.file_readlink_syscall(dirfd, b"link", &mut []),
            Ok(0)
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_stat_put_times_round_trip() {
        let dir = scratch_dir("times");
        std::fs::write(dir.join("f"), b"x").unwrap();
        let capsule = Capsule::new();
        let dirfd = seed_dir(&capsule, &dir);

        let put = Filestat {
            st_atim: 5_000_000_000,
            st_mtim: 7_000_000_000,
            ..Filestat::default()
        };
        capsule
            .file_stat_put_syscall(lookup(dirfd), b"f", &put, FILESTAT_ATIM | FILESTAT_MTIM)
            .unwrap();

        let got = capsule.file_stat_get_syscall(lookup(dirfd), b"f").unwrap();
        assert_eq!(got.st_atim, 5_000_000_000);
        assert_eq!(got.st_mtim, 7_000_000_000);

        assert_eq!(
            capsule
                .file_stat_put_syscall(lookup(dirfd), b"f", &put, FILESTAT_SIZE)
                .unwrap_err(),
            Errno::EINVAL
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_stat_fput_size_then_fget() {
        let dir = scratch_dir("truncate");
        let capsule = Capsule::new();
        let dirfd = seed_dir(&capsule, &dir);

        let mut fdstat = rw_fdstat();
        fdstat.fs_rights_base |= RIGHT_FILE_STAT_FPUT_SIZE;
        let fd = capsule
            .file_open_syscall(lookup(dirfd), b"f", O_CREAT, &fdstat)
            .unwrap();

        let put = Filestat {
            st_size: 4096,
            ..Filestat::default()
        };
        capsule
            .file_stat_fput_syscall(fd, &put, FILESTAT_SIZE)
            .unwrap();
        let got = capsule.file_stat_fget_syscall(fd).unwrap();
        assert_eq!(got.st_size, 4096);
        assert_eq!(got.st_filetype, Filetype::RegularFile as u8);

        // Size combined with timestamps is rejected.
        assert_eq!(
            capsule
                .file_stat_fput_syscall(fd, &put, FILESTAT_SIZE | FILESTAT_MTIM)
                .unwrap_err(),
            Errno::EINVAL
        );
        capsule.fd_close_syscall(fd).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_advise_and_allocate() {
        let dir = scratch_dir("advise");
        let capsule = Capsule::new();
        let dirfd = seed_dir(&capsule, &dir);

        let mut fdstat = rw_fdstat();
        fdstat.fs_rights_base |= RIGHT_FILE_ADVISE | RIGHT_FILE_ALLOCATE;
        let fd = capsule
            .file_open_syscall(lookup(dirfd), b"f", O_CREAT, &fdstat)
            .unwrap();

        capsule
            .file_advise_syscall(fd, 0, 4096, ADVICE_SEQUENTIAL)
            .unwrap();
        assert_eq!(
            capsule.file_advise_syscall(fd, 0, 0, 99).unwrap_err(),
            Errno::EINVAL
        );

        capsule.file_allocate_syscall(fd, 0, 8192).unwrap();
        let got = capsule.file_stat_fget_syscall(fd).unwrap();
        assert_eq!(got.st_size, 8192);
        capsule.fd_close_syscall(fd).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_readdir_pagination() {
        let dir = scratch_dir("readdir");
        for i in 0..10 {
            std::fs::write(dir.join(format!("entry{:03}", i)), b"").unwrap();
        }
        let capsule = Capsule::new();
        let dirfd = seed_dir(&capsule, &dir);

        // Collect every entry through a buffer that forces several
        // calls; each continuation uses the cookie of the last complete
        // entry from the previous call.
        let mut names = Vec::new();
        let mut cookie = DIRCOOKIE_START;
        loop {
            let mut buf = [0u8; 128];
            let used = capsule
                .file_readdir_syscall(dirfd, &mut buf, cookie)
                .unwrap();
            if used == 0 {
                break;
            }
            let (entries, truncated) = parse_dirents(&buf[..used]);
            assert!(!entries.is_empty(), "buffer too small for one entry");
            for (next, name) in &entries {
                names.push(String::from_utf8(name.clone()).unwrap());
                cookie = *next;
            }
            if !truncated && used < buf.len() {
                break;
            }
        }

        // All ten files appear exactly once, next to the dot entries.
        let mut data_names: Vec<_> = names
            .iter()
            .filter(|name| name.starts_with("entry"))
            .cloned()
            .collect();
        data_names.sort();
        assert_eq!(data_names.len(), 10);
        for (i, name) in data_names.iter().enumerate() {
            assert_eq!(name, &format!("entry{:03}", i));
        }
        let dot_count = names.iter().filter(|name| *name == "." || *name == "..").count();
        assert_eq!(dot_count, 2);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_readdir_tiny_buffer_truncates() {
        let dir = scratch_dir("tiny");
        std::fs::write(dir.join("somename"), b"").unwrap();
        let capsule = Capsule::new();
        let dirfd = seed_dir(&capsule, &dir);

        // Smaller than one header: the call fills the buffer with the
        // truncated head of the first entry. Callers detect a full
        // buffer with no complete entry and grow.
        let mut buf = [0u8; 16];
        let used = capsule
            .file_readdir_syscall(dirfd, &mut buf, DIRCOOKIE_START)
            .unwrap();
        assert_eq!(used, 16);
        let (entries, truncated) = parse_dirents(&buf[..used]);
        assert!(entries.is_empty());
        assert!(truncated);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_readdir_rewind() {
        let dir = scratch_dir("rewind");
        std::fs::write(dir.join("only"), b"").unwrap();
        let capsule = Capsule::new();
        let dirfd = seed_dir(&capsule, &dir);

        let mut buf = [0u8; 512];
        let first = capsule
            .file_readdir_syscall(dirfd, &mut buf, DIRCOOKIE_START)
            .unwrap();
        let again = capsule
            .file_readdir_syscall(dirfd, &mut buf, DIRCOOKIE_START)
            .unwrap();
        assert_eq!(first, again);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    pub fn ut_cap_fs_readdir_needs_right() {
        let dir = scratch_dir("rdright");
        let capsule = Capsule::new();
        let host_fd = open_host_dir(&dir);
        let dirfd = capsule.fdtable.insert(
            crate::emulator::fdtable::FdObject::new(Filetype::Directory, host_fd),
            RIGHTS_DIRECTORY_BASE & !RIGHT_FILE_READDIR,
            0,
        );
        let mut buf = [0u8; 64];
        assert_eq!(
            capsule
                .file_readdir_syscall(dirfd, &mut buf, DIRCOOKIE_START)
                .unwrap_err(),
            Errno::ENOTCAPABLE
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
