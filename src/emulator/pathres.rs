// Confined path resolution.
//
// Path-using syscalls name files as (directory descriptor, relative
// path) pairs. The resolver walks the path one component at a time,
// expanding symbolic links itself, so that the final (host dirfd, leaf)
// pair can never name anything outside the subtree of the directory
// descriptor. Normalisation shortcuts (realpath and friends) are not an
// option: they are vulnerable to TOCTOU races on symlinks.

use std::ffi::{CStr, CString};

use crate::emulator::fdtable::{FdObject, FdTable};
use crate::emulator::syscalls::fs_constants::LOOKUP_SYMLINK_FOLLOW;
use crate::interface;
use crate::interface::errnos::{syscall_error, Errno};
use crate::interface::types::{Fd, Lookup, Rights, RustRfc};

// Directory descriptors held at once during one resolution.
const DIRFD_STACK_DEPTH: usize = 128;
// Concurrently pending pathname strings during symlink expansion.
const PATH_STACK_DEPTH: usize = 32;
// Symlink expansions across one entire resolution.
const MAX_SYMLINK_EXPANSIONS: usize = 128;

/// Lease to a directory, so a path underneath it can be accessed. Owned
/// by the caller for the duration of one path-using syscall; dropping it
/// closes any intermediate descriptor opened during resolution and
/// releases the directory object reference.
pub struct PathAccess {
    fd: i32,
    leaf: CString,
    follow: bool,
    object: RustRfc<FdObject>,
}

impl PathAccess {
    /// Host directory descriptor the leaf is relative to.
    pub fn fd(&self) -> i32 {
        self.fd
    }

    /// The final pathname component. A trailing slash is retained so the
    /// host properly reports ENOTDIR on non-directories.
    pub fn leaf(&self) -> &CStr {
        &self.leaf
    }

    pub fn follow(&self) -> bool {
        self.follow
    }
}

impl Drop for PathAccess {
    fn drop(&mut self) {
        if self.fd != self.object.number() {
            interface::close(self.fd);
        }
    }
}

/// A pathname string waiting to be processed, with a cursor over the
/// components already consumed.
struct PendingPath {
    bytes: Vec<u8>,
    pos: usize,
}

impl PendingPath {
    fn new(bytes: Vec<u8>) -> PendingPath {
        PendingPath { bytes, pos: 0 }
    }

    fn exhausted(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Splits off the next component. Returns the component and whether
    /// it was followed by one or more slashes.
    fn next_component(&mut self) -> (Vec<u8>, bool) {
        let rest = &self.bytes[self.pos..];
        let end = rest.iter().position(|&b| b == b'/').unwrap_or(rest.len());
        let file = rest[..end].to_vec();
        let ends_with_slashes = end < rest.len();
        let mut skip = end;
        while skip < rest.len() && rest[skip] == b'/' {
            skip += 1;
        }
        self.pos += skip;
        (file, ends_with_slashes)
    }
}

fn leaf_cstring(mut leaf: Vec<u8>, trailing_slash: bool) -> Result<CString, Errno> {
    if trailing_slash {
        leaf.push(b'/');
    }
    CString::new(leaf)
        .map_err(|_| syscall_error(Errno::EINVAL, "path_get", "pathname contains a NUL byte"))
}

/// Creates a lease to a descriptor and pathname pair, emulating
/// confined lookup in user space.
pub fn path_get(
    table: &FdTable,
    lookup: Lookup,
    path: &[u8],
    rights_base: Rights,
    rights_inheriting: Rights,
    needs_final_component: bool,
) -> Result<PathAccess, Errno> {
    if path.contains(&0) {
        return Err(syscall_error(
            Errno::EINVAL,
            "path_get",
            "pathname contains a NUL byte",
        ));
    }
    let fo = table.acquire(lookup.fd, rights_base, rights_inheriting)?;
    let follow = lookup.flags & LOOKUP_SYMLINK_FOLLOW != 0;

    // Capsicum already constrains *at() lookups to stay underneath the
    // descriptor, so the whole pathname can be handed to the host.
    #[cfg(target_os = "freebsd")]
    {
        let _ = needs_final_component;
        let leaf = leaf_cstring(path.to_vec(), false)?;
        let fd = fo.number();
        return Ok(PathAccess {
            fd,
            leaf,
            follow,
            object: fo,
        });
    }

    #[cfg(not(target_os = "freebsd"))]
    {
        resolve_confined(fo, follow, path.to_vec(), needs_final_component)
    }
}

/// path_get for callers that never follow a symlink in the final
/// component.
pub fn path_get_nofollow(
    table: &FdTable,
    fd: Fd,
    path: &[u8],
    rights_base: Rights,
    rights_inheriting: Rights,
    needs_final_component: bool,
) -> Result<PathAccess, Errno> {
    path_get(
        table,
        Lookup { fd, flags: 0 },
        path,
        rights_base,
        rights_inheriting,
        needs_final_component,
    )
}

fn resolve_confined(
    fo: RustRfc<FdObject>,
    follow: bool,
    path: Vec<u8>,
    needs_final_component: bool,
) -> Result<PathAccess, Errno> {
    // Stack of directory descriptors. Index 0 always corresponds to the
    // directory descriptor the lookup started from. Entering a directory
    // pushes; ".." pops. Index 0 cannot be popped, as that would mean
    // escaping the base directory.
    let mut fds: Vec<i32> = vec![fo.number()];
    // Stack of pathname strings used for symlink expansion. Using a
    // stack avoids concatenating pathnames while expanding.
    let mut paths: Vec<PendingPath> = vec![PendingPath::new(path)];
    let mut expansions = 0usize;

    let result = 'resolve: loop {
        let (file, ends_with_slashes) = paths.last_mut().unwrap().next_component();

        // Empty pathname strings and absolute paths.
        if file.is_empty() {
            break 'resolve Err(if ends_with_slashes {
                syscall_error(Errno::ENOTCAPABLE, "path_get", "path is absolute")
            } else {
                syscall_error(Errno::ENOENT, "path_get", "path is empty")
            });
        }

        if file == b"." {
            // Skip component.
        } else if file == b".." {
            if fds.len() == 1 {
                // Attempted to go to the parent of the lookup directory.
                break 'resolve Err(syscall_error(
                    Errno::ENOTCAPABLE,
                    "path_get",
                    "path escapes the directory descriptor",
                ));
            }
            interface::close(fds.pop().unwrap());
        } else if paths.len() > 1
            || !paths.last().unwrap().exhausted()
            || (ends_with_slashes && !needs_final_component)
        {
            // A component that must be a directory: more path follows, or
            // a trailing slash the caller is not interested in. First try
            // to enter it.
            let name = match leaf_cstring(file, false) {
                Ok(name) => name,
                Err(e) => break 'resolve Err(e),
            };
            match interface::openat(
                *fds.last().unwrap(),
                &name,
                libc::O_RDONLY | libc::O_DIRECTORY | libc::O_NOFOLLOW,
                0,
            ) {
                Ok(newdir) => {
                    if fds.len() == DIRFD_STACK_DEPTH {
                        interface::close(newdir);
                        break 'resolve Err(syscall_error(
                            Errno::ENAMETOOLONG,
                            "path_get",
                            "directory stack exhausted",
                        ));
                    }
                    fds.push(newdir);
                }
                Err(e) => {
                    // ELOOP (or EMLINK on hosts that misreport it) means
                    // the component is a symlink. Expand it.
                    if e != Errno::ELOOP && e != Errno::EMLINK {
                        break 'resolve Err(e);
                    }
                    let target = match interface::readlinkat_alloc(*fds.last().unwrap(), &name) {
                        Ok(target) => target,
                        Err(e) => break 'resolve Err(e),
                    };
                    if let Err(e) =
                        push_symlink(&mut paths, &mut expansions, target, ends_with_slashes)
                    {
                        break 'resolve Err(e);
                    }
                    continue 'resolve;
                }
            }
        } else {
            // The final pathname component. If it ends with a slash or
            // the caller asked for symlink following, expand it.
            if ends_with_slashes || follow {
                let name = match leaf_cstring(file.clone(), false) {
                    Ok(name) => name,
                    Err(e) => break 'resolve Err(e),
                };
                match interface::readlinkat_alloc(*fds.last().unwrap(), &name) {
                    Ok(target) => {
                        if let Err(e) =
                            push_symlink(&mut paths, &mut expansions, target, ends_with_slashes)
                        {
                            break 'resolve Err(e);
                        }
                        continue 'resolve;
                    }
                    // Not a symlink, or nonexistent: the leaf is
                    // whatever name remained.
                    Err(Errno::EINVAL) | Err(Errno::ENOENT) => {}
                    Err(e) => break 'resolve Err(e),
                }
            }
            break 'resolve leaf_cstring(file, ends_with_slashes);
        }

        if paths.last().unwrap().exhausted() {
            if paths.len() == 1 {
                // No further components. We end up here for paths like
                // "." and "a/..", and for trailing slashes when the
                // caller is not interested in the final name.
                break 'resolve Ok(CString::new(".").expect("static leaf"));
            }
            // Finished expanding a symlink; continue along the original.
            paths.pop();
        }
    };

    match result {
        Ok(leaf) => {
            // Close all directories except the one the caller will use.
            let top = fds.pop().unwrap();
            if fds.len() > 1 {
                for fd in fds.drain(1..) {
                    interface::close(fd);
                }
            }
            Ok(PathAccess {
                fd: top,
                leaf,
                follow: false,
                object: fo,
            })
        }
        Err(e) => {
            for fd in fds.drain(1..) {
                interface::close(fd);
            }
            Err(e)
        }
    }
}

/// Queues a symlink target for processing, enforcing the expansion and
/// path-stack limits.
fn push_symlink(
    paths: &mut Vec<PendingPath>,
    expansions: &mut usize,
    mut target: Vec<u8>,
    ends_with_slashes: bool,
) -> Result<(), Errno> {
    *expansions += 1;
    if *expansions == MAX_SYMLINK_EXPANSIONS {
        return Err(syscall_error(
            Errno::ELOOP,
            "path_get",
            "too many levels of symbolic links",
        ));
    }

    // Keep a trailing slash on the target if the component had one, so
    // non-directory targets still fail with ENOTDIR.
    if ends_with_slashes {
        target.push(b'/');
    }

    if paths.last().map(|p| p.exhausted()).unwrap_or(false) {
        // The current pathname finished processing; the symlink replaces
        // it entirely.
        paths.pop();
    } else if paths.len() == PATH_STACK_DEPTH {
        return Err(syscall_error(
            Errno::ELOOP,
            "path_get",
            "nested symbolic links exhausted the path stack",
        ));
    }
    paths.push(PendingPath::new(target));
    Ok(())
}
