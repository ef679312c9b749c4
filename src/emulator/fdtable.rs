// The descriptor object and the per-process descriptor table.
//
// A descriptor object wraps one live host resource. The table maps guest
// descriptor numbers to (object, rights) pairs; the object's strong
// reference count is the number of table entries plus in-flight syscall
// acquisitions referencing it, and dropping the last reference is what
// closes the host resource.

use crate::interface;
use crate::interface::errnos::{syscall_error, Errno};
use crate::interface::types::{Dircookie, Fd, Filetype, Mutex, Rights, RustLock, RustRfc};

/// Directory descriptors lazily grow a host directory stream the first
/// time the guest reads them. The cursor mirrors the guest's view of the
/// stream position and is only meaningful once the stream exists.
pub struct DirState {
    pub handle: Option<interface::DirStream>,
    pub offset: Dircookie,
}

pub struct FdObject {
    filetype: Filetype,
    /// Host descriptor number, or -1 for purely virtual descriptors.
    number: i32,
    /// Present exactly for directory descriptors.
    directory: Option<Mutex<DirState>>,
}

impl FdObject {
    pub fn new(filetype: Filetype, number: i32) -> RustRfc<FdObject> {
        let directory = if filetype == Filetype::Directory {
            Some(Mutex::new(DirState {
                handle: None,
                offset: crate::emulator::syscalls::fs_constants::DIRCOOKIE_START,
            }))
        } else {
            None
        };
        RustRfc::new(FdObject {
            filetype,
            number,
            directory,
        })
    }

    pub fn filetype(&self) -> Filetype {
        self.filetype
    }

    pub fn is_virtual(&self) -> bool {
        self.number < 0
    }

    /// The underlying host descriptor number. Only callable on objects
    /// that have one.
    pub fn number(&self) -> i32 {
        assert!(self.number >= 0, "number() called on virtual descriptor");
        self.number
    }

    /// The per-directory stream state. Only callable on directories.
    pub fn directory(&self) -> &Mutex<DirState> {
        self.directory
            .as_ref()
            .expect("directory() called on non-directory descriptor")
    }
}

impl Drop for FdObject {
    fn drop(&mut self) {
        // Once a directory has been promoted to a stream, closing the
        // stream closes the underlying descriptor as a side effect.
        if let Some(dir) = &mut self.directory {
            let state = dir.get_mut();
            if state.handle.take().is_some() {
                return;
            }
        }
        if self.number >= 0 {
            interface::close(self.number);
        }
    }
}

#[derive(Clone)]
pub struct FdEntry {
    pub object: RustRfc<FdObject>,
    pub rights_base: Rights,
    pub rights_inheriting: Rights,
}

struct FdTableState {
    entries: Vec<Option<FdEntry>>,
    used: usize,
}

impl FdTableState {
    /// Looks up an entry by number and required rights.
    fn get_entry(&self, fd: Fd, base: Rights, inheriting: Rights) -> Result<&FdEntry, Errno> {
        let entry = self
            .entries
            .get(fd as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| syscall_error(Errno::EBADF, "fd_table", "no such descriptor"))?;
        if (!entry.rights_base & base) != 0 || (!entry.rights_inheriting & inheriting) != 0 {
            return Err(syscall_error(
                Errno::ENOTCAPABLE,
                "fd_table",
                "descriptor lacks a required right",
            ));
        }
        Ok(entry)
    }

    /// Grows the table so that `size > min` and free slots remain for
    /// `incr` more descriptors without passing half occupancy.
    fn grow(&mut self, min: usize, incr: usize) {
        if self.entries.len() <= min || self.entries.len() < (self.used + incr) * 2 {
            let mut size = std::cmp::max(self.entries.len(), 1);
            while size <= min || size < (self.used + incr) * 2 {
                size *= 2;
            }
            self.entries.resize_with(size, || None);
        }
    }

    /// Picks an unused slot uniformly at random. Terminates quickly
    /// because the table is never more than half full.
    fn unused(&self) -> Fd {
        assert!(self.entries.len() > self.used, "descriptor table has no free slots");
        loop {
            let fd = interface::random_uniform(self.entries.len() as u64) as Fd;
            if self.entries[fd as usize].is_none() {
                return fd;
            }
        }
    }

    fn attach(&mut self, fd: Fd, object: RustRfc<FdObject>, base: Rights, inheriting: Rights) {
        let slot = &mut self.entries[fd as usize];
        assert!(slot.is_none(), "attempted to overwrite an existing descriptor");
        *slot = Some(FdEntry {
            object,
            rights_base: base,
            rights_inheriting: inheriting,
        });
        self.used += 1;
        debug_assert!(self.entries.len() >= self.used * 2);
    }

    fn detach(&mut self, fd: Fd) -> FdEntry {
        let entry = self.entries[fd as usize]
            .take()
            .expect("attempted to detach nonexistent descriptor");
        self.used -= 1;
        entry
    }
}

/// The descriptor table shared by all threads of one emulated process.
pub struct FdTable {
    state: RustLock<FdTableState>,
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FdTable {
    pub fn new() -> FdTable {
        FdTable {
            state: RustLock::new(FdTableState {
                entries: Vec::new(),
                used: 0,
            }),
        }
    }

    /// Resolves a descriptor, validates the required rights, and takes
    /// one additional reference on the object so it stays alive after
    /// the table lock is dropped. This is the normal path for I/O.
    pub fn acquire(&self, fd: Fd, base: Rights, inheriting: Rights) -> Result<RustRfc<FdObject>, Errno> {
        let state = self.state.read();
        let entry = state.get_entry(fd, base, inheriting)?;
        Ok(entry.object.clone())
    }

    /// Like acquire, but also returns the rights stored in the entry.
    pub fn acquire_with_rights(
        &self,
        fd: Fd,
        base: Rights,
        inheriting: Rights,
    ) -> Result<(RustRfc<FdObject>, Rights, Rights), Errno> {
        let state = self.state.read();
        let entry = state.get_entry(fd, base, inheriting)?;
        Ok((entry.object.clone(), entry.rights_base, entry.rights_inheriting))
    }

    /// Acquires a reference for every listed descriptor under a single
    /// shared lock. Fails on the first descriptor that is missing or
    /// lacks the rights.
    pub fn acquire_many(&self, fds: &[Fd], base: Rights) -> Result<Vec<RustRfc<FdObject>>, Errno> {
        let state = self.state.read();
        let mut objects = Vec::with_capacity(fds.len());
        for &fd in fds {
            objects.push(state.get_entry(fd, base, 0)?.object.clone());
        }
        Ok(objects)
    }

    /// Per-descriptor acquisition under a single shared lock, reporting
    /// an individual result for each. Used by poll, which turns lookup
    /// failures into events rather than failing the whole call.
    pub fn try_acquire_each(
        &self,
        fds: &[(Fd, Rights)],
    ) -> Vec<Result<RustRfc<FdObject>, Errno>> {
        let state = self.state.read();
        fds.iter()
            .map(|&(fd, base)| state.get_entry(fd, base, 0).map(|entry| entry.object.clone()))
            .collect()
    }

    /// Inserts an object at a randomly chosen unused slot, consuming the
    /// caller's reference.
    pub fn insert(&self, object: RustRfc<FdObject>, base: Rights, inheriting: Rights) -> Fd {
        let mut state = self.state.write();
        state.grow(0, 1);
        let fd = state.unused();
        state.attach(fd, object, base, inheriting);
        fd
    }

    /// Inserts an object at a caller-chosen slot, growing as needed.
    /// Used to seed the initial table and for number-preserving imports.
    pub fn insert_at(
        &self,
        fd: Fd,
        object: RustRfc<FdObject>,
        base: Rights,
        inheriting: Rights,
    ) -> Result<(), Errno> {
        let mut state = self.state.write();
        state.grow(fd as usize, 1);
        if state.entries[fd as usize].is_some() {
            return Err(syscall_error(Errno::EEXIST, "fd_table", "slot already occupied"));
        }
        state.attach(fd, object, base, inheriting);
        Ok(())
    }

    /// Atomically inserts two objects, e.g. the ends of a socketpair.
    pub fn insert_pair(
        &self,
        object1: RustRfc<FdObject>,
        object2: RustRfc<FdObject>,
        base1: Rights,
        base2: Rights,
        inheriting: Rights,
    ) -> (Fd, Fd) {
        let mut state = self.state.write();
        state.grow(0, 2);
        let fd1 = state.unused();
        state.attach(fd1, object1, base1, inheriting);
        let fd2 = state.unused();
        state.attach(fd2, object2, base2, inheriting);
        (fd1, fd2)
    }

    /// Removes a descriptor. The host resource is released outside the
    /// table lock, because closing can block.
    pub fn close(&self, fd: Fd) -> Result<(), Errno> {
        let detached;
        {
            let mut state = self.state.write();
            state.get_entry(fd, 0, 0)?;
            detached = state.detach(fd);
        }
        drop(detached);
        Ok(())
    }

    /// Atomically points `to` at `from`'s object and rights. The object
    /// previously at `to` is released after the lock is dropped.
    pub fn replace(&self, from: Fd, to: Fd) -> Result<(), Errno> {
        let displaced;
        {
            let mut state = self.state.write();
            let entry_from = state.get_entry(from, 0, 0)?.clone();
            state.get_entry(to, 0, 0)?;
            displaced = state.detach(to);
            state.attach(
                to,
                entry_from.object,
                entry_from.rights_base,
                entry_from.rights_inheriting,
            );
        }
        drop(displaced);
        Ok(())
    }

    /// Duplicates a descriptor into a randomly chosen unused slot.
    pub fn dup(&self, from: Fd) -> Result<Fd, Errno> {
        let mut state = self.state.write();
        let entry = state.get_entry(from, 0, 0)?.clone();
        state.grow(0, 1);
        let fd = state.unused();
        state.attach(fd, entry.object, entry.rights_base, entry.rights_inheriting);
        Ok(fd)
    }

    /// Restricts the rights stored for a descriptor. Widening is a
    /// capability violation.
    pub fn restrict_rights(&self, fd: Fd, base: Rights, inheriting: Rights) -> Result<(), Errno> {
        let mut state = self.state.write();
        state.get_entry(fd, base, inheriting)?;
        let entry = state.entries[fd as usize].as_mut().unwrap();
        entry.rights_base = base;
        entry.rights_inheriting = inheriting;
        Ok(())
    }

    /// (used, size) counters, for invariant checks.
    pub fn usage(&self) -> (usize, usize) {
        let state = self.state.read();
        (state.used, state.entries.len())
    }
}

/// Probes an existing host descriptor and installs it at the given guest
/// number with the maximum rights its type allows.
pub fn insert_existing(table: &FdTable, guest_fd: Fd, host_fd: i32) -> Result<(), Errno> {
    let (filetype, base, inheriting) = crate::emulator::rights::determine_type_rights(host_fd)?;
    let object = FdObject::new(filetype, host_fd);
    table.insert_at(guest_fd, object, base, inheriting)
}

/// Wraps a freshly opened host descriptor and inserts it at a random
/// slot, taking ownership of the descriptor.
pub fn insert_host_fd(
    table: &FdTable,
    host_fd: i32,
    filetype: Filetype,
    base: Rights,
    inheriting: Rights,
) -> Fd {
    table.insert(FdObject::new(filetype, host_fd), base, inheriting)
}
