// The emulated guest process. All threads of a capsule share one
// descriptor table; a capsule carries no other state, because the guest
// ABI forbids every form of ambient authority.

use crate::emulator::fdtable::{insert_existing, FdTable};
use crate::interface::errnos::Errno;
use crate::interface::types::{Fd, RustRfc};

pub struct Capsule {
    pub fdtable: FdTable,
}

impl Capsule {
    pub fn new() -> RustRfc<Capsule> {
        RustRfc::new(Capsule {
            fdtable: FdTable::new(),
        })
    }

    /// Installs an inherited host descriptor at a fixed guest number with
    /// the maximum rights its type allows. Used to seed the table before
    /// the guest starts.
    pub fn seed_fd(&self, guest_fd: Fd, host_fd: i32) -> Result<(), Errno> {
        insert_existing(&self.fdtable, guest_fd, host_fd)
    }
}
