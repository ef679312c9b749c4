//! System related system calls: clocks, memory management, process
//! control, randomness, synchronisation hand-offs and threads.
//!
//! - [clock_res_get_syscall](crate::emulator::capsule::Capsule::clock_res_get_syscall)
//! - [clock_time_get_syscall](crate::emulator::capsule::Capsule::clock_time_get_syscall)
//! - [condvar_signal_syscall](crate::emulator::capsule::Capsule::condvar_signal_syscall)
//! - [lock_unlock_syscall](crate::emulator::capsule::Capsule::lock_unlock_syscall)
//! - [mem_advise_syscall](crate::emulator::capsule::Capsule::mem_advise_syscall)
//! - [mem_map_syscall](crate::emulator::capsule::Capsule::mem_map_syscall)
//! - [mem_protect_syscall](crate::emulator::capsule::Capsule::mem_protect_syscall)
//! - [mem_sync_syscall](crate::emulator::capsule::Capsule::mem_sync_syscall)
//! - [mem_unmap_syscall](crate::emulator::capsule::Capsule::mem_unmap_syscall)
//! - [proc_exec_syscall](crate::emulator::capsule::Capsule::proc_exec_syscall)
//! - [proc_exit_syscall](crate::emulator::capsule::Capsule::proc_exit_syscall)
//! - [proc_fork_syscall](crate::emulator::capsule::Capsule::proc_fork_syscall)
//! - [proc_raise_syscall](crate::emulator::capsule::Capsule::proc_raise_syscall)
//! - [random_get_syscall](crate::emulator::capsule::Capsule::random_get_syscall)
//! - [thread_create_syscall](crate::emulator::capsule::Capsule::thread_create_syscall)
//! - [thread_exit_syscall](crate::emulator::capsule::Capsule::thread_exit_syscall)
//! - [thread_yield_syscall](crate::emulator::capsule::Capsule::thread_yield_syscall)

#![allow(dead_code)]

use super::fs_constants::*;
use super::sys_constants::*;
use crate::emulator::capsule::Capsule;
use crate::emulator::dispatcher;
use crate::emulator::futex;
use crate::emulator::rights::*;
use crate::interface;
use crate::interface::errnos::{get_host_errno, syscall_error, Errno};
use crate::interface::types::*;

fn convert_mprot(prot: u8) -> Result<libc::c_int, Errno> {
    if prot & !(PROT_READ | PROT_WRITE | PROT_EXEC) != 0 {
        return Err(syscall_error(Errno::EINVAL, "mem", "unknown protection bits"));
    }
    // Writable and executable at once defeats W^X and is refused.
    if prot & PROT_WRITE != 0 && prot & PROT_EXEC != 0 {
        return Err(syscall_error(
            Errno::ENOTSUP,
            "mem",
            "mappings cannot be both writable and executable",
        ));
    }
    let mut nprot = 0;
    if prot & PROT_READ != 0 {
        nprot |= libc::PROT_READ;
    }
    if prot & PROT_WRITE != 0 {
        nprot |= libc::PROT_WRITE;
    }
    if prot & PROT_EXEC != 0 {
        nprot |= libc::PROT_EXEC;
    }
    Ok(nprot)
}

impl Capsule {
    pub fn clock_res_get_syscall(&self, clock_id: u32) -> Result<Timestamp, Errno> {
        let nclock = interface::convert_clockid(clock_id)
            .ok_or_else(|| syscall_error(Errno::EINVAL, "clock_res_get", "unknown clock"))?;
        interface::clock_getres(nclock)
    }

    pub fn clock_time_get_syscall(
        &self,
        clock_id: u32,
        _precision: Timestamp,
    ) -> Result<Timestamp, Errno> {
        let nclock = interface::convert_clockid(clock_id)
            .ok_or_else(|| syscall_error(Errno::EINVAL, "clock_time_get", "unknown clock"))?;
        interface::clock_gettime(nclock)
    }

    pub fn condvar_signal_syscall(
        &self,
        condvar: *mut u32,
        scope: u8,
        nwaiters: u32,
    ) -> Result<(), Errno> {
        futex::op_condvar_signal(condvar, scope, nwaiters)
    }

    pub fn lock_unlock_syscall(&self, lock: *mut u32, scope: u8) -> Result<(), Errno> {
        futex::op_lock_unlock(dispatcher::current_tid(), lock, scope)
    }

    pub fn mem_advise_syscall(
        &self,
        addr: *mut libc::c_void,
        len: usize,
        advice: u8,
    ) -> Result<(), Errno> {
        let nadvice = match advice {
            ADVICE_DONTNEED => libc::POSIX_MADV_DONTNEED,
            ADVICE_NORMAL => libc::POSIX_MADV_NORMAL,
            ADVICE_RANDOM => libc::POSIX_MADV_RANDOM,
            ADVICE_SEQUENTIAL => libc::POSIX_MADV_SEQUENTIAL,
            ADVICE_WILLNEED => libc::POSIX_MADV_WILLNEED,
            _ => {
                return Err(syscall_error(
                    Errno::EINVAL,
                    "mem_advise",
                    "advice has no mapping counterpart",
                ))
            }
        };
        let error = unsafe { libc::posix_madvise(addr, len, nadvice) };
        if error != 0 {
            return Err(crate::interface::errnos::convert_host_errno(error));
        }
        Ok(())
    }

    pub fn mem_map_syscall(
        &self,
        addr: *mut libc::c_void,
        len: usize,
        prot: u8,
        flags: u8,
        fd: Fd,
        off: Filesize,
    ) -> Result<*mut libc::c_void, Errno> {
        let nprot = convert_mprot(prot)?;

        let mut nflags = 0;
        if flags & MAP_FIXED != 0 {
            nflags |= libc::MAP_FIXED;
        }
        match flags & (MAP_PRIVATE | MAP_SHARED) {
            MAP_PRIVATE => nflags |= libc::MAP_PRIVATE,
            MAP_SHARED => nflags |= libc::MAP_SHARED,
            _ => {
                return Err(syscall_error(
                    Errno::EINVAL,
                    "mem_map",
                    "exactly one of private or shared must be set",
                ))
            }
        }

        let ret = if flags & MAP_ANON != 0 {
            // Anonymous memory needs no descriptor at all.
            if fd != MAP_ANON_FD || off != 0 {
                return Err(syscall_error(
                    Errno::EINVAL,
                    "mem_map",
                    "anonymous mappings take no descriptor",
                ));
            }
            nflags |= libc::MAP_ANON;
            unsafe { libc::mmap(addr, len, nprot, nflags, -1, 0) }
        } else {
            let mut needed = RIGHT_MEM_MAP;
            if prot & PROT_EXEC != 0 {
                needed |= RIGHT_MEM_MAP_EXEC;
            }
            let fo = self.fdtable.acquire(fd, needed, 0)?;
            unsafe { libc::mmap(addr, len, nprot, nflags, fo.number(), off as libc::off_t) }
        };
        if ret == libc::MAP_FAILED {
            return Err(get_host_errno());
        }
        Ok(ret)
    }

    pub fn mem_protect_syscall(
        &self,
        addr: *mut libc::c_void,
        len: usize,
        prot: u8,
    ) -> Result<(), Errno> {
        let nprot = convert_mprot(prot)?;
        if unsafe { libc::mprotect(addr, len, nprot) } < 0 {
            return Err(get_host_errno());
        }
        Ok(())
    }

    pub fn mem_sync_syscall(
        &self,
        addr: *mut libc::c_void,
        len: usize,
        flags: u8,
    ) -> Result<(), Errno> {
        let mut nflags = 0;
        match flags & (MS_ASYNC | MS_SYNC) {
            MS_ASYNC => nflags |= libc::MS_ASYNC,
            MS_SYNC => nflags |= libc::MS_SYNC,
            _ => {
                return Err(syscall_error(
                    Errno::EINVAL,
                    "mem_sync",
                    "exactly one of async or sync must be set",
                ))
            }
        }
        if flags & MS_INVALIDATE != 0 {
            nflags |= libc::MS_INVALIDATE;
        }
        if unsafe { libc::msync(addr, len, nflags) } < 0 {
            return Err(get_host_errno());
        }
        Ok(())
    }

    pub fn mem_unmap_syscall(&self, addr: *mut libc::c_void, len: usize) -> Result<(), Errno> {
        if unsafe { libc::munmap(addr, len) } < 0 {
            return Err(get_host_errno());
        }
        Ok(())
    }

    /// Process spawning is not part of this ABI.
    pub fn proc_exec_syscall(&self, _fd: Fd, _data: &[u8], _fds: &[Fd]) -> Result<(), Errno> {
        Err(Errno::ENOSYS)
    }

    pub fn proc_exit_syscall(&self, rval: u32) -> ! {
        std::process::exit(rval as i32)
    }

    /// Forking is not part of this ABI either.
    pub fn proc_fork_syscall(&self) -> Result<(Fd, Tid), Errno> {
        Err(Errno::ENOSYS)
    }

    pub fn proc_raise_syscall(&self, sig: u8) -> Result<(), Errno> {
        let nsig = match sig {
            SIGABRT => libc::SIGABRT,
            SIGALRM => libc::SIGALRM,
            SIGBUS => libc::SIGBUS,
            SIGCHLD => libc::SIGCHLD,
            SIGCONT => libc::SIGCONT,
            SIGFPE => libc::SIGFPE,
            SIGHUP => libc::SIGHUP,
            SIGILL => libc::SIGILL,
            SIGINT => libc::SIGINT,
            SIGKILL => libc::SIGKILL,
            SIGPIPE => libc::SIGPIPE,
            SIGQUIT => libc::SIGQUIT,
            SIGSEGV => libc::SIGSEGV,
            SIGSTOP => libc::SIGSTOP,
            SIGSYS => libc::SIGSYS,
            SIGTERM => libc::SIGTERM,
            SIGTRAP => libc::SIGTRAP,
            SIGTSTP => libc::SIGTSTP,
            SIGTTIN => libc::SIGTTIN,
            SIGTTOU => libc::SIGTTOU,
            SIGURG => libc::SIGURG,
            SIGUSR1 => libc::SIGUSR1,
            SIGUSR2 => libc::SIGUSR2,
            SIGVTALRM => libc::SIGVTALRM,
            SIGXCPU => libc::SIGXCPU,
            SIGXFSZ => libc::SIGXFSZ,
            _ => {
                return Err(syscall_error(
                    Errno::EINVAL,
                    "proc_raise",
                    "unknown signal number",
                ))
            }
        };
        if unsafe { libc::raise(nsig) } < 0 {
            return Err(get_host_errno());
        }
        Ok(())
    }

    pub fn random_get_syscall(&self, buf: &mut [u8]) -> Result<(), Errno> {
        interface::random_buf(buf);
        Ok(())
    }

    /// Starts a new guest thread sharing this capsule's descriptor
    /// table. The trampoline installs the per-thread context before the
    /// first guest instruction runs.
    pub fn thread_create_syscall(
        self: RustRfc<Capsule>,
        entry_point: ThreadEntry,
        argument: *mut libc::c_void,
        stack_len: usize,
    ) -> Result<Tid, Errno> {
        dispatcher::spawn_thread(self, entry_point, argument, stack_len)
    }

    /// Releases the given guest lock, waking joiners, and terminates the
    /// calling host thread.
    pub fn thread_exit_syscall(&self, lock: *mut u32, scope: u8) -> ! {
        let _ = futex::op_lock_unlock(dispatcher::current_tid(), lock, scope);
        dispatcher::exit_thread()
    }

    pub fn thread_yield_syscall(&self) -> Result<(), Errno> {
        if unsafe { libc::sched_yield() } < 0 {
            return Err(get_host_errno());
        }
        Ok(())
    }
}
