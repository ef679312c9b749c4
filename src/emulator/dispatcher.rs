// Per-thread emulation context and the thread spawning glue.
//
// Two pieces of state are thread-local: which capsule the thread belongs
// to and its guest thread id. Both are published exactly once, by
// capsule_enter on the initial thread and by the spawn trampoline on
// every other.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};

use crate::emulator::capsule::Capsule;
use crate::interface;
use crate::interface::errnos::{convert_host_errno, syscall_error, Errno};
use crate::interface::types::{RustRfc, ThreadEntry, Tid};

thread_local! {
    static CURRENT_CAPSULE: RefCell<Option<RustRfc<Capsule>>> = const { RefCell::new(None) };
    static CURRENT_TID: Cell<Tid> = const { Cell::new(0) };
}

/// Binds the calling thread to a capsule under a fresh guest thread id.
/// Returns the id, which the embedder passes to the guest entry point.
pub fn capsule_enter(capsule: RustRfc<Capsule>) -> Tid {
    let tid = interface::tidpool_allocate();
    install(capsule, tid);
    tid
}

fn install(capsule: RustRfc<Capsule>, tid: Tid) {
    CURRENT_CAPSULE.with(|current| *current.borrow_mut() = Some(capsule));
    CURRENT_TID.with(|current| current.set(tid));
}

/// The capsule the calling thread belongs to.
pub fn capsule_current() -> Option<RustRfc<Capsule>> {
    CURRENT_CAPSULE.with(|current| current.borrow().clone())
}

pub fn current_tid() -> Tid {
    CURRENT_TID.with(|current| current.get())
}

struct ThreadParams {
    entry_point: ThreadEntry,
    tid: Tid,
    argument: *mut libc::c_void,
    capsule: RustRfc<Capsule>,
}

// The argument pointer is handed to exactly one guest thread.
unsafe impl Send for ThreadParams {}

/// Panic payload used to terminate a guest thread from thread_exit
/// without returning into guest code.
pub(crate) struct ThreadExit;

pub(crate) fn exit_thread() -> ! {
    // resume_unwind rather than panic_any: this is control flow, not a
    // failure, and must not trip the panic hook.
    panic::resume_unwind(Box::new(ThreadExit))
}

fn trampoline(params: ThreadParams) {
    install(params.capsule, params.tid);

    // Pass on execution to the thread's entry point. It must never
    // return; it calls thread_exit instead, which unwinds back here.
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        (params.entry_point)(params.tid, params.argument)
    }));
    match result {
        Ok(()) => std::process::abort(),
        Err(payload) => {
            if !payload.is::<ThreadExit>() {
                panic::resume_unwind(payload);
            }
        }
    }
}

/// Starts a detached host thread running the guest entry point with the
/// per-thread context installed.
pub(crate) fn spawn_thread(
    capsule: RustRfc<Capsule>,
    entry_point: ThreadEntry,
    argument: *mut libc::c_void,
    stack_len: usize,
) -> Result<Tid, Errno> {
    let tid = interface::tidpool_allocate();
    let params = ThreadParams {
        entry_point,
        tid,
        argument,
        capsule,
    };

    // A fresh stack of the requested size is allocated instead of the
    // buffer the guest provided: the guest may free its buffer as soon
    // as thread_exit wakes a joiner, while the host thread is still
    // shutting down.
    let builder = std::thread::Builder::new().stack_size(stack_len);
    match builder.spawn(move || trampoline(params)) {
        // Detached: the handle is dropped, nobody joins.
        Ok(_handle) => Ok(tid),
        Err(e) => Err(e
            .raw_os_error()
            .map(convert_host_errno)
            .unwrap_or_else(|| syscall_error(Errno::EAGAIN, "thread_create", "spawn failed"))),
    }
}
