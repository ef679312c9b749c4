// Futex emulation for guest locks and condition variables.
//
// Guest synchronisation objects are 32-bit words in guest memory. The
// emulator keeps a wait queue per word address; the queue exists only
// while threads are waiting on it. Within one emulated process, shared
// and private scope behave identically.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::emulator::syscalls::sys_constants::*;
use crate::interface;
use crate::interface::errnos::{syscall_error, Errno};
use crate::interface::types::{
    Condvar, Event, Mutex, RustHashMap, RustLazyGlobal, RustRfc, Subscription, SubscriptionKind,
    Tid, Timestamp, EVENTTYPE_CLOCK, EVENTTYPE_CONDVAR,
};

struct QueueState {
    waiters: usize,
    wakeups: usize,
}

struct WaitQueue {
    state: Mutex<QueueState>,
    condvar: Condvar,
}

static QUEUES: RustLazyGlobal<RustHashMap<usize, RustRfc<WaitQueue>>> =
    RustLazyGlobal::new(RustHashMap::new);

fn queue_for(addr: usize) -> RustRfc<WaitQueue> {
    QUEUES
        .entry(addr)
        .or_insert_with(|| {
            RustRfc::new(WaitQueue {
                state: Mutex::new(QueueState {
                    waiters: 0,
                    wakeups: 0,
                }),
                condvar: Condvar::new(),
            })
        })
        .clone()
}

fn drop_queue_if_idle(addr: usize) {
    QUEUES.remove_if(&addr, |_, queue| {
        let state = queue.state.lock();
        state.waiters == 0
    });
}

// The guest word is only ever accessed atomically.
fn guest_word<'a>(ptr: *mut u32) -> &'a AtomicU32 {
    unsafe { AtomicU32::from_ptr(ptr) }
}

fn try_acquire_write(word: &AtomicU32, tid: Tid) -> bool {
    word.compare_exchange(
        LOCK_UNLOCKED,
        LOCK_WRLOCKED | tid,
        Ordering::Acquire,
        Ordering::Relaxed,
    )
    .is_ok()
        || word
            .compare_exchange(
                LOCK_KERNEL_MANAGED,
                LOCK_WRLOCKED | tid,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
}

/// Acquires a guest lock word for writing, parking the thread while some
/// other thread holds it.
fn lock_acquire_write(tid: Tid, lock: *mut u32) {
    let word = guest_word(lock);
    loop {
        if try_acquire_write(word, tid) {
            return;
        }
        let addr = lock as usize;
        let queue = queue_for(addr);
        let mut state = queue.state.lock();
        // Mark the word as having queued waiters, then recheck under the
        // queue lock so an unlock between the failed acquire and here is
        // not missed.
        word.fetch_or(LOCK_KERNEL_MANAGED, Ordering::Relaxed);
        if try_acquire_write(word, tid) {
            drop(state);
            drop_queue_if_idle(addr);
            return;
        }
        state.waiters += 1;
        while state.wakeups == 0 {
            queue.condvar.wait(&mut state);
        }
        state.wakeups -= 1;
        state.waiters -= 1;
        drop(state);
        drop_queue_if_idle(addr);
    }
}

/// Releases a guest lock word and wakes every queued waiter; the waiters
/// re-contend for the word.
pub fn op_lock_unlock(_tid: Tid, lock: *mut u32, _scope: u8) -> Result<(), Errno> {
    let word = guest_word(lock);
    word.store(LOCK_UNLOCKED, Ordering::Release);
    let addr = lock as usize;
    if let Some(queue) = QUEUES.get(&addr).map(|q| q.value().clone()) {
        let mut state = queue.state.lock();
        state.wakeups = state.waiters;
        queue.condvar.notify_all();
    }
    Ok(())
}

/// Wakes up to nwaiters threads blocked on the condition variable.
pub fn op_condvar_signal(condvar: *mut u32, _scope: u8, nwaiters: u32) -> Result<(), Errno> {
    let addr = condvar as usize;
    if let Some(queue) = QUEUES.get(&addr).map(|q| q.value().clone()) {
        let mut state = queue.state.lock();
        let pending = state.waiters.saturating_sub(state.wakeups);
        state.wakeups += std::cmp::min(nwaiters as usize, pending);
        queue.condvar.notify_all();
    }
    Ok(())
}

/// Converts a clock subscription timeout into a relative duration from
/// now on the subscription's clock.
fn relative_timeout(clock_id: u32, timeout: Timestamp, absolute: bool) -> Result<Duration, Errno> {
    if !absolute {
        return Ok(Duration::from_nanos(timeout));
    }
    let nclock = interface::convert_clockid(clock_id).ok_or_else(|| {
        syscall_error(Errno::EINVAL, "poll", "unknown clock in subscription")
    })?;
    let now = interface::clock_gettime(nclock)?;
    Ok(Duration::from_nanos(timeout.saturating_sub(now)))
}

/// Waits on a condition variable word, releasing and reacquiring the
/// paired lock word. Returns ETIMEDOUT when the deadline passes first.
pub fn op_cond_timedwait(
    tid: Tid,
    condvar: *mut u32,
    lock: *mut u32,
    timeout: Option<Duration>,
) -> Result<(), Errno> {
    let addr = condvar as usize;
    let queue = queue_for(addr);
    let word = guest_word(condvar);

    let mut state = queue.state.lock();
    word.store(1, Ordering::Relaxed);
    state.waiters += 1;
    // The lock must drop after we are queued, so a signal sent by the
    // freshly woken lock holder cannot be lost.
    op_lock_unlock(tid, lock, SCOPE_PRIVATE)?;

    let mut timed_out = false;
    while state.wakeups == 0 {
        match timeout {
            Some(dur) => {
                if queue.condvar.wait_for(&mut state, dur).timed_out() {
                    timed_out = true;
                    break;
                }
            }
            None => queue.condvar.wait(&mut state),
        }
    }
    if !timed_out {
        state.wakeups -= 1;
    }
    state.waiters -= 1;
    if state.waiters == 0 {
        word.store(CONDVAR_HAS_NO_WAITERS, Ordering::Relaxed);
    }
    drop(state);
    drop_queue_if_idle(addr);

    lock_acquire_write(tid, lock);
    if timed_out {
        return Err(Errno::ETIMEDOUT);
    }
    Ok(())
}

/// Captures poll calls that deal with futexes: a single condvar
/// subscription, optionally paired with one clock subscription acting as
/// a timeout. Returns false when the subscription set is not futex
/// shaped, leaving the call to the host poller.
pub fn op_poll(tid: Tid, subs: &[Subscription], events: &mut Vec<Event>) -> bool {
    let (cv_sub, clock_sub) = match subs {
        [only] => (only, None),
        [first, second] => (first, Some(second)),
        _ => return false,
    };
    let (condvar, lock) = match cv_sub.kind {
        SubscriptionKind::Condvar { condvar, lock, .. } => (condvar, lock),
        _ => return false,
    };
    let timeout = match clock_sub {
        None => None,
        Some(sub) => match sub.kind {
            SubscriptionKind::Clock {
                clock_id,
                timeout,
                flags,
                ..
            } => match relative_timeout(clock_id, timeout, flags & SUBSCRIPTION_CLOCK_ABSTIME != 0)
            {
                Ok(dur) => Some(dur),
                Err(errno) => {
                    events.push(Event::error(sub.userdata, EVENTTYPE_CLOCK, errno));
                    return true;
                }
            },
            _ => return false,
        },
    };

    match op_cond_timedwait(tid, condvar, lock, timeout) {
        Ok(()) => events.push(Event::new(cv_sub.userdata, EVENTTYPE_CONDVAR)),
        Err(Errno::ETIMEDOUT) => {
            // The deadline fired; report the clock subscription instead.
            let clock = clock_sub.expect("timeout implies a clock subscription");
            events.push(Event::new(clock.userdata, EVENTTYPE_CLOCK));
        }
        Err(errno) => events.push(Event::error(cv_sub.userdata, EVENTTYPE_CONDVAR, errno)),
    }
    true
}
