// Clock identifiers and 64-bit nanosecond timestamp conversion.

use crate::interface::errnos::{get_host_errno, Errno};
use crate::interface::types::Timestamp;

pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Translates a guest clock id to the host clock id.
pub fn convert_clockid(clock_id: u32) -> Option<libc::clockid_t> {
    match clock_id {
        crate::emulator::syscalls::sys_constants::CLOCK_REALTIME => Some(libc::CLOCK_REALTIME),
        crate::emulator::syscalls::sys_constants::CLOCK_MONOTONIC => Some(libc::CLOCK_MONOTONIC),
        crate::emulator::syscalls::sys_constants::CLOCK_PROCESS_CPUTIME_ID => {
            Some(libc::CLOCK_PROCESS_CPUTIME_ID)
        }
        crate::emulator::syscalls::sys_constants::CLOCK_THREAD_CPUTIME_ID => {
            Some(libc::CLOCK_THREAD_CPUTIME_ID)
        }
        _ => None,
    }
}

/// Converts a host timespec to a guest timestamp. Negative times clamp to
/// zero; times past the representable range saturate.
pub fn convert_timespec(ts: &libc::timespec) -> Timestamp {
    if ts.tv_sec < 0 {
        return 0;
    }
    let sec = ts.tv_sec as u64;
    if sec >= u64::MAX / NANOS_PER_SEC {
        return u64::MAX;
    }
    sec * NANOS_PER_SEC + ts.tv_nsec as u64
}

/// Converts a guest timestamp to a host timespec, clamping the seconds at
/// the host time type's maximum.
pub fn convert_timestamp(ns: Timestamp) -> libc::timespec {
    let sec = ns / NANOS_PER_SEC;
    let max_sec = libc::time_t::MAX as u64;
    libc::timespec {
        tv_sec: if sec < max_sec { sec } else { max_sec } as libc::time_t,
        tv_nsec: (ns % NANOS_PER_SEC) as _,
    }
}

fn zeroed_timespec() -> libc::timespec {
    libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    }
}

pub fn clock_getres(clock_id: libc::clockid_t) -> Result<Timestamp, Errno> {
    let mut ts = zeroed_timespec();
    if unsafe { libc::clock_getres(clock_id, &mut ts) } < 0 {
        return Err(get_host_errno());
    }
    Ok(convert_timespec(&ts))
}

pub fn clock_gettime(clock_id: libc::clockid_t) -> Result<Timestamp, Errno> {
    let mut ts = zeroed_timespec();
    if unsafe { libc::clock_gettime(clock_id, &mut ts) } < 0 {
        return Err(get_host_errno());
    }
    Ok(convert_timespec(&ts))
}

/// Sleeps on the given clock, absolute or relative.
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub fn clock_sleep(clock_id: libc::clockid_t, timeout: Timestamp, absolute: bool) -> Option<Errno> {
    let ts = convert_timestamp(timeout);
    let ret = unsafe {
        libc::clock_nanosleep(
            clock_id,
            if absolute { libc::TIMER_ABSTIME } else { 0 },
            &ts,
            std::ptr::null_mut(),
        )
    };
    if ret != 0 {
        return Some(crate::interface::errnos::convert_host_errno(ret));
    }
    None
}

/// Hosts without clock_nanosleep can only sleep relative to now; absolute
/// deadlines are turned into relative ones against the same clock.
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
pub fn clock_sleep(clock_id: libc::clockid_t, timeout: Timestamp, absolute: bool) -> Option<Errno> {
    let deadline = if absolute {
        match clock_gettime(clock_id) {
            Ok(now) => timeout.saturating_sub(now),
            Err(e) => return Some(e),
        }
    } else {
        timeout
    };
    let ts = convert_timestamp(deadline);
    if unsafe { libc::nanosleep(&ts, std::ptr::null_mut()) } < 0 {
        return Some(get_host_errno());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timespec_saturation() {
        let neg = libc::timespec {
            tv_sec: -5,
            tv_nsec: 0,
        };
        assert_eq!(convert_timespec(&neg), 0);

        let big = libc::timespec {
            tv_sec: libc::time_t::MAX,
            tv_nsec: 999_999_999,
        };
        assert_eq!(convert_timespec(&big), u64::MAX);

        let plain = libc::timespec {
            tv_sec: 3,
            tv_nsec: 7,
        };
        assert_eq!(convert_timespec(&plain), 3 * NANOS_PER_SEC + 7);
    }

    #[test]
    fn timestamp_split() {
        let ts = convert_timestamp(5 * NANOS_PER_SEC + 123);
        assert_eq!(ts.tv_sec, 5);
        assert_eq!(ts.tv_nsec, 123);

        let max = convert_timestamp(u64::MAX);
        assert_eq!(max.tv_sec, libc::time_t::MAX);
    }

    #[test]
    fn monotonic_advances() {
        let a = clock_gettime(libc::CLOCK_MONOTONIC).unwrap();
        let b = clock_gettime(libc::CLOCK_MONOTONIC).unwrap();
        assert!(b >= a);
    }
}
