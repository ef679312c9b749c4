// The unified event-wait primitive: one entry point multiplexes futex
// waits, clock sleeps and host descriptor readiness.

use super::sys_constants::*;
use crate::emulator::capsule::Capsule;
use crate::emulator::dispatcher;
use crate::emulator::futex;
use crate::emulator::rights::RIGHT_POLL_FD_READWRITE;
use crate::interface;
use crate::interface::errnos::{syscall_error, Errno};
use crate::interface::types::*;

impl Capsule {
    /// Waits for the first of the subscribed conditions. Lookup failures
    /// are reported as events, in subscription order, ahead of the
    /// events produced by the host poll; the returned list is never
    /// longer than the subscription list.
    pub fn poll_syscall(&self, subs: &[Subscription]) -> Result<Vec<Event>, Errno> {
        let mut events = Vec::with_capacity(subs.len());
        if subs.is_empty() {
            return Ok(events);
        }

        // Futex-shaped subscription sets never reach the host.
        if futex::op_poll(dispatcher::current_tid(), subs, &mut events) {
            return Ok(events);
        }

        // A single clock subscription is a sleep.
        if let [sub] = subs {
            if let SubscriptionKind::Clock {
                clock_id,
                timeout,
                flags,
                ..
            } = sub.kind
            {
                let mut event = Event::new(sub.userdata, EVENTTYPE_CLOCK);
                match interface::convert_clockid(clock_id) {
                    Some(nclock) => {
                        if let Some(errno) = interface::clock_sleep(
                            nclock,
                            timeout,
                            flags & SUBSCRIPTION_CLOCK_ABSTIME != 0,
                        ) {
                            event.error = Some(errno);
                        }
                    }
                    None => event.error = Some(Errno::ENOTSUP),
                }
                events.push(event);
                return Ok(events);
            }
        }

        // Everything else must be descriptor readiness, with at most one
        // relative clock subscription acting as a timeout. References
        // are taken under one shared lock and held across the host poll.
        let lookups: Vec<(Fd, Rights)> = subs
            .iter()
            .filter_map(|sub| match sub.kind {
                SubscriptionKind::FdRead { fd } | SubscriptionKind::FdWrite { fd } => {
                    Some((fd, RIGHT_POLL_FD_READWRITE))
                }
                _ => None,
            })
            .collect();
        let mut resolved = self.fdtable.try_acquire_each(&lookups).into_iter();

        let mut fos: Vec<Option<RustRfc<crate::emulator::fdtable::FdObject>>> =
            Vec::with_capacity(subs.len());
        let mut pfds: Vec<libc::pollfd> = Vec::with_capacity(subs.len());
        let mut clock_subscription: Option<&Subscription> = None;
        for sub in subs {
            let mut fo = None;
            let mut pfd = libc::pollfd {
                fd: -1,
                events: 0,
                revents: 0,
            };
            match sub.kind {
                SubscriptionKind::FdRead { .. } | SubscriptionKind::FdWrite { .. } => {
                    let eventtype = if matches!(sub.kind, SubscriptionKind::FdRead { .. }) {
                        EVENTTYPE_FD_READ
                    } else {
                        EVENTTYPE_FD_WRITE
                    };
                    match resolved.next().expect("one lookup per fd subscription") {
                        Ok(object) => {
                            pfd.fd = object.number();
                            pfd.events = if eventtype == EVENTTYPE_FD_READ {
                                libc::POLLRDNORM
                            } else {
                                libc::POLLWRNORM
                            };
                            fo = Some(object);
                        }
                        Err(errno) => {
                            // Missing descriptor or missing rights turn
                            // into an error event, not a call failure.
                            events.push(Event::error(sub.userdata, eventtype, errno));
                        }
                    }
                }
                SubscriptionKind::Clock { flags, .. }
                    if clock_subscription.is_none()
                        && flags & SUBSCRIPTION_CLOCK_ABSTIME == 0 =>
                {
                    clock_subscription = Some(sub);
                }
                SubscriptionKind::Clock { .. } | SubscriptionKind::Condvar { .. } => {
                    events.push(Event::error(
                        sub.userdata,
                        match sub.kind {
                            SubscriptionKind::Clock { .. } => EVENTTYPE_CLOCK,
                            _ => EVENTTYPE_CONDVAR,
                        },
                        syscall_error(Errno::ENOSYS, "poll", "unsupported subscription mix"),
                    ));
                }
            }
            fos.push(fo);
            pfds.push(pfd);
        }

        // Zero timeout if events were already generated above; otherwise
        // the clock subscription bounds the wait, in milliseconds.
        let timeout = if !events.is_empty() {
            0
        } else if let Some(clock) = clock_subscription {
            match clock.kind {
                SubscriptionKind::Clock { timeout, .. } => {
                    let ms = timeout / 1_000_000;
                    if ms > i32::MAX as u64 {
                        i32::MAX
                    } else {
                        ms as i32
                    }
                }
                _ => unreachable!(),
            }
        } else {
            -1
        };

        let ready = interface::host_poll(&mut pfds, timeout)?;

        if ready == 0 && events.is_empty() {
            if let Some(clock) = clock_subscription {
                // Nothing triggered before the deadline.
                events.push(Event::new(clock.userdata, EVENTTYPE_CLOCK));
            }
        } else {
            for (i, sub) in subs.iter().enumerate() {
                if pfds[i].fd < 0 {
                    continue;
                }
                let eventtype = if matches!(sub.kind, SubscriptionKind::FdRead { .. }) {
                    EVENTTYPE_FD_READ
                } else {
                    EVENTTYPE_FD_WRITE
                };
                let nbytes = if eventtype == EVENTTYPE_FD_READ {
                    interface::bytes_readable(pfds[i].fd)
                } else {
                    0
                };
                let revents = pfds[i].revents;
                if revents & libc::POLLNVAL != 0 {
                    // Should be impossible while we hold a reference,
                    // but some hosts report it on FIFOs at end-of-file.
                    events.push(Event::error(sub.userdata, eventtype, Errno::EBADF));
                } else if revents & libc::POLLERR != 0 {
                    events.push(Event::error(sub.userdata, eventtype, Errno::EIO));
                } else if revents & libc::POLLHUP != 0 {
                    let mut event = Event::new(sub.userdata, eventtype);
                    event.nbytes = nbytes;
                    event.flags |= EVENT_FD_READWRITE_HANGUP;
                    events.push(event);
                } else if revents & (libc::POLLRDNORM | libc::POLLWRNORM) != 0 {
                    let mut event = Event::new(sub.userdata, eventtype);
                    event.nbytes = nbytes;
                    events.push(event);
                }
            }
        }

        drop(fos);
        Ok(events)
    }
}
