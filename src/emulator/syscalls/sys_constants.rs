// System related constants of the guest ABI: clocks, scopes, memory
// management flags, signals, and the guest-visible lock word layout.

#![allow(dead_code)]

// Clock identifiers.
pub const CLOCK_REALTIME: u32 = 0;
pub const CLOCK_MONOTONIC: u32 = 1;
pub const CLOCK_PROCESS_CPUTIME_ID: u32 = 2;
pub const CLOCK_THREAD_CPUTIME_ID: u32 = 3;

// Clock subscription flags.
pub const SUBSCRIPTION_CLOCK_ABSTIME: u16 = 0x0001;

// Object scopes for locks and condition variables. A single emulated
// process treats both the same way.
pub const SCOPE_PRIVATE: u8 = 4;
pub const SCOPE_SHARED: u8 = 8;

// Guest lock word layout.
pub const LOCK_UNLOCKED: u32 = 0;
pub const LOCK_WRLOCKED: u32 = 0x8000_0000;
pub const LOCK_KERNEL_MANAGED: u32 = 0x4000_0000;
pub const CONDVAR_HAS_NO_WAITERS: u32 = 0;

// Memory protection bits.
pub const PROT_READ: u8 = 0x01;
pub const PROT_WRITE: u8 = 0x02;
pub const PROT_EXEC: u8 = 0x04;

// Memory mapping flags.
pub const MAP_ANON: u8 = 0x01;
pub const MAP_FIXED: u8 = 0x02;
pub const MAP_PRIVATE: u8 = 0x04;
pub const MAP_SHARED: u8 = 0x08;

// Descriptor argument required for anonymous mappings.
pub const MAP_ANON_FD: u32 = u32::MAX;

// mem_sync flags.
pub const MS_ASYNC: u8 = 0x01;
pub const MS_INVALIDATE: u8 = 0x02;
pub const MS_SYNC: u8 = 0x04;

// Guest signal numbers for proc_raise.
pub const SIGABRT: u8 = 1;
pub const SIGALRM: u8 = 2;
pub const SIGBUS: u8 = 3;
pub const SIGCHLD: u8 = 4;
pub const SIGCONT: u8 = 5;
pub const SIGFPE: u8 = 6;
pub const SIGHUP: u8 = 7;
pub const SIGILL: u8 = 8;
pub const SIGINT: u8 = 9;
pub const SIGKILL: u8 = 10;
pub const SIGPIPE: u8 = 11;
pub const SIGQUIT: u8 = 12;
pub const SIGSEGV: u8 = 13;
pub const SIGSTOP: u8 = 14;
pub const SIGSYS: u8 = 15;
pub const SIGTERM: u8 = 16;
pub const SIGTRAP: u8 = 17;
pub const SIGTSTP: u8 = 18;
pub const SIGTTIN: u8 = 19;
pub const SIGTTOU: u8 = 20;
pub const SIGURG: u8 = 21;
pub const SIGUSR1: u8 = 22;
pub const SIGUSR2: u8 = 23;
pub const SIGVTALRM: u8 = 24;
pub const SIGXCPU: u8 = 25;
pub const SIGXFSZ: u8 = 26;
