// Misc functions for the interface layer: randomness, thread ids, logging.

use rand::Rng;
use std::io::Write;

use crate::interface::types::{RustAtomicOrdering, RustAtomicU32, Tid};

// Print text to stdout
pub fn log_to_stdout(s: &str) {
    print!("{}", s);
}

// Print text to stderr
pub fn log_to_stderr(s: &str) {
    let _ = std::io::stderr().write_all(s.as_bytes());
}

/// Returns a uniformly distributed value in [0, n).
pub fn random_uniform(n: u64) -> u64 {
    rand::thread_rng().gen_range(0..n)
}

/// Fills the buffer with random bytes.
pub fn random_buf(buf: &mut [u8]) {
    rand::thread_rng().fill(buf);
}

// Thread id 0 is reserved so a zeroed field never aliases a real thread.
static NEXT_TID: RustAtomicU32 = RustAtomicU32::new(1);

/// Hands out guest thread identifiers. Ids are never reused within a
/// process lifetime.
pub fn tidpool_allocate() -> Tid {
    NEXT_TID.fetch_add(1, RustAtomicOrdering::Relaxed)
}
