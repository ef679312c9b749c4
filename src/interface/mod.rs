// Module definitions for the host interface layer.
// This layer is the only place that talks to libc directly; everything the
// emulator needs from the host is re-exported from here.

pub mod comm;
pub mod errnos;
pub mod file;
pub mod misc;
pub mod timer;
pub mod types;
pub use comm::*;
pub use errnos::*;
pub use file::*;
pub use misc::*;
pub use timer::*;
pub use types::*;
