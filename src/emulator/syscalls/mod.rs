pub mod fs_constants;
pub mod net_constants;
pub mod sys_constants;

pub mod event_calls;
pub mod fd_calls;
pub mod fs_calls;
pub mod net_calls;
pub mod sys_calls;
