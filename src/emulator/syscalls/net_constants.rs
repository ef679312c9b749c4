// Socket related constants of the guest ABI.

#![allow(dead_code)]

// sock_recv input flags.
pub const SOCK_RECV_PEEK: u16 = 0x0004;
pub const SOCK_RECV_WAITALL: u16 = 0x0010;

// sock_recv output flags.
pub const SOCK_RECV_FDS_TRUNCATED: u16 = 0x0001;
pub const SOCK_RECV_DATA_TRUNCATED: u16 = 0x0002;

// sock_shutdown directions.
pub const SHUT_RD: u8 = 0x01;
pub const SHUT_WR: u8 = 0x02;
