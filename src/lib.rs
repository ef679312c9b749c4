#![allow(unused_imports)]

// interface and emulator are public because otherwise there isn't a great
// way to 'use' them for benchmarking.
pub mod emulator;
pub mod interface;
pub mod tests;
