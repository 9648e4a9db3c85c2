//! Backend implementations

pub mod emulator;
pub mod mem;
pub mod network;
