#![cfg_attr(not(any(test, feature = "sim")), no_std)]

pub mod fifo_c;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use fifo_c::FifoC;
