#![cfg_attr(not(any(test, feature = "sim")), no_std)]

pub mod spi;
pub mod spi_os;

#[cfg(any(test, feature = "sim"))]
pub mod sim;
