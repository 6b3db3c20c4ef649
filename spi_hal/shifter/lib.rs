#![cfg_attr(not(any(test, feature = "sim")), no_std)]

pub mod shifter;
pub mod shifter_a;
pub mod shifter_b;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use shifter::{Shifter, ShifterRevision};
pub use shifter_a::{RevA, ShifterA};
pub use shifter_b::{RevB, ShifterB};
