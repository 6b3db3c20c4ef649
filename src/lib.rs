//! Driver for the SPI SD slot controller family.
//!
//! [`SpiSdConfig`] names the controller revision and where its registers
//! live, [`Controller`] wraps whichever revision that is behind a single
//! [`SpiHardware`] implementation, and [`SpiSd`] does the lifecycle work on
//! top: clock setup, card-detect interrupt server, presence queries.
//! Platforms without an interrupt-server facility of their own can use
//! [`ServerChain`].
#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod controller;
pub mod interrupt_chain;

pub use board::{DeviceId, FixedBase, ResourceDiscovery, SpiSdConfig, SF2000_DEFAULT_BASE};
pub use controller::Controller;
pub use interrupt_chain::{ServerChain, ServerHandle};

pub use spi_protocol::spi::driver::SpiSd;
pub use spi_protocol::spi::interrupt::{InterruptContext, IrqSource};
pub use spi_protocol::spi::{ClockSpeed, HardwareVariant, Mmio, SpiHalError, SpiHardware};
pub use spi_protocol::spi_os::{Deadline, Forever, SpinLimit};
