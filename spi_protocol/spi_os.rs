use core::convert::Infallible;
use core::hint;

use crate::spi::SpiHalError;

#[cfg(feature = "log")]
#[doc(hidden)]
pub use log as __log;

// `log` backed implementation
#[cfg(feature = "log")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        $crate::spi_os::__log::debug!($($arg)*)
    };
}

#[cfg(feature = "log")]
#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)*) => {
        $crate::spi_os::__log::warn!($($arg)*)
    };
}

/// Bare metal
#[cfg(not(feature = "log"))]
#[macro_export]
// No operation, would be optimized out
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "log"))]
#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)*) => {};
}

/// A bound on how long a status poll may spin.
///
/// `poll` is called once every time a polled status flag is found not ready.
/// Returning an error aborts the transfer in progress; the controller is then
/// left mid-transfer and the caller owns the recovery (deselect, reset).
pub trait Deadline {
    type Error;

    fn poll(&mut self) -> Result<(), Self::Error>;
}

/// Never expires. This is what the plain `read`/`write` calls use: the
/// hardware is trusted to finish within microseconds and a stuck flag hangs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Forever;

impl Deadline for Forever {
    type Error = Infallible;

    #[inline(always)]
    fn poll(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

/// Expires after a fixed number of unsuccessful status polls, counted over
/// the whole lifetime of the value (one `SpinLimit` per transfer gives a
/// per-transfer budget).
#[derive(Debug, Clone, Copy)]
pub struct SpinLimit {
    remaining: u32,
}

impl SpinLimit {
    pub const fn new(polls: u32) -> Self {
        SpinLimit { remaining: polls }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl Deadline for SpinLimit {
    type Error = SpiHalError;

    #[inline]
    fn poll(&mut self) -> Result<(), SpiHalError> {
        if self.remaining == 0 {
            crate::warn_log!("spi: status poll budget exhausted");
            return Err(SpiHalError::ETIMEDOUT);
        }
        self.remaining -= 1;
        Ok(())
    }
}

/// Spin until `ready` reports true, charging every miss to `deadline`.
#[inline(always)]
pub fn spin_until<D: Deadline>(
    deadline: &mut D,
    mut ready: impl FnMut() -> bool,
) -> Result<(), D::Error> {
    while !ready() {
        deadline.poll()?;
        hint::spin_loop();
    }
    Ok(())
}

/// Unwrap the result of a transfer run against [`Forever`].
#[inline(always)]
pub fn never_expires(res: Result<(), Infallible>) {
    match res {
        Ok(()) => {}
        Err(never) => match never {},
    }
}
