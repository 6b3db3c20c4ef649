use core::ptr::{self, NonNull};

use crate::spi_os::{never_expires, Deadline, Forever};

pub mod card_detect;
pub mod driver;
pub mod interrupt;

use card_detect::CardDetect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiHalError {
    // A `Deadline` other than `Forever` ran out while a status flag was polled
    ETIMEDOUT,
    // Bad base address or configuration
    EINVAL,
    // The interrupt-server chain has no room left
    EBUSY,
    // Resource discovery found no controller
    ENODEV,
}

/// The three register-layout revisions of the controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HardwareVariant {
    /// First shift-register revision, 25 MHz fast clock, 10 bit receive length.
    ShifterA,
    /// Shift-register revision fitted to the SF2000 slot, 16 MHz fast clock.
    ShifterB,
    /// FIFO revision with a longword data port and a byte-lane alias.
    FifoC,
}

impl HardwareVariant {
    pub fn name(&self) -> &'static str {
        match self {
            HardwareVariant::ShifterA => "shifter-a",
            HardwareVariant::ShifterB => "shifter-b",
            HardwareVariant::FifoC => "fifo-c",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClockSpeed {
    /// Data transfer speed. What this means in Hz depends on the revision.
    Fast,
    /// 400 kHz, the speed a card has to be initialised at.
    Slow,
}

/// Every revision derives the SPI clock from the same 50 MHz source:
/// `f = CONTROLLER_CLOCK_HZ / (divisor + 1)`.
pub const CONTROLLER_CLOCK_HZ: u32 = 50_000_000;

impl ClockSpeed {
    /// Resulting SPI clock for a divisor register value.
    pub fn frequency_hz(divisor: u16) -> u32 {
        CONTROLLER_CLOCK_HZ / (divisor as u32 + 1)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferDirection {
    Read,
    Write,
}

/// Access to the controller's register window.
///
/// Offsets are byte offsets from the base of the window. All methods take
/// `&self`: a register access is a volatile bus cycle, not a Rust-level
/// mutation, and the card-detect handler has to reach the same window from
/// interrupt context while a transfer owns the data path.
pub trait RegisterIo {
    fn read_u8(&self, offset: usize) -> u8;
    fn write_u8(&self, offset: usize, value: u8);
    fn read_u16(&self, offset: usize) -> u16;
    fn write_u16(&self, offset: usize, value: u16);
    fn read_u32(&self, offset: usize) -> u32;
    fn write_u32(&self, offset: usize, value: u32);
}

impl<R: RegisterIo + ?Sized> RegisterIo for &R {
    #[inline(always)]
    fn read_u8(&self, offset: usize) -> u8 {
        (**self).read_u8(offset)
    }

    #[inline(always)]
    fn write_u8(&self, offset: usize, value: u8) {
        (**self).write_u8(offset, value)
    }

    #[inline(always)]
    fn read_u16(&self, offset: usize) -> u16 {
        (**self).read_u16(offset)
    }

    #[inline(always)]
    fn write_u16(&self, offset: usize, value: u16) {
        (**self).write_u16(offset, value)
    }

    #[inline(always)]
    fn read_u32(&self, offset: usize) -> u32 {
        (**self).read_u32(offset)
    }

    #[inline(always)]
    fn write_u32(&self, offset: usize, value: u32) {
        (**self).write_u32(offset, value)
    }
}

/// The memory-mapped register window at a fixed bus address.
///
/// Copying an `Mmio` copies the address, not the registers.
#[derive(Debug, Clone, Copy)]
pub struct Mmio {
    base: NonNull<u8>,
}

// The window is plain device memory, every access goes through volatile reads and writes.
unsafe impl Send for Mmio {}
unsafe impl Sync for Mmio {}

impl Mmio {
    /// # Safety
    /// `base` must be the address of the controller's register window, mapped
    /// uncached, for as long as this value or any copy of it is used.
    pub unsafe fn new(base: usize) -> Result<Mmio, SpiHalError> {
        // Registers are 16 bit wide and word aligned on every revision
        if base & 1 != 0 {
            return Err(SpiHalError::EINVAL);
        }
        NonNull::new(base as *mut u8)
            .map(|base| Mmio { base })
            .ok_or(SpiHalError::EINVAL)
    }

    pub fn base(&self) -> usize {
        self.base.as_ptr() as usize
    }
}

impl RegisterIo for Mmio {
    #[inline(always)]
    fn read_u8(&self, offset: usize) -> u8 {
        unsafe { ptr::read_volatile(self.base.as_ptr().add(offset)) }
    }

    #[inline(always)]
    fn write_u8(&self, offset: usize, value: u8) {
        unsafe { ptr::write_volatile(self.base.as_ptr().add(offset), value) }
    }

    #[inline(always)]
    fn read_u16(&self, offset: usize) -> u16 {
        unsafe { ptr::read_volatile(self.base.as_ptr().add(offset).cast::<u16>()) }
    }

    #[inline(always)]
    fn write_u16(&self, offset: usize, value: u16) {
        unsafe { ptr::write_volatile(self.base.as_ptr().add(offset).cast::<u16>(), value) }
    }

    #[inline(always)]
    fn read_u32(&self, offset: usize) -> u32 {
        unsafe { ptr::read_volatile(self.base.as_ptr().add(offset).cast::<u32>()) }
    }

    #[inline(always)]
    fn write_u32(&self, offset: usize, value: u32) {
        unsafe { ptr::write_volatile(self.base.as_ptr().add(offset).cast::<u32>(), value) }
    }
}

/// One controller revision.
///
/// `spi_select`, `spi_deselect` and `spi_set_speed` are single register
/// writes on every revision. The transfer calls are where the revisions
/// differ: they move the whole buffer and return only once the last byte has
/// been clocked, so a `spi_deselect` right after a write never cuts a byte.
///
/// Chip select is not bracketed here. A command sequence may keep the card
/// selected across several reads and writes and the caller decides when to let go.
///
/// Card-detect registers are not reachable through this trait at all, only
/// through the [`CardDetect`] view returned by `card_detect`. The transfer
/// path and the interrupt handler therefore never touch the same register.
pub trait SpiHardware {
    type Io: RegisterIo + Clone;

    fn variant(&self) -> HardwareVariant;

    /// View over the card-detect and interrupt registers of this controller.
    fn card_detect(&self) -> CardDetect<Self::Io>;

    fn spi_select(&mut self);

    fn spi_deselect(&mut self);

    /// Divisor register value this revision uses for `speed`.
    fn clock_divisor(&self, speed: ClockSpeed) -> u16;

    fn spi_set_speed(&mut self, speed: ClockSpeed);

    /// Shift `buf.len()` bytes in, charging every unsuccessful status poll to `deadline`.
    fn spi_read_until<D: Deadline>(&mut self, buf: &mut [u8], deadline: &mut D)
        -> Result<(), D::Error>;

    /// Shift `buf` out and wait for the shifter to go idle, charging every
    /// unsuccessful status poll to `deadline`.
    fn spi_write_until<D: Deadline>(&mut self, buf: &[u8], deadline: &mut D)
        -> Result<(), D::Error>;

    fn spi_read(&mut self, buf: &mut [u8]) {
        never_expires(self.spi_read_until(buf, &mut Forever));
    }

    fn spi_write(&mut self, buf: &[u8]) {
        never_expires(self.spi_write_until(buf, &mut Forever));
    }
}
