//! Where the controller lives and which revision it is.

use spi_protocol::debug_log;
use spi_protocol::spi::{HardwareVariant, Mmio, SpiHalError};

use crate::controller::Controller;

/// Base address of the SD slot on the SF2000 board. Only a placeholder:
/// boards that enumerate their expansion bus should look the address up
/// through a [`ResourceDiscovery`] instead.
pub const SF2000_DEFAULT_BASE: usize = 0xEE_0000;

/// Identifies a controller to the platform's resource discovery,
/// e.g. a manufacturer/product pair packed into one word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub u32);

/// The platform's base-address lookup.
pub trait ResourceDiscovery {
    fn base_address(&self, device: DeviceId) -> Result<usize, SpiHalError>;
}

/// Discovery that knows a single device at a fixed address.
#[derive(Debug, Clone, Copy)]
pub struct FixedBase {
    device: DeviceId,
    base: usize,
}

impl FixedBase {
    pub const fn new(device: DeviceId, base: usize) -> Self {
        FixedBase { device, base }
    }
}

impl ResourceDiscovery for FixedBase {
    fn base_address(&self, device: DeviceId) -> Result<usize, SpiHalError> {
        if device == self.device {
            Ok(self.base)
        } else {
            Err(SpiHalError::ENODEV)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiSdConfig {
    pub variant: HardwareVariant,
    pub base: usize,
}

impl SpiSdConfig {
    pub const fn new(variant: HardwareVariant, base: usize) -> Self {
        SpiSdConfig { variant, base }
    }

    /// The SF2000 slot at its historical address.
    pub const fn sf2000() -> Self {
        SpiSdConfig::new(HardwareVariant::ShifterB, SF2000_DEFAULT_BASE)
    }

    pub fn discover<D: ResourceDiscovery>(
        variant: HardwareVariant,
        discovery: &D,
        device: DeviceId,
    ) -> Result<Self, SpiHalError> {
        let base = discovery.base_address(device)?;
        debug_log!(
            "spisd: {} controller for device {:#x} at {:#x}",
            variant.name(),
            device.0,
            base
        );
        Ok(SpiSdConfig::new(variant, base))
    }

    /// Map the configured controller.
    ///
    /// # Safety
    /// `self.base` must be the address of a controller of revision
    /// `self.variant`, accessible for as long as the returned value or any
    /// card-detect view taken from it is in use.
    pub unsafe fn open(&self) -> Result<Controller<Mmio>, SpiHalError> {
        let io = unsafe { Mmio::new(self.base)? };
        debug_log!("spisd: mapped {} controller at {:#x}", self.variant.name(), io.base());
        Ok(Controller::new(self.variant, io))
    }
}

impl Default for SpiSdConfig {
    fn default() -> Self {
        SpiSdConfig::sf2000()
    }
}
