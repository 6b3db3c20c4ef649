use crate::debug_log;
use crate::spi_os::Deadline;

use super::card_detect::CardDetect;
use super::interrupt::{IntServer, InterruptContext, InterruptHost, IrqSource};
use super::{ClockSpeed, HardwareVariant, SpiHalError, SpiHardware};

/// Name the card-detect server is registered under.
pub const SPI_SERVER_NAME: &str = "spisd";
/// Low priority: the card-detect edge is never urgent compared to the other
/// peripherals sharing the source.
pub const SPI_SERVER_PRIORITY: i8 = -60;
pub const SPI_IRQ_SOURCE: IrqSource = IrqSource::Ports;

/// A controller bound to the host: card-detect server installed, clock set up.
///
/// The data path is driven synchronously through `&mut self`; the
/// card-detect server runs from interrupt context and only ever sees the
/// [`CardDetect`] view. `host` is usually a shared reference to the
/// platform's registration facility. Dropping the driver performs the same teardown as
/// [`SpiSd::shutdown`].
pub struct SpiSd<'a, T: SpiHardware, H: InterruptHost<'a>> {
    hardware: T,
    card_detect: CardDetect<T::Io>,
    host: H,
    server: Option<H::Handle>,
}

impl<'a, T, H> SpiSd<'a, T, H>
where
    T: SpiHardware,
    T::Io: Sync + 'a,
    H: InterruptHost<'a>,
{
    /// Bring the controller up and install the card-detect server.
    ///
    /// The clock is forced to [`ClockSpeed::Slow`], the card-detect source is
    /// disabled and cleared, the interrupt context is built in `context`
    /// (which has to outlive the registration) and handed to `host`. The
    /// source is armed last, by the presence query whose result is returned,
    /// so the caller starts from a known card state and no edge can fire
    /// before the server is in place.
    ///
    /// `on_change` runs in interrupt context: it must not block, allocate or
    /// start a transfer.
    pub fn initialize<F>(
        mut hardware: T,
        host: H,
        context: &'a mut Option<InterruptContext<T::Io, F>>,
        on_change: F,
    ) -> Result<(Self, bool), SpiHalError>
    where
        F: Fn() + Sync + 'a,
    {
        hardware.spi_set_speed(ClockSpeed::Slow);

        let card_detect = hardware.card_detect();
        card_detect.disarm();

        let context: &'a InterruptContext<T::Io, F> =
            Option::insert(context, InterruptContext::new(card_detect.clone(), on_change));

        let server = host.add_int_server(
            SPI_IRQ_SOURCE,
            IntServer {
                name: SPI_SERVER_NAME,
                priority: SPI_SERVER_PRIORITY,
                server: context,
            },
        )?;

        debug_log!(
            "spisd: {} controller up, card-detect server installed at priority {}",
            hardware.variant().name(),
            SPI_SERVER_PRIORITY
        );

        let driver = SpiSd {
            hardware,
            card_detect,
            host,
            server: Some(server),
        };
        let present = driver.card_present();

        debug_log!("spisd: card present at init: {}", present);

        Ok((driver, present))
    }
}

impl<'a, T: SpiHardware, H: InterruptHost<'a>> SpiSd<'a, T, H> {
    pub fn variant(&self) -> HardwareVariant {
        self.hardware.variant()
    }

    pub fn hardware(&self) -> &T {
        &self.hardware
    }

    pub fn select(&mut self) {
        self.hardware.spi_select();
    }

    pub fn deselect(&mut self) {
        self.hardware.spi_deselect();
    }

    pub fn set_speed(&mut self, speed: ClockSpeed) {
        debug_log!(
            "spisd: clock {:?} ({} Hz)",
            speed,
            ClockSpeed::frequency_hz(self.hardware.clock_divisor(speed))
        );
        self.hardware.spi_set_speed(speed);
    }

    /// Sample card presence. Re-arms the card-detect interrupt as a side effect.
    pub fn card_present(&self) -> bool {
        self.card_detect.present_and_rearm()
    }

    pub fn read(&mut self, buf: &mut [u8]) {
        self.hardware.spi_read(buf);
    }

    pub fn write(&mut self, buf: &[u8]) {
        self.hardware.spi_write(buf);
    }

    pub fn read_until<D: Deadline>(&mut self, buf: &mut [u8], deadline: &mut D) -> Result<(), D::Error> {
        self.hardware.spi_read_until(buf, deadline)
    }

    pub fn write_until<D: Deadline>(&mut self, buf: &[u8], deadline: &mut D) -> Result<(), D::Error> {
        self.hardware.spi_write_until(buf, deadline)
    }

    /// Disable the card-detect source and remove the server.
    ///
    /// Taking `self` means no transfer can still be running.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(server) = self.server.take() {
            self.card_detect.disarm();
            self.host.rem_int_server(SPI_IRQ_SOURCE, server);
            debug_log!("spisd: card-detect server removed");
        }
    }
}

impl<'a, T: SpiHardware, H: InterruptHost<'a>> Drop for SpiSd<'a, T, H> {
    fn drop(&mut self) {
        self.teardown();
    }
}
