use spi_hal_fifo::FifoC;
use spi_hal_shifter::{ShifterA, ShifterB};
use spi_protocol::spi::card_detect::CardDetect;
use spi_protocol::spi::{ClockSpeed, HardwareVariant, RegisterIo, SpiHardware};
use spi_protocol::spi_os::Deadline;

/// Any one of the three controller revisions, chosen at run time.
///
/// The revision is matched once per call; the byte loops run inside the
/// revision's own implementation.
#[derive(Debug)]
pub enum Controller<R> {
    ShifterA(ShifterA<R>),
    ShifterB(ShifterB<R>),
    FifoC(FifoC<R>),
}

macro_rules! dispatch {
    ($self:expr, $hw:ident => $call:expr) => {
        match $self {
            Controller::ShifterA($hw) => $call,
            Controller::ShifterB($hw) => $call,
            Controller::FifoC($hw) => $call,
        }
    };
}

impl<R: RegisterIo + Clone> Controller<R> {
    pub fn new(variant: HardwareVariant, io: R) -> Self {
        match variant {
            HardwareVariant::ShifterA => Controller::ShifterA(ShifterA::new(io)),
            HardwareVariant::ShifterB => Controller::ShifterB(ShifterB::new(io)),
            HardwareVariant::FifoC => Controller::FifoC(FifoC::new(io)),
        }
    }

    pub fn io(&self) -> &R {
        dispatch!(self, hw => hw.io())
    }
}

impl<R: RegisterIo + Clone> SpiHardware for Controller<R> {
    type Io = R;

    fn variant(&self) -> HardwareVariant {
        dispatch!(self, hw => hw.variant())
    }

    fn card_detect(&self) -> CardDetect<R> {
        dispatch!(self, hw => hw.card_detect())
    }

    fn spi_select(&mut self) {
        dispatch!(self, hw => hw.spi_select())
    }

    fn spi_deselect(&mut self) {
        dispatch!(self, hw => hw.spi_deselect())
    }

    fn clock_divisor(&self, speed: ClockSpeed) -> u16 {
        dispatch!(self, hw => hw.clock_divisor(speed))
    }

    fn spi_set_speed(&mut self, speed: ClockSpeed) {
        dispatch!(self, hw => hw.spi_set_speed(speed))
    }

    fn spi_read_until<D: Deadline>(
        &mut self,
        buf: &mut [u8],
        deadline: &mut D,
    ) -> Result<(), D::Error> {
        dispatch!(self, hw => hw.spi_read_until(buf, deadline))
    }

    fn spi_write_until<D: Deadline>(&mut self, buf: &[u8], deadline: &mut D) -> Result<(), D::Error> {
        dispatch!(self, hw => hw.spi_write_until(buf, deadline))
    }
}
