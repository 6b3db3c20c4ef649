//! The byte-at-a-time engine shared by the shift-register revisions.
//!
//! Both revisions expose a mode register (direction and receive length), a
//! status register and a 16 bit shift register whose low byte lane carries
//! the data. They only differ in where those registers sit and in the bit
//! layout of mode and status, which [`ShifterRevision`] describes.

use core::marker::PhantomData;

use spi_protocol::spi::card_detect::{CardDetect, CardDetectLayout};
use spi_protocol::spi::{ClockSpeed, HardwareVariant, RegisterIo, SpiHardware, TransferDirection};
use spi_protocol::spi_os::{spin_until, Deadline};

/// Register layout and bit encoding of one shift-register revision.
pub trait ShifterRevision {
    const VARIANT: HardwareVariant;

    const CLOCK_DIVISOR: usize;
    const SLAVE_SELECT: usize;
    /// Write side of the card-detect/mode register.
    const MODE: usize;
    const STATUS: usize;
    const SHIFT_REG: usize;
    const CARD_DETECT: CardDetectLayout;

    const FAST_DIVISOR: u16;
    const SLOW_DIVISOR: u16;

    /// Largest receive length the mode register can hold.
    const MAX_RX_LENGTH: usize;

    /// Mode register value starting a transfer. `len` is only meaningful for reads.
    fn mode(direction: TransferDirection, len: usize) -> u16;

    /// A received byte is waiting in the shift register.
    fn rx_ready(status: u16) -> bool;

    /// The shift register can take the next byte.
    fn tx_ready(status: u16) -> bool;

    /// The shifter is still clocking bits out.
    fn busy(status: u16) -> bool;
}

pub struct Shifter<R, V> {
    io: R,
    _revision: PhantomData<fn() -> V>,
}

impl<R: RegisterIo + Clone, V: ShifterRevision> Shifter<R, V> {
    pub fn new(io: R) -> Self {
        Shifter {
            io,
            _revision: PhantomData,
        }
    }

    pub fn io(&self) -> &R {
        &self.io
    }

    #[inline(always)]
    fn status(&self) -> u16 {
        self.io.read_u16(V::STATUS)
    }
}

impl<R: core::fmt::Debug, V: ShifterRevision> core::fmt::Debug for Shifter<R, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Shifter")
            .field("variant", &V::VARIANT)
            .field("io", &self.io)
            .finish()
    }
}

impl<R: RegisterIo + Clone, V: ShifterRevision> SpiHardware for Shifter<R, V> {
    type Io = R;

    fn variant(&self) -> HardwareVariant {
        V::VARIANT
    }

    fn card_detect(&self) -> CardDetect<R> {
        CardDetect::new(self.io.clone(), V::CARD_DETECT)
    }

    fn spi_select(&mut self) {
        self.io.write_u16(V::SLAVE_SELECT, 1);
    }

    fn spi_deselect(&mut self) {
        self.io.write_u16(V::SLAVE_SELECT, 0);
    }

    fn clock_divisor(&self, speed: ClockSpeed) -> u16 {
        match speed {
            ClockSpeed::Fast => V::FAST_DIVISOR,
            ClockSpeed::Slow => V::SLOW_DIVISOR,
        }
    }

    fn spi_set_speed(&mut self, speed: ClockSpeed) {
        self.io.write_u16(V::CLOCK_DIVISOR, self.clock_divisor(speed));
    }

    /// Reads longer than the mode register's length field are split, each
    /// segment starting with its own mode write. An empty read touches nothing.
    fn spi_read_until<D: Deadline>(
        &mut self,
        buf: &mut [u8],
        deadline: &mut D,
    ) -> Result<(), D::Error> {
        for segment in buf.chunks_mut(V::MAX_RX_LENGTH) {
            self.io
                .write_u16(V::MODE, V::mode(TransferDirection::Read, segment.len()));
            for byte in segment.iter_mut() {
                spin_until(deadline, || V::rx_ready(self.status()))?;
                *byte = self.io.read_u16(V::SHIFT_REG) as u8;
            }
        }
        Ok(())
    }

    /// Each byte is stored and then waited on until the shifter has picked
    /// it up, so the final busy poll covers the last byte too.
    fn spi_write_until<D: Deadline>(&mut self, buf: &[u8], deadline: &mut D) -> Result<(), D::Error> {
        self.io
            .write_u16(V::MODE, V::mode(TransferDirection::Write, 0));
        for &byte in buf {
            self.io.write_u16(V::SHIFT_REG, byte as u16);
            spin_until(deadline, || V::tx_ready(self.status()))?;
        }
        spin_until(deadline, || !V::busy(self.status()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{ShifterSim, SimMode, SimRevision};
    use crate::{RevA, RevB};
    use spi_protocol::sim::{pattern, AlignedBuf, SimBus, Width};
    use spi_protocol::spi::SpiHalError;
    use spi_protocol::spi_os::SpinLimit;

    const LENGTHS: [usize; 11] = [0, 1, 2, 3, 4, 15, 16, 17, 31, 32, 33];

    fn round_trip<V: SimRevision>() {
        for len in LENGTHS {
            for odd in [false, true] {
                let bus = SimBus::new(ShifterSim::<V>::new(true));
                let mut hw = Shifter::<_, V>::new(&bus);
                let data = pattern(len, len as u8);

                let mut out = AlignedBuf::new();
                out.slice(odd, len).copy_from_slice(&data);
                hw.spi_write(out.slice(odd, len));

                let mut back = AlignedBuf::new();
                hw.spi_read(back.slice(odd, len));

                assert_eq!(back.slice(odd, len), &data[..], "len {} odd {}", len, odd);
                assert_eq!(bus.with_device(|dev| dev.wire.sent().to_vec()), data);
            }
        }
    }

    #[test]
    fn shifter_a_round_trip() {
        round_trip::<RevA>();
    }

    #[test]
    fn shifter_b_round_trip() {
        round_trip::<RevB>();
    }

    #[test]
    fn every_byte_waits_for_the_shifter() {
        let bus = SimBus::new(ShifterSim::<RevB>::new(true));
        let mut hw = Shifter::<_, RevB>::new(&bus);
        hw.spi_write(&[1, 2, 3]);

        let trace = bus.trace();
        assert!(trace[0].is_write() && trace[0].offset() == RevB::MODE);
        let data: Vec<_> = trace
            .iter()
            .filter(|a| a.is_write() && a.offset() == RevB::SHIFT_REG)
            .collect();
        assert_eq!(data.len(), 3);
        // Never two data writes without a status poll in between.
        for pair in trace.windows(2) {
            assert!(!(pair[0].offset() == RevB::SHIFT_REG && pair[1].offset() == RevB::SHIFT_REG));
        }
        assert!(trace.iter().all(|a| a.width() == Width::Word));
        // The transfer ends on a status read that found the shifter idle.
        assert_eq!(trace.last().map(|a| a.offset()), Some(RevB::STATUS));
        assert!(!bus.with_device(|dev| dev.busy()));
    }

    fn single_byte_has_left_on_return<V: SimRevision>() {
        let bus = SimBus::new(ShifterSim::<V>::new(true));
        bus.with_device(|dev| dev.pickup = 3);
        let mut hw = Shifter::<_, V>::new(&bus);

        hw.spi_write(&[0xFF]);

        bus.with_device(|dev| {
            assert_eq!(dev.wire.sent(), [0xFF]);
            assert!(!dev.busy());
        });
    }

    #[test]
    fn shifter_a_write_returns_after_the_last_byte_left() {
        single_byte_has_left_on_return::<RevA>();
    }

    #[test]
    fn shifter_b_write_returns_after_the_last_byte_left() {
        single_byte_has_left_on_return::<RevB>();
    }

    #[test]
    fn slow_pickup_is_waited_for_before_the_next_byte() {
        let bus = SimBus::new(ShifterSim::<RevB>::new(true));
        bus.with_device(|dev| dev.pickup = 4);
        let mut hw = Shifter::<_, RevB>::new(&bus);

        hw.spi_write(&[0x40, 0x95]);

        assert_eq!(bus.with_device(|dev| dev.wire.sent().to_vec()), [0x40, 0x95]);
    }

    #[test]
    fn long_reads_are_split_into_segments() {
        let len = RevA::MAX_RX_LENGTH + 5;
        let bus = SimBus::new(ShifterSim::<RevA>::new(true));
        let mut hw = Shifter::<_, RevA>::new(&bus);
        let mut buf = vec![0u8; len];

        hw.spi_read(&mut buf);

        let modes: Vec<_> = bus
            .trace()
            .iter()
            .filter(|a| a.is_write() && a.offset() == RevA::MODE)
            .map(|a| match *a {
                spi_protocol::sim::Access::Write { value, .. } => RevA::decode_mode(value as u16),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(
            modes,
            [SimMode::Read(RevA::MAX_RX_LENGTH), SimMode::Read(5)]
        );
        // Nothing was looped back, so the line idled high.
        assert!(buf.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn empty_read_touches_nothing() {
        let bus = SimBus::new(ShifterSim::<RevA>::new(true));
        let mut hw = Shifter::<_, RevA>::new(&bus);
        hw.spi_read(&mut [0u8; 0]);
        assert!(bus.trace().is_empty());
    }

    #[test]
    fn empty_write_still_waits_for_idle() {
        let bus = SimBus::new(ShifterSim::<RevB>::new(true));
        let mut hw = Shifter::<_, RevB>::new(&bus);
        hw.spi_write(&[]);

        let trace = bus.trace();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0].offset(), RevB::MODE);
        assert_eq!(trace[1].offset(), RevB::STATUS);
    }

    #[test]
    fn set_speed_is_idempotent() {
        let bus = SimBus::new(ShifterSim::<RevA>::new(true));
        let mut hw = Shifter::<_, RevA>::new(&bus);

        hw.spi_set_speed(ClockSpeed::Fast);
        let once = bus.with_device(|dev| dev.clock_divisor());
        hw.spi_set_speed(ClockSpeed::Fast);
        assert_eq!(bus.with_device(|dev| dev.clock_divisor()), once);
        assert_eq!(once, 1);

        hw.spi_set_speed(ClockSpeed::Slow);
        assert_eq!(bus.with_device(|dev| dev.clock_divisor()), 124);
    }

    #[test]
    fn fast_clock_differs_per_revision() {
        let a = SimBus::new(ShifterSim::<RevA>::new(true));
        let b = SimBus::new(ShifterSim::<RevB>::new(true));
        assert_eq!(Shifter::<_, RevA>::new(&a).clock_divisor(ClockSpeed::Fast), 1);
        assert_eq!(Shifter::<_, RevB>::new(&b).clock_divisor(ClockSpeed::Fast), 2);
        assert_eq!(ClockSpeed::frequency_hz(RevB::FAST_DIVISOR), 16_666_666);
    }

    #[test]
    fn select_drives_the_slave_select_register() {
        let bus = SimBus::new(ShifterSim::<RevB>::new(true));
        let mut hw = Shifter::<_, RevB>::new(&bus);
        hw.spi_select();
        assert!(bus.with_device(|dev| dev.selected()));
        hw.spi_deselect();
        assert!(!bus.with_device(|dev| dev.selected()));
    }

    #[test]
    fn stuck_status_expires_the_deadline() {
        let bus = SimBus::new(ShifterSim::<RevA>::new(true));
        bus.with_device(|dev| dev.stalled = true);
        let mut hw = Shifter::<_, RevA>::new(&bus);

        let mut buf = [0u8; 4];
        let mut limit = SpinLimit::new(10);
        assert_eq!(
            hw.spi_read_until(&mut buf, &mut limit),
            Err(SpiHalError::ETIMEDOUT)
        );
        let polls = bus
            .trace()
            .iter()
            .filter(|a| a.offset() == RevA::STATUS)
            .count();
        assert_eq!(polls, 11);
    }

    #[test]
    fn generous_deadline_lets_the_transfer_finish() {
        let bus = SimBus::new(ShifterSim::<RevB>::new(true));
        let mut hw = Shifter::<_, RevB>::new(&bus);
        let mut limit = SpinLimit::new(1_000);
        assert_eq!(hw.spi_write_until(&[0x40, 0, 0, 0, 0, 0x95], &mut limit), Ok(()));
        assert!(limit.remaining() < 1_000);
    }

    #[test]
    fn card_detect_view_uses_the_revision_layout() {
        let bus = SimBus::new(ShifterSim::<RevA>::new(true));
        let hw = Shifter::<_, RevA>::new(&bus);
        let cd = hw.card_detect();
        assert_eq!(*cd.layout(), RevA::CARD_DETECT);
        assert!(cd.present_and_rearm());
        bus.with_device(|dev| dev.slot.toggle());
        assert!(cd.changed());
    }
}
