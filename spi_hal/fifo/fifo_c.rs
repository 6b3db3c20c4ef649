//! FIFO revision of the controller.
//!
//! Data goes through a 32 byte FIFO per direction instead of a single shift
//! register. The FIFO port takes word and longword accesses; a byte-lane
//! alias of the port moves single bytes. Bulk transfers move 16 bytes per
//! half-full/half-empty poll, which is where this revision gets its speed.
//!
//! | Offset | Register |
//! |---|---|
//! | 0x00 | clock divisor |
//! | 0x02 | slave select |
//! | 0x04 | card detect (read) / mode (write) |
//! | 0x06 | status |
//! | 0x08 | interrupt request |
//! | 0x0A | interrupt enable |
//! | 0x0C | interrupt active |
//! | 0x10 | FIFO port, word or longword |
//! | 0x15 | FIFO port, byte lane |

use spi_protocol::spi::card_detect::{CardDetect, CardDetectLayout};
use spi_protocol::spi::{ClockSpeed, HardwareVariant, RegisterIo, SpiHardware};
use spi_protocol::spi_os::{spin_until, Deadline};
use tock_registers::{register_bitfields, LocalRegisterCopy};

pub const CLOCK_DIVISOR: usize = 0x00;
pub const SLAVE_SELECT: usize = 0x02;
pub const MODE: usize = 0x04;
pub const STATUS: usize = 0x06;
pub const FIFO_DATA: usize = 0x10;
pub const FIFO_BYTE: usize = 0x15;

pub const CARD_DETECT: CardDetectLayout = CardDetectLayout {
    card_detect: 0x04,
    present_mask: 1,
    int_req: 0x08,
    int_ena: 0x0A,
    int_act: 0x0C,
};

// 25 MHz
pub const FAST_DIVISOR: u16 = 1;
// 400 kHz
pub const SLOW_DIVISOR: u16 = 124;

pub const FIFO_DEPTH: usize = 32;
/// Bytes moved per half-full/half-empty poll.
pub const CHUNK: usize = FIFO_DEPTH / 2;
/// Longest read started by one mode write. The length field holds 13 bits;
/// staying on a chunk boundary keeps every segment but the last one on the
/// longword path.
pub const MAX_RX_SEGMENT: usize = 0x1FF0;

register_bitfields![u16,
    pub(crate) MODE_REG [
        RX_LENGTH OFFSET(0) NUMBITS(13) [],
        DIRECTION OFFSET(14) NUMBITS(2) [
            Stop = 0,
            Rx = 1,
            Tx = 2,
            Both = 3,
        ]
    ],
    pub(crate) STATUS_REG [
        RX_EMPTY OFFSET(0) NUMBITS(1) [],
        RX_FULL OFFSET(1) NUMBITS(1) [],
        TX_EMPTY OFFSET(2) NUMBITS(1) [],
        TX_FULL OFFSET(3) NUMBITS(1) [],
        RX_HALF_FULL OFFSET(4) NUMBITS(1) [],
        TX_HALF_EMPTY OFFSET(5) NUMBITS(1) [],
        BUSY OFFSET(6) NUMBITS(1) []
    ],
];

type Status = LocalRegisterCopy<u16, STATUS_REG::Register>;

pub struct FifoC<R> {
    io: R,
}

impl<R: RegisterIo + Clone> FifoC<R> {
    pub fn new(io: R) -> Self {
        FifoC { io }
    }

    pub fn io(&self) -> &R {
        &self.io
    }

    #[inline(always)]
    fn status(&self) -> Status {
        Status::new(self.io.read_u16(STATUS))
    }

    #[inline(always)]
    fn wait_rx<D: Deadline>(&self, deadline: &mut D) -> Result<(), D::Error> {
        spin_until(deadline, || !self.status().is_set(STATUS_REG::RX_EMPTY))
    }

    #[inline(always)]
    fn wait_tx<D: Deadline>(&self, deadline: &mut D) -> Result<(), D::Error> {
        spin_until(deadline, || !self.status().is_set(STATUS_REG::TX_FULL))
    }

    fn read_segment<D: Deadline>(&self, buf: &mut [u8], deadline: &mut D) -> Result<(), D::Error> {
        let mut mode = LocalRegisterCopy::<u16, MODE_REG::Register>::new(0);
        mode.write(MODE_REG::DIRECTION::Rx + MODE_REG::RX_LENGTH.val(buf.len() as u16));
        self.io.write_u16(MODE, mode.get());

        let rest = if buf.as_ptr() as usize & 1 != 0 && !buf.is_empty() {
            let (first, tail) = buf.split_at_mut(1);
            self.wait_rx(deadline)?;
            first[0] = self.io.read_u8(FIFO_BYTE);
            tail
        } else {
            buf
        };

        let mut chunks = rest.chunks_exact_mut(CHUNK);
        for chunk in &mut chunks {
            spin_until(deadline, || self.status().is_set(STATUS_REG::RX_HALF_FULL))?;
            for long in chunk.chunks_exact_mut(4) {
                long.copy_from_slice(&self.io.read_u32(FIFO_DATA).to_be_bytes());
            }
        }

        let mut words = chunks.into_remainder().chunks_exact_mut(2);
        for word in &mut words {
            self.wait_rx(deadline)?;
            word.copy_from_slice(&self.io.read_u16(FIFO_DATA).to_be_bytes());
        }

        if let [last] = words.into_remainder() {
            self.wait_rx(deadline)?;
            *last = self.io.read_u8(FIFO_BYTE);
        }
        Ok(())
    }
}

impl<R: core::fmt::Debug> core::fmt::Debug for FifoC<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FifoC").field("io", &self.io).finish()
    }
}

impl<R: RegisterIo + Clone> SpiHardware for FifoC<R> {
    type Io = R;

    fn variant(&self) -> HardwareVariant {
        HardwareVariant::FifoC
    }

    fn card_detect(&self) -> CardDetect<R> {
        CardDetect::new(self.io.clone(), CARD_DETECT)
    }

    fn spi_select(&mut self) {
        self.io.write_u16(SLAVE_SELECT, 1);
    }

    fn spi_deselect(&mut self) {
        self.io.write_u16(SLAVE_SELECT, 0);
    }

    fn clock_divisor(&self, speed: ClockSpeed) -> u16 {
        match speed {
            ClockSpeed::Fast => FAST_DIVISOR,
            ClockSpeed::Slow => SLOW_DIVISOR,
        }
    }

    fn spi_set_speed(&mut self, speed: ClockSpeed) {
        self.io.write_u16(CLOCK_DIVISOR, self.clock_divisor(speed));
    }

    fn spi_read_until<D: Deadline>(
        &mut self,
        buf: &mut [u8],
        deadline: &mut D,
    ) -> Result<(), D::Error> {
        for segment in buf.chunks_mut(MAX_RX_SEGMENT) {
            self.read_segment(segment, deadline)?;
        }
        Ok(())
    }

    fn spi_write_until<D: Deadline>(&mut self, buf: &[u8], deadline: &mut D) -> Result<(), D::Error> {
        let mut mode = LocalRegisterCopy::<u16, MODE_REG::Register>::new(0);
        mode.write(MODE_REG::DIRECTION::Tx);
        self.io.write_u16(MODE, mode.get());

        let rest = match buf.split_first() {
            Some((&first, tail)) if buf.as_ptr() as usize & 1 != 0 => {
                self.wait_tx(deadline)?;
                self.io.write_u8(FIFO_BYTE, first);
                tail
            }
            _ => buf,
        };

        let mut chunks = rest.chunks_exact(CHUNK);
        for chunk in &mut chunks {
            spin_until(deadline, || self.status().is_set(STATUS_REG::TX_HALF_EMPTY))?;
            for long in chunk.chunks_exact(4) {
                self.io
                    .write_u32(FIFO_DATA, u32::from_be_bytes([long[0], long[1], long[2], long[3]]));
            }
        }

        let mut words = chunks.remainder().chunks_exact(2);
        for word in &mut words {
            self.wait_tx(deadline)?;
            self.io
                .write_u16(FIFO_DATA, u16::from_be_bytes([word[0], word[1]]));
        }

        if let [last] = words.remainder() {
            self.wait_tx(deadline)?;
            self.io.write_u8(FIFO_BYTE, *last);
        }

        spin_until(deadline, || !self.status().is_set(STATUS_REG::BUSY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::FifoSim;
    use spi_protocol::sim::{pattern, Access, AlignedBuf, SimBus, Width};
    use spi_protocol::spi::SpiHalError;
    use spi_protocol::spi_os::SpinLimit;

    const LENGTHS: [usize; 11] = [0, 1, 2, 3, 4, 15, 16, 17, 31, 32, 33];

    fn fifo_accesses(trace: &[Access]) -> Vec<Access> {
        trace
            .iter()
            .copied()
            .filter(|a| a.offset() == FIFO_DATA || a.offset() == FIFO_BYTE)
            .collect()
    }

    #[test]
    fn round_trip_every_length_and_alignment() {
        for len in LENGTHS {
            for odd in [false, true] {
                let bus = SimBus::new(FifoSim::new(true));
                let mut hw = FifoC::new(&bus);
                let data = pattern(len, 0x5A);

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
    fn odd_seventeen_byte_write_is_one_byte_and_one_chunk() {
        let bus = SimBus::new(FifoSim::new(true));
        let mut hw = FifoC::new(&bus);
        let mut buf = AlignedBuf::new();
        buf.slice(true, 17).copy_from_slice(&pattern(17, 1));

        hw.spi_write(buf.slice(true, 17));

        let trace = bus.trace();
        let fifo = fifo_accesses(&trace);
        let widths: Vec<_> = fifo.iter().map(|a| a.width()).collect();
        assert_eq!(
            widths,
            [Width::Byte, Width::Long, Width::Long, Width::Long, Width::Long]
        );
        assert_eq!(fifo[0].offset(), FIFO_BYTE);

        // Exactly one status poll between the leading byte and the chunk.
        let byte_at = trace.iter().position(|a| *a == fifo[0]).unwrap();
        let chunk_at = trace.iter().position(|a| *a == fifo[1]).unwrap();
        assert_eq!(chunk_at - byte_at, 2);
        assert_eq!(trace[byte_at + 1].offset(), STATUS);
        // The four longwords are back to back.
        assert!(trace[chunk_at..chunk_at + 4].iter().all(|a| a.offset() == FIFO_DATA));

        assert_eq!(bus.with_device(|dev| dev.wire.sent().to_vec()), pattern(17, 1));
        assert!(!bus.with_device(|dev| dev.busy()));
    }

    #[test]
    fn even_residue_goes_through_the_word_port() {
        let bus = SimBus::new(FifoSim::new(true));
        let mut hw = FifoC::new(&bus);
        let mut buf = AlignedBuf::new();
        let data = pattern(21, 3);
        buf.slice(false, 21).copy_from_slice(&data);

        hw.spi_write(buf.slice(false, 21));

        let widths: Vec<_> = fifo_accesses(&bus.trace()).iter().map(|a| a.width()).collect();
        assert_eq!(
            widths,
            [
                Width::Long,
                Width::Long,
                Width::Long,
                Width::Long,
                Width::Word,
                Width::Word,
                Width::Byte
            ]
        );
    }

    #[test]
    fn longwords_are_big_endian() {
        let bus = SimBus::new(FifoSim::new(true));
        let mut hw = FifoC::new(&bus);
        let mut buf = AlignedBuf::new();
        buf.slice(false, 16).copy_from_slice(&pattern(16, 0));
        hw.spi_write(buf.slice(false, 16));

        let first = fifo_accesses(&bus.trace())[0];
        let expected = pattern(4, 0);
        assert_eq!(
            first,
            Access::write(
                Width::Long,
                FIFO_DATA,
                u32::from_be_bytes([expected[0], expected[1], expected[2], expected[3]])
            )
        );
    }

    #[test]
    fn write_waits_for_the_shifter_to_drain() {
        let bus = SimBus::new(FifoSim::new(true));
        let mut hw = FifoC::new(&bus);
        hw.spi_write(&[0xFF; 32]);
        assert!(!bus.with_device(|dev| dev.busy()));
        assert_eq!(bus.with_device(|dev| dev.wire.sent().len()), 32);
    }

    #[test]
    fn long_reads_are_segmented_on_a_chunk_boundary() {
        let len = MAX_RX_SEGMENT + 3;
        let bus = SimBus::new(FifoSim::new(true));
        let mut hw = FifoC::new(&bus);
        let mut buf = vec![0u8; len];

        hw.spi_read(&mut buf);

        assert_eq!(
            bus.with_device(|dev| dev.read_lengths().to_vec()),
            [MAX_RX_SEGMENT, 3]
        );
        assert!(buf.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn empty_read_touches_nothing() {
        let bus = SimBus::new(FifoSim::new(true));
        let mut hw = FifoC::new(&bus);
        hw.spi_read(&mut [0u8; 0]);
        assert!(bus.trace().is_empty());
    }

    #[test]
    fn stalled_fifo_times_out() {
        let bus = SimBus::new(FifoSim::new(true));
        let mut hw = FifoC::new(&bus);
        bus.with_device(|dev| dev.stalled = true);

        let mut buf = [0u8; 16];
        assert_eq!(
            hw.spi_read_until(&mut buf, &mut SpinLimit::new(5)),
            Err(SpiHalError::ETIMEDOUT)
        );
        assert!(fifo_accesses(&bus.trace()).is_empty());
    }

    #[test]
    fn set_speed_is_idempotent() {
        let bus = SimBus::new(FifoSim::new(true));
        let mut hw = FifoC::new(&bus);
        hw.spi_set_speed(ClockSpeed::Fast);
        hw.spi_set_speed(ClockSpeed::Fast);
        assert_eq!(bus.with_device(|dev| dev.clock_divisor()), FAST_DIVISOR);
        assert_eq!(ClockSpeed::frequency_hz(FAST_DIVISOR), 25_000_000);
    }

    #[test]
    fn status_bits_decode() {
        let status = Status::new(0b0110_0001);
        assert!(status.is_set(STATUS_REG::RX_EMPTY));
        assert!(status.is_set(STATUS_REG::TX_HALF_EMPTY));
        assert!(status.is_set(STATUS_REG::BUSY));
        assert!(!status.is_set(STATUS_REG::TX_FULL));
    }
}
