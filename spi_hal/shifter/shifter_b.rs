//! Shift-register revision fitted to the SF2000 SD slot.
//!
//! Registers are eight consecutive 16 bit words: clock divisor, slave
//! select, card detect (read) / mode (write), status, shift register,
//! interrupt request, enable and active.

use spi_protocol::spi::card_detect::CardDetectLayout;
use spi_protocol::spi::{HardwareVariant, TransferDirection};
use tock_registers::{register_bitfields, LocalRegisterCopy};

use crate::shifter::{Shifter, ShifterRevision};

register_bitfields![u16,
    pub(crate) MODE [
        RX_LENGTH OFFSET(0) NUMBITS(13) [],
        DIRECTION OFFSET(14) NUMBITS(2) [
            Stop = 0,
            Rx = 1,
            Tx = 2,
            Both = 3,
        ]
    ],
    pub(crate) STATUS [
        BUSY OFFSET(0) NUMBITS(1) [],
        // A received byte is waiting
        OUT_FULL OFFSET(1) NUMBITS(1) [],
        // The byte written last has not been picked up by the shifter yet
        IN_FULL OFFSET(2) NUMBITS(1) []
    ],
];

#[derive(Debug, Clone, Copy)]
pub struct RevB;

pub type ShifterB<R> = Shifter<R, RevB>;

impl ShifterRevision for RevB {
    const VARIANT: HardwareVariant = HardwareVariant::ShifterB;

    const CLOCK_DIVISOR: usize = 0x0;
    const SLAVE_SELECT: usize = 0x2;
    const MODE: usize = 0x4;
    const STATUS: usize = 0x6;
    const SHIFT_REG: usize = 0x8;
    const CARD_DETECT: CardDetectLayout = CardDetectLayout {
        card_detect: 0x4,
        // The slot reports presence as the whole word being non-zero.
        present_mask: 0xFFFF,
        int_req: 0xA,
        int_ena: 0xC,
        int_act: 0xE,
    };

    // 16 MHz, the slot's wiring does not hold up at 25 MHz
    const FAST_DIVISOR: u16 = 2;
    const SLOW_DIVISOR: u16 = 124;

    const MAX_RX_LENGTH: usize = (1 << 13) - 1;

    fn mode(direction: TransferDirection, len: usize) -> u16 {
        let mut mode = LocalRegisterCopy::<u16, MODE::Register>::new(0);
        match direction {
            TransferDirection::Read => {
                mode.write(MODE::DIRECTION::Rx + MODE::RX_LENGTH.val(len as u16))
            }
            TransferDirection::Write => mode.write(MODE::DIRECTION::Tx),
        }
        mode.get()
    }

    #[inline(always)]
    fn rx_ready(status: u16) -> bool {
        LocalRegisterCopy::<u16, STATUS::Register>::new(status).is_set(STATUS::OUT_FULL)
    }

    #[inline(always)]
    fn tx_ready(status: u16) -> bool {
        !LocalRegisterCopy::<u16, STATUS::Register>::new(status).is_set(STATUS::IN_FULL)
    }

    #[inline(always)]
    fn busy(status: u16) -> bool {
        LocalRegisterCopy::<u16, STATUS::Register>::new(status).is_set(STATUS::BUSY)
    }
}

#[cfg(any(test, feature = "sim"))]
impl crate::sim::SimRevision for RevB {
    fn status(rx_ready: bool, tx_ready: bool, busy: bool) -> u16 {
        let mut status = LocalRegisterCopy::<u16, STATUS::Register>::new(0);
        status.write(
            STATUS::OUT_FULL.val(rx_ready as u16)
                + STATUS::IN_FULL.val(!tx_ready as u16)
                + STATUS::BUSY.val(busy as u16),
        );
        status.get()
    }

    fn decode_mode(value: u16) -> crate::sim::SimMode {
        let mode = LocalRegisterCopy::<u16, MODE::Register>::new(value);
        crate::sim::SimMode::from_direction(
            mode.read(MODE::DIRECTION),
            mode.read(MODE::RX_LENGTH) as usize,
        )
    }
}
