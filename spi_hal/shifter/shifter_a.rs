//! First shift-register revision.
//!
//! | Offset | Register |
//! |---|---|
//! | 0x0 | clock divisor |
//! | 0x2 | slave select |
//! | 0x4 | status |
//! | 0x6 | card detect (read) / mode (write) |
//! | 0x8 | shift register |
//! | 0xA | interrupt request |
//! | 0xC | interrupt enable |
//! | 0xE | interrupt active |

use spi_protocol::spi::card_detect::CardDetectLayout;
use spi_protocol::spi::{HardwareVariant, TransferDirection};
use tock_registers::{register_bitfields, LocalRegisterCopy};

use crate::shifter::{Shifter, ShifterRevision};

register_bitfields![u16,
    pub(crate) MODE [
        RX_LENGTH OFFSET(0) NUMBITS(10) [],
        DIRECTION OFFSET(12) NUMBITS(2) [
            Stop = 0,
            Rx = 1,
            Tx = 2,
            Both = 3,
        ]
    ],
    pub(crate) STATUS [
        RX_READY OFFSET(0) NUMBITS(1) [],
        TX_READY OFFSET(1) NUMBITS(1) [],
        BUSY OFFSET(7) NUMBITS(1) []
    ],
];

/// Card present, active high.
const CD_PRESENT: u16 = 1 << 15;

#[derive(Debug, Clone, Copy)]
pub struct RevA;

pub type ShifterA<R> = Shifter<R, RevA>;

impl ShifterRevision for RevA {
    const VARIANT: HardwareVariant = HardwareVariant::ShifterA;

    const CLOCK_DIVISOR: usize = 0x0;
    const SLAVE_SELECT: usize = 0x2;
    const MODE: usize = 0x6;
    const STATUS: usize = 0x4;
    const SHIFT_REG: usize = 0x8;
    const CARD_DETECT: CardDetectLayout = CardDetectLayout {
        card_detect: 0x6,
        present_mask: CD_PRESENT,
        int_req: 0xA,
        int_ena: 0xC,
        int_act: 0xE,
    };

    // 25 MHz
    const FAST_DIVISOR: u16 = 1;
    // 400 kHz
    const SLOW_DIVISOR: u16 = 124;

    const MAX_RX_LENGTH: usize = (1 << 10) - 1;

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
        LocalRegisterCopy::<u16, STATUS::Register>::new(status).is_set(STATUS::RX_READY)
    }

    #[inline(always)]
    fn tx_ready(status: u16) -> bool {
        LocalRegisterCopy::<u16, STATUS::Register>::new(status).is_set(STATUS::TX_READY)
    }

    #[inline(always)]
    fn busy(status: u16) -> bool {
        LocalRegisterCopy::<u16, STATUS::Register>::new(status).is_set(STATUS::BUSY)
    }
}

#[cfg(any(test, feature = "sim"))]
impl crate::sim::SimRevision for RevA {
    fn status(rx_ready: bool, tx_ready: bool, busy: bool) -> u16 {
        let mut status = LocalRegisterCopy::<u16, STATUS::Register>::new(0);
        status.write(
            STATUS::RX_READY.val(rx_ready as u16)
                + STATUS::TX_READY.val(tx_ready as u16)
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
