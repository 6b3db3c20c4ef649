//! Simulated FIFO controller.
//!
//! Each status read lets the shifter move up to `rate` bytes: out of the
//! transmit FIFO onto the wire, or off the wire into the receive FIFO until
//! the programmed read length has arrived. The receive FIFO is word wide,
//! so it reports empty until a whole word is in, unless only one byte of
//! the read is left. FIFO overruns and underruns panic.

use std::collections::VecDeque;
use std::vec::Vec;

use spi_protocol::sim::{CardSlot, Loopback, SimDevice, Width};
use tock_registers::LocalRegisterCopy;

use crate::fifo_c::{
    CARD_DETECT, CHUNK, CLOCK_DIVISOR, FIFO_BYTE, FIFO_DATA, FIFO_DEPTH, MODE, MODE_REG,
    SLAVE_SELECT, STATUS, STATUS_REG,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Stop,
    Read,
    Write,
}

pub struct FifoSim {
    pub slot: CardSlot,
    pub wire: Loopback,
    pub stalled: bool,
    pub rate: usize,
    clock_divisor: u16,
    slave_select: u16,
    direction: Direction,
    rx_pending: usize,
    rx: VecDeque<u8>,
    tx: VecDeque<u8>,
    read_lengths: Vec<usize>,
}

impl FifoSim {
    pub fn new(present: bool) -> Self {
        FifoSim {
            slot: CardSlot::new(present),
            wire: Loopback::default(),
            stalled: false,
            rate: 3,
            clock_divisor: 0,
            slave_select: 0,
            direction: Direction::Stop,
            rx_pending: 0,
            rx: VecDeque::new(),
            tx: VecDeque::new(),
            read_lengths: Vec::new(),
        }
    }

    pub fn clock_divisor(&self) -> u16 {
        self.clock_divisor
    }

    pub fn selected(&self) -> bool {
        self.slave_select != 0
    }

    pub fn busy(&self) -> bool {
        !self.tx.is_empty()
    }

    /// Length of every read started so far, in order.
    pub fn read_lengths(&self) -> &[usize] {
        &self.read_lengths
    }

    fn tick(&mut self) {
        if self.stalled {
            return;
        }
        for _ in 0..self.rate {
            match self.direction {
                Direction::Write => match self.tx.pop_front() {
                    Some(byte) => self.wire.shift_out(byte),
                    None => break,
                },
                Direction::Read if self.rx_pending > 0 && self.rx.len() < FIFO_DEPTH => {
                    self.rx_pending -= 1;
                    self.rx.push_back(self.wire.shift_in());
                }
                _ => break,
            }
        }
    }

    fn status(&self) -> u16 {
        let outstanding = self.rx.len() + self.rx_pending;
        let tx_free = FIFO_DEPTH - self.tx.len();
        let mut status = LocalRegisterCopy::<u16, STATUS_REG::Register>::new(0);
        status.write(
            STATUS_REG::RX_EMPTY.val((self.rx.len() < outstanding.clamp(1, 2)) as u16)
                + STATUS_REG::RX_FULL.val((self.rx.len() == FIFO_DEPTH) as u16)
                + STATUS_REG::TX_EMPTY.val(self.tx.is_empty() as u16)
                + STATUS_REG::TX_FULL.val((tx_free < 2) as u16)
                + STATUS_REG::RX_HALF_FULL.val((self.rx.len() >= CHUNK) as u16)
                + STATUS_REG::TX_HALF_EMPTY.val((tx_free >= CHUNK) as u16)
                + STATUS_REG::BUSY.val(self.busy() as u16),
        );
        status.get()
    }

    fn set_mode(&mut self, value: u16) {
        assert!(!self.busy(), "mode changed with data still queued");
        assert!(self.rx.is_empty(), "mode changed with received data unread");
        let mode = LocalRegisterCopy::<u16, MODE_REG::Register>::new(value);
        self.direction = match mode.read(MODE_REG::DIRECTION) {
            0 => Direction::Stop,
            1 => Direction::Read,
            2 => Direction::Write,
            other => panic!("full duplex mode {} is never used", other),
        };
        self.rx_pending = 0;
        if self.direction == Direction::Read {
            self.rx_pending = mode.read(MODE_REG::RX_LENGTH) as usize;
            self.read_lengths.push(self.rx_pending);
        }
    }

    fn pop(&mut self, n: usize) -> u32 {
        assert_eq!(self.direction, Direction::Read, "FIFO read outside a read");
        assert!(self.rx.len() >= n, "receive FIFO underrun");
        self.rx
            .drain(..n)
            .fold(0, |acc, byte| (acc << 8) | byte as u32)
    }

    fn push(&mut self, n: usize, value: u32) {
        assert_eq!(self.direction, Direction::Write, "FIFO write outside a write");
        assert!(self.tx.len() + n <= FIFO_DEPTH, "transmit FIFO overrun");
        for i in (0..n).rev() {
            self.tx.push_back((value >> (8 * i)) as u8);
        }
    }
}

fn unit(width: Width) -> usize {
    match width {
        Width::Byte => 1,
        Width::Word => 2,
        Width::Long => 4,
    }
}

impl SimDevice for FifoSim {
    fn read(&mut self, width: Width, offset: usize) -> u32 {
        match offset {
            FIFO_DATA => {
                assert_ne!(width, Width::Byte, "bytes go through the byte lane");
                self.pop(unit(width))
            }
            FIFO_BYTE => {
                assert_eq!(width, Width::Byte);
                self.pop(1)
            }
            _ => {
                assert_eq!(width, Width::Word, "16 bit register at {:#x}", offset);
                let value = match offset {
                    CLOCK_DIVISOR => self.clock_divisor,
                    SLAVE_SELECT => self.slave_select,
                    STATUS => {
                        self.tick();
                        self.status()
                    }
                    o => match self.slot.read(&CARD_DETECT, o) {
                        Some(value) => value,
                        None => panic!("read from unmapped offset {:#x}", o),
                    },
                };
                value as u32
            }
        }
    }

    fn write(&mut self, width: Width, offset: usize, value: u32) {
        match offset {
            FIFO_DATA => {
                assert_ne!(width, Width::Byte, "bytes go through the byte lane");
                self.push(unit(width), value)
            }
            FIFO_BYTE => {
                assert_eq!(width, Width::Byte);
                self.push(1, value)
            }
            _ => {
                assert_eq!(width, Width::Word, "16 bit register at {:#x}", offset);
                let value = value as u16;
                match offset {
                    CLOCK_DIVISOR => self.clock_divisor = value,
                    SLAVE_SELECT => self.slave_select = value,
                    MODE => self.set_mode(value),
                    o => {
                        if !self.slot.write(&CARD_DETECT, o, value) {
                            panic!("write to unmapped offset {:#x}", o);
                        }
                    }
                }
            }
        }
    }
}
