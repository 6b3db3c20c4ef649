//! Simulated shift-register controllers.
//!
//! A written byte waits in the holding register for `pickup` status reads
//! before the shifter takes it, then needs `latency` more to clock out.
//! BUSY covers only the clocking, not the holding register. A byte written
//! while the previous one is still held, or a shift register read with
//! nothing received, is a driver bug and panics.

use std::marker::PhantomData;

use spi_protocol::sim::{CardSlot, Loopback, SimDevice, Width};

use crate::shifter::ShifterRevision;
use crate::{RevA, RevB};

/// Decoded mode register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimMode {
    Stop,
    Read(usize),
    Write,
}

impl SimMode {
    pub fn from_direction(direction: u16, len: usize) -> Self {
        match direction {
            1 => SimMode::Read(len),
            2 => SimMode::Write,
            0 => SimMode::Stop,
            other => panic!("full duplex mode {} is never used", other),
        }
    }
}

/// Bit encoding of a revision, seen from the device side.
pub trait SimRevision: ShifterRevision + 'static {
    fn status(rx_ready: bool, tx_ready: bool, busy: bool) -> u16;
    fn decode_mode(value: u16) -> SimMode;
}

pub struct ShifterSim<V> {
    pub slot: CardSlot,
    pub wire: Loopback,
    /// Freeze the shifter: status never changes again.
    pub stalled: bool,
    pub latency: u32,
    /// Status reads a written byte sits in the holding register.
    pub pickup: u32,
    clock_divisor: u16,
    slave_select: u16,
    mode: SimMode,
    rx_remaining: usize,
    rx_ticks: u32,
    holding: Option<(u8, u32)>,
    shifting: Option<(u8, u32)>,
    received: Option<u8>,
    _revision: PhantomData<fn() -> V>,
}

pub type ShifterASim = ShifterSim<RevA>;
pub type ShifterBSim = ShifterSim<RevB>;

impl<V: SimRevision> ShifterSim<V> {
    pub fn new(present: bool) -> Self {
        ShifterSim {
            slot: CardSlot::new(present),
            wire: Loopback::default(),
            stalled: false,
            latency: 2,
            pickup: 0,
            clock_divisor: 0,
            slave_select: 0,
            mode: SimMode::Stop,
            rx_remaining: 0,
            rx_ticks: 0,
            holding: None,
            shifting: None,
            received: None,
            _revision: PhantomData,
        }
    }

    pub fn clock_divisor(&self) -> u16 {
        self.clock_divisor
    }

    pub fn selected(&self) -> bool {
        self.slave_select != 0
    }

    pub fn busy(&self) -> bool {
        self.shifting.is_some()
    }

    /// The last written byte has not been picked up yet.
    pub fn holding(&self) -> bool {
        self.holding.is_some()
    }

    fn tick(&mut self) {
        if self.stalled {
            return;
        }
        match self.mode {
            SimMode::Write => {
                if let Some((byte, left)) = self.shifting.take() {
                    if left > 1 {
                        self.shifting = Some((byte, left - 1));
                    } else {
                        self.wire.shift_out(byte);
                    }
                }
                match self.holding {
                    Some((byte, 0)) if self.shifting.is_none() => {
                        self.holding = None;
                        self.shifting = Some((byte, self.latency));
                    }
                    Some((byte, wait)) if wait > 0 => self.holding = Some((byte, wait - 1)),
                    _ => {}
                }
            }
            SimMode::Read(_) => {
                if self.received.is_none() && self.rx_remaining > 0 {
                    self.rx_ticks += 1;
                    if self.rx_ticks >= self.latency {
                        self.rx_ticks = 0;
                        self.rx_remaining -= 1;
                        self.received = Some(self.wire.shift_in());
                    }
                }
            }
            SimMode::Stop => {}
        }
    }

    fn set_mode(&mut self, value: u16) {
        assert!(
            !self.busy() && self.holding.is_none(),
            "mode changed while the shifter is busy"
        );
        self.mode = V::decode_mode(value);
        self.rx_ticks = 0;
        self.rx_remaining = match self.mode {
            SimMode::Read(len) => len,
            _ => 0,
        };
    }
}

impl<V: SimRevision> SimDevice for ShifterSim<V> {
    fn read(&mut self, width: Width, offset: usize) -> u32 {
        assert_eq!(width, Width::Word, "16 bit register at {:#x}", offset);
        let value = match offset {
            o if o == V::CLOCK_DIVISOR => self.clock_divisor,
            o if o == V::SLAVE_SELECT => self.slave_select,
            o if o == V::STATUS => {
                self.tick();
                V::status(
                    self.received.is_some(),
                    self.holding.is_none(),
                    self.busy(),
                )
            }
            o if o == V::SHIFT_REG => match self.received.take() {
                Some(byte) => byte as u16,
                None => panic!("shift register read with nothing received"),
            },
            o => match self.slot.read(&V::CARD_DETECT, o) {
                Some(value) => value,
                None => panic!("read from unmapped offset {:#x}", o),
            },
        };
        value as u32
    }

    fn write(&mut self, width: Width, offset: usize, value: u32) {
        assert_eq!(width, Width::Word, "16 bit register at {:#x}", offset);
        let value = value as u16;
        match offset {
            o if o == V::CLOCK_DIVISOR => self.clock_divisor = value,
            o if o == V::SLAVE_SELECT => self.slave_select = value,
            o if o == V::MODE => self.set_mode(value),
            o if o == V::SHIFT_REG => {
                assert_eq!(self.mode, SimMode::Write, "shift register written outside a write");
                assert!(self.holding.is_none(), "shift register overrun");
                self.holding = Some((value as u8, self.pickup));
            }
            o => {
                if !self.slot.write(&V::CARD_DETECT, o, value) {
                    panic!("write to unmapped offset {:#x}", o);
                }
            }
        }
    }
}
