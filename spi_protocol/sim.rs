//! Register-level simulation support.
//!
//! A simulated controller implements [`SimDevice`] and is wrapped in a
//! [`SimBus`], which implements [`RegisterIo`] and records every access in
//! order. Time only moves when the driver reads a register, which is what
//! makes the polling loops observable: a device that needs three status reads
//! before it is ready shows exactly three status reads in the trace.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::vec::Vec;

use crate::spi::card_detect::{CardDetectIrq, CardDetectLayout};
use crate::spi::RegisterIo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Word,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read { width: Width, offset: usize, value: u32 },
    Write { width: Width, offset: usize, value: u32 },
}

impl Access {
    pub fn read(width: Width, offset: usize, value: u32) -> Self {
        Access::Read {
            width,
            offset,
            value,
        }
    }

    pub fn write(width: Width, offset: usize, value: u32) -> Self {
        Access::Write {
            width,
            offset,
            value,
        }
    }

    pub fn offset(&self) -> usize {
        match *self {
            Access::Read { offset, .. } | Access::Write { offset, .. } => offset,
        }
    }

    pub fn width(&self) -> Width {
        match *self {
            Access::Read { width, .. } | Access::Write { width, .. } => width,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Access::Write { .. })
    }
}

pub trait SimDevice: Send {
    fn read(&mut self, width: Width, offset: usize) -> u32;
    fn write(&mut self, width: Width, offset: usize, value: u32);
}

pub struct SimBus<D> {
    device: Mutex<D>,
    trace: Mutex<Vec<Access>>,
}

impl<D: SimDevice> SimBus<D> {
    pub fn new(device: D) -> Self {
        SimBus {
            device: Mutex::new(device),
            trace: Mutex::new(Vec::new()),
        }
    }

    pub fn trace(&self) -> Vec<Access> {
        self.trace.lock().unwrap().clone()
    }

    pub fn clear_trace(&self) {
        self.trace.lock().unwrap().clear();
    }

    /// Reach into the device without leaving a trace, e.g. to flip the card-detect switch.
    pub fn with_device<T>(&self, f: impl FnOnce(&mut D) -> T) -> T {
        f(&mut self.device.lock().unwrap())
    }

    fn read(&self, width: Width, offset: usize) -> u32 {
        let value = self.device.lock().unwrap().read(width, offset);
        self.trace
            .lock()
            .unwrap()
            .push(Access::read(width, offset, value));
        value
    }

    fn write(&self, width: Width, offset: usize, value: u32) {
        self.trace
            .lock()
            .unwrap()
            .push(Access::write(width, offset, value));
        self.device.lock().unwrap().write(width, offset, value);
    }
}

impl<D: SimDevice> RegisterIo for SimBus<D> {
    fn read_u8(&self, offset: usize) -> u8 {
        self.read(Width::Byte, offset) as u8
    }

    fn write_u8(&self, offset: usize, value: u8) {
        self.write(Width::Byte, offset, value as u32)
    }

    fn read_u16(&self, offset: usize) -> u16 {
        self.read(Width::Word, offset) as u16
    }

    fn write_u16(&self, offset: usize, value: u16) {
        self.write(Width::Word, offset, value as u32)
    }

    fn read_u32(&self, offset: usize) -> u32 {
        self.read(Width::Long, offset)
    }

    fn write_u32(&self, offset: usize, value: u32) {
        self.write(Width::Long, offset, value)
    }
}

/// The card-detect switch and its interrupt latch.
///
/// An edge latches a request only while the source is enabled, and the
/// hardware drops the enable bit when it latches, so every delivered edge
/// has to be re-armed by software. `int_req` is write-one-to-clear,
/// `int_ena` is written as a whole, `int_act` shows the latched request.
#[derive(Debug, Clone)]
pub struct CardSlot {
    present: bool,
    int_req: u16,
    int_ena: u16,
}

impl CardSlot {
    pub fn new(present: bool) -> Self {
        CardSlot {
            present,
            int_req: 0,
            int_ena: 0,
        }
    }

    pub fn present(&self) -> bool {
        self.present
    }

    /// Insert or remove the card.
    pub fn toggle(&mut self) {
        self.present = !self.present;
        let cd = CardDetectIrq::CD_CHANGED.bits();
        if self.int_ena & cd != 0 {
            self.int_req |= cd;
            self.int_ena &= !cd;
        }
    }

    pub fn armed(&self) -> bool {
        self.int_ena & CardDetectIrq::CD_CHANGED.bits() != 0
    }

    /// Whether the controller is asserting its interrupt line.
    pub fn irq_pending(&self) -> bool {
        self.int_req & CardDetectIrq::CD_CHANGED.bits() != 0
    }

    /// Register read, `None` when `offset` is not a card-detect register.
    pub fn read(&self, layout: &CardDetectLayout, offset: usize) -> Option<u16> {
        if offset == layout.card_detect {
            Some(if self.present { layout.present_mask } else { 0 })
        } else if offset == layout.int_req || offset == layout.int_act {
            Some(self.int_req)
        } else if offset == layout.int_ena {
            Some(self.int_ena)
        } else {
            None
        }
    }

    /// Register write, `false` when `offset` is not a card-detect register.
    /// The card-detect register itself is read-only.
    pub fn write(&mut self, layout: &CardDetectLayout, offset: usize, value: u16) -> bool {
        if offset == layout.int_req {
            self.int_req &= !value;
            true
        } else if offset == layout.int_ena {
            self.int_ena = value;
            true
        } else {
            false
        }
    }
}

/// The far end of the SPI link: whatever is shifted out is shifted back in.
/// With nothing queued the data line idles high.
#[derive(Debug, Clone, Default)]
pub struct Loopback {
    pending: VecDeque<u8>,
    sent: Vec<u8>,
}

impl Loopback {
    pub fn shift_out(&mut self, byte: u8) {
        self.sent.push(byte);
        self.pending.push_back(byte);
    }

    pub fn shift_in(&mut self) -> u8 {
        self.pending.pop_front().unwrap_or(0xFF)
    }

    /// Every byte that has left the shifter so far.
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    /// Queue bytes for the receive side without sending them.
    pub fn preload(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes.iter().copied());
    }
}

/// A buffer whose first byte sits at an even address, for handing out
/// slices at a chosen alignment.
#[repr(C, align(4))]
pub struct AlignedBuf(pub [u8; 128]);

impl AlignedBuf {
    pub fn new() -> Self {
        AlignedBuf([0; 128])
    }

    pub fn slice(&mut self, odd: bool, len: usize) -> &mut [u8] {
        let start = usize::from(odd);
        &mut self.0[start..start + len]
    }
}

impl Default for AlignedBuf {
    fn default() -> Self {
        Self::new()
    }
}

/// A recognisable test pattern.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(37).wrapping_add(seed))
        .collect()
}
