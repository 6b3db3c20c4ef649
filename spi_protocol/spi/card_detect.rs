use bitflags::bitflags;

use super::RegisterIo;

bitflags! {
    /// Bits of the interrupt request/enable/active registers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CardDetectIrq: u16 {
        const CD_CHANGED = 1 << 0;
    }
}

/// Where a revision keeps its card-detect registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardDetectLayout {
    /// Read side of the card-detect/mode register.
    pub card_detect: usize,
    /// Bits of `card_detect`, any of which reads as one while a card sits in the slot.
    pub present_mask: u16,
    pub int_req: usize,
    pub int_ena: usize,
    pub int_act: usize,
}

/// The card-detect half of a controller's register window.
///
/// This is the only way to reach the card-detect registers. The transfer
/// engine never holds one, the interrupt handler holds nothing else.
#[derive(Debug, Clone)]
pub struct CardDetect<R> {
    io: R,
    layout: CardDetectLayout,
}

impl<R: RegisterIo> CardDetect<R> {
    pub fn new(io: R, layout: CardDetectLayout) -> Self {
        CardDetect { io, layout }
    }

    pub fn layout(&self) -> &CardDetectLayout {
        &self.layout
    }

    /// Sample the card-detect bit and re-arm the change interrupt.
    ///
    /// Every query goes through the same clear/re-enable sequence as the
    /// interrupt handler, so a caller that polls presence never leaves the
    /// source disarmed.
    pub fn present_and_rearm(&self) -> bool {
        let present = self.io.read_u16(self.layout.card_detect) & self.layout.present_mask != 0;
        self.rearm();
        present
    }

    /// Whether the card-detect change is what raised the shared interrupt.
    pub fn changed(&self) -> bool {
        CardDetectIrq::from_bits_truncate(self.io.read_u16(self.layout.int_act))
            .contains(CardDetectIrq::CD_CHANGED)
    }

    /// Clear the request, then enable the source again.
    pub fn rearm(&self) {
        self.io
            .write_u16(self.layout.int_req, CardDetectIrq::CD_CHANGED.bits());
        self.io
            .write_u16(self.layout.int_ena, CardDetectIrq::CD_CHANGED.bits());
    }

    /// Disable the source first, then drop whatever request is still latched.
    pub fn disarm(&self) {
        self.io.write_u16(self.layout.int_ena, 0);
        self.io
            .write_u16(self.layout.int_req, CardDetectIrq::CD_CHANGED.bits());
    }
}
