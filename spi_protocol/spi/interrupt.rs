use core::fmt;

use super::card_detect::CardDetect;
use super::{RegisterIo, SpiHalError};

/// Interrupt sources a server can be chained on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IrqSource {
    /// Level 2 source shared by the expansion bus peripherals.
    Ports,
    /// Level 6 source, also shared.
    Exter,
}

/// Something that can be called from interrupt context when its source fires.
///
/// The source is shared, so a server has to check whether its own device
/// raised the interrupt and return `false` when it did not, letting the host
/// try the next server in the chain.
pub trait IrqServer: Sync {
    fn serve(&self) -> bool;
}

/// A server as handed to the host's registration facility.
#[derive(Clone, Copy)]
pub struct IntServer<'a> {
    pub name: &'static str,
    /// Higher priority servers are called first.
    pub priority: i8,
    pub server: &'a dyn IrqServer,
}

impl fmt::Debug for IntServer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntServer")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// The host's interrupt-server registration facility.
///
/// The server reference is lent for `'a`; the host may call it from
/// interrupt context at any point until the matching `rem_int_server`
/// returns, and never afterwards.
pub trait InterruptHost<'a> {
    type Handle;

    fn add_int_server(
        &self,
        source: IrqSource,
        server: IntServer<'a>,
    ) -> Result<Self::Handle, SpiHalError>;

    fn rem_int_server(&self, source: IrqSource, handle: Self::Handle);
}

impl<'a, H: InterruptHost<'a> + ?Sized> InterruptHost<'a> for &H {
    type Handle = H::Handle;

    fn add_int_server(
        &self,
        source: IrqSource,
        server: IntServer<'a>,
    ) -> Result<Self::Handle, SpiHalError> {
        (**self).add_int_server(source, server)
    }

    fn rem_int_server(&self, source: IrqSource, handle: Self::Handle) {
        (**self).rem_int_server(source, handle)
    }
}

/// State shared between a driver instance and its card-detect interrupt server.
///
/// Read-only once built. The handler reaches the controller exclusively
/// through the card-detect view, never through the data path.
pub struct InterruptContext<R, F> {
    card_detect: CardDetect<R>,
    on_change: F,
}

impl<R: RegisterIo, F: Fn()> InterruptContext<R, F> {
    pub fn new(card_detect: CardDetect<R>, on_change: F) -> Self {
        InterruptContext {
            card_detect,
            on_change,
        }
    }

    /// Handle one interrupt on the shared source.
    ///
    /// Returns `false` without touching anything when the card-detect change
    /// is not pending. Otherwise clears the request, re-enables the source
    /// and runs the callback, in that order: an edge arriving during the
    /// callback latches a new request instead of being lost, and the edge
    /// being handled cannot be delivered a second time.
    pub fn handle(&self) -> bool {
        if !self.card_detect.changed() {
            return false;
        }
        self.card_detect.rearm();
        (self.on_change)();
        true
    }
}

impl<R, F> IrqServer for InterruptContext<R, F>
where
    R: RegisterIo + Sync,
    F: Fn() + Sync,
{
    fn serve(&self) -> bool {
        self.handle()
    }
}

impl<R: fmt::Debug, F> fmt::Debug for InterruptContext<R, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptContext")
            .field("card_detect", &self.card_detect)
            .finish_non_exhaustive()
    }
}
