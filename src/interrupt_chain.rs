//! A fixed-capacity interrupt-server chain.
//!
//! Each source keeps its servers sorted by descending priority; servers of
//! equal priority run in registration order. [`ServerChain::dispatch`] is
//! what the platform's low-level handler calls when a source fires.
//!
//! Adding and removing servers takes the same lock `dispatch` takes. An
//! interrupt that arrives while the chain is being changed is left unclaimed
//! instead of waiting for the lock; the sources are level-triggered, so it
//! fires again once the change is done.

use core::sync::atomic::{AtomicU32, Ordering};

use heapless::Vec;
use spi_protocol::debug_log;
use spi_protocol::spi::interrupt::{IntServer, InterruptHost, IrqSource};
use spi_protocol::spi::SpiHalError;
use spin::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerHandle(u32);

#[derive(Debug, Clone, Copy)]
struct Entry<'a> {
    handle: ServerHandle,
    server: IntServer<'a>,
}

pub struct ServerChain<'a, const N: usize> {
    ports: Mutex<Vec<Entry<'a>, N>>,
    exter: Mutex<Vec<Entry<'a>, N>>,
    next_handle: AtomicU32,
}

impl<'a, const N: usize> ServerChain<'a, N> {
    pub const fn new() -> Self {
        ServerChain {
            ports: Mutex::new(Vec::new()),
            exter: Mutex::new(Vec::new()),
            next_handle: AtomicU32::new(0),
        }
    }

    fn chain(&self, source: IrqSource) -> &Mutex<Vec<Entry<'a>, N>> {
        match source {
            IrqSource::Ports => &self.ports,
            IrqSource::Exter => &self.exter,
        }
    }

    /// Call the servers on `source` in order until one claims the interrupt.
    ///
    /// Never spins: returns `false` without calling anyone if the chain is
    /// locked for an add or a removal.
    pub fn dispatch(&self, source: IrqSource) -> bool {
        match self.chain(source).try_lock() {
            Some(chain) => chain.iter().any(|entry| entry.server.server.serve()),
            None => {
                debug_log!("chain: {:?} busy, interrupt left pending", source);
                false
            }
        }
    }

    pub fn len(&self, source: IrqSource) -> usize {
        self.chain(source).lock().len()
    }

    pub fn is_empty(&self, source: IrqSource) -> bool {
        self.len(source) == 0
    }

    /// Names of the servers on `source`, in call order.
    pub fn names(&self, source: IrqSource) -> Vec<&'static str, N> {
        self.chain(source)
            .lock()
            .iter()
            .map(|entry| entry.server.name)
            .collect()
    }
}

impl<const N: usize> Default for ServerChain<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, const N: usize> InterruptHost<'a> for ServerChain<'a, N> {
    type Handle = ServerHandle;

    fn add_int_server(
        &self,
        source: IrqSource,
        server: IntServer<'a>,
    ) -> Result<ServerHandle, SpiHalError> {
        let mut chain = self.chain(source).lock();
        let handle = ServerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let at = chain
            .iter()
            .position(|entry| entry.server.priority < server.priority)
            .unwrap_or(chain.len());
        chain
            .insert(at, Entry { handle, server })
            .map_err(|_| SpiHalError::EBUSY)?;
        debug_log!(
            "chain: {} added to {:?} at priority {}",
            server.name,
            source,
            server.priority
        );
        Ok(handle)
    }

    fn rem_int_server(&self, source: IrqSource, handle: ServerHandle) {
        self.chain(source).lock().retain(|entry| entry.handle != handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;
    use spi_protocol::spi::interrupt::IrqServer;

    struct Counter {
        calls: AtomicUsize,
        claims: bool,
    }

    impl Counter {
        fn new(claims: bool) -> Self {
            Counter {
                calls: AtomicUsize::new(0),
                claims,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::Relaxed)
        }
    }

    impl IrqServer for Counter {
        fn serve(&self) -> bool {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.claims
        }
    }

    fn server<'a>(name: &'static str, priority: i8, counter: &'a Counter) -> IntServer<'a> {
        IntServer {
            name,
            priority,
            server: counter,
        }
    }

    #[test]
    fn servers_run_by_priority() {
        let (a, b, c) = (Counter::new(false), Counter::new(false), Counter::new(false));
        let chain: ServerChain<4> = ServerChain::new();

        chain.add_int_server(IrqSource::Ports, server("low", -60, &a)).unwrap();
        chain.add_int_server(IrqSource::Ports, server("high", 20, &b)).unwrap();
        chain.add_int_server(IrqSource::Ports, server("low-2", -60, &c)).unwrap();

        assert_eq!(&chain.names(IrqSource::Ports)[..], ["high", "low", "low-2"]);
        assert!(chain.is_empty(IrqSource::Exter));
    }

    #[test]
    fn dispatch_stops_at_the_first_claim() {
        let (first, second) = (Counter::new(true), Counter::new(true));
        let chain: ServerChain<4> = ServerChain::new();
        chain.add_int_server(IrqSource::Ports, server("first", 10, &first)).unwrap();
        chain.add_int_server(IrqSource::Ports, server("second", 0, &second)).unwrap();

        assert!(chain.dispatch(IrqSource::Ports));
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
        assert!(!chain.dispatch(IrqSource::Exter));
    }

    #[test]
    fn unclaimed_interrupt_visits_every_server() {
        let (a, b) = (Counter::new(false), Counter::new(false));
        let chain: ServerChain<4> = ServerChain::new();
        chain.add_int_server(IrqSource::Exter, server("a", 0, &a)).unwrap();
        chain.add_int_server(IrqSource::Exter, server("b", 0, &b)).unwrap();

        assert!(!chain.dispatch(IrqSource::Exter));
        assert_eq!((a.calls(), b.calls()), (1, 1));
    }

    #[test]
    fn full_chain_is_busy() {
        let a = Counter::new(false);
        let chain: ServerChain<1> = ServerChain::new();
        chain.add_int_server(IrqSource::Ports, server("a", 0, &a)).unwrap();
        assert_eq!(
            chain.add_int_server(IrqSource::Ports, server("b", 0, &a)),
            Err(SpiHalError::EBUSY)
        );
        // The other source has its own room.
        assert!(chain.add_int_server(IrqSource::Exter, server("b", 0, &a)).is_ok());
    }

    #[test]
    fn dispatch_during_a_chain_update_returns_unclaimed() {
        let (a, b) = (Counter::new(true), Counter::new(true));
        let chain: ServerChain<4> = ServerChain::new();
        chain.add_int_server(IrqSource::Ports, server("a", 0, &a)).unwrap();
        chain.add_int_server(IrqSource::Exter, server("b", 0, &b)).unwrap();

        {
            let _updating = chain.ports.lock();
            assert!(!chain.dispatch(IrqSource::Ports));
            // The other source has its own lock.
            assert!(chain.dispatch(IrqSource::Exter));
        }
        assert_eq!(a.calls(), 0);

        assert!(chain.dispatch(IrqSource::Ports));
        assert_eq!(a.calls(), 1);
    }

    #[test]
    fn removal_only_drops_the_given_server() {
        let (a, b) = (Counter::new(false), Counter::new(false));
        let chain: ServerChain<4> = ServerChain::new();
        let ha = chain.add_int_server(IrqSource::Ports, server("a", 0, &a)).unwrap();
        chain.add_int_server(IrqSource::Ports, server("b", 0, &b)).unwrap();

        chain.rem_int_server(IrqSource::Ports, ha);
        chain.dispatch(IrqSource::Ports);
        assert_eq!((a.calls(), b.calls()), (0, 1));
    }
}
