//! Module `port_pool`
//!
//! The fixed set of passive-mode ports shared by every session. A port
//! is handed out by [`PortPool::allocate`] and comes back through
//! [`PortPool::release`] when the data channel bound to it closes.

use log::warn;
use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::TransferError;

/// Pool shared across sessions; allocate/release are serialized by the lock.
pub type SharedPortPool = Arc<Mutex<PortPool>>;

#[derive(Debug)]
pub struct PortPool {
    range: RangeInclusive<u16>,
    free: BTreeSet<u16>,
}

impl PortPool {
    /// Creates a pool with every port of `range` free.
    pub fn new(range: RangeInclusive<u16>) -> Self {
        let free = range.clone().collect();
        Self { range, free }
    }

    pub fn shared(range: RangeInclusive<u16>) -> SharedPortPool {
        Arc::new(Mutex::new(Self::new(range)))
    }

    /// Removes and returns a free port.
    pub fn allocate(&mut self) -> Result<u16, TransferError> {
        self.free.pop_first().ok_or(TransferError::NoAvailablePort)
    }

    /// Returns a port to the free set.
    ///
    /// Releasing a port that is already free, or that never belonged to
    /// the pool, is ignored. Returns whether the port was actually returned.
    pub fn release(&mut self, port: u16) -> bool {
        if !self.range.contains(&port) {
            warn!("Ignoring release of port {port} outside pool range {:?}", self.range);
            return false;
        }
        if !self.free.insert(port) {
            warn!("Ignoring double release of port {port}");
            return false;
        }
        true
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.range.clone().count()
    }

    pub fn is_free(&self, port: u16) -> bool {
        self.free.contains(&port)
    }
}
