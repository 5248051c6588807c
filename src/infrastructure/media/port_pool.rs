//! RTP port allocation
//!
//! Ports are handed out per local IP from an even-numbered range; odd ports
//! stay free for RTCP. A [`PortLease`] returns its port to the pool when it
//! is released or dropped, so a port can never leak on an error path.

use crate::domain::shared::{ForkError, Result};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

#[derive(Default)]
struct AddressPorts {
    next: u16,
    in_use: HashSet<u16>,
}

struct PoolState {
    start: u16,
    end: u16,
    addresses: HashMap<IpAddr, AddressPorts>,
}

/// Even RTP ports in `[start, end)` for every local address
#[derive(Clone)]
pub struct PortPool {
    state: Arc<Mutex<PoolState>>,
}

impl PortPool {
    pub fn new(start: u16, end: u16) -> Self {
        // Round the start up to an even port
        let start = start.saturating_add(start % 2);
        Self {
            state: Arc::new(Mutex::new(PoolState {
                start,
                end,
                addresses: HashMap::new(),
            })),
        }
    }

    /// Lease the next free even port on `ip`
    pub fn allocate_port(&self, ip: IpAddr) -> Result<PortLease> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (start, end) = (state.start, state.end);
        let slots = end.saturating_sub(start).div_ceil(2);

        let entry = state.addresses.entry(ip).or_default();
        if entry.next < start || entry.next >= end {
            entry.next = start;
        }

        for _ in 0..slots {
            let port = entry.next;
            entry.next = match port.checked_add(2) {
                Some(next) if next < end => next,
                _ => start,
            };

            if entry.in_use.insert(port) {
                debug!("Allocated RTP port {}:{}", ip, port);
                return Ok(PortLease {
                    pool: self.clone(),
                    ip,
                    port,
                    released: false,
                });
            }
        }

        Err(ForkError::NoPortsAvailable(ip))
    }

    /// Return a port to the pool; releasing a free port is a no-op
    pub fn release_port(&self, ip: IpAddr, port: u16) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = state.addresses.get_mut(&ip) {
            if entry.in_use.remove(&port) {
                debug!("Released RTP port {}:{}", ip, port);
            }
        }
    }

    /// Ports currently leased on `ip`
    pub fn leased_count(&self, ip: IpAddr) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .addresses
            .get(&ip)
            .map(|entry| entry.in_use.len())
            .unwrap_or(0)
    }

    /// Ports still available on `ip`
    pub fn available(&self, ip: IpAddr) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let slots = state.end.saturating_sub(state.start).div_ceil(2) as usize;
        let used = state
            .addresses
            .get(&ip)
            .map(|entry| entry.in_use.len())
            .unwrap_or(0);
        slots.saturating_sub(used)
    }
}

/// A leased RTP port, returned to its pool exactly once
pub struct PortLease {
    pool: PortPool,
    ip: IpAddr,
    port: u16,
    released: bool,
}

impl PortLease {
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.pool.release_port(self.ip, self.port);
        }
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl std::fmt::Debug for PortLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortLease")
            .field("ip", &self.ip)
            .field("port", &self.port)
            .finish()
    }
}
