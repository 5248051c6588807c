//! Outbound RTP transports toward the recording server

use super::codec::{G711_CLOCK_RATE, PCMU_PAYLOAD_TYPE};
use super::port_pool::{PortLease, PortPool};
use super::rtp::{RtpHeader, RtpSession};
use crate::domain::shared::{ForkError, Result};
use async_trait::async_trait;
use bytes::BytesMut;
use std::net::{IpAddr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::{debug, info, trace};

/// Stream parameters of an outbound leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecParams {
    pub payload_type: u8,
    pub clock_rate: u32,
    pub ptime_ms: u32,
}

impl CodecParams {
    /// PCMU at 8 kHz, 20 ms packets
    pub fn pcmu() -> Self {
        Self {
            payload_type: PCMU_PAYLOAD_TYPE,
            clock_rate: G711_CLOCK_RATE,
            ptime_ms: 20,
        }
    }

    pub fn samples_per_packet(&self) -> usize {
        (self.clock_rate * self.ptime_ms / 1000) as usize
    }
}

impl Default for CodecParams {
    fn default() -> Self {
        Self::pcmu()
    }
}

/// A send-only media stream bound to a (local, remote) address pair
pub trait MediaTransport: Send {
    /// Send one encoded frame; returns the payload bytes written or 0
    fn write_frame(&mut self, payload: &[u8]) -> usize;

    /// Close the underlying socket; later writes return 0
    fn destroy(&mut self);

    fn local_addr(&self) -> SocketAddr;

    fn remote_addr(&self) -> SocketAddr;
}

/// Port and transport lifecycle for recording legs
#[async_trait]
pub trait TransportManager: Send + Sync {
    /// Lease a local RTP port on `ip`
    fn allocate_port(&self, ip: IpAddr) -> Result<PortLease>;

    /// Return a lease to the pool
    fn release_port(&self, lease: PortLease) {
        lease.release();
    }

    /// Create a transport on a leased port; the lease stays with the caller
    async fn create_transport(
        &self,
        local: SocketAddr,
        remote: SocketAddr,
        params: &CodecParams,
    ) -> Result<Box<dyn MediaTransport>>;

    /// Close a transport; never touches the port lease
    fn destroy_transport(&self, mut transport: Box<dyn MediaTransport>) {
        transport.destroy();
    }
}

/// UDP RTP transports over a process-wide port pool
pub struct RtpTransportManager {
    pool: PortPool,
}

impl RtpTransportManager {
    pub fn new(pool: PortPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PortPool {
        &self.pool
    }
}

#[async_trait]
impl TransportManager for RtpTransportManager {
    fn allocate_port(&self, ip: IpAddr) -> Result<PortLease> {
        self.pool.allocate_port(ip)
    }

    async fn create_transport(
        &self,
        local: SocketAddr,
        remote: SocketAddr,
        params: &CodecParams,
    ) -> Result<Box<dyn MediaTransport>> {
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| ForkError::Transport(format!("bind {}: {}", local, e)))?;
        socket
            .connect(remote)
            .await
            .map_err(|e| ForkError::Transport(format!("connect {}: {}", remote, e)))?;

        info!("RTP transport {} -> {}", local, remote);

        Ok(Box::new(RtpTransport::new(socket, local, remote, params)))
    }
}

/// RTP over a connected UDP socket
pub struct RtpTransport {
    socket: Option<UdpSocket>,
    session: RtpSession,
    local: SocketAddr,
    remote: SocketAddr,
    buffer: BytesMut,
}

impl RtpTransport {
    fn new(socket: UdpSocket, local: SocketAddr, remote: SocketAddr, params: &CodecParams) -> Self {
        let session = RtpSession::new(params.payload_type, params.clock_rate);
        let capacity = RtpHeader::SIZE + params.samples_per_packet();

        Self {
            socket: Some(socket),
            session,
            local,
            remote,
            buffer: BytesMut::with_capacity(capacity),
        }
    }
}

impl MediaTransport for RtpTransport {
    fn write_frame(&mut self, payload: &[u8]) -> usize {
        let Some(socket) = self.socket.as_ref() else {
            return 0;
        };
        if payload.is_empty() {
            return 0;
        }

        self.buffer.clear();
        // One G.711 byte per sample
        self.session
            .packetize(payload, payload.len() as u32, &mut self.buffer);

        match socket.try_send(&self.buffer) {
            Ok(_) => payload.len(),
            Err(e) => {
                trace!("RTP send to {} failed: {}", self.remote, e);
                0
            }
        }
    }

    fn destroy(&mut self) {
        if self.socket.take().is_some() {
            debug!(
                "Closed RTP transport {} -> {} after {} packets",
                self.local,
                self.remote,
                self.session.packets_sent()
            );
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

impl Drop for RtpTransport {
    fn drop(&mut self) {
        self.destroy();
    }
}
