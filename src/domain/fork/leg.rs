//! One outbound media leg of a fork

use super::value_object::LegKind;
use crate::infrastructure::media::codec::SampleConverter;
use crate::infrastructure::media::port_pool::PortLease;
use crate::infrastructure::media::transport::{MediaTransport, TransportManager};
use crate::infrastructure::metrics;
use bytes::BytesMut;
use tracing::{debug, error};

/// Successful writes logged individually at debug
const LOGGED_FRAMES: u64 = 10;
/// Write failures logged at error before throttling kicks in
const LOGGED_FAILURES: u64 = 3;
/// After that, one debug line per this many failures
const FAILURE_LOG_INTERVAL: u64 = 500;

/// Leased port, converter and transport for one direction of the call
///
/// The lease and the transport are each given up exactly once, either by
/// [`TransportLeg::teardown`] or on drop.
pub struct TransportLeg {
    kind: LegKind,
    lease: Option<PortLease>,
    transport: Option<Box<dyn MediaTransport>>,
    converter: SampleConverter,
    encoded: BytesMut,
    frame_counter: u64,
    write_failures: u64,
}

impl TransportLeg {
    pub fn new(kind: LegKind, lease: PortLease, converter: SampleConverter) -> Self {
        Self {
            kind,
            lease: Some(lease),
            transport: None,
            converter,
            encoded: BytesMut::with_capacity(1024),
            frame_counter: 0,
            write_failures: 0,
        }
    }

    pub fn kind(&self) -> LegKind {
        self.kind
    }

    /// Leased local port; 0 once released
    pub fn local_port(&self) -> u16 {
        self.lease.as_ref().map(PortLease::port).unwrap_or(0)
    }

    pub fn attach_transport(&mut self, transport: Box<dyn MediaTransport>) {
        self.transport = Some(transport);
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Frames written successfully so far
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }

    /// Encode `samples` and send them; returns the bytes written
    ///
    /// With `quiet` set, failed writes are counted but not logged.
    pub fn forward(&mut self, samples: &[i16], quiet: bool) -> usize {
        if samples.is_empty() {
            return 0;
        }

        let transport = match self.transport.as_mut() {
            Some(transport) => transport,
            None => return 0,
        };

        self.encoded.clear();
        let encoded = self.converter.convert(samples, &mut self.encoded);
        if encoded == 0 {
            return 0;
        }

        let written = transport.write_frame(&self.encoded);
        if written > 0 {
            self.frame_counter += 1;
            if self.frame_counter <= LOGGED_FRAMES {
                debug!("Fork wrote {} bytes ({})", written, self.kind);
            }
            metrics::record_frame_forwarded(self.kind);
            return written;
        }

        self.write_failures += 1;
        metrics::record_frame_failed(self.kind);
        if !quiet {
            if self.write_failures <= LOGGED_FAILURES {
                error!("Failed to write {} bytes ({})", encoded, self.kind);
            } else if self.write_failures % FAILURE_LOG_INTERVAL == 0 {
                debug!(
                    "{} writes failed so far ({})",
                    self.write_failures, self.kind
                );
            }
        }
        0
    }

    /// Destroy the transport and release the port lease
    pub fn teardown(&mut self, transports: &dyn TransportManager) {
        if let Some(transport) = self.transport.take() {
            transports.destroy_transport(transport);
        }
        if let Some(lease) = self.lease.take() {
            transports.release_port(lease);
        }
    }
}

impl Drop for TransportLeg {
    fn drop(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.destroy();
        }
        // A remaining lease returns its port when dropped
    }
}

impl std::fmt::Debug for TransportLeg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportLeg")
            .field("kind", &self.kind)
            .field("local_port", &self.local_port())
            .field("has_transport", &self.has_transport())
            .field("frame_counter", &self.frame_counter)
            .field("write_failures", &self.write_failures)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::Result;
    use crate::infrastructure::media::port_pool::PortPool;
    use crate::infrastructure::media::transport::CodecParams;
    use async_trait::async_trait;
    use std::net::{IpAddr, SocketAddr};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct ScriptedTransport {
        accept: bool,
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
        destroyed: Arc<AtomicUsize>,
    }

    impl MediaTransport for ScriptedTransport {
        fn write_frame(&mut self, payload: &[u8]) -> usize {
            if !self.accept {
                return 0;
            }
            self.writes.lock().unwrap().push(payload.to_vec());
            payload.len()
        }

        fn destroy(&mut self) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }

        fn local_addr(&self) -> SocketAddr {
            "127.0.0.1:16384".parse().unwrap()
        }

        fn remote_addr(&self) -> SocketAddr {
            "127.0.0.1:40000".parse().unwrap()
        }
    }

    struct PoolOnly(PortPool);

    #[async_trait]
    impl TransportManager for PoolOnly {
        fn allocate_port(&self, ip: IpAddr) -> Result<PortLease> {
            self.0.allocate_port(ip)
        }

        async fn create_transport(
            &self,
            _local: SocketAddr,
            _remote: SocketAddr,
            _codec: &CodecParams,
        ) -> Result<Box<dyn MediaTransport>> {
            unreachable!("not used by leg tests")
        }
    }

    fn ip() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    fn leg(pool: &PortPool, accept: bool) -> (TransportLeg, Arc<Mutex<Vec<Vec<u8>>>>, Arc<AtomicUsize>) {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let destroyed = Arc::new(AtomicUsize::new(0));
        let mut leg = TransportLeg::new(
            LegKind::Read,
            pool.allocate_port(ip()).unwrap(),
            SampleConverter::new(8000, 2).unwrap(),
        );
        leg.attach_transport(Box::new(ScriptedTransport {
            accept,
            writes: writes.clone(),
            destroyed: destroyed.clone(),
        }));
        (leg, writes, destroyed)
    }

    #[test]
    fn test_forward_encodes_one_byte_per_sample() {
        let pool = PortPool::new(16384, 16400);
        let (mut leg, writes, _) = leg(&pool, true);

        assert_eq!(leg.forward(&[0i16; 160], false), 160);
        assert_eq!(leg.forward(&[], false), 0);
        assert_eq!(leg.frame_counter(), 1);
        assert_eq!(writes.lock().unwrap()[0].len(), 160);
    }

    #[test]
    fn test_failed_writes_are_counted() {
        let pool = PortPool::new(16384, 16400);
        let (mut leg, _, _) = leg(&pool, false);

        for _ in 0..5 {
            assert_eq!(leg.forward(&[100i16; 160], false), 0);
        }
        assert_eq!(leg.write_failures(), 5);
        assert_eq!(leg.frame_counter(), 0);
    }

    #[test]
    fn test_teardown_releases_exactly_once() {
        let pool = PortPool::new(16384, 16400);
        let manager = PoolOnly(pool.clone());
        let (mut leg, _, destroyed) = leg(&pool, true);
        assert_eq!(pool.leased_count(ip()), 1);

        leg.teardown(&manager);
        leg.teardown(&manager);
        drop(leg);

        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.leased_count(ip()), 0);
    }

    #[test]
    fn test_drop_cleans_up() {
        let pool = PortPool::new(16384, 16400);
        let (leg, _, destroyed) = leg(&pool, true);

        drop(leg);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.leased_count(ip()), 0);
    }
}
