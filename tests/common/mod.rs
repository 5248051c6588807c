//! Shared fakes for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use siprec_fork::application::{ForkService, MediaHost};
use siprec_fork::config::{Config, ForkConfig};
use siprec_fork::domain::fork::{CallContext, EventPublisher, ForkEvent, MediaTap};
use siprec_fork::domain::shared::{CallHandle, ForkError, HangupCause, Result};
use siprec_fork::infrastructure::media::{
    CodecParams, MediaTransport, PortLease, PortPool, TransportManager,
};
use siprec_fork::infrastructure::protocols::sip::{OriginateRequest, Originator, OutboundSession};
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const LOCAL_IP: &str = "127.0.0.1";
pub const RECORDER_IP: &str = "10.2.2.2";

pub fn local_ip() -> IpAddr {
    LOCAL_IP.parse().unwrap()
}

/// SDP answer accepting `ports` in order
pub fn answer_sdp(ports: &[u16]) -> String {
    let mut sdp = format!(
        "v=0\r\no=srs 1 1 IN IP4 {ip}\r\ns=-\r\nc=IN IP4 {ip}\r\nt=0 0\r\n",
        ip = RECORDER_IP
    );
    for port in ports {
        sdp.push_str(&format!(
            "m=audio {} RTP/AVP 0\r\na=rtpmap:0 PCMU/8000\r\na=recvonly\r\n",
            port
        ));
    }
    sdp
}

pub fn call() -> Arc<CallContext> {
    Arc::new(CallContext::new(
        "orig-call@10.0.0.1",
        "sip:alice@example.com",
        "sip:bob@example.com",
        "1000",
    ))
}

/// What one fake transport saw
#[derive(Debug, Clone)]
pub struct TransportRecord {
    pub local: SocketAddr,
    pub remote: SocketAddr,
    pub writes: Vec<usize>,
    /// Writes refused because the transport was told to fail
    pub failed_writes: usize,
    pub destroyed: bool,
}

struct FakeTransport {
    index: usize,
    local: SocketAddr,
    remote: SocketAddr,
    records: Arc<Mutex<Vec<TransportRecord>>>,
    failing: Arc<Mutex<HashSet<usize>>>,
}

impl MediaTransport for FakeTransport {
    fn write_frame(&mut self, payload: &[u8]) -> usize {
        let failing = self.failing.lock().unwrap().contains(&self.index);
        let mut records = self.records.lock().unwrap();
        let record = &mut records[self.index];
        if record.destroyed {
            return 0;
        }
        if failing {
            record.failed_writes += 1;
            return 0;
        }
        record.writes.push(payload.len());
        payload.len()
    }

    fn destroy(&mut self) {
        self.records.lock().unwrap()[self.index].destroyed = true;
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

/// Real port pool, in-memory transports
pub struct FakeTransportManager {
    pub pool: PortPool,
    pub records: Arc<Mutex<Vec<TransportRecord>>>,
    fail_create: AtomicBool,
    failing_writes: Arc<Mutex<HashSet<usize>>>,
}

impl FakeTransportManager {
    pub fn new(pool: PortPool) -> Self {
        Self {
            pool,
            records: Arc::new(Mutex::new(Vec::new())),
            fail_create: AtomicBool::new(false),
            failing_writes: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    /// Make every write on the `index`-th created transport fail
    pub fn fail_writes_on(&self, index: usize) {
        self.failing_writes.lock().unwrap().insert(index);
    }

    pub fn created(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn records(&self) -> Vec<TransportRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn leased(&self) -> usize {
        self.pool.leased_count(local_ip())
    }
}

#[async_trait]
impl TransportManager for FakeTransportManager {
    fn allocate_port(&self, ip: IpAddr) -> Result<PortLease> {
        self.pool.allocate_port(ip)
    }

    async fn create_transport(
        &self,
        local: SocketAddr,
        remote: SocketAddr,
        _params: &CodecParams,
    ) -> Result<Box<dyn MediaTransport>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ForkError::Transport(format!("bind {}: refused", local)));
        }

        let mut records = self.records.lock().unwrap();
        records.push(TransportRecord {
            local,
            remote,
            writes: Vec::new(),
            failed_writes: 0,
            destroyed: false,
        });
        Ok(Box::new(FakeTransport {
            index: records.len() - 1,
            local,
            remote,
            records: self.records.clone(),
            failing: self.failing_writes.clone(),
        }))
    }
}

/// How the fake recorder responds
#[derive(Debug, Clone)]
pub enum Recorder {
    Answer(String),
    AnswerAfter(Duration, String),
    Reject(HangupCause),
    NeverAnswer,
}

pub struct FakeOriginator {
    behavior: Recorder,
    pub requests: Mutex<Vec<OriginateRequest>>,
    pub hangups: Arc<Mutex<Vec<HangupCause>>>,
}

impl FakeOriginator {
    pub fn new(behavior: Recorder) -> Self {
        Self {
            behavior,
            requests: Mutex::new(Vec::new()),
            hangups: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn hangups(&self) -> Vec<HangupCause> {
        self.hangups.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn session(&self, sdp: &str) -> Box<dyn OutboundSession> {
        Box::new(FakeOutbound {
            sdp: sdp.to_string(),
            hangups: self.hangups.clone(),
        })
    }
}

#[async_trait]
impl Originator for FakeOriginator {
    async fn originate(
        &self,
        request: OriginateRequest,
    ) -> std::result::Result<Box<dyn OutboundSession>, HangupCause> {
        self.requests.lock().unwrap().push(request);

        match &self.behavior {
            Recorder::Answer(sdp) => Ok(self.session(sdp)),
            Recorder::AnswerAfter(delay, sdp) => {
                tokio::time::sleep(*delay).await;
                Ok(self.session(sdp))
            }
            Recorder::Reject(cause) => Err(*cause),
            Recorder::NeverAnswer => std::future::pending().await,
        }
    }
}

struct FakeOutbound {
    sdp: String,
    hangups: Arc<Mutex<Vec<HangupCause>>>,
}

#[async_trait]
impl OutboundSession for FakeOutbound {
    fn remote_sdp(&self) -> &str {
        &self.sdp
    }

    fn remote_media_ip(&self) -> Option<IpAddr> {
        None
    }

    async fn hangup(&mut self, cause: HangupCause) {
        self.hangups.lock().unwrap().push(cause);
    }
}

#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<ForkEvent>>,
}

impl RecordingEventPublisher {
    pub fn events(&self) -> Vec<ForkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(ForkEvent::event_type).collect()
    }
}

impl EventPublisher for RecordingEventPublisher {
    fn publish(&self, event: ForkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Host that only keeps track of attached taps; tests drive the pipeline
#[derive(Default)]
pub struct FakeHost {
    pub taps: Mutex<HashMap<CallHandle, Arc<MediaTap>>>,
    pub detached: Mutex<Vec<CallHandle>>,
}

#[async_trait]
impl MediaHost for FakeHost {
    async fn attach_tap(&self, call: &CallContext, tap: Arc<MediaTap>) -> Result<()> {
        self.taps.lock().unwrap().insert(call.handle, tap);
        Ok(())
    }

    async fn detach_tap(&self, call: CallHandle) {
        self.taps.lock().unwrap().remove(&call);
        self.detached.lock().unwrap().push(call);
    }
}

pub struct Harness {
    pub service: ForkService,
    pub transports: Arc<FakeTransportManager>,
    pub originator: Arc<FakeOriginator>,
    pub events: Arc<RecordingEventPublisher>,
    pub host: Arc<FakeHost>,
}

impl Harness {
    pub fn new(recorder: Recorder) -> Self {
        Self::with_pool(recorder, PortPool::new(20000, 20100))
    }

    pub fn with_pool(recorder: Recorder, pool: PortPool) -> Self {
        let mut fork = ForkConfig::new(local_ip(), "srs.example.com", 5060);
        fork.originate_timeout_secs = 1;
        let config = Arc::new(Config::new(fork));

        let transports = Arc::new(FakeTransportManager::new(pool));
        let originator = Arc::new(FakeOriginator::new(recorder));
        let events = Arc::new(RecordingEventPublisher::default());
        let host = Arc::new(FakeHost::default());

        let service = ForkService::new(
            config,
            transports.clone(),
            originator.clone(),
            events.clone(),
            host.clone(),
        );

        Self {
            service,
            transports,
            originator,
            events,
            host,
        }
    }
}
