//! UDP user-agent client placing recording calls
//!
//! Implements just the client side of one INVITE dialog per recording: the
//! INVITE transaction with timer A retransmissions, ACK for the final
//! response, CANCEL on timeout and BYE on hangup. Every recording call gets
//! its own ephemeral UDP socket, so responses never need demultiplexing
//! across calls.

use super::bridge::{OriginateRequest, Originator, OutboundSession};
use super::message::{is_valid_extension_header, MultipartBody, SipError, SipResponse};
use crate::domain::shared::HangupCause;
use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rsip::{Header, Headers, Method, Request, Uri, Version};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

const MAX_DATAGRAM: usize = 65535;
const MAX_FORWARDS: u32 = 70;

/// SIP Timers (RFC 3261 Section 17.1.1.1)
#[derive(Debug, Clone, Copy)]
pub struct SipTimers {
    /// T1: RTT Estimate (default 500ms)
    pub t1: Duration,
    /// T2: Maximum retransmit interval (default 4s)
    pub t2: Duration,
}

impl Default for SipTimers {
    fn default() -> Self {
        Self {
            t1: Duration::from_millis(500),
            t2: Duration::from_secs(4),
        }
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn new_branch() -> String {
    let random: u64 = rand::thread_rng().gen();
    format!("z9hG4bK{:x}", random)
}

/// Places recording calls over UDP from `local_ip`
pub struct SipOriginator {
    local_ip: IpAddr,
    user_agent: String,
    timers: SipTimers,
}

impl SipOriginator {
    pub fn new(local_ip: IpAddr, user_agent: impl Into<String>) -> Self {
        Self {
            local_ip,
            user_agent: user_agent.into(),
            timers: SipTimers::default(),
        }
    }

    pub fn with_timers(mut self, timers: SipTimers) -> Self {
        self.timers = timers;
        self
    }

    async fn resolve(host: &str, port: u16) -> Result<SocketAddr, SipError> {
        tokio::net::lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| SipError::InvalidMessage(format!("cannot resolve {}", host)))
    }

    async fn run_invite(&self, request: &OriginateRequest) -> Result<InviteOutcome, SipError> {
        let remote = Self::resolve(&request.host, request.port).await?;
        let socket = UdpSocket::bind(SocketAddr::new(self.local_ip, 0)).await?;
        let local = socket.local_addr()?;

        let remote_uri = Uri::try_from(format!(
            "sip:{}@{}:{}",
            request.user, request.host, request.port
        ))?;
        let dialog = Dialog {
            call_id: format!("{}@{}", uuid::Uuid::new_v4(), self.local_ip),
            local_uri: format!("sip:{}@{}", request.caller_id_number, self.local_ip),
            local_tag: random_token(10),
            remote_target: remote_uri.clone(),
            remote_uri,
            remote_to: None,
            cseq: 1,
            local,
            remote,
            user_agent: self.user_agent.clone(),
        };

        let branch = new_branch();
        let invite = dialog.invite(&branch, request).to_string();
        let deadline = Instant::now() + request.timeout;

        info!(
            "INVITE {} via {} (Call-ID {})",
            dialog.remote_uri, remote, dialog.call_id
        );
        socket.send_to(invite.as_bytes(), remote).await?;

        let mut provisional = false;
        let mut retransmit_interval = self.timers.t1;
        let mut next_retransmit = Instant::now() + retransmit_interval;
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let wake = if provisional {
                deadline
            } else {
                next_retransmit.min(deadline)
            };

            match timeout_at(wake, socket.recv_from(&mut buf)).await {
                Err(_) => {
                    if Instant::now() >= deadline {
                        return Ok(InviteOutcome::TimedOut {
                            socket,
                            dialog,
                            branch,
                            provisional,
                        });
                    }
                    // Timer A
                    debug!("Retransmitting INVITE for {}", dialog.call_id);
                    socket.send_to(invite.as_bytes(), remote).await?;
                    retransmit_interval = (retransmit_interval * 2).min(self.timers.t2);
                    next_retransmit = Instant::now() + retransmit_interval;
                }
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok((len, source))) => {
                    let response = match SipResponse::parse(&buf[..len]) {
                        Ok(response) => response,
                        Err(e) => {
                            debug!("Ignoring unparseable datagram from {}: {}", source, e);
                            continue;
                        }
                    };

                    if response.call_id() != Some(dialog.call_id.as_str())
                        || !matches!(response.cseq(), Some((1, ref method)) if method == "INVITE")
                    {
                        continue;
                    }

                    let status = response.status_code();
                    if response.is_provisional() {
                        debug!("{} provisional {}", dialog.call_id, status);
                        provisional = true;
                        continue;
                    }

                    return Ok(InviteOutcome::Final {
                        socket,
                        dialog,
                        branch,
                        response,
                    });
                }
            }
        }
    }
}

enum InviteOutcome {
    Final {
        socket: UdpSocket,
        dialog: Dialog,
        branch: String,
        response: SipResponse,
    },
    TimedOut {
        socket: UdpSocket,
        dialog: Dialog,
        branch: String,
        provisional: bool,
    },
}

#[async_trait]
impl Originator for SipOriginator {
    async fn originate(
        &self,
        request: OriginateRequest,
    ) -> Result<Box<dyn OutboundSession>, HangupCause> {
        let outcome = match self.run_invite(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Recording INVITE to {}:{} failed: {}", request.host, request.port, e);
                return Err(HangupCause::DestinationOutOfOrder);
            }
        };

        match outcome {
            InviteOutcome::TimedOut {
                socket,
                dialog,
                branch,
                provisional,
            } => {
                if provisional {
                    let cancel = dialog.cancel(&branch).to_string();
                    if let Err(e) = socket.send_to(cancel.as_bytes(), dialog.remote).await {
                        debug!("CANCEL for {} not sent: {}", dialog.call_id, e);
                    }
                    Err(HangupCause::NoAnswer)
                } else {
                    Err(HangupCause::RecoveryOnTimerExpire)
                }
            }
            InviteOutcome::Final {
                socket,
                mut dialog,
                branch,
                response,
            } => {
                let status = response.status_code();
                dialog.remote_to = response.to_header().map(str::to_string);

                if !response.is_success() {
                    let ack = dialog.ack_failure(&branch).to_string();
                    if let Err(e) = socket.send_to(ack.as_bytes(), dialog.remote).await {
                        debug!("ACK for {} not sent: {}", dialog.call_id, e);
                    }
                    return Err(HangupCause::from_sip_status(status));
                }

                if let Some(contact) = response.contact_uri() {
                    match Uri::try_from(contact.as_str()) {
                        Ok(target) => dialog.remote_target = target,
                        Err(e) => debug!("Keeping request URI, bad Contact {}: {}", contact, e),
                    }
                }

                let ack = dialog.ack_answer().to_string();
                if let Err(e) = socket.send_to(ack.as_bytes(), dialog.remote).await {
                    warn!("ACK for {} not sent: {}", dialog.call_id, e);
                }

                let remote_sdp = response.sdp().unwrap_or_default();
                info!("Recording call {} answered ({})", dialog.call_id, status);

                Ok(Box::new(SipSession {
                    socket,
                    dialog,
                    remote_sdp,
                    terminated: false,
                }))
            }
        }
    }
}

/// Client side of the recording dialog
struct Dialog {
    call_id: String,
    local_uri: String,
    local_tag: String,
    /// Request URI of the INVITE
    remote_uri: Uri,
    /// `To` header value including the remote tag, once known
    remote_to: Option<String>,
    /// Where in-dialog requests go, from the answer's Contact
    remote_target: Uri,
    cseq: u32,
    local: SocketAddr,
    remote: SocketAddr,
    user_agent: String,
}

impl Dialog {
    fn headers(&self, method: Method, branch: &str, cseq: u32) -> Headers {
        let to = self
            .remote_to
            .clone()
            .unwrap_or_else(|| format!("<{}>", self.remote_uri));

        let mut headers = Headers::default();
        headers.push(Header::Via(
            format!("SIP/2.0/UDP {};branch={};rport", self.local, branch).into(),
        ));
        headers.push(Header::MaxForwards(MAX_FORWARDS.to_string().into()));
        headers.push(Header::From(
            format!("<{}>;tag={}", self.local_uri, self.local_tag).into(),
        ));
        headers.push(Header::To(to.into()));
        headers.push(Header::CallId(self.call_id.clone().into()));
        headers.push(Header::CSeq(format!("{} {}", cseq, method).into()));
        headers.push(Header::UserAgent(self.user_agent.clone().into()));
        headers
    }

    fn request(method: Method, uri: Uri, mut headers: Headers, body: Vec<u8>) -> Request {
        headers.push(Header::ContentLength(body.len().to_string().into()));
        Request {
            method,
            uri,
            version: Version::V2,
            headers,
            body,
        }
    }

    fn invite(&self, branch: &str, request: &OriginateRequest) -> Request {
        let mut headers = self.headers(Method::Invite, branch, self.cseq);
        headers.push(Header::Contact(
            format!("<sip:{}@{}>;+sip.src", request.caller_id_number, self.local).into(),
        ));
        headers.push(Header::Require("siprec".into()));
        headers.push(Header::Allow("INVITE, ACK, CANCEL, BYE".into()));
        for (name, value) in &request.headers {
            if !is_valid_extension_header(name, value) {
                warn!("Dropping malformed header {:?} on {}", name, self.call_id);
                continue;
            }
            headers.push(Header::Other(name.clone(), value.clone()));
        }

        let mut body = MultipartBody::new(format!("siprec-{}", random_token(16)));
        for part in &request.parts {
            body.add_part(part.clone());
        }
        headers.push(Header::MimeVersion("1.0".into()));
        headers.push(Header::ContentType(body.content_type().into()));

        Self::request(
            Method::Invite,
            self.remote_uri.clone(),
            headers,
            body.to_string().into_bytes(),
        )
    }

    /// ACK for a non-2xx final response: same branch and request URI as the INVITE
    fn ack_failure(&self, branch: &str) -> Request {
        Self::request(
            Method::Ack,
            self.remote_uri.clone(),
            self.headers(Method::Ack, branch, self.cseq),
            Vec::new(),
        )
    }

    /// ACK for a 2xx: a new transaction sent to the remote target
    fn ack_answer(&self) -> Request {
        Self::request(
            Method::Ack,
            self.remote_target.clone(),
            self.headers(Method::Ack, &new_branch(), self.cseq),
            Vec::new(),
        )
    }

    fn cancel(&self, branch: &str) -> Request {
        Self::request(
            Method::Cancel,
            self.remote_uri.clone(),
            self.headers(Method::Cancel, branch, self.cseq),
            Vec::new(),
        )
    }

    fn bye(&mut self, cause: HangupCause) -> Request {
        self.cseq += 1;
        let mut headers = self.headers(Method::Bye, &new_branch(), self.cseq);
        headers.push(Header::Other(
            "Reason".to_string(),
            format!("Q.850;cause={};text=\"{}\"", cause.q850(), cause),
        ));
        Self::request(Method::Bye, self.remote_target.clone(), headers, Vec::new())
    }
}

/// Answered recording call
struct SipSession {
    socket: UdpSocket,
    dialog: Dialog,
    remote_sdp: String,
    terminated: bool,
}

#[async_trait]
impl OutboundSession for SipSession {
    fn remote_sdp(&self) -> &str {
        &self.remote_sdp
    }

    fn remote_media_ip(&self) -> Option<IpAddr> {
        None
    }

    async fn hangup(&mut self, cause: HangupCause) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        let bye = self.dialog.bye(cause).to_string();
        match self.socket.send_to(bye.as_bytes(), self.dialog.remote).await {
            Ok(_) => info!("BYE {} ({})", self.dialog.call_id, cause),
            Err(e) => warn!("BYE for {} not sent: {}", self.dialog.call_id, e),
        }
    }
}
