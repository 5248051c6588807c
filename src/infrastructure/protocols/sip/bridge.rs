//! Signaling bridge toward the recording server
//!
//! Places the outbound recording call for a fork: builds the SDP offer and
//! the recording metadata, dials the recording server through an
//! [`Originator`] and hands back the connected session together with the
//! media addresses the server answered with.

use super::message::{is_valid_extension_header, MimePart, SDP_CONTENT_TYPE};
use super::metadata::{RecordingMetadata, RS_METADATA_CONTENT_TYPE};
use super::sdp::SdpSession;
use crate::config::SipConfig;
use crate::domain::fork::{CallContext, RecorderDestination};
use crate::domain::shared::{ForkError, HangupCause, Result};
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Packetization time of every recording stream
pub const RECORDING_PTIME_MS: u32 = 20;

/// Extra time the bridge waits beyond the originate timeout, so the
/// originator can cancel the INVITE itself
const ORIGINATE_GRACE: Duration = Duration::from_millis(500);

/// Channel header naming the recording tenant
const DEST_HOST_HEADER: &str = "DestHost";

/// Everything needed to place the recording call
#[derive(Debug, Clone)]
pub struct OriginateRequest {
    /// User part of the request URI
    pub user: String,
    pub host: String,
    pub port: u16,
    pub caller_id_number: String,
    /// Extra SIP headers in order
    pub headers: Vec<(String, String)>,
    /// Body parts, sent as `multipart/mixed`
    pub parts: Vec<MimePart>,
    pub timeout: Duration,
}

/// A connected recording call
#[async_trait]
pub trait OutboundSession: Send + Sync {
    /// SDP answer of the recording server
    fn remote_sdp(&self) -> &str;

    /// Media address reported by the signaling layer, if any
    fn remote_media_ip(&self) -> Option<IpAddr>;

    /// Hang up the recording call
    async fn hangup(&mut self, cause: HangupCause);
}

/// Places outbound calls
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Originator: Send + Sync {
    /// Dial and wait for an answer; one attempt, bounded by `request.timeout`
    async fn originate(
        &self,
        request: OriginateRequest,
    ) -> std::result::Result<Box<dyn OutboundSession>, HangupCause>;
}

/// Connected recording call plus the negotiated media addresses
pub struct RecorderEndpoint {
    pub session: Box<dyn OutboundSession>,
    /// Where each answered audio stream goes, in offer order; `None` marks
    /// a rejected stream
    pub remote_media: Vec<Option<SocketAddr>>,
}

impl std::fmt::Debug for RecorderEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecorderEndpoint")
            .field("remote_media", &self.remote_media)
            .finish()
    }
}

pub struct SignalingBridge {
    originator: Arc<dyn Originator>,
    sip: SipConfig,
    timeout: Duration,
}

impl SignalingBridge {
    pub fn new(originator: Arc<dyn Originator>, sip: SipConfig, timeout: Duration) -> Self {
        Self {
            originator,
            sip,
            timeout,
        }
    }

    /// Place the recording call for `call`
    ///
    /// `streams` are the leased local ports with their labels, in offer
    /// order.
    pub async fn establish(
        &self,
        call: &CallContext,
        destination: &RecorderDestination,
        local_ip: IpAddr,
        streams: &[(u16, &str)],
    ) -> Result<RecorderEndpoint> {
        let request = self.build_request(call, destination, local_ip, streams);

        info!(
            "Placing recording call for {} to {}@{}",
            call.handle, request.user, destination
        );

        let outcome =
            tokio::time::timeout(self.timeout + ORIGINATE_GRACE, self.originator.originate(request))
                .await;

        let mut session = match outcome {
            Err(_) => {
                warn!("Recording call for {} timed out after {:?}", call.handle, self.timeout);
                return Err(ForkError::SignalingTimeout(self.timeout));
            }
            Ok(Err(cause)) => {
                warn!("Recording call for {} failed: {}", call.handle, cause);
                return Err(ForkError::Signaling(cause));
            }
            Ok(Ok(session)) => session,
        };

        let answer = match SdpSession::parse(session.remote_sdp()) {
            Some(answer) => answer,
            None => {
                session.hangup(HangupCause::OriginatorCancel).await;
                return Err(ForkError::NoMediaAccepted("unparseable SDP answer".to_string()));
            }
        };

        let fallback_ip = session.remote_media_ip();
        let mut remote_media = Vec::new();
        for (index, (port, ip)) in answer.audio_streams().into_iter().enumerate() {
            if port == 0 {
                remote_media.push(None);
                continue;
            }
            match ip.or(fallback_ip) {
                Some(ip) => remote_media.push(Some(SocketAddr::new(ip, port))),
                None => {
                    session.hangup(HangupCause::OriginatorCancel).await;
                    return Err(ForkError::NoMediaAccepted(format!(
                        "audio stream {} of the SDP answer has no connection address",
                        index
                    )));
                }
            }
        }

        debug!("Recorder media at {:?}", remote_media);

        Ok(RecorderEndpoint {
            session,
            remote_media,
        })
    }

    fn build_request(
        &self,
        call: &CallContext,
        destination: &RecorderDestination,
        local_ip: IpAddr,
        streams: &[(u16, &str)],
    ) -> OriginateRequest {
        let offer = SdpSession::recording_offer(
            &self.sip.origin_user,
            &self.sip.session_name,
            local_ip,
            RECORDING_PTIME_MS,
            streams,
        );

        let metadata = RecordingMetadata::new(
            call.handle.to_string(),
            call.sip_call_id.clone(),
            call.from_uri.clone(),
            call.to_uri.clone(),
            streams.iter().map(|(_, label)| label.to_string()).collect(),
        );

        let mut user = call.caller_id_number.clone();
        let mut headers = Vec::new();
        for (name, value) in call.sip_header_variables() {
            if !is_valid_extension_header(name, value) {
                warn!("Call {}: dropping malformed SIP header {:?}", call.handle, name);
                continue;
            }
            if name.eq_ignore_ascii_case(DEST_HOST_HEADER) {
                if !value.is_empty() {
                    // Tenant routing: the recorder picks the tenant from X-DestHost
                    user = self.sip.srs_name.clone();
                    headers.push((format!("X-{}", DEST_HOST_HEADER), value.to_string()));
                }
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        OriginateRequest {
            user,
            host: destination.host.clone(),
            port: destination.port,
            caller_id_number: call.caller_id_number.clone(),
            headers,
            parts: vec![
                MimePart::new(SDP_CONTENT_TYPE, offer.to_string()),
                MimePart::new(RS_METADATA_CONTENT_TYPE, metadata.to_string())
                    .with_disposition("recording-session"),
            ],
            timeout: self.timeout,
        }
    }
}
