//! Media tap attached to the call's audio pipeline

use super::aggregate::ForkSession;
use super::value_object::{LegKind, MediaParams};
use crate::domain::shared::{ForkError, HangupCause};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, trace};

/// Name the tap is registered under on the host
pub const TAP_NAME: &str = "siprec_read";

/// Largest raw frame pulled on a read ping, in samples
pub const MAX_RAW_FRAME_SAMPLES: usize = 4096;

/// Source of raw frames for pull-style reads
pub trait RawFrameReader {
    /// Fill `buf` with the next frame; `None` when no frame is available
    fn read_frame(&mut self, buf: &mut [i16]) -> Option<usize>;
}

/// Callback events delivered by the host's media pipeline
pub enum PipelineEvent<'a> {
    /// Pipeline started; carries the call's actual sample rates
    Init(MediaParams),
    /// Pipeline closing, with the call's hangup cause if known
    Close(Option<HangupCause>),
    /// Audio read from the call
    ReadFrame(&'a [i16]),
    /// Read tick without data; the tap pulls a frame itself
    ReadPing(&'a mut (dyn RawFrameReader + Send)),
    /// Audio written to the call
    WriteFrame(&'a [i16]),
}

impl PipelineEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::Init(_) => "init",
            PipelineEvent::Close(_) => "close",
            PipelineEvent::ReadFrame(_) => "read",
            PipelineEvent::ReadPing(_) => "read-ping",
            PipelineEvent::WriteFrame(_) => "write",
        }
    }
}

/// Dispatches pipeline events into a [`ForkSession`]
pub struct MediaTap {
    session: Arc<ForkSession>,
    raw: Mutex<Vec<i16>>,
}

impl MediaTap {
    pub fn new(session: Arc<ForkSession>) -> Self {
        Self {
            session,
            raw: Mutex::new(vec![0; MAX_RAW_FRAME_SAMPLES]),
        }
    }

    /// Name the host registers the tap under
    pub fn name(&self) -> &'static str {
        TAP_NAME
    }

    pub fn session(&self) -> &Arc<ForkSession> {
        &self.session
    }

    /// Handle one pipeline event; the tap always stays attached
    pub async fn handle(&self, event: PipelineEvent<'_>) -> bool {
        trace!("Fork {} pipeline event {}", self.session.id(), event.name());

        match event {
            PipelineEvent::Init(media) => {
                info!("Starting recording stream for call {}", self.session.call().handle);
                match self.session.activate(media).await {
                    Ok(()) => {}
                    Err(ForkError::InvalidStateTransition(e)) => {
                        debug!("Fork {} ignored init: {}", self.session.id(), e)
                    }
                    // Already logged by the session
                    Err(_) => {}
                }
            }
            PipelineEvent::Close(cause) => {
                info!("Stopping recording stream for call {}", self.session.call().handle);
                self.session
                    .stop(cause.unwrap_or(HangupCause::NormalClearing))
                    .await;
            }
            PipelineEvent::ReadFrame(samples) => {
                self.session.forward_frame(LegKind::Read, samples);
            }
            PipelineEvent::ReadPing(reader) => self.pull_read_frame(reader),
            PipelineEvent::WriteFrame(samples) => {
                self.session.forward_frame(LegKind::Write, samples);
            }
        }

        true
    }

    fn pull_read_frame(&self, reader: &mut (dyn RawFrameReader + Send)) {
        let mut raw = self.raw.lock().unwrap_or_else(PoisonError::into_inner);
        match reader.read_frame(&mut raw) {
            Some(samples) if samples > 0 => {
                let samples = samples.min(raw.len());
                self.session.forward_frame(LegKind::Read, &raw[..samples]);
            }
            _ => trace!("Fork {} read ping without frame", self.session.id()),
        }
    }
}

impl std::fmt::Debug for MediaTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTap")
            .field("session", &self.session)
            .finish()
    }
}
