//! Fork session aggregate root

use super::entity::CallContext;
use super::event::{EventPublisher, ForkEvent, ForkStarted, ForkStopped};
use super::leg::TransportLeg;
use super::value_object::{ForkDirection, ForkState, LegKind, MediaParams, RecorderDestination};
use crate::domain::shared::{ForkError, ForkId, HangupCause, Result};
use crate::infrastructure::media::codec::SampleConverter;
use crate::infrastructure::media::transport::{CodecParams, TransportManager};
use crate::infrastructure::metrics;
use crate::infrastructure::protocols::sip::{OutboundSession, SignalingBridge};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Collaborators shared by every fork session
#[derive(Clone)]
pub struct ForkResources {
    pub transports: Arc<dyn TransportManager>,
    pub bridge: Arc<SignalingBridge>,
    pub events: Arc<dyn EventPublisher>,
    /// Local address RTP is sent from and advertised in the offer
    pub local_ip: IpAddr,
    pub resample_quality: u8,
}

/// Fork session aggregate root
///
/// Copies the audio of one call to a recording server. The session owns its
/// legs and the recording call; the call context is shared with the host.
///
/// State and legs sit behind one mutex. Frame forwarding holds it for the
/// non-blocking write, and teardown takes the legs out under the same lock,
/// so a write in flight completes before its transport is destroyed. The
/// lock is never held across an await.
pub struct ForkSession {
    id: ForkId,
    call: Arc<CallContext>,
    direction: ForkDirection,
    destination: RecorderDestination,
    resources: ForkResources,
    inner: Mutex<ForkInner>,
}

struct ForkInner {
    state: ForkState,
    read_leg: Option<TransportLeg>,
    write_leg: Option<TransportLeg>,
    recorder: Option<Box<dyn OutboundSession>>,
    hangup_cause: Option<HangupCause>,
    abort_requested: bool,
}

impl ForkInner {
    fn transition(&mut self, next: ForkState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(ForkError::InvalidStateTransition(format!(
                "{} -> {}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    fn leg_mut(&mut self, kind: LegKind) -> Option<&mut TransportLeg> {
        match kind {
            LegKind::Read => self.read_leg.as_mut(),
            LegKind::Write => self.write_leg.as_mut(),
        }
    }

    fn leg(&self, kind: LegKind) -> Option<&TransportLeg> {
        match kind {
            LegKind::Read => self.read_leg.as_ref(),
            LegKind::Write => self.write_leg.as_ref(),
        }
    }
}

/// Resources acquired by an activation that has not committed yet
#[derive(Default)]
struct PendingActivation {
    legs: Vec<TransportLeg>,
    recorder: Option<Box<dyn OutboundSession>>,
}

impl PendingActivation {
    async fn rollback(&mut self, transports: &dyn TransportManager) {
        for mut leg in self.legs.drain(..) {
            leg.teardown(transports);
        }
        if let Some(mut recorder) = self.recorder.take() {
            recorder.hangup(HangupCause::OriginatorCancel).await;
        }
    }
}

impl ForkSession {
    pub fn new(
        call: Arc<CallContext>,
        direction: ForkDirection,
        destination: RecorderDestination,
        resources: ForkResources,
    ) -> Self {
        Self {
            id: ForkId::new(),
            call,
            direction,
            destination,
            resources,
            inner: Mutex::new(ForkInner {
                state: ForkState::Idle,
                read_leg: None,
                write_leg: None,
                recorder: None,
                hangup_cause: None,
                abort_requested: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ForkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> ForkId {
        self.id
    }

    pub fn call(&self) -> &Arc<CallContext> {
        &self.call
    }

    pub fn direction(&self) -> ForkDirection {
        self.direction
    }

    pub fn destination(&self) -> &RecorderDestination {
        &self.destination
    }

    pub fn state(&self) -> ForkState {
        self.lock().state
    }

    pub fn hangup_cause(&self) -> Option<HangupCause> {
        self.lock().hangup_cause
    }

    pub fn has_leg(&self, kind: LegKind) -> bool {
        self.lock().leg(kind).is_some()
    }

    pub fn leg_count(&self) -> usize {
        let inner = self.lock();
        inner.read_leg.iter().chain(inner.write_leg.iter()).count()
    }

    /// Frames successfully written on a leg
    pub fn frames_forwarded(&self, kind: LegKind) -> u64 {
        self.lock().leg(kind).map(TransportLeg::frame_counter).unwrap_or(0)
    }

    /// Set up ports, the recording call and the transports
    ///
    /// Any failure rolls back everything acquired so far and leaves the
    /// session in `Failed`. A stop requested meanwhile makes the activation
    /// roll back as well, ending with [`ForkError::Aborted`].
    pub async fn activate(&self, media: MediaParams) -> Result<()> {
        self.lock().transition(ForkState::Allocating)?;
        info!(
            "Starting fork {} for call {} ({}) to {}",
            self.id, self.call.handle, self.direction, self.destination
        );

        let mut pending = PendingActivation::default();
        let outcome = match self.allocate(media, &mut pending).await {
            Ok(()) => self.commit(&mut pending),
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            pending.rollback(self.resources.transports.as_ref()).await;
            self.mark_failed(&e);
            return Err(e);
        }

        self.resources
            .events
            .publish(ForkEvent::Started(ForkStarted::new(self.call.handle, self.id)));
        metrics::record_fork_started();
        info!(
            "Fork {} active with {} leg(s)",
            self.id,
            self.leg_count()
        );
        Ok(())
    }

    async fn allocate(&self, media: MediaParams, pending: &mut PendingActivation) -> Result<()> {
        let transports = self.resources.transports.as_ref();
        let local_ip = self.resources.local_ip;

        for &kind in self.direction.legs() {
            let converter =
                SampleConverter::new(media.rate_for(kind), self.resources.resample_quality)?;
            let lease = transports.allocate_port(local_ip)?;
            debug!("Fork {} {} leg on port {}", self.id, kind, lease.port());
            pending.legs.push(TransportLeg::new(kind, lease, converter));
        }

        self.check_abort()?;

        let streams: Vec<(u16, &str)> = pending
            .legs
            .iter()
            .map(|leg| (leg.local_port(), leg.kind().label()))
            .collect();
        let endpoint = self
            .resources
            .bridge
            .establish(&self.call, &self.destination, local_ip, &streams)
            .await?;
        pending.recorder = Some(endpoint.session);

        self.check_abort()?;

        // Answer media lines map to legs in offer order
        let mut remotes = Vec::with_capacity(pending.legs.len());
        for (index, mut leg) in std::mem::take(&mut pending.legs).into_iter().enumerate() {
            match endpoint.remote_media.get(index).copied().flatten() {
                Some(remote) => {
                    remotes.push(remote);
                    pending.legs.push(leg);
                }
                None => {
                    warn!(
                        "Recorder did not accept the {} stream of fork {}, leg skipped",
                        leg.kind().label(),
                        self.id
                    );
                    leg.teardown(transports);
                }
            }
        }

        if pending.legs.is_empty() {
            return Err(ForkError::NoMediaAccepted(
                "no audio stream accepted".to_string(),
            ));
        }

        let codec = CodecParams::pcmu();
        for (leg, remote) in pending.legs.iter_mut().zip(remotes) {
            let local = SocketAddr::new(local_ip, leg.local_port());
            let transport = transports.create_transport(local, remote, &codec).await?;
            leg.attach_transport(transport);
        }

        Ok(())
    }

    fn check_abort(&self) -> Result<()> {
        if self.lock().abort_requested {
            return Err(ForkError::Aborted);
        }
        Ok(())
    }

    fn commit(&self, pending: &mut PendingActivation) -> Result<()> {
        let mut inner = self.lock();
        if inner.abort_requested {
            return Err(ForkError::Aborted);
        }
        inner.transition(ForkState::Active)?;

        for leg in pending.legs.drain(..) {
            match leg.kind() {
                LegKind::Read => inner.read_leg = Some(leg),
                LegKind::Write => inner.write_leg = Some(leg),
            }
        }
        inner.recorder = pending.recorder.take();
        Ok(())
    }

    fn mark_failed(&self, error: &ForkError) {
        let mut inner = self.lock();
        inner.hangup_cause = Some(match error {
            ForkError::Signaling(cause) => *cause,
            _ => HangupCause::OriginatorCancel,
        });
        if let Err(e) = inner.transition(ForkState::Failed) {
            warn!("Fork {}: {}", self.id, e);
        }
        drop(inner);

        match error {
            ForkError::Aborted => info!("Fork {} aborted during activation", self.id),
            _ => error!(
                "Fork {} for call {} failed: {}",
                self.id, self.call.handle, error
            ),
        }
        metrics::record_fork_failed(error.kind());
    }

    /// Forward one frame of linear samples on a leg
    ///
    /// Frames are only sent while active; otherwise, or when the leg does not
    /// exist, they are dropped. Returns the bytes written.
    pub fn forward_frame(&self, kind: LegKind, samples: &[i16]) -> usize {
        let mut inner = self.lock();
        if inner.state != ForkState::Active {
            return 0;
        }

        let quiet = inner.hangup_cause.is_some();
        match inner.leg_mut(kind) {
            Some(leg) => leg.forward(samples, quiet),
            None => 0,
        }
    }

    /// Stop the fork
    ///
    /// Idle sessions close without events; an activation in flight is asked
    /// to abort; active sessions are torn down and report `fork-stop` with
    /// `cause`. Stopping a finished session does nothing.
    pub async fn stop(&self, cause: HangupCause) {
        let (legs, recorder) = {
            let mut inner = self.lock();
            match inner.state {
                ForkState::Idle => {
                    inner.hangup_cause = Some(cause);
                    if let Err(e) = inner.transition(ForkState::Closed) {
                        warn!("Fork {}: {}", self.id, e);
                    }
                    debug!("Fork {} closed before activation", self.id);
                    return;
                }
                ForkState::Allocating => {
                    if !inner.abort_requested {
                        inner.abort_requested = true;
                        info!("Fork {} stop requested during activation", self.id);
                    }
                    return;
                }
                ForkState::Active => {
                    inner.hangup_cause = Some(cause);
                    if let Err(e) = inner.transition(ForkState::Closing) {
                        warn!("Fork {}: {}", self.id, e);
                        return;
                    }
                    let legs = [inner.read_leg.take(), inner.write_leg.take()];
                    (legs, inner.recorder.take())
                }
                ForkState::Closing | ForkState::Closed | ForkState::Failed => return,
            }
        };

        let transports = self.resources.transports.as_ref();
        for mut leg in legs.into_iter().flatten() {
            debug!(
                "Fork {} {} leg closed after {} frames ({} failed writes)",
                self.id,
                leg.kind(),
                leg.frame_counter(),
                leg.write_failures()
            );
            leg.teardown(transports);
        }

        if let Some(mut recorder) = recorder {
            recorder.hangup(HangupCause::NormalClearing).await;
        }

        self.resources.events.publish(ForkEvent::Stopped(ForkStopped::new(
            self.call.handle,
            self.id,
            cause,
        )));

        if let Err(e) = self.lock().transition(ForkState::Closed) {
            warn!("Fork {}: {}", self.id, e);
        }
        metrics::record_fork_stopped();
        info!("Fork {} for call {} stopped ({})", self.id, self.call.handle, cause);
    }
}

impl std::fmt::Debug for ForkSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForkSession")
            .field("id", &self.id)
            .field("call", &self.call.handle)
            .field("direction", &self.direction)
            .field("destination", &self.destination)
            .field("state", &self.state())
            .finish()
    }
}
