//! Fork application service

use crate::config::Config;
use crate::domain::fork::{
    CallContext, EventPublisher, ForkParams, ForkResources, ForkSession, MediaTap,
};
use crate::domain::shared::{CallHandle, ForkError, HangupCause, Result};
use crate::infrastructure::media::TransportManager;
use crate::infrastructure::protocols::sip::{Originator, SignalingBridge};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// The media host running the original calls
///
/// After a tap is attached the host delivers pipeline events to it and,
/// once the tap is detached or the call ends, a final `Close`.
#[async_trait]
pub trait MediaHost: Send + Sync {
    async fn attach_tap(&self, call: &CallContext, tap: Arc<MediaTap>) -> Result<()>;

    async fn detach_tap(&self, call: CallHandle);
}

/// Starts and stops recording forks for calls
///
/// At most one fork is attached to a call at a time. Hosts should call
/// [`ForkService::stop_fork`] when a recorded call goes away.
pub struct ForkService {
    config: Arc<Config>,
    resources: ForkResources,
    host: Arc<dyn MediaHost>,
    taps: Arc<RwLock<HashMap<CallHandle, Arc<MediaTap>>>>,
}

impl ForkService {
    pub fn new(
        config: Arc<Config>,
        transports: Arc<dyn TransportManager>,
        originator: Arc<dyn Originator>,
        events: Arc<dyn EventPublisher>,
        host: Arc<dyn MediaHost>,
    ) -> Self {
        let bridge = Arc::new(SignalingBridge::new(
            originator,
            config.sip.clone(),
            config.fork.originate_timeout(),
        ));
        let resources = ForkResources {
            transports,
            bridge,
            events,
            local_ip: config.fork.local_media_ip,
            resample_quality: config.fork.resample_quality,
        };

        Self {
            config,
            resources,
            host,
            taps: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Attach a recording fork to `call`
    ///
    /// The fork activates once the host delivers `Init`; setup failures
    /// after that point never affect the call.
    pub async fn start_fork(
        &self,
        call: Arc<CallContext>,
        params: ForkParams,
    ) -> Result<Arc<MediaTap>> {
        let destination = params.destination(&self.config.fork.destination());

        let tap = {
            let mut taps = self.taps.write().await;
            if taps.contains_key(&call.handle) {
                warn!("Fork already attached to call {}", call.handle);
                return Err(ForkError::AlreadyAttached(call.handle.to_string()));
            }

            let session = Arc::new(ForkSession::new(
                call.clone(),
                params.direction,
                destination,
                self.resources.clone(),
            ));
            let tap = Arc::new(MediaTap::new(session));
            taps.insert(call.handle, tap.clone());
            tap
        };

        if let Err(e) = self.host.attach_tap(&call, tap.clone()).await {
            warn!("Failed to attach fork to call {}: {}", call.handle, e);
            self.taps.write().await.remove(&call.handle);
            return Err(e);
        }

        info!(
            "Fork {} attached to call {} as {} ({}, recorder {})",
            tap.session().id(),
            call.handle,
            tap.name(),
            params.direction,
            tap.session().destination()
        );
        Ok(tap)
    }

    /// Attach a fork using JSON start arguments
    pub async fn start_fork_with_args(
        &self,
        call: Arc<CallContext>,
        args: &str,
    ) -> Result<Arc<MediaTap>> {
        self.start_fork(call, ForkParams::from_json(args)).await
    }

    /// Detach and tear down the fork of `call`; returns false if there was none
    pub async fn stop_fork(&self, call: CallHandle) -> bool {
        let tap = match self.taps.write().await.remove(&call) {
            Some(tap) => tap,
            None => {
                debug!("No fork attached to call {}", call);
                return false;
            }
        };

        self.host.detach_tap(call).await;
        tap.session().stop(HangupCause::NormalClearing).await;
        info!("Fork {} detached from call {}", tap.session().id(), call);
        true
    }

    /// Tap attached to `call`, if any
    pub async fn tap(&self, call: CallHandle) -> Option<Arc<MediaTap>> {
        self.taps.read().await.get(&call).cloned()
    }

    pub async fn attached_count(&self) -> usize {
        self.taps.read().await.len()
    }
}
