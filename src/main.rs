use siprec_fork::application::{ForkService, MediaHost};
use siprec_fork::config::Config;
use siprec_fork::ForkError;
use siprec_fork::domain::fork::{CallContext, ForkEvent, MediaParams, MediaTap, PipelineEvent};
use siprec_fork::domain::shared::{CallHandle, HangupCause};
use siprec_fork::infrastructure::media::{PortPool, RtpTransportManager};
use siprec_fork::infrastructure::messaging::BroadcastEventPublisher;
use siprec_fork::infrastructure::metrics::describe_metrics;
use siprec_fork::infrastructure::protocols::sip::SipOriginator;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const DEFAULT_RUN_SECS: u64 = 10;
const DEMO_SAMPLE_RATE: u32 = 16000;
const DEMO_TONE_HZ: f64 = 440.0;
const FRAME_MS: u64 = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let run_secs = match args.next() {
        Some(secs) => secs.parse()?,
        None => DEFAULT_RUN_SECS,
    };

    let config = Arc::new(Config::load(&config_path)?);

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting siprec-fork with {}", config_path);
    describe_metrics();

    let pool = PortPool::new(config.fork.rtp_port_start, config.fork.rtp_port_end);
    let transports = Arc::new(RtpTransportManager::new(pool));
    let originator = Arc::new(SipOriginator::new(
        config.fork.local_media_ip,
        config.sip.user_agent.clone(),
    ));
    let events = Arc::new(BroadcastEventPublisher::default());
    let host = Arc::new(LoopbackHost::new(DEMO_SAMPLE_RATE));

    let mut subscriber = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = subscriber.recv().await {
            log_event(&event);
        }
    });

    let service = ForkService::new(config.clone(), transports, originator, events, host);

    let call = Arc::new(
        CallContext::new(
            format!("{}@{}", uuid::Uuid::new_v4(), config.fork.local_media_ip),
            format!("sip:1000@{}", config.fork.local_media_ip),
            format!("sip:2000@{}", config.fork.local_media_ip),
            "1000",
        )
        .with_variable("siprec_sip_h_X-Siprec-Demo", "true"),
    );
    service.start_fork_with_args(call.clone(), "{}").await?;
    info!(
        "Recording synthetic call {} to {}:{} for {}s",
        call.handle, config.fork.srs_host, config.fork.srs_port, run_secs
    );

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(run_secs)) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    service.stop_fork(call.handle).await;
    // Let the pipeline deliver its close
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!("siprec-fork finished");
    Ok(())
}

fn log_event(event: &ForkEvent) {
    let headers: Vec<String> = event
        .headers()
        .into_iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect();
    info!(
        "Event {} for call {}: {}",
        event.event_type(),
        event.call(),
        headers.join(" ")
    );
}

/// In-process host feeding a sine tone to attached taps
struct LoopbackHost {
    sample_rate: u32,
    pipelines: Mutex<HashMap<CallHandle, watch::Sender<bool>>>,
}

impl LoopbackHost {
    fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            pipelines: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl MediaHost for LoopbackHost {
    async fn attach_tap(
        &self,
        call: &CallContext,
        tap: Arc<MediaTap>,
    ) -> siprec_fork::Result<()> {
        let mut pipelines = self.pipelines.lock().unwrap_or_else(PoisonError::into_inner);
        if pipelines.contains_key(&call.handle) {
            return Err(ForkError::Host(format!(
                "{} already attached to call {}",
                tap.name(),
                call.handle
            )));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        pipelines.insert(call.handle, stop_tx);
        tokio::spawn(run_pipeline(tap, self.sample_rate, stop_rx));
        Ok(())
    }

    async fn detach_tap(&self, call: CallHandle) {
        let stop = self
            .pipelines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&call);
        match stop {
            Some(stop) => {
                if stop.send(true).is_err() {
                    warn!("Pipeline of call {} already gone", call);
                }
            }
            None => warn!("No pipeline for call {}", call),
        }
    }
}

async fn run_pipeline(tap: Arc<MediaTap>, sample_rate: u32, mut stop: watch::Receiver<bool>) {
    tap.handle(PipelineEvent::Init(MediaParams::new(sample_rate, sample_rate)))
        .await;

    let samples_per_frame = (sample_rate as u64 * FRAME_MS / 1000) as usize;
    let step = 2.0 * PI * DEMO_TONE_HZ / sample_rate as f64;
    let mut phase = 0.0f64;
    let mut frame = vec![0i16; samples_per_frame];
    let mut ticker = tokio::time::interval(Duration::from_millis(FRAME_MS));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for sample in frame.iter_mut() {
                    *sample = (phase.sin() * 8000.0) as i16;
                    phase = (phase + step) % (2.0 * PI);
                }
                tap.handle(PipelineEvent::ReadFrame(&frame)).await;
                tap.handle(PipelineEvent::WriteFrame(&frame)).await;
            }
            _ = stop.changed() => break,
        }
    }

    tap.handle(PipelineEvent::Close(Some(HangupCause::NormalClearing)))
        .await;
}
