//! Fork metrics
//!
//! Recorded through the `metrics` facade; installing an exporter is left to
//! the embedding application.

use crate::domain::fork::LegKind;
use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Describe all fork metrics
pub fn describe_metrics() {
    describe_counter!("siprec_forks_started_total", "Forks that reached the active state");
    describe_counter!(
        "siprec_forks_failed_total",
        "Forks that failed during activation"
    );
    describe_counter!("siprec_forks_stopped_total", "Active forks that were stopped");
    describe_gauge!("siprec_active_forks", "Number of currently active forks");
    describe_counter!(
        "siprec_frames_forwarded_total",
        "Frames written to the recording server"
    );
    describe_counter!(
        "siprec_frame_write_failures_total",
        "Frames that could not be written to the recording server"
    );
}

pub fn record_fork_started() {
    counter!("siprec_forks_started_total").increment(1);
    gauge!("siprec_active_forks").increment(1.0);
}

pub fn record_fork_failed(reason: &'static str) {
    counter!("siprec_forks_failed_total", "reason" => reason).increment(1);
}

pub fn record_fork_stopped() {
    counter!("siprec_forks_stopped_total").increment(1);
    gauge!("siprec_active_forks").decrement(1.0);
}

pub fn record_frame_forwarded(leg: LegKind) {
    counter!("siprec_frames_forwarded_total", "leg" => leg.as_str()).increment(1);
}

pub fn record_frame_failed(leg: LegKind) {
    counter!("siprec_frame_write_failures_total", "leg" => leg.as_str()).increment(1);
}
