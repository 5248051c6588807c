//! Fork bounded context
//!
//! A fork copies the audio of one call to a SIPREC recording server: one
//! outbound RTP leg per recorded direction plus a recording call carrying
//! the SDP offer and the recording metadata.

pub mod aggregate;
pub mod entity;
pub mod event;
pub mod leg;
pub mod tap;
pub mod value_object;

pub use aggregate::{ForkResources, ForkSession};
pub use entity::{CallContext, SIP_HEADER_VARIABLE_PREFIX};
pub use event::{EventPublisher, ForkEvent, ForkEventBase, ForkStarted, ForkStopped};
pub use leg::TransportLeg;
pub use tap::{MediaTap, PipelineEvent, RawFrameReader, MAX_RAW_FRAME_SAMPLES, TAP_NAME};
pub use value_object::{
    ForkDirection, ForkParams, ForkState, LegKind, MediaParams, RecorderDestination,
};
