//! SIP signaling toward the recording server
//!
//! ```text
//! ┌─────────────────────────┐
//! │    Signaling Bridge     │  offer + metadata, answer mapping
//! └───────────┬─────────────┘
//!             │ Originator
//! ┌───────────▼─────────────┐
//! │     SIP Originator      │  INVITE / ACK / CANCEL / BYE
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │          UDP            │
//! └─────────────────────────┘
//! ```

pub mod bridge;
pub mod message;
pub mod metadata;
pub mod originator;
pub mod sdp;

#[cfg(test)]
pub use bridge::MockOriginator;
pub use bridge::{
    OriginateRequest, Originator, OutboundSession, RecorderEndpoint, SignalingBridge,
    RECORDING_PTIME_MS,
};
pub use message::{is_valid_extension_header, MimePart, MultipartBody, SipError, SipResponse};
pub use metadata::RecordingMetadata;
pub use originator::{SipOriginator, SipTimers};
pub use sdp::{SdpDirection, SdpSession};
