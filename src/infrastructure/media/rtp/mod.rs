//! RTP (Real-time Transport Protocol) Implementation
//!
//! Send side of RFC 3550 as used by the recording legs.

pub mod packet;
pub mod session;

pub use packet::{RtpError, RtpHeader};
pub use session::RtpSession;
