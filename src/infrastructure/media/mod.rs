//! Media implementations

pub mod codec;
pub mod port_pool;
pub mod rtp;
pub mod transport;

pub use codec::{PcmuCodec, SampleConverter, G711_CLOCK_RATE, PCMU_PAYLOAD_TYPE};
pub use port_pool::{PortLease, PortPool};
pub use rtp::{RtpError, RtpHeader, RtpSession};
pub use transport::{CodecParams, MediaTransport, RtpTransport, RtpTransportManager, TransportManager};
