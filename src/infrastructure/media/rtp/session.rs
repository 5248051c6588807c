//! RTP Session Management

use super::packet::RtpHeader;
use bytes::BufMut;
use rand::Rng;
use tracing::trace;

/// Outgoing RTP stream state
///
/// One session per recording leg. The sequence number and timestamp start at
/// random values; the timestamp advances by the number of samples carried in
/// each packet.
pub struct RtpSession {
    /// Synchronization source identifier (randomly generated)
    ssrc: u32,
    sequence: u16,
    timestamp: u32,
    payload_type: u8,
    clock_rate: u32,
    packets_sent: u64,
    bytes_sent: u64,
}

impl RtpSession {
    /// Create a new RTP session
    pub fn new(payload_type: u8, clock_rate: u32) -> Self {
        let mut rng = rand::thread_rng();
        Self::with_ssrc(rng.gen(), payload_type, clock_rate)
    }

    /// Create with specific SSRC
    pub fn with_ssrc(ssrc: u32, payload_type: u8, clock_rate: u32) -> Self {
        let mut rng = rand::thread_rng();

        Self {
            ssrc,
            sequence: rng.gen(),
            timestamp: rng.gen(),
            payload_type,
            clock_rate,
            packets_sent: 0,
            bytes_sent: 0,
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    /// Write header plus payload for the next packet into `buf`
    ///
    /// `samples` is the number of clock ticks the payload covers; for PCMU
    /// that equals the payload length.
    pub fn packetize<B: BufMut>(&mut self, payload: &[u8], samples: u32, buf: &mut B) {
        let header = RtpHeader {
            marker: self.packets_sent == 0,
            payload_type: self.payload_type,
            sequence: self.sequence,
            timestamp: self.timestamp,
            ssrc: self.ssrc,
        };

        header.write(buf);
        buf.put_slice(payload);

        trace!("Packetized {}", header);

        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(samples);
        self.packets_sent += 1;
        self.bytes_sent += payload.len() as u64;
    }

    /// Get packets sent count
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    /// Get payload bytes sent count
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_rtp_session_creation() {
        let session = RtpSession::new(0, 8000);
        assert_eq!(session.payload_type(), 0);
        assert_eq!(session.clock_rate(), 8000);
        assert_eq!(session.packets_sent(), 0);
    }

    #[test]
    fn test_sequence_and_timestamp_advance() {
        let mut session = RtpSession::with_ssrc(0x1234_5678, 0, 8000);
        let payload = [0xFFu8; 160];

        let mut first = BytesMut::new();
        session.packetize(&payload, 160, &mut first);
        let mut second = BytesMut::new();
        session.packetize(&payload, 160, &mut second);

        let (h1, p1) = RtpHeader::parse(&first).unwrap();
        let (h2, _) = RtpHeader::parse(&second).unwrap();

        assert_eq!(p1.len(), 160);
        assert_eq!(h1.ssrc, 0x1234_5678);
        assert!(h1.marker);
        assert!(!h2.marker);
        assert_eq!(h2.sequence, h1.sequence.wrapping_add(1));
        assert_eq!(h2.timestamp, h1.timestamp.wrapping_add(160));

        assert_eq!(session.packets_sent(), 2);
        assert_eq!(session.bytes_sent(), 320);
    }
}
