//! SDP (Session Description Protocol) for recording offers and answers

use std::fmt;
use std::net::IpAddr;

/// SDP session
#[derive(Debug, Clone)]
pub struct SdpSession {
    pub version: u32,
    pub origin: SdpOrigin,
    pub session_name: String,
    pub connection: Option<SdpConnection>,
    pub media: Vec<SdpMedia>,
}

#[derive(Debug, Clone)]
pub struct SdpOrigin {
    pub username: String,
    pub session_id: String,
    pub session_version: String,
    pub network_type: String,
    pub address_type: String,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct SdpConnection {
    pub network_type: String,
    pub address_type: String,
    pub address: String,
}

impl SdpConnection {
    fn for_ip(ip: IpAddr) -> Self {
        Self {
            network_type: "IN".to_string(),
            address_type: address_type(ip).to_string(),
            address: ip.to_string(),
        }
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.address.parse().ok()
    }
}

/// Media stream direction attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpDirection {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl SdpDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpDirection::SendRecv => "sendrecv",
            SdpDirection::SendOnly => "sendonly",
            SdpDirection::RecvOnly => "recvonly",
            SdpDirection::Inactive => "inactive",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "sendrecv" => Some(SdpDirection::SendRecv),
            "sendonly" => Some(SdpDirection::SendOnly),
            "recvonly" => Some(SdpDirection::RecvOnly),
            "inactive" => Some(SdpDirection::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SdpMedia {
    pub media_type: String,  // "audio", "video"
    pub port: u16,
    pub protocol: String,
    pub formats: Vec<String>, // Codec payload types
    pub rtpmap: Vec<(String, String)>, // (payload_type, encoding)
    pub connection: Option<SdpConnection>,
    pub ptime: Option<u32>,
    pub maxptime: Option<u32>,
    pub direction: Option<SdpDirection>,
    pub label: Option<String>,
}

impl SdpMedia {
    /// One send-only PCMU stream of a recording session
    pub fn recording_stream(port: u16, ptime_ms: u32, label: &str) -> Self {
        Self {
            media_type: "audio".to_string(),
            port,
            protocol: "RTP/AVP".to_string(),
            formats: vec!["0".to_string()],
            rtpmap: vec![("0".to_string(), "PCMU/8000".to_string())],
            connection: None,
            ptime: Some(ptime_ms),
            maxptime: Some(ptime_ms),
            direction: Some(SdpDirection::SendOnly),
            label: Some(label.to_string()),
        }
    }

    fn from_m_line(value: &str) -> Option<Self> {
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() < 3 {
            return None;
        }

        Some(Self {
            media_type: parts[0].to_string(),
            // "port/count" form; a bad port reads as 0 (rejected stream)
            port: parts[1]
                .split('/')
                .next()
                .and_then(|p| p.parse().ok())
                .unwrap_or(0),
            protocol: parts[2].to_string(),
            formats: parts[3..].iter().map(|s| s.to_string()).collect(),
            rtpmap: Vec::new(),
            connection: None,
            ptime: None,
            maxptime: None,
            direction: None,
            label: None,
        })
    }

    fn parse_attribute(&mut self, value: &str) {
        let (name, arg) = match value.split_once(':') {
            Some((name, arg)) => (name, Some(arg.trim())),
            None => (value, None),
        };

        match (name, arg) {
            ("rtpmap", Some(arg)) => {
                if let Some((pt, encoding)) = arg.split_once(' ') {
                    self.rtpmap.push((pt.to_string(), encoding.trim().to_string()));
                }
            }
            ("ptime", Some(arg)) => self.ptime = arg.parse().ok(),
            ("maxptime", Some(arg)) => self.maxptime = arg.parse().ok(),
            ("label", Some(arg)) => self.label = Some(arg.to_string()),
            (name, None) => {
                if let Some(direction) = SdpDirection::parse(name) {
                    self.direction = Some(direction);
                }
            }
            _ => {}
        }
    }
}

fn address_type(ip: IpAddr) -> &'static str {
    if ip.is_ipv4() {
        "IP4"
    } else {
        "IP6"
    }
}

impl SdpSession {
    /// Build the offer for a recording session, one stream per leg
    ///
    /// `streams` holds `(local port, label)` pairs in offer order.
    pub fn recording_offer(
        origin_user: &str,
        session_name: &str,
        local_ip: IpAddr,
        ptime_ms: u32,
        streams: &[(u16, &str)],
    ) -> Self {
        let now = chrono::Utc::now().timestamp().to_string();

        Self {
            version: 0,
            origin: SdpOrigin {
                username: origin_user.to_string(),
                session_id: now.clone(),
                session_version: now,
                network_type: "IN".to_string(),
                address_type: address_type(local_ip).to_string(),
                address: local_ip.to_string(),
            },
            session_name: session_name.to_string(),
            connection: Some(SdpConnection::for_ip(local_ip)),
            media: streams
                .iter()
                .map(|(port, label)| SdpMedia::recording_stream(*port, ptime_ms, label))
                .collect(),
        }
    }

    /// Parse SDP from string
    pub fn parse(sdp_body: &str) -> Option<Self> {
        let mut version = 0;
        let mut origin: Option<SdpOrigin> = None;
        let mut session_name = String::new();
        let mut connection: Option<SdpConnection> = None;
        let mut media: Vec<SdpMedia> = Vec::new();

        for line in sdp_body.lines() {
            let line = line.trim();
            if line.len() < 2 || line.as_bytes()[1] != b'=' {
                continue;
            }

            let (field_type, value) = line.split_at(2);
            let value = value.trim();

            match field_type {
                "v=" => {
                    version = value.parse().unwrap_or(0);
                }
                "o=" => {
                    let parts: Vec<&str> = value.split_whitespace().collect();
                    if parts.len() >= 6 {
                        origin = Some(SdpOrigin {
                            username: parts[0].to_string(),
                            session_id: parts[1].to_string(),
                            session_version: parts[2].to_string(),
                            network_type: parts[3].to_string(),
                            address_type: parts[4].to_string(),
                            address: parts[5].to_string(),
                        });
                    }
                }
                "s=" => {
                    session_name = value.to_string();
                }
                "c=" => {
                    let parts: Vec<&str> = value.split_whitespace().collect();
                    if parts.len() >= 3 {
                        let conn = SdpConnection {
                            network_type: parts[0].to_string(),
                            address_type: parts[1].to_string(),
                            // Strip a multicast TTL suffix
                            address: parts[2].split('/').next().unwrap_or(parts[2]).to_string(),
                        };

                        match media.last_mut() {
                            Some(current) => current.connection = Some(conn),
                            None => connection = Some(conn),
                        }
                    }
                }
                "m=" => {
                    if let Some(m) = SdpMedia::from_m_line(value) {
                        media.push(m);
                    }
                }
                "a=" => {
                    if let Some(current) = media.last_mut() {
                        current.parse_attribute(value);
                    }
                }
                _ => {
                    // Ignore other fields
                }
            }
        }

        Some(Self {
            version,
            origin: origin?,
            session_name,
            connection,
            media,
        })
    }

    /// Audio media descriptions in the order they appear
    pub fn audio_media(&self) -> impl Iterator<Item = &SdpMedia> {
        self.media.iter().filter(|m| m.media_type == "audio")
    }

    /// Ports of the audio streams in order; 0 marks a rejected stream
    pub fn audio_ports(&self) -> Vec<u16> {
        self.audio_media().map(|m| m.port).collect()
    }

    /// Address of one stream: its own `c=` line, else the session-level one
    pub fn stream_ip(&self, media: &SdpMedia) -> Option<IpAddr> {
        media
            .connection
            .as_ref()
            .or(self.connection.as_ref())
            .and_then(SdpConnection::ip)
    }

    /// Port and address of every audio stream, in order
    pub fn audio_streams(&self) -> Vec<(u16, Option<IpAddr>)> {
        self.audio_media()
            .map(|m| (m.port, self.stream_ip(m)))
            .collect()
    }
}

impl fmt::Display for SdpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v={}\r\n", self.version)?;
        write!(
            f,
            "o={} {} {} {} {} {}\r\n",
            self.origin.username,
            self.origin.session_id,
            self.origin.session_version,
            self.origin.network_type,
            self.origin.address_type,
            self.origin.address
        )?;
        write!(f, "s={}\r\n", self.session_name)?;
        if let Some(conn) = &self.connection {
            write!(f, "c={} {} {}\r\n", conn.network_type, conn.address_type, conn.address)?;
        }
        write!(f, "t=0 0\r\n")?;

        for media in &self.media {
            write!(
                f,
                "m={} {} {} {}\r\n",
                media.media_type,
                media.port,
                media.protocol,
                media.formats.join(" ")
            )?;
            if let Some(conn) = &media.connection {
                write!(f, "c={} {} {}\r\n", conn.network_type, conn.address_type, conn.address)?;
            }
            for (pt, encoding) in &media.rtpmap {
                write!(f, "a=rtpmap:{} {}\r\n", pt, encoding)?;
            }
            if let Some(ptime) = media.ptime {
                write!(f, "a=ptime:{}\r\n", ptime)?;
            }
            if let Some(maxptime) = media.maxptime {
                write!(f, "a=maxptime:{}\r\n", maxptime)?;
            }
            if let Some(direction) = media.direction {
                write!(f, "a={}\r\n", direction.as_str())?;
            }
            if let Some(label) = &media.label {
                write!(f, "a=label:{}\r\n", label)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_offer() {
        let local_ip: IpAddr = "10.0.0.5".parse().unwrap();
        let sdp = SdpSession::recording_offer(
            "siprec-src",
            "SIPREC Media Gateway",
            local_ip,
            20,
            &[(16384, "inbound"), (16386, "outbound")],
        );

        let text = sdp.to_string();
        assert!(text.starts_with("v=0\r\no=siprec-src "));
        assert!(text.contains(" IN IP4 10.0.0.5\r\n"));
        assert!(text.contains("s=SIPREC Media Gateway\r\n"));
        assert!(text.contains("c=IN IP4 10.0.0.5\r\nt=0 0\r\n"));
        assert!(text.contains(
            "m=audio 16384 RTP/AVP 0\r\na=rtpmap:0 PCMU/8000\r\na=ptime:20\r\na=maxptime:20\r\na=sendonly\r\na=label:inbound\r\n"
        ));
        assert!(text.contains("m=audio 16386 RTP/AVP 0\r\n"));
        assert!(text.ends_with("a=label:outbound\r\n"));
    }

    #[test]
    fn test_parse_answer() {
        let sdp_str = "v=0\r\n\
o=srs 123456 7890 IN IP4 192.168.1.100\r\n\
s=Recorder\r\n\
c=IN IP4 192.168.1.100\r\n\
t=0 0\r\n\
m=audio 40000 RTP/AVP 0\r\n\
a=rtpmap:0 PCMU/8000\r\n\
a=recvonly\r\n\
a=label:inbound\r\n\
m=audio 40002 RTP/AVP 0\r\n\
c=IN IP4 192.168.1.101\r\n\
a=recvonly\r\n";

        let sdp = SdpSession::parse(sdp_str).unwrap();
        assert_eq!(sdp.session_name, "Recorder");
        assert_eq!(sdp.audio_ports(), vec![40000, 40002]);
        assert_eq!(sdp.media[0].direction, Some(SdpDirection::RecvOnly));
        assert_eq!(sdp.media[0].label.as_deref(), Some("inbound"));
        assert_eq!(sdp.media[1].connection.as_ref().unwrap().address, "192.168.1.101");

        // The first stream inherits the session address, the second has its own
        assert_eq!(
            sdp.audio_streams(),
            vec![
                (40000, Some("192.168.1.100".parse().unwrap())),
                (40002, Some("192.168.1.101".parse().unwrap())),
            ]
        );
    }

    #[test]
    fn test_stream_without_any_connection_has_no_address() {
        let sdp = SdpSession::parse(
            "v=0\no=- 1 1 IN IP4 10.1.1.1\ns=-\nt=0 0\nm=audio 5000 RTP/AVP 0\nm=audio 5002 RTP/AVP 0\nc=IN IP4 10.1.1.3\n",
        )
        .unwrap();
        assert_eq!(
            sdp.audio_streams(),
            vec![(5000, None), (5002, Some("10.1.1.3".parse().unwrap()))]
        );
    }

    #[test]
    fn test_rejected_stream_has_zero_port() {
        let sdp = SdpSession::parse(
            "v=0\no=- 1 1 IN IP4 10.1.1.1\ns=-\nc=IN IP4 10.1.1.1\nt=0 0\nm=audio 0 RTP/AVP 0\nm=audio 6000 RTP/AVP 0\n",
        )
        .unwrap();
        assert_eq!(sdp.audio_ports(), vec![0, 6000]);
    }

    #[test]
    fn test_parse_requires_origin() {
        assert!(SdpSession::parse("v=0\ns=-\nm=audio 5000 RTP/AVP 0\n").is_none());
    }
}
