//! SIP originator against a scripted recording server on loopback UDP

use siprec_fork::domain::shared::HangupCause;
use siprec_fork::infrastructure::protocols::sip::{
    MimePart, OriginateRequest, Originator, OutboundSession, SipOriginator, SipTimers,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const OFFER: &str = "v=0\r\no=siprec-src 1 1 IN IP4 127.0.0.1\r\ns=-\r\nc=IN IP4 127.0.0.1\r\nt=0 0\r\n\
m=audio 16384 RTP/AVP 0\r\na=sendonly\r\na=label:inbound\r\n";

const ANSWER: &str = "v=0\r\no=srs 1 1 IN IP4 127.0.0.1\r\ns=-\r\nc=IN IP4 127.0.0.1\r\nt=0 0\r\n\
m=audio 40000 RTP/AVP 0\r\na=recvonly\r\n";

fn originator() -> SipOriginator {
    SipOriginator::new("127.0.0.1".parse().unwrap(), "siprec-test").with_timers(SipTimers {
        t1: Duration::from_millis(50),
        t2: Duration::from_millis(200),
    })
}

fn request(srs: SocketAddr, timeout: Duration) -> OriginateRequest {
    OriginateRequest {
        user: "1000".to_string(),
        host: srs.ip().to_string(),
        port: srs.port(),
        caller_id_number: "1000".to_string(),
        headers: vec![("X-Tenant".to_string(), "acme".to_string())],
        parts: vec![
            MimePart::new("application/sdp", OFFER),
            MimePart::new("application/rs-metadata+xml", "<recording/>")
                .with_disposition("recording-session"),
        ],
        timeout,
    }
}

/// Scripted recording server
struct Srs {
    socket: UdpSocket,
}

impl Srs {
    async fn bind() -> Self {
        Self {
            socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
        }
    }

    fn addr(&self) -> SocketAddr {
        self.socket.local_addr().unwrap()
    }

    async fn recv(&self) -> (String, SocketAddr) {
        let mut buf = vec![0u8; 65535];
        let (len, from) = timeout(Duration::from_secs(3), self.socket.recv_from(&mut buf))
            .await
            .expect("nothing received")
            .unwrap();
        (String::from_utf8_lossy(&buf[..len]).into_owned(), from)
    }

    async fn respond(&self, request: &str, to: SocketAddr, status: &str, to_tag: bool, sdp: Option<&str>) {
        let mut msg = format!("SIP/2.0 {}\r\n", status);
        for name in ["Via", "From", "Call-ID", "CSeq"] {
            msg.push_str(header_line(request, name));
            msg.push_str("\r\n");
        }
        msg.push_str(header_line(request, "To"));
        if to_tag {
            msg.push_str(";tag=srs1");
        }
        msg.push_str("\r\n");
        msg.push_str(&format!("Contact: <sip:srs@{}>\r\n", self.addr()));
        match sdp {
            Some(sdp) => msg.push_str(&format!(
                "Content-Type: application/sdp\r\nContent-Length: {}\r\n\r\n{}",
                sdp.len(),
                sdp
            )),
            None => msg.push_str("Content-Length: 0\r\n\r\n"),
        }
        self.socket.send_to(msg.as_bytes(), to).await.unwrap();
    }

    /// Receive until a request with `method` arrives, skipping retransmissions
    async fn expect(&self, method: &str) -> (String, SocketAddr) {
        loop {
            let (msg, from) = self.recv().await;
            if msg.starts_with(&format!("{} ", method)) {
                return (msg, from);
            }
        }
    }
}

fn header_line<'a>(msg: &'a str, name: &str) -> &'a str {
    msg.lines()
        .find(|line| {
            line.split_once(':')
                .map(|(n, _)| n.trim().eq_ignore_ascii_case(name))
                .unwrap_or(false)
        })
        .unwrap_or_else(|| panic!("missing {} header in:\n{}", name, msg))
}

#[tokio::test]
async fn test_answered_call_then_bye() {
    let srs = Srs::bind().await;
    let target = srs.addr();

    let server: JoinHandle<Srs> = tokio::spawn(async move {
        let (invite, from) = srs.expect("INVITE").await;
        assert!(invite.starts_with(&format!("INVITE sip:1000@{} SIP/2.0", target)));
        assert!(invite.contains("Require: siprec\r\n"));
        assert!(invite.contains("X-Tenant: acme\r\n"));
        assert!(invite.contains(";+sip.src"));
        assert!(header_line(&invite, "Content-Type").contains("multipart/mixed;boundary="));
        assert!(invite.contains("Content-Disposition: recording-session"));
        assert!(invite.contains("a=label:inbound"));

        srs.respond(&invite, from, "100 Trying", false, None).await;
        srs.respond(&invite, from, "200 OK", true, Some(ANSWER)).await;

        let (ack, _) = srs.expect("ACK").await;
        assert!(ack.starts_with(&format!("ACK sip:srs@{} SIP/2.0", target)));
        assert!(header_line(&ack, "CSeq").contains("1 ACK"));
        assert!(header_line(&ack, "To").contains("tag=srs1"));
        srs
    });

    let mut session = originator()
        .originate(request(target, Duration::from_secs(2)))
        .await
        .unwrap_or_else(|cause| panic!("call failed: {}", cause));
    assert_eq!(session.remote_sdp(), ANSWER);

    let srs = server.await.unwrap();
    session.hangup(HangupCause::NormalClearing).await;
    session.hangup(HangupCause::NormalClearing).await;

    let (bye, _) = srs.expect("BYE").await;
    assert!(header_line(&bye, "CSeq").contains("2 BYE"));
    assert!(bye.contains("Reason: Q.850;cause=16;text=\"NORMAL_CLEARING\""));
}

#[tokio::test]
async fn test_busy_recorder_maps_cause() {
    let srs = Srs::bind().await;
    let target = srs.addr();

    let server = tokio::spawn(async move {
        let (invite, from) = srs.expect("INVITE").await;
        srs.respond(&invite, from, "486 Busy Here", true, None).await;

        let (ack, _) = srs.expect("ACK").await;
        assert!(ack.starts_with(&format!("ACK sip:1000@{} SIP/2.0", target)));
        // Non-2xx ACK stays in the INVITE transaction
        assert_eq!(header_line(&ack, "Via"), header_line(&invite, "Via"));
    });

    let result = originator()
        .originate(request(target, Duration::from_secs(2)))
        .await;

    assert!(matches!(result, Err(HangupCause::UserBusy)));
    server.await.unwrap();
}

#[tokio::test]
async fn test_ringing_without_answer_is_cancelled() {
    let srs = Srs::bind().await;
    let target = srs.addr();

    let server = tokio::spawn(async move {
        let (invite, from) = srs.expect("INVITE").await;
        srs.respond(&invite, from, "180 Ringing", true, None).await;

        let (cancel, _) = srs.expect("CANCEL").await;
        assert!(header_line(&cancel, "CSeq").contains("1 CANCEL"));
        assert_eq!(header_line(&cancel, "Call-ID"), header_line(&invite, "Call-ID"));
    });

    let result = originator()
        .originate(request(target, Duration::from_millis(400)))
        .await;

    assert!(matches!(result, Err(HangupCause::NoAnswer)));
    server.await.unwrap();
}

#[tokio::test]
async fn test_silent_recorder_gets_retransmissions() {
    let srs = Srs::bind().await;
    let target = srs.addr();

    let server = tokio::spawn(async move {
        let (first, _) = srs.expect("INVITE").await;
        let (second, _) = srs.expect("INVITE").await;
        assert_eq!(first, second);
    });

    let result = originator()
        .originate(request(target, Duration::from_millis(400)))
        .await;

    assert!(matches!(result, Err(HangupCause::RecoveryOnTimerExpire)));
    server.await.unwrap();
}

#[tokio::test]
async fn test_multiline_header_is_not_sent() {
    let srs = Srs::bind().await;
    let target = srs.addr();

    let server = tokio::spawn(async move {
        let (invite, from) = srs.expect("INVITE").await;
        assert!(!invite.contains("X-Injected"));
        assert!(!invite.contains("X-Tenant"));
        assert!(invite.contains("X-Site: berlin\r\n"));
        srs.respond(&invite, from, "486 Busy Here", true, None).await;
        srs.expect("ACK").await;
    });

    let mut request = request(target, Duration::from_secs(2));
    request.headers = vec![
        ("X-Tenant".to_string(), "acme\r\nX-Injected: yes".to_string()),
        ("X-Site".to_string(), "berlin".to_string()),
    ];
    let result = originator().originate(request).await;

    assert!(matches!(result, Err(HangupCause::UserBusy)));
    server.await.unwrap();
}
