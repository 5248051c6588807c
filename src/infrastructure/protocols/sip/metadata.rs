//! Recording session metadata (`application/rs-metadata+xml`, RFC 7865)

use chrono::{DateTime, Local};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;

pub const RS_METADATA_CONTENT_TYPE: &str = "application/rs-metadata+xml";

const RECORDING_NAMESPACE: &str = "urn:ietf:params:xml:ns:recording:1";
const ID_LEN: usize = 24;

/// Random identifier for participants and streams
fn random_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Metadata document describing the recorded call and its streams
#[derive(Debug, Clone)]
pub struct RecordingMetadata {
    pub session_id: String,
    pub sip_call_id: String,
    pub from_uri: String,
    pub to_uri: String,
    /// Stream labels in offer order ("inbound", "outbound")
    pub labels: Vec<String>,
    pub associate_time: DateTime<Local>,
}

impl RecordingMetadata {
    pub fn new(
        session_id: impl Into<String>,
        sip_call_id: impl Into<String>,
        from_uri: impl Into<String>,
        to_uri: impl Into<String>,
        labels: Vec<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            sip_call_id: sip_call_id.into(),
            from_uri: from_uri.into(),
            to_uri: to_uri.into(),
            labels,
            associate_time: Local::now(),
        }
    }
}

/// Renders the XML document
impl fmt::Display for RecordingMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session_id = escape(&self.session_id);

        write!(f, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\r\n")?;
        write!(f, "<recording xmlns=\"{}\">\r\n", RECORDING_NAMESPACE)?;
        write!(f, "<session session_id=\"{}\">\r\n", session_id)?;
        write!(
            f,
            "<sipSessionID>{}</sipSessionID>\r\n",
            escape(&self.sip_call_id)
        )?;
        write!(f, "</session>\r\n")?;

        for aor in [&self.from_uri, &self.to_uri] {
            write!(f, "<participant participant_id=\"{}\">\r\n", random_id())?;
            write!(f, "<nameID aor=\"{}\"/>\r\n", escape(aor))?;
            write!(f, "</participant>\r\n")?;
        }

        for label in &self.labels {
            write!(
                f,
                "<stream stream_id=\"{}\" session_id=\"{}\">\r\n",
                random_id(),
                session_id
            )?;
            write!(f, "<label>{}</label>\r\n", escape(label))?;
            write!(f, "</stream>\r\n")?;
        }

        write!(f, "<sessionrecordingassoc session_id=\"{}\">\r\n", session_id)?;
        write!(
            f,
            "<associate-time>{}</associate-time>\r\n",
            self.associate_time.format("%Y-%m-%dT%H:%M:%S%z")
        )?;
        write!(f, "</sessionrecordingassoc>\r\n")?;
        write!(f, "</recording>\r\n")
    }
}
