//! SIP message types and parsing

use rsip::headers::UntypedHeader;
use rsip::{Header, Headers, Response};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SipError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Transport error: {0}")]
    TransportError(#[from] std::io::Error),
}

impl From<rsip::Error> for SipError {
    fn from(err: rsip::Error) -> Self {
        SipError::ParseError(err.to_string())
    }
}

/// SIP Response wrapper
#[derive(Debug, Clone)]
pub struct SipResponse {
    pub inner: Response,
}

impl SipResponse {
    pub fn new(inner: Response) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let response = rsip::Response::try_from(data)?;
        Ok(Self::new(response))
    }

    pub fn status_code(&self) -> u16 {
        self.inner.status_code.clone().into()
    }

    pub fn is_provisional(&self) -> bool {
        self.status_code() < 200
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code())
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    /// Raw `To` header value, including the remote tag
    pub fn to_header(&self) -> Option<&str> {
        self.inner.headers.iter().find_map(|h| match h {
            Header::To(to) => Some(to.value()),
            _ => None,
        })
    }

    pub fn call_id(&self) -> Option<&str> {
        self.inner.headers.iter().find_map(|h| match h {
            Header::CallId(cid) => Some(cid.value()),
            _ => None,
        })
    }

    /// CSeq number and method
    pub fn cseq(&self) -> Option<(u32, String)> {
        self.inner.headers.iter().find_map(|h| match h {
            Header::CSeq(cseq) => {
                let mut parts = cseq.value().split_whitespace();
                let seq = parts.next()?.parse().ok()?;
                let method = parts.next()?.to_ascii_uppercase();
                Some((seq, method))
            }
            _ => None,
        })
    }

    pub fn content_type(&self) -> Option<&str> {
        self.inner.headers.iter().find_map(|h| match h {
            Header::ContentType(ct) => Some(ct.value()),
            _ => None,
        })
    }

    /// Contact URI of the remote party, without angle brackets or params
    pub fn contact_uri(&self) -> Option<String> {
        self.inner.headers.iter().find_map(|h| match h {
            Header::Contact(contact) => {
                let value = contact.value();
                let uri = match (value.find('<'), value.find('>')) {
                    (Some(start), Some(end)) if start < end => &value[start + 1..end],
                    _ => value.split(';').next().unwrap_or(value),
                };
                Some(uri.trim().to_string())
            }
            _ => None,
        })
    }

    /// SDP carried by the response, either directly or inside a multipart body
    pub fn sdp(&self) -> Option<String> {
        let body = std::str::from_utf8(self.body()).ok()?;
        if body.trim().is_empty() {
            return None;
        }

        match self.content_type() {
            Some(ct) if ct.to_ascii_lowercase().starts_with("multipart/") => {
                let boundary = MultipartBody::boundary_from_content_type(ct)?;
                MultipartBody::parse(&boundary, body)
                    .parts
                    .into_iter()
                    .find(|part| part.content_type.eq_ignore_ascii_case(SDP_CONTENT_TYPE))
                    .map(|part| part.body)
            }
            _ => Some(body.to_string()),
        }
    }
}

pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Whether an extension header can go on the wire as given: the name is a
/// token and the value fits on one line
pub fn is_valid_extension_header(name: &str, value: &str) -> bool {
    let token = |c: char| c.is_ascii_alphanumeric() || "-.!%*_+`'~".contains(c);
    !name.is_empty() && name.chars().all(token) && !value.contains(['\r', '\n'])
}

/// One MIME part of a multipart body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    pub content_type: String,
    pub disposition: Option<String>,
    pub body: String,
}

impl MimePart {
    pub fn new(content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            disposition: None,
            body: body.into(),
        }
    }

    pub fn with_disposition(mut self, disposition: impl Into<String>) -> Self {
        self.disposition = Some(disposition.into());
        self
    }
}

/// `multipart/mixed` body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartBody {
    pub boundary: String,
    pub parts: Vec<MimePart>,
}

impl MultipartBody {
    pub fn new(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    pub fn add_part(&mut self, part: MimePart) {
        self.parts.push(part);
    }

    /// Value for the message `Content-Type` header
    pub fn content_type(&self) -> String {
        format!("multipart/mixed;boundary={}", self.boundary)
    }

    pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
        content_type.split(';').skip(1).find_map(|param| {
            let (name, value) = param.split_once('=')?;
            if name.trim().eq_ignore_ascii_case("boundary") {
                Some(value.trim().trim_matches('"').to_string())
            } else {
                None
            }
        })
    }

    /// Split a multipart body into its parts; malformed parts are skipped
    pub fn parse(boundary: &str, body: &str) -> Self {
        let delimiter = format!("--{}", boundary);
        let mut parts = Vec::new();

        for chunk in body.split(delimiter.as_str()).skip(1) {
            if chunk.starts_with("--") {
                break; // Closing delimiter
            }

            let chunk = chunk.trim_start_matches(['\r', '\n']);
            let (head, content) = match chunk.split_once("\r\n\r\n") {
                Some(split) => split,
                None => match chunk.split_once("\n\n") {
                    Some(split) => split,
                    None => continue,
                },
            };

            let mut part = MimePart::new("text/plain", content.trim_end_matches(['\r', '\n']));
            for line in head.lines() {
                if let Some((name, value)) = line.split_once(':') {
                    let value = value.trim().to_string();
                    if name.trim().eq_ignore_ascii_case("Content-Type") {
                        part.content_type = value;
                    } else if name.trim().eq_ignore_ascii_case("Content-Disposition") {
                        part.disposition = Some(value);
                    }
                }
            }
            parts.push(part);
        }

        Self {
            boundary: boundary.to_string(),
            parts,
        }
    }
}

impl fmt::Display for MultipartBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            write!(f, "--{}\r\n", self.boundary)?;
            write!(f, "Content-Type: {}\r\n", part.content_type)?;
            if let Some(disposition) = &part.disposition {
                write!(f, "Content-Disposition: {}\r\n", disposition)?;
            }
            write!(f, "\r\n{}", part.body)?;
            if !part.body.ends_with("\r\n") {
                write!(f, "\r\n")?;
            }
        }
        write!(f, "--{}--\r\n", self.boundary)
    }
}
