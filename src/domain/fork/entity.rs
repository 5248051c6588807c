//! Call context entity

use crate::domain::shared::CallHandle;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Channel variables that become SIP headers on the recording INVITE
pub const SIP_HEADER_VARIABLE_PREFIX: &str = "siprec_sip_h_";

/// The original call a fork records
///
/// Owned by the host; a fork only holds a shared reference.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub handle: CallHandle,
    pub sip_call_id: String,
    pub from_uri: String,
    pub to_uri: String,
    pub caller_id_number: String,
    pub variables: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl CallContext {
    pub fn new(
        sip_call_id: impl Into<String>,
        from_uri: impl Into<String>,
        to_uri: impl Into<String>,
        caller_id_number: impl Into<String>,
    ) -> Self {
        Self {
            handle: CallHandle::new(),
            sip_call_id: sip_call_id.into(),
            from_uri: from_uri.into(),
            to_uri: to_uri.into(),
            caller_id_number: caller_id_number.into(),
            variables: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// `(header name, value)` pairs from prefixed variables, prefix stripped
    pub fn sip_header_variables(&self) -> impl Iterator<Item = (&str, &str)> {
        self.variables.iter().filter_map(|(name, value)| {
            let prefix_len = SIP_HEADER_VARIABLE_PREFIX.len();
            if name.len() > prefix_len
                && name.is_char_boundary(prefix_len)
                && name[..prefix_len].eq_ignore_ascii_case(SIP_HEADER_VARIABLE_PREFIX)
            {
                Some((&name[prefix_len..], value.as_str()))
            } else {
                None
            }
        })
    }
}
