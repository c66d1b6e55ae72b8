//! Expectation definitions.
//!
//! Defines the request filters and actions that make up an expectation, in
//! the JSON wire format the admin endpoints and start-up loaders accept.

use crate::error::{DecodeError, MockError, ValidationError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// HTTP headers, one comma-joined value per name.
pub type Headers = HashMap<String, String>;

/// Scheme used for forwards that do not name one.
pub const DEFAULT_SCHEME: &str = "http";

/// A single expectation: a request filter paired with an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expectation {
    /// Unique key; adding another expectation with the same key replaces it
    #[serde(default)]
    pub key: String,

    /// Request filter (absent = match every request)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestFilter>,

    /// Forward the request to another host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward: Option<ForwardAction>,

    /// Answer with a canned or templated response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseAction>,

    /// Delay in seconds before the action runs (zero or negative = none)
    #[serde(default, skip_serializing_if = "is_zero")]
    pub delay: i64,

    /// Priority (higher = matched first)
    #[serde(default, skip_serializing_if = "is_zero")]
    pub priority: i64,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl Expectation {
    /// Create an expectation that matches everything and does nothing.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            request: None,
            forward: None,
            response: None,
            delay: 0,
            priority: 0,
        }
    }

    /// Decode a single expectation from JSON.
    pub fn from_json(data: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Fill in defaults the wire format leaves implicit.
    pub fn normalize(&mut self) {
        if let Some(forward) = &mut self.forward {
            if forward.scheme.is_empty() {
                forward.scheme = DEFAULT_SCHEME.to_string();
            }
        }
    }

    /// The delay to apply, if any.
    pub fn delay_duration(&self) -> Option<Duration> {
        u64::try_from(self.delay)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Validate the expectation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.key.is_empty() {
            return Err(ValidationError::EmptyKey);
        }
        if self.response.is_some() && self.forward.is_some() {
            return Err(ValidationError::ResponseAndForward(self.key.clone()));
        }
        if let Some(response) = &self.response {
            if !(100..=599).contains(&response.httpcode) {
                return Err(ValidationError::InvalidStatus {
                    key: self.key.clone(),
                    status: response.httpcode,
                });
            }
        }
        if let Some(forward) = &self.forward {
            if forward.host.is_empty() {
                return Err(ValidationError::EmptyForwardHost(self.key.clone()));
            }
        }
        Ok(())
    }
}

/// Filter for incoming requests. Also the normalized form of a live request.
///
/// Empty strings and absent headers place no constraint on a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestFilter {
    #[serde(default)]
    pub method: String,

    /// Request target: path and query
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub body: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,

    /// Body bytes exactly as received; `body` is their lossy text form.
    /// Only set on live requests, never part of a filter.
    #[serde(skip)]
    pub raw_body: Option<Bytes>,
}

impl RequestFilter {
    /// The body to send upstream: the received bytes when known.
    pub fn body_bytes(&self) -> Bytes {
        match &self.raw_body {
            Some(raw) => raw.clone(),
            None => Bytes::from(self.body.clone()),
        }
    }
}

/// Forward action: proxy the request to `scheme://host` keeping its path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForwardAction {
    #[serde(default)]
    pub scheme: String,

    #[serde(default)]
    pub host: String,

    /// Headers set on the outbound request; `Host` sets the target host identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,
}

/// Response action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseAction {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub httpcode: u16,

    #[serde(default)]
    pub body: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,

    /// Base64-encoded template; when set its output replaces `body`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jstemplate: Option<String>,
}

fn default_status() -> u16 {
    200
}

impl Default for ResponseAction {
    fn default() -> Self {
        Self {
            httpcode: default_status(),
            body: String::new(),
            headers: None,
            jstemplate: None,
        }
    }
}

/// Body of a remove request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectationRemove {
    pub key: String,
}

/// Parse a JSON array of expectations.
pub fn parse_expectations(json: &str) -> Result<Vec<Expectation>, DecodeError> {
    Ok(serde_json::from_str(json)?)
}

/// Load expectations from a file holding an array of them.
///
/// `.yaml` and `.yml` files are read as YAML with the same schema, anything
/// else as JSON.
pub fn load_expectations_file(path: &Path) -> Result<Vec<Expectation>, DecodeError> {
    let content = std::fs::read_to_string(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    if is_yaml {
        Ok(serde_yaml::from_str(&content)?)
    } else {
        parse_expectations(&content)
    }
}

/// Validate a batch, reporting the position of the first bad entry.
pub fn validate_all(expectations: &[Expectation]) -> Result<(), MockError> {
    for (index, exp) in expectations.iter().enumerate() {
        exp.validate()
            .map_err(|source| MockError::InvalidEntry { index, source })?;
    }
    Ok(())
}
