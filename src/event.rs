//! Audit event decoding
//!
//! An ingested event keeps its original body text verbatim in `payload`; the
//! typed fields are only what filtering and the request-info view need.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// One audit log record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Event {
    pub time: DateTime<Utc>,

    pub api: ApiDetails,

    #[serde(default, rename = "remotehost")]
    pub remote_host: Option<String>,

    #[serde(default, rename = "requestID")]
    pub request_id: Option<String>,

    #[serde(default, rename = "userAgent")]
    pub user_agent: Option<String>,

    /// Original request body, stored as-is
    #[serde(skip)]
    pub payload: String,
}

/// The `api` object of an audit record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiDetails {
    pub name: String,

    #[serde(default)]
    pub bucket: Option<String>,

    #[serde(default)]
    pub object: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default, rename = "statusCode")]
    pub status_code: Option<i64>,

    /// Bytes received
    #[serde(default)]
    pub rx: Option<i64>,

    /// Bytes sent
    #[serde(default)]
    pub tx: Option<i64>,

    /// Formatted as `<nanoseconds>ns`
    #[serde(default, rename = "timeToResponse")]
    pub time_to_response: Option<String>,
}

impl Event {
    pub fn api_name(&self) -> &str {
        &self.api.name
    }

    /// Response time in nanoseconds, if present and well-formed.
    pub fn time_to_response_ns(&self) -> Option<i64> {
        let raw = self.api.time_to_response.as_deref()?;
        raw.strip_suffix("ns").unwrap_or(raw).trim().parse().ok()
    }
}

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

/// Decode a request body into an [`Event`].
pub fn parse_event(body: &[u8]) -> Result<Event, EventDecodeError> {
    let text = std::str::from_utf8(body)?;
    let mut event: Event = serde_json::from_str(text)?;
    event.payload = text.to_owned();
    Ok(event)
}

/// True when the body is an empty JSON object (`{}`, whitespace allowed).
pub fn is_empty_event(body: &[u8]) -> bool {
    let trimmed = body.trim_ascii();
    match trimmed {
        [b'{', inner @ .., b'}'] => inner.iter().all(u8::is_ascii_whitespace),
        _ => false,
    }
}
