//! Logging setup and secret redaction
//!
//! Auth tokens travel in the query string, so request URIs are redacted
//! before they are recorded.

use axum::http::Uri;
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::{fmt as tracing_fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {:?} (expected text or json)", other)),
        }
    }
}

/// Initialize tracing/logging
///
/// `RUST_LOG` overrides the default `info` level. Can only be called once.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_fmt::layer().with_target(true)).init(),
        LogFormat::Json => registry
            .with(tracing_fmt::layer().json().with_target(true))
            .init(),
    }
}

/// A secret that only shows its first characters when formatted
#[derive(Clone, Copy)]
pub struct SensitiveToken<'a> {
    inner: &'a str,
}

impl<'a> SensitiveToken<'a> {
    pub fn new(token: &'a str) -> Self {
        Self { inner: token }
    }
}

impl fmt::Display for SensitiveToken<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short secrets are hidden entirely
        const VISIBLE: usize = 4;
        match self.inner.get(..VISIBLE) {
            Some(prefix) if self.inner.len() > VISIBLE * 2 => write!(f, "{}***", prefix),
            _ => f.write_str("***"),
        }
    }
}

impl fmt::Debug for SensitiveToken<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

/// Path and query of `uri` with the value of any `token` parameter replaced by `***`.
pub fn redacted_uri(uri: &Uri) -> String {
    match uri.query() {
        None => uri.path().to_string(),
        Some(query) => format!("{}?{}", uri.path(), redact_query(query)),
    }
}

fn redact_query(query: &str) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some(("token", _)) => "token=***".to_string(),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}
