//! `POST /api/ingest?token=...`
//!
//! The body is one audit event. An empty object is accepted and ignored.
//!
//! Once an event passes the filters it is persisted by a detached task, so
//! an insert that fails or runs past the deadline is logged with its raw body
//! even when the client has already gone away.

use super::AppState;
use crate::error::AppError;
use crate::event::{is_empty_event, parse_event};
use crate::storage::StoreError;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{Method, StatusCode},
};
use std::fmt::Display;
use tracing::Instrument;

/// Largest event body accepted. Larger bodies are answered with 413.
pub const MAX_EVENT_BYTES: usize = 10 * 1024 * 1024;

pub async fn handle_ingest(
    method: Method,
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<StatusCode, AppError> {
    if method != Method::POST {
        return Err(AppError::bad_request(
            "Non post request",
            format!("method {} not allowed", method),
        ));
    }

    let body = match body {
        Ok(body) => body,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return Err(AppError::payload_too_large(
                "Error reading request body",
                format!("event exceeds {} bytes", MAX_EVENT_BYTES),
            ));
        }
        Err(rejection) => {
            return Err(AppError::internal(
                "Error reading request body",
                rejection.body_text(),
            ));
        }
    };

    if is_empty_event(&body) {
        return Ok(StatusCode::OK);
    }

    let event = match parse_event(&body) {
        Ok(event) => event,
        Err(e) => {
            log_unsaved(&body, &e);
            return Err(AppError::bad_request("Error parsing event JSON", e));
        }
    };

    if !state.config.ingest_filters.accept(&event) {
        tracing::debug!(api_name = event.api_name(), "Event filtered out");
        return Ok(StatusCode::OK);
    }

    let store = state.store.clone();
    let deadline = state.config.server.ingest_timeout;
    let raw = body.clone();
    let persist = tokio::spawn(
        async move {
            let result = match tokio::time::timeout(deadline, store.insert_event(&event)).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(deadline)),
            };
            if let Err(e) = &result {
                log_unsaved(&raw, e);
            }
            result
        }
        .in_current_span(),
    );

    match persist.await {
        Ok(Ok(())) => Ok(StatusCode::OK),
        Ok(Err(e)) => Err(AppError::storage("Error writing to DB", e)),
        Err(e) => {
            log_unsaved(&body, &e);
            Err(AppError::internal("Error writing to DB", e))
        }
    }
}

/// Keep the raw body in the log so a lost event can be replayed by hand.
///
/// Bodies that are not UTF-8 are logged with non-ASCII bytes escaped.
fn log_unsaved(body: &[u8], cause: &dyn Display) {
    match std::str::from_utf8(body) {
        Ok(text) => tracing::warn!(
            payload = %text,
            cause = %cause,
            "audit event not saved"
        ),
        Err(_) => tracing::warn!(
            payload = %body.escape_ascii(),
            cause = %cause,
            "audit event not saved"
        ),
    }
}
