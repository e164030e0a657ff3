//! `GET /api/query?token=...&q=(raw|reqinfo)&pageNo=0&pageSize=50&timeAsc|timeDesc&timeStart=...`
//!
//! Results are streamed: the store writes into a [`ResultSink`] whose
//! receiving end is the response body.
//!
//! If the search fails before producing any output the client gets a plain
//! 500. If it fails after output has been sent, the success status and
//! headers are already on the wire; an `Unhandled error:` line is appended
//! and the body ends early. Clients must treat such a body as truncated.
//!
//! The search task lives only as long as the request: dropping the handler
//! future or the response body aborts it.

use super::AppState;
use crate::error::AppError;
use crate::query::{ExportFormat, SearchQuery};
use crate::storage::ResultSink;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::collections::HashMap;
use std::convert::Infallible;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

/// Chunks buffered between the search task and the client
const SINK_CAPACITY: usize = 16;

pub async fn handle_query(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let query = SearchQuery::from_params(&params, state.config.server.max_page_size)
        .map_err(|e| AppError::bad_request("Bad params", e))?;
    tracing::debug!(query = %query, "Running search");

    let format = query.export_format;
    let (mut sink, mut rx) = ResultSink::channel(SINK_CAPACITY);
    let store = state.store.clone();

    let mut search = AbortOnDrop(tokio::spawn(async move {
        let result = store.search(&query, &mut sink).await;
        if let Err(e) = &result {
            if sink.has_output() {
                tracing::error!(
                    error = %e,
                    bytes_sent = sink.bytes_written(),
                    "Search failed after partial output"
                );
                // Best effort; the client may already be gone
                let _ = sink.write(format!("\nUnhandled error: {}\n", e)).await;
            }
        }
        result
    }));

    let Some(first) = rx.recv().await else {
        // Sink dropped without output: the search is over
        return match (&mut search.0).await {
            Ok(Ok(())) => Ok(with_format_headers(format, Body::empty())),
            Ok(Err(e)) => Err(AppError::storage("Unhandled error", e)),
            Err(e) => Err(AppError::internal("Unhandled error", e)),
        };
    };

    let stream = futures::stream::once(async move { first })
        .chain(ReceiverStream::new(rx))
        .map(move |chunk| {
            let _ = &search;
            Ok::<_, Infallible>(chunk)
        });

    Ok(with_format_headers(format, Body::from_stream(stream)))
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn with_format_headers(format: ExportFormat, body: Body) -> Response {
    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(format.content_type()),
    );
    if let Some(disposition) = format.content_disposition() {
        headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static(disposition),
        );
    }
    response
}
