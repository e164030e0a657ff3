use axum::http::StatusCode;

/// Liveness probe
///
/// Always 200 with an empty body while the process is serving.
pub async fn status() -> StatusCode {
    StatusCode::OK
}
