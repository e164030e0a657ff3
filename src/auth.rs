use crate::error::AppError;
use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Name of the query parameter carrying the shared secret
pub const TOKEN_PARAM: &str = "token";

/// Shared secret protecting one route
#[derive(Clone)]
pub struct TokenGuard {
    secret: Arc<str>,
}

impl TokenGuard {
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Whether `candidate` equals the configured secret.
    ///
    /// Compared in constant time for equal lengths.
    pub fn verify(&self, candidate: &str) -> bool {
        bool::from(candidate.as_bytes().ct_eq(self.secret.as_bytes()))
    }
}

/// Authentication middleware
///
/// Rejects the request with 401 unless its `token` query parameter matches
/// the guard's secret. The inner handler is not called on rejection.
pub async fn require_token(
    State(guard): State<TokenGuard>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(&req).ok_or(AppError::Unauthorized)?;

    if !guard.verify(&token) {
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(req).await)
}

fn extract_token(req: &Request) -> Option<String> {
    let Query(mut params) = Query::<HashMap<String, String>>::try_from_uri(req.uri()).ok()?;
    params.remove(TOKEN_PARAM).filter(|t| !t.is_empty())
}
