//! Bearer token extraction and the authentication middleware

use crate::api::AppState;
use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

const ACCESS_TOKEN_HEADER: &str = "X-Access-Token";
const FORWARDED_ACCESS_TOKEN_HEADER: &str = "X-Forwarded-Access-Token";

/// Verified bearer token of the current request
#[derive(Debug, Clone)]
pub struct AccessToken(pub String);

/// Read the caller's token from the request headers.
///
/// `X-Access-Token` (optionally `Bearer `-prefixed) wins over the
/// `X-Forwarded-Access-Token` set by an authenticating proxy.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
    };

    if let Some(token) = header(ACCESS_TOKEN_HEADER) {
        return Some(token.strip_prefix("Bearer ").unwrap_or(token).to_string());
    }
    header(FORWARDED_ACCESS_TOKEN_HEADER).map(str::to_string)
}

/// Reject requests not made by the terminal's owner
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("authorization header is missing"))?;

    state.authenticator.authenticate(&token).await?;

    request.extensions_mut().insert(AccessToken(token));
    Ok(next.run(request).await)
}
