use crate::AppState;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

/// Client identity resolved from the bearer credential, inserted into
/// request extensions for the handlers.
#[derive(Debug, Clone)]
pub struct ClientIdentity(pub String);

pub async fn require_bearer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer_token(request.headers())?;
    let client_id = state
        .client_for_key(token)
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    request.extensions_mut().insert(ClientIdentity(client_id));
    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;
    value
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)
}
