//! Authentication gate middleware
//!
//! Runs in front of every route. Allow-listed paths pass through untouched;
//! everything else needs a verified identity, which is attached to the
//! request together with its [`AccessGrant`].

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::debug;

use super::AppState;
use crate::auth::{AccessGrant, extract_bearer_token};
use crate::error::rpc_codes;

/// Authentication middleware
pub async fn auth_gate(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if state.auth.is_public_path(request.uri().path()) {
        debug!(path = %request.uri().path(), "Public path, skipping auth");
        return next.run(request).await;
    }

    let Some(identity) = state.authenticator.authenticate(request.headers()).await else {
        debug!(
            path = %request.uri().path(),
            has_token = extract_bearer_token(request.headers()).is_some(),
            "Rejecting unauthenticated request"
        );
        return unauthorized_response("Authentication required");
    };

    let grant = AccessGrant::for_identity(&identity, state.auth.grant_ttl);
    debug!(username = %identity.username, path = %request.uri().path(), "Authenticated request");
    request.extensions_mut().insert(identity);
    request.extensions_mut().insert(grant);
    next.run(request).await
}

/// 401 with a JSON-RPC error body.
///
/// Identical for missing, rejected and unverifiable tokens.
pub(crate) fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(json!({
            "jsonrpc": "2.0",
            "error": {
                "code": rpc_codes::SERVER_ERROR_START,
                "message": message
            },
            "id": null
        })),
    )
        .into_response()
}
