//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use medintake_core::domain::UserProfile;
use medintake_core::ports::PortError;
use std::sync::Arc;
use tracing::debug;

use crate::web::rest::WebError;
use crate::web::state::{AppState, CurrentUser};

/// Middleware that verifies the bearer credential and resolves the caller
/// to a local User row (find-or-create, refreshing provider profile
/// fields). The local user id lands in request extensions for handlers.
///
/// Anything short of a verified token is a 401; the response body never
/// says whether the token was absent, malformed, or expired.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, WebError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(WebError(PortError::Unauthorized))?;

    let claims = state.verifier.verify(token).await.map_err(WebError)?;

    let user = state
        .repo
        .find_or_create_user(
            &claims.subject,
            UserProfile {
                email: claims.email,
                display_name: claims.display_name,
                avatar_url: claims.avatar_url,
            },
        )
        .await
        .map_err(WebError)?;

    debug!(user_id = %user.id, "authenticated request");
    req.extensions_mut().insert(CurrentUser(user.id));

    Ok(next.run(req).await)
}
