use axum::{body::Body, http::Request, middleware::Next, response::Response};
use souk_messages::User;
use std::sync::Arc;

use crate::auth::{authenticate, bearer_token};
use crate::error::ApiError;
use crate::AppState;

/// The authenticated user, stored in request extensions.
#[derive(Clone, Debug)]
pub struct AuthUser(pub User);

/// Middleware to authenticate requests via `Authorization: Bearer`.
///
/// Rejections answer `401` with the `AUTH_FAILURE` body.
pub async fn auth_middleware(mut req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or_else(|| ApiError::Internal("application state missing".to_string()))?
        .clone();

    let token = bearer_token(req.headers()).map(str::to_owned);
    let user = authenticate(&state, token.as_deref()).await?;

    req.extensions_mut().insert(AuthUser(user));
    Ok(next.run(req).await)
}
