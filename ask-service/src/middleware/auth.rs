use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::{handlers::ask::AskError, models::VerifiedIdentity, startup::AppState};

const BEARER_PREFIX: &str = "Bearer ";

/// Gate for authenticated routes.
///
/// Rejects before the body is read: no usable `Authorization` header gives
/// "No token provided" without consulting the verifier, any verifier failure
/// gives "Unauthorized".
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AskError> {
    let token = bearer_token(&req).ok_or(AskError::MissingToken)?;

    let identity = state.verifier.verify(token).await.map_err(|e| {
        tracing::warn!(error = %e, "Firebase token rejected");
        AskError::Unauthorized
    })?;

    tracing::debug!(uid = %identity.uid, "Caller authenticated");

    // Store the identity in request extensions so handlers can access it
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
}

/// Extractor for the identity stored by [`auth_middleware`].
pub struct AuthUser(pub VerifiedIdentity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AskError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<VerifiedIdentity>()
            .cloned()
            .map(AuthUser)
            .ok_or(AskError::Unauthorized)
    }
}
