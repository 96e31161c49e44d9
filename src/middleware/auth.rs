use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::errors::AppError;
use crate::models::{Authenticatable, EntityKind};
use crate::services::cookie_service::CookiePurpose;
use crate::services::token_service::TokenType;
use crate::state::AuthState;

pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

/// Entity already resolved by `require_access` for this request.
#[derive(Clone)]
struct Resolved<E>(E);

/// The entity behind a valid access token.
///
/// The token comes from `Authorization: Bearer <token>`, else from the
/// signed `<kind>_access_token` cookie.
#[derive(Debug, Clone)]
pub struct AccessGuard<E>(pub E);

/// The entity behind a valid refresh token, read from the `X-Refresh-Token`
/// header or the signed `<kind>_refresh_token` cookie.
#[derive(Debug, Clone)]
pub struct RefreshGuard<E>(pub E);

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .trim();

    (!token.is_empty()).then_some(token)
}

fn header_token<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn find_token(
    state: &AuthState,
    headers: &HeaderMap,
    kind: EntityKind,
    token_type: TokenType,
) -> Option<String> {
    let from_header = match token_type {
        TokenType::Access => bearer_token(headers),
        TokenType::Refresh => header_token(headers, REFRESH_TOKEN_HEADER),
    };

    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    let purpose = match token_type {
        TokenType::Access => CookiePurpose::AccessToken,
        TokenType::Refresh => CookiePurpose::RefreshToken,
    };
    state.cookies.read(&state.cookies.jar(headers), kind, purpose)
}

/// Validate the request's token of `token_type` and load its entity.
async fn authenticate<E: Authenticatable>(
    state: &AuthState,
    headers: &HeaderMap,
    token_type: TokenType,
) -> Result<E, AppError> {
    let token = find_token(state, headers, E::KIND, token_type).ok_or_else(|| {
        AppError::unauthorized(format!("Missing {} token", token_type.as_str()))
    })?;

    let id = state.tokens.validate(E::KIND, token_type, &token)?;

    state
        .stores
        .entities::<E>()
        .find_by_id(&id)
        .await?
        .ok_or_else(|| {
            tracing::debug!(kind = %E::KIND, entity_id = %id, "token for missing entity");
            AppError::unauthorized("Account no longer exists")
        })
}

#[async_trait]
impl<S, E> FromRequestParts<S> for AccessGuard<E>
where
    AuthState: FromRef<S>,
    S: Send + Sync,
    E: Authenticatable,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(Resolved(entity)) = parts.extensions.get::<Resolved<E>>() {
            return Ok(AccessGuard(entity.clone()));
        }

        let state = AuthState::from_ref(state);
        let entity = authenticate::<E>(&state, &parts.headers, TokenType::Access).await?;
        Ok(AccessGuard(entity))
    }
}

#[async_trait]
impl<S, E> FromRequestParts<S> for RefreshGuard<E>
where
    AuthState: FromRef<S>,
    S: Send + Sync,
    E: Authenticatable,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AuthState::from_ref(state);
        let entity = authenticate::<E>(&state, &parts.headers, TokenType::Refresh).await?;
        Ok(RefreshGuard(entity))
    }
}

/// Route-layer form of `AccessGuard`: rejects unauthenticated requests before
/// the handler runs and leaves the entity for any `AccessGuard<E>` downstream.
///
/// ```ignore
/// router.route_layer(axum::middleware::from_fn_with_state(
///     state.clone(),
///     require_access::<User>,
/// ))
/// ```
pub async fn require_access<E: Authenticatable>(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let entity = authenticate::<E>(&state, request.headers(), TokenType::Access).await?;
    request.extensions_mut().insert(Resolved(entity));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer   ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }

    #[test]
    fn refresh_header_is_trimmed() {
        let mut headers = HeaderMap::new();
        headers.insert(REFRESH_TOKEN_HEADER, " tok ".parse().unwrap());
        assert_eq!(header_token(&headers, REFRESH_TOKEN_HEADER), Some("tok"));
    }
}
