use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::errors::AppError;
use crate::middleware::auth::AccessGuard;
use crate::models::Authenticatable;
use crate::services::cookie_service::CookiePurpose;
use crate::state::AuthState;

/// An authenticated entity that also re-entered its password recently.
///
/// Requires a valid access token plus the signed
/// `<kind>_password_confirmation` cookie issued to this same entity. The
/// account service only accepts sensitive changes through this type.
#[derive(Debug, Clone)]
pub struct PasswordConfirmed<E> {
    entity: E,
}

impl<E> PasswordConfirmed<E> {
    #[cfg(test)]
    pub(crate) fn new(entity: E) -> Self {
        Self { entity }
    }

    pub fn entity(&self) -> &E {
        &self.entity
    }

    pub fn into_inner(self) -> E {
        self.entity
    }
}

#[async_trait]
impl<S, E> FromRequestParts<S> for PasswordConfirmed<E>
where
    AuthState: FromRef<S>,
    S: Send + Sync,
    E: Authenticatable,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AccessGuard(entity) = AccessGuard::<E>::from_request_parts(parts, state).await?;
        let state = AuthState::from_ref(state);

        let token = state
            .cookies
            .read(
                &state.cookies.jar(&parts.headers),
                E::KIND,
                CookiePurpose::PasswordConfirmation,
            )
            .ok_or_else(|| AppError::unauthorized("Password confirmation required"))?;

        let confirmed_id = state.tokens.validate_password_confirmation(E::KIND, &token)?;
        let id = entity.require_id()?;
        if confirmed_id != id {
            tracing::info!(kind = %E::KIND, entity_id = %id, "password confirmation for another account");
            return Err(AppError::unauthorized("Password confirmation required"));
        }

        Ok(PasswordConfirmed { entity })
    }
}
