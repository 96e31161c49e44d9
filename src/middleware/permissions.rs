use std::marker::PhantomData;

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts, RawPathParams},
    http::request::Parts,
};

use crate::errors::AppError;
use crate::middleware::auth::AccessGuard;
use crate::models::Authenticatable;
use crate::permissions::{authorize, Actor, RequiredPermissions, RouteParams};
use crate::state::AuthState;

/// An authenticated entity whose grants satisfy `P` for this route.
///
/// ```ignore
/// required_permissions!(pub ReadUser => [USER_READ_OWN, USER_READ_OTHERS]);
///
/// async fn show(Authorized(user, _): Authorized<User, ReadUser>, Path(id): Path<String>) { .. }
/// ```
#[derive(Debug)]
pub struct Authorized<E, P>(pub E, pub PhantomData<fn() -> P>);

impl<E, P> Authorized<E, P> {
    pub fn into_inner(self) -> E {
        self.0
    }
}

async fn route_params<S: Send + Sync>(parts: &mut Parts, state: &S) -> RouteParams {
    match RawPathParams::from_request_parts(parts, state).await {
        Ok(params) => params
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        Err(_) => RouteParams::new(),
    }
}

#[async_trait]
impl<S, E, P> FromRequestParts<S> for Authorized<E, P>
where
    AuthState: FromRef<S>,
    S: Send + Sync,
    E: Authenticatable,
    P: RequiredPermissions,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AccessGuard(entity) = AccessGuard::<E>::from_request_parts(parts, state).await?;
        let params = route_params(parts, state).await;

        authorize(&Actor::from_entity(&entity)?, P::REQUIRED, &params)?;
        Ok(Authorized(entity, PhantomData))
    }
}
