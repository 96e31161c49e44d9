use std::sync::Arc;

use mongodb::bson::oid::ObjectId;
use tokio::sync::OnceCell;

use crate::database::Stores;
use crate::errors::{AppError, Result};
use crate::models::Authenticatable;
use crate::services::password::PasswordHasher;
use crate::services::token_service::{IssuedToken, TokenService, TokenType};

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const DUMMY_PASSWORD: &str = "no account has this password";

/// Access and refresh tokens handed out at login.
#[derive(Debug, Clone)]
pub struct Session {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

#[derive(Clone)]
pub struct AuthService {
    stores: Stores,
    tokens: TokenService,
    hasher: PasswordHasher,
    dummy_hash: Arc<OnceCell<String>>,
}

impl AuthService {
    pub fn new(stores: Stores, tokens: TokenService, hasher: PasswordHasher) -> Self {
        Self {
            stores,
            tokens,
            hasher,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// Hash at the configured cost, compared against when the identity is
    /// unknown so both failure paths pay for one bcrypt verify.
    async fn dummy_hash(&self) -> Result<&str> {
        self.dummy_hash
            .get_or_try_init(|| self.hasher.hash(DUMMY_PASSWORD))
            .await
            .map(String::as_str)
    }

    /// Check credentials and issue a session. An unknown identity and a
    /// wrong password fail the same way.
    pub async fn login<E: Authenticatable>(&self, identity: &str, password: &str) -> Result<(E, Session)> {
        let identity = E::normalize_identity(identity)
            .map_err(|_| AppError::unauthorized(INVALID_CREDENTIALS))?;

        let entity = match self.stores.entities::<E>().find_by_identity(&identity).await? {
            Some(entity) => entity,
            None => {
                self.hasher.verify(password, self.dummy_hash().await?).await?;
                tracing::info!(kind = %E::KIND, "login for unknown identity");
                return Err(AppError::unauthorized(INVALID_CREDENTIALS));
            }
        };

        if !self.hasher.verify(password, entity.password_hash()).await? {
            tracing::info!(kind = %E::KIND, entity_id = ?entity.id(), "login with wrong password");
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        }

        let session = self.issue_session::<E>(&entity.require_id()?)?;
        tracing::info!(kind = %E::KIND, entity_id = ?entity.id(), "login succeeded");
        Ok((entity, session))
    }

    pub fn issue_session<E: Authenticatable>(&self, id: &ObjectId) -> Result<Session> {
        Ok(Session {
            access: self.tokens.issue(E::KIND, TokenType::Access, id)?,
            refresh: self.tokens.issue(E::KIND, TokenType::Refresh, id)?,
        })
    }

    /// New access token for an entity that presented a valid refresh token.
    pub fn refresh_access<E: Authenticatable>(&self, entity: &E) -> Result<IssuedToken> {
        self.tokens.issue(E::KIND, TokenType::Access, &entity.require_id()?)
    }

    /// New refresh token for an entity that presented a valid access token.
    pub fn refresh_refresh<E: Authenticatable>(&self, entity: &E) -> Result<IssuedToken> {
        self.tokens.issue(E::KIND, TokenType::Refresh, &entity.require_id()?)
    }
}
