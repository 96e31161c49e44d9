use crate::errors::{AppError, Result};
use crate::models::Authenticatable;
use crate::services::password::PasswordHasher;
use crate::services::token_service::{IssuedToken, TokenService};

/// Re-checks the password of an already signed-in entity and hands out the
/// short-lived proof required by sensitive account changes.
#[derive(Clone)]
pub struct PasswordConfirmationService {
    tokens: TokenService,
    hasher: PasswordHasher,
}

impl PasswordConfirmationService {
    pub fn new(tokens: TokenService, hasher: PasswordHasher) -> Self {
        Self { tokens, hasher }
    }

    pub async fn confirm<E: Authenticatable>(&self, entity: &E, password: &str) -> Result<IssuedToken> {
        let id = entity.require_id()?;

        if !self.hasher.verify(password, entity.password_hash()).await? {
            tracing::info!(kind = %E::KIND, entity_id = %id, "password confirmation failed");
            return Err(AppError::unauthorized("Invalid password"));
        }

        self.tokens.issue_password_confirmation(E::KIND, &id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mongodb::bson::{oid::ObjectId, DateTime};

    use super::*;
    use crate::config::test_support;
    use crate::models::{EntityKind, User};

    async fn user(hasher: &PasswordHasher, password: &str) -> User {
        User {
            id: Some(ObjectId::new()),
            email: "u@example.com".into(),
            name: "U".into(),
            password_hash: hasher.hash(password).await.unwrap(),
            permissions: vec![],
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    #[tokio::test]
    async fn confirmation_names_the_confirming_entity() {
        let tokens = TokenService::new(Arc::new(test_support::config()));
        let hasher = PasswordHasher::new(4);
        let service = PasswordConfirmationService::new(tokens.clone(), hasher);

        let u = user(&hasher, "shared password").await;
        let v = user(&hasher, "shared password").await;

        let issued = service.confirm(&u, "shared password").await.unwrap();
        let confirmed = tokens
            .validate_password_confirmation(EntityKind::User, &issued.token)
            .unwrap();
        assert_eq!(Some(confirmed), u.id);
        assert_ne!(Some(confirmed), v.id);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let tokens = TokenService::new(Arc::new(test_support::config()));
        let hasher = PasswordHasher::new(4);
        let service = PasswordConfirmationService::new(tokens, hasher);

        let u = user(&hasher, "right password").await;
        let err = service.confirm(&u, "wrong password").await.unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));
    }
}
