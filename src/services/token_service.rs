use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::oid::ObjectId;
use serde::Serialize;

use crate::config::{AuthConfig, TokenSettings};
use crate::errors::{AppError, Result};
use crate::models::claims::{ConfirmationClaims, TokenClaims};
use crate::models::entity::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// A signed token plus the lifetime its cookie should carry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub max_age: Duration,
}

#[derive(Clone)]
pub struct TokenService {
    config: Arc<AuthConfig>,
}

impl TokenService {
    pub fn new(config: Arc<AuthConfig>) -> Self {
        Self { config }
    }

    fn settings(&self, kind: EntityKind, token_type: TokenType) -> &TokenSettings {
        let tokens = self.config.tokens_for(kind);
        match token_type {
            TokenType::Access => &tokens.access,
            TokenType::Refresh => &tokens.refresh,
        }
    }

    pub fn issue(&self, kind: EntityKind, token_type: TokenType, id: &ObjectId) -> Result<IssuedToken> {
        self.issue_at(kind, token_type, id, Utc::now())
    }

    pub(crate) fn issue_at(
        &self,
        kind: EntityKind,
        token_type: TokenType,
        id: &ObjectId,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken> {
        let tokens = self.config.tokens_for(kind);
        let settings = self.settings(kind, token_type);
        let (iat, exp) = window(issued_at, settings.expires_in)?;

        let claims = TokenClaims {
            id: id.to_hex(),
            iss: tokens.issuer.clone(),
            aud: tokens.audience.clone(),
            iat,
            exp,
        };

        sign(&claims, &settings.secret, exp, settings.expires_in)
    }

    /// Verify signature, expiry, issuer and audience; return the entity id.
    pub fn validate(&self, kind: EntityKind, token_type: TokenType, token: &str) -> Result<ObjectId> {
        let tokens = self.config.tokens_for(kind);
        let settings = self.settings(kind, token_type);

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&tokens.issuer]);
        validation.set_audience(&[&tokens.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        let data = decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(settings.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            tracing::debug!(%kind, token_type = token_type.as_str(), error = %e, "token rejected");
            AppError::unauthorized(format!("Invalid {} token", token_type.as_str()))
        })?;

        parse_id(&data.claims.id)
    }

    pub fn issue_password_confirmation(&self, kind: EntityKind, id: &ObjectId) -> Result<IssuedToken> {
        self.issue_password_confirmation_at(kind, id, Utc::now())
    }

    pub(crate) fn issue_password_confirmation_at(
        &self,
        kind: EntityKind,
        id: &ObjectId,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken> {
        let settings = &self.config.confirmation;
        let (iat, exp) = window(issued_at, settings.expires_in)?;

        let claims = ConfirmationClaims {
            id: id.to_hex(),
            kind,
            iat,
            exp,
        };

        sign(&claims, &settings.secret, exp, settings.expires_in)
    }

    pub fn validate_password_confirmation(&self, kind: EntityKind, token: &str) -> Result<ObjectId> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<ConfirmationClaims>(
            token,
            &DecodingKey::from_secret(self.config.confirmation.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            tracing::debug!(%kind, error = %e, "password confirmation rejected");
            AppError::unauthorized("Invalid password confirmation")
        })?;

        if data.claims.kind != kind {
            return Err(AppError::unauthorized("Invalid password confirmation"));
        }

        parse_id(&data.claims.id)
    }
}

fn window(issued_at: DateTime<Utc>, ttl: Duration) -> Result<(i64, i64)> {
    let ttl = i64::try_from(ttl.as_secs())
        .map_err(|_| AppError::configuration("Token lifetime is too large"))?;
    let iat = issued_at.timestamp();
    Ok((iat, iat.saturating_add(ttl)))
}

fn sign<C: Serialize>(claims: &C, secret: &str, exp: i64, max_age: Duration) -> Result<IssuedToken> {
    let token = encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal_server_error(format!("Token generation failed: {}", e)))?;

    let expires_at = Utc
        .timestamp_opt(exp, 0)
        .single()
        .ok_or_else(|| AppError::internal_server_error("Token expiry out of range"))?;

    Ok(IssuedToken {
        token,
        expires_at,
        max_age,
    })
}

fn parse_id(raw: &str) -> Result<ObjectId> {
    ObjectId::parse_str(raw).map_err(|_| AppError::unauthorized("Invalid token subject"))
}
