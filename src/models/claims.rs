use serde::{Deserialize, Serialize};

use crate::models::entity::EntityKind;

/// Access/refresh token payload. `id` is the only entity data carried.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenClaims {
    pub id: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Payload of the password-confirmation cookie.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConfirmationClaims {
    pub id: String,
    pub kind: EntityKind,
    pub iat: i64,
    pub exp: i64,
}
