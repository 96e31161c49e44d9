use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use crate::models::to_rfc3339;

/// Proof that a user passed the forgot-password OTP check.
///
/// At most one per user; a newer verification replaces the older record.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PasswordReset {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub created_at: DateTime,
    pub expires_at: DateTime,
}

impl PasswordReset {
    pub fn is_expired(&self, now: DateTime) -> bool {
        self.expires_at.timestamp_millis() <= now.timestamp_millis()
    }
}

#[derive(Debug, Serialize)]
pub struct PasswordResetResponse {
    pub reset_id: String,
    pub expires_at: String,
}

impl From<&PasswordReset> for PasswordResetResponse {
    fn from(reset: &PasswordReset) -> Self {
        PasswordResetResponse {
            reset_id: reset.id.map(|id| id.to_hex()).unwrap_or_default(),
            expires_at: to_rfc3339(reset.expires_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_formats_id_and_expiry() {
        let id = ObjectId::new();
        let reset = PasswordReset {
            id: Some(id),
            user_id: ObjectId::new(),
            created_at: DateTime::from_millis(1_700_000_000_000),
            expires_at: DateTime::from_millis(1_700_000_900_000),
        };

        let body = serde_json::to_value(PasswordResetResponse::from(&reset)).unwrap();
        assert_eq!(body["reset_id"], id.to_hex());
        assert_eq!(body["expires_at"], "2023-11-14T22:28:20+00:00");
        assert!(body.get("user_id").is_none());
    }
}
