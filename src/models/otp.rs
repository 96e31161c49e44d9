use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// What a one-time code was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpKind {
    ForgotPassword,
    Registration,
}

impl OtpKind {
    pub const ALL: [OtpKind; 2] = [OtpKind::ForgotPassword, OtpKind::Registration];

    pub fn as_str(&self) -> &'static str {
        match self {
            OtpKind::ForgotPassword => "forgot_password",
            OtpKind::Registration => "registration",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OtpRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub kind: OtpKind,
    pub destination: String,
    pub code_hash: String,
    pub attempts: i32,
    pub expires_at: DateTime,
    pub created_at: DateTime,
}

impl OtpRecord {
    pub fn is_expired(&self, now: DateTime) -> bool {
        self.expires_at.timestamp_millis() <= now.timestamp_millis()
    }
}
