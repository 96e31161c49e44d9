use std::sync::Arc;

use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::database::{EntityRepository, Stores};
use crate::errors::{AppError, Result};
use crate::models::entity::{Authenticatable, EntityKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Administrator {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub username: String,
    pub email: String,
    pub password_hash: String,

    #[serde(default)]
    pub permissions: Vec<String>,

    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAdministrator {
    #[validate(length(min = 3, max = 50, message = "Username must be 3 to 50 characters"))]
    pub username: String,

    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,

    #[validate(length(min = 12, message = "Password must be at least 12 characters"))]
    pub password: String,

    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateAdministrator {
    #[validate(email(message = "Email must be a valid address"))]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdministratorResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub permissions: Vec<String>,
}

impl From<&Administrator> for AdministratorResponse {
    fn from(admin: &Administrator) -> Self {
        AdministratorResponse {
            id: admin.id.map(|id| id.to_hex()).unwrap_or_default(),
            username: admin.username.clone(),
            email: admin.email.clone(),
            permissions: admin.permissions.clone(),
        }
    }
}

/// Contact addresses are stored trimmed and lowercased.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Authenticatable for Administrator {
    const KIND: EntityKind = EntityKind::Administrator;
    const COLLECTION: &'static str = "administrators";
    const IDENTITY_FIELD: &'static str = "username";

    type Patch = UpdateAdministrator;

    fn id(&self) -> Option<ObjectId> {
        self.id
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = Some(id);
    }

    fn identity(&self) -> &str {
        &self.username
    }

    fn set_identity(&mut self, identity: String) {
        self.username = identity;
    }

    fn normalize_identity(identity: &str) -> Result<String> {
        let username = identity.trim().to_lowercase();
        if !(3..=50).contains(&username.chars().count()) {
            return Err(AppError::invalid_data("Username must be 3 to 50 characters"));
        }
        Ok(username)
    }

    fn email(&self) -> &str {
        &self.email
    }

    fn password_hash(&self) -> &str {
        &self.password_hash
    }

    fn set_password_hash(&mut self, hash: String) {
        self.password_hash = hash;
    }

    fn permissions(&self) -> &[String] {
        &self.permissions
    }

    fn touch(&mut self, now: DateTime) {
        self.updated_at = now;
    }

    fn apply_patch(&mut self, patch: &UpdateAdministrator) {
        if let Some(email) = &patch.email {
            self.email = normalize_email(email);
        }
    }

    fn patch_document(patch: &UpdateAdministrator) -> Document {
        let mut fields = doc! {};
        if let Some(email) = &patch.email {
            fields.insert("email", normalize_email(email));
        }
        fields
    }

    fn repository(stores: &Stores) -> &Arc<dyn EntityRepository<Self>> {
        &stores.administrators
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Administrator {
        let now = DateTime::now();
        Administrator {
            id: Some(ObjectId::new()),
            username: "root".to_string(),
            email: "root@example.com".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            permissions: vec!["user:read:any".to_string()],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn patched_email_is_normalized() {
        let patch = UpdateAdministrator {
            email: Some("Ops@Example.COM".to_string()),
        };

        let mut admin = root();
        admin.apply_patch(&patch);
        assert_eq!(admin.email, "ops@example.com");

        let fields = Administrator::patch_document(&patch);
        assert_eq!(fields.get_str("email").unwrap(), "ops@example.com");
    }

    #[test]
    fn response_leaves_out_the_hash() {
        let admin = root();
        let body = serde_json::to_value(AdministratorResponse::from(&admin)).unwrap();

        assert_eq!(body["id"], admin.id.unwrap().to_hex());
        assert_eq!(body["username"], "root");
        assert_eq!(body["permissions"][0], "user:read:any");
        assert!(body.get("password_hash").is_none());
    }
}
