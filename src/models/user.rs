use std::sync::Arc;

use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidateEmail};

use crate::database::{EntityRepository, Stores};
use crate::errors::{AppError, Result};
use crate::models::entity::{Authenticatable, EntityKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub name: String,
    pub password_hash: String,

    #[serde(default)]
    pub permissions: Vec<String>,

    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUser {
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,

    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUser {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub permissions: Vec<String>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        UserResponse {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            email: user.email.clone(),
            name: user.name.clone(),
            permissions: user.permissions.clone(),
        }
    }
}

impl Authenticatable for User {
    const KIND: EntityKind = EntityKind::User;
    const COLLECTION: &'static str = "users";
    const IDENTITY_FIELD: &'static str = "email";

    type Patch = UpdateUser;

    fn id(&self) -> Option<ObjectId> {
        self.id
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = Some(id);
    }

    fn identity(&self) -> &str {
        &self.email
    }

    fn set_identity(&mut self, identity: String) {
        self.email = identity;
    }

    fn normalize_identity(identity: &str) -> Result<String> {
        let email = identity.trim().to_lowercase();
        if !email.validate_email() {
            return Err(AppError::invalid_data("Email must be a valid address"));
        }
        Ok(email)
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

    fn apply_patch(&mut self, patch: &UpdateUser) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
    }

    fn patch_document(patch: &UpdateUser) -> Document {
        let mut fields = doc! {};
        if let Some(name) = &patch.name {
            fields.insert("name", name);
        }
        fields
    }

    fn repository(stores: &Stores) -> &Arc<dyn EntityRepository<Self>> {
        &stores.users
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_leaves_out_the_hash() {
        let now = DateTime::now();
        let user = User {
            id: Some(ObjectId::new()),
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            permissions: vec!["user:read:own".to_string()],
            created_at: now,
            updated_at: now,
        };

        let body = serde_json::to_value(UserResponse::from(&user)).unwrap();
        assert_eq!(body["id"], user.id.unwrap().to_hex());
        assert_eq!(body["email"], "ada@example.com");
        assert_eq!(body["name"], "Ada");
        assert!(body.get("password_hash").is_none());
        assert!(body.get("created_at").is_none());
    }
}
