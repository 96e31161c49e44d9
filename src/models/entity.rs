use std::fmt;
use std::sync::Arc;

use mongodb::bson::{oid::ObjectId, DateTime, Document};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use validator::Validate;

use crate::database::{EntityRepository, Stores};
use crate::errors::{AppError, Result};

/// The two kinds of accounts that can sign in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Administrator,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Administrator => "administrator",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An account that holds credentials and permission grants.
///
/// `identity` is the unique login handle. Mail (OTP codes) goes to `email`,
/// which is the identity itself for users.
pub trait Authenticatable:
    fmt::Debug + Clone + Send + Sync + Unpin + Serialize + DeserializeOwned + 'static
{
    const KIND: EntityKind;
    const COLLECTION: &'static str;
    const IDENTITY_FIELD: &'static str;

    /// Partial profile update accepted for this kind.
    type Patch: Validate + fmt::Debug + Send + Sync;

    fn id(&self) -> Option<ObjectId>;
    fn set_id(&mut self, id: ObjectId);

    /// Id of a stored entity; only unsaved values lack one.
    fn require_id(&self) -> Result<ObjectId> {
        self.id()
            .ok_or_else(|| AppError::internal_server_error(format!("{} has no id", Self::KIND)))
    }

    fn identity(&self) -> &str;
    fn set_identity(&mut self, identity: String);

    /// Normalize and check a candidate identity before it is stored.
    fn normalize_identity(identity: &str) -> Result<String>;

    fn email(&self) -> &str;

    fn password_hash(&self) -> &str;
    fn set_password_hash(&mut self, hash: String);

    fn permissions(&self) -> &[String];

    fn touch(&mut self, now: DateTime);

    fn apply_patch(&mut self, patch: &Self::Patch);
    fn patch_document(patch: &Self::Patch) -> Document;

    fn repository(stores: &Stores) -> &Arc<dyn EntityRepository<Self>>;
}
