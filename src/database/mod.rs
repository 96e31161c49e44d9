use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, DateTime};
use mongodb::Database;

use crate::errors::Result;
use crate::models::otp::{OtpKind, OtpRecord};
use crate::models::password_reset::PasswordReset;
use crate::models::{Administrator, Authenticatable, User};

pub mod memory;
pub mod mongo;

/// Credential store for one authenticatable kind.
#[async_trait]
pub trait EntityRepository<E: Authenticatable>: Send + Sync {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<E>>;

    async fn find_by_identity(&self, identity: &str) -> Result<Option<E>>;

    async fn list(&self) -> Result<Vec<E>>;

    /// Fails with `DuplicateKey` when the identity is taken.
    async fn insert(&self, entity: E) -> Result<E>;

    async fn update_profile(&self, id: &ObjectId, patch: &E::Patch) -> Result<E>;

    async fn update_password(&self, id: &ObjectId, password_hash: &str) -> Result<()>;

    async fn update_identity(&self, id: &ObjectId, identity: &str) -> Result<()>;

    async fn delete(&self, id: &ObjectId) -> Result<()>;
}

#[async_trait]
pub trait OtpRepository: Send + Sync {
    /// Store `record`, replacing any record for the same (kind, destination).
    async fn upsert(&self, record: OtpRecord) -> Result<OtpRecord>;

    async fn find_active(
        &self,
        kind: OtpKind,
        destination: &str,
        now: DateTime,
    ) -> Result<Option<OtpRecord>>;

    async fn record_failed_attempt(&self, id: &ObjectId) -> Result<()>;

    /// Delete exactly this record (same id and code hash). Returns true only
    /// for the call that removed it.
    async fn consume(&self, record: &OtpRecord) -> Result<bool>;

    async fn delete_for(&self, kind: OtpKind, destination: &str) -> Result<()>;
}

#[async_trait]
pub trait PasswordResetRepository: Send + Sync {
    async fn upsert_for_user(
        &self,
        user_id: &ObjectId,
        now: DateTime,
        expires_at: DateTime,
    ) -> Result<PasswordReset>;

    async fn find_active(&self, id: &ObjectId, now: DateTime) -> Result<Option<PasswordReset>>;

    /// Delete the record. Returns true only for the call that removed it.
    async fn consume(&self, id: &ObjectId) -> Result<bool>;
}

/// Every repository the services need, behind trait objects.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn EntityRepository<User>>,
    pub administrators: Arc<dyn EntityRepository<Administrator>>,
    pub otps: Arc<dyn OtpRepository>,
    pub password_resets: Arc<dyn PasswordResetRepository>,
}

impl Stores {
    pub fn mongo(db: &Database) -> Self {
        Stores {
            users: Arc::new(mongo::MongoEntityRepository::<User>::new(db)),
            administrators: Arc::new(mongo::MongoEntityRepository::<Administrator>::new(db)),
            otps: Arc::new(mongo::MongoOtpRepository::new(db)),
            password_resets: Arc::new(mongo::MongoPasswordResetRepository::new(db)),
        }
    }

    pub fn memory() -> Self {
        Stores {
            users: Arc::new(memory::MemoryEntityRepository::<User>::default()),
            administrators: Arc::new(memory::MemoryEntityRepository::<Administrator>::default()),
            otps: Arc::new(memory::MemoryOtpRepository::default()),
            password_resets: Arc::new(memory::MemoryPasswordResetRepository::default()),
        }
    }

    pub fn entities<E: Authenticatable>(&self) -> &Arc<dyn EntityRepository<E>> {
        E::repository(self)
    }
}
