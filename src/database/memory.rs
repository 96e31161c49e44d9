//! In-process repositories with the same semantics as the MongoDB ones,
//! including expiry on read. Used by tests and local development.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, DateTime};
use tokio::sync::RwLock;

use crate::database::{EntityRepository, OtpRepository, PasswordResetRepository};
use crate::errors::{AppError, Result};
use crate::models::otp::{OtpKind, OtpRecord};
use crate::models::password_reset::PasswordReset;
use crate::models::Authenticatable;

pub struct MemoryEntityRepository<E> {
    rows: RwLock<BTreeMap<ObjectId, E>>,
}

impl<E> Default for MemoryEntityRepository<E> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl<E: Authenticatable> EntityRepository<E> for MemoryEntityRepository<E> {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<E>> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn find_by_identity(&self, identity: &str) -> Result<Option<E>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|e| e.identity() == identity)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<E>> {
        Ok(self.rows.read().await.values().cloned().collect())
    }

    async fn insert(&self, mut entity: E) -> Result<E> {
        let mut rows = self.rows.write().await;
        if rows.values().any(|e| e.identity() == entity.identity()) {
            return Err(AppError::DuplicateKey(E::IDENTITY_FIELD.to_string()));
        }

        let id = ObjectId::new();
        entity.set_id(id);
        rows.insert(id, entity.clone());
        Ok(entity)
    }

    async fn update_profile(&self, id: &ObjectId, patch: &E::Patch) -> Result<E> {
        let mut rows = self.rows.write().await;
        let entity = rows.get_mut(id).ok_or(AppError::DocumentNotFound)?;
        entity.apply_patch(patch);
        entity.touch(DateTime::now());
        Ok(entity.clone())
    }

    async fn update_password(&self, id: &ObjectId, password_hash: &str) -> Result<()> {
        let mut rows = self.rows.write().await;
        let entity = rows.get_mut(id).ok_or(AppError::DocumentNotFound)?;
        entity.set_password_hash(password_hash.to_string());
        entity.touch(DateTime::now());
        Ok(())
    }

    async fn update_identity(&self, id: &ObjectId, identity: &str) -> Result<()> {
        let mut rows = self.rows.write().await;
        if rows
            .iter()
            .any(|(other, e)| other != id && e.identity() == identity)
        {
            return Err(AppError::DuplicateKey(E::IDENTITY_FIELD.to_string()));
        }

        let entity = rows.get_mut(id).ok_or(AppError::DocumentNotFound)?;
        entity.set_identity(identity.to_string());
        entity.touch(DateTime::now());
        Ok(())
    }

    async fn delete(&self, id: &ObjectId) -> Result<()> {
        self.rows
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or(AppError::DocumentNotFound)
    }
}

#[derive(Default)]
pub struct MemoryOtpRepository {
    records: RwLock<HashMap<(OtpKind, String), OtpRecord>>,
}

#[async_trait]
impl OtpRepository for MemoryOtpRepository {
    async fn upsert(&self, mut record: OtpRecord) -> Result<OtpRecord> {
        let mut records = self.records.write().await;
        let key = (record.kind, record.destination.clone());

        // A replacement keeps the document id, as a Mongo replace would.
        record.id = records
            .get(&key)
            .and_then(|existing| existing.id)
            .or_else(|| Some(ObjectId::new()));
        records.insert(key, record.clone());
        Ok(record)
    }

    async fn find_active(
        &self,
        kind: OtpKind,
        destination: &str,
        now: DateTime,
    ) -> Result<Option<OtpRecord>> {
        Ok(self
            .records
            .read()
            .await
            .get(&(kind, destination.to_string()))
            .filter(|record| !record.is_expired(now))
            .cloned())
    }

    async fn record_failed_attempt(&self, id: &ObjectId) -> Result<()> {
        let mut records = self.records.write().await;
        if let Some(record) = records.values_mut().find(|r| r.id.as_ref() == Some(id)) {
            record.attempts += 1;
        }
        Ok(())
    }

    async fn consume(&self, record: &OtpRecord) -> Result<bool> {
        let mut records = self.records.write().await;
        let key = (record.kind, record.destination.clone());
        let matches = records
            .get(&key)
            .is_some_and(|stored| stored.id == record.id && stored.code_hash == record.code_hash);

        if matches {
            records.remove(&key);
        }
        Ok(matches)
    }

    async fn delete_for(&self, kind: OtpKind, destination: &str) -> Result<()> {
        self.records
            .write()
            .await
            .remove(&(kind, destination.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPasswordResetRepository {
    by_user: RwLock<HashMap<ObjectId, PasswordReset>>,
}

#[async_trait]
impl PasswordResetRepository for MemoryPasswordResetRepository {
    async fn upsert_for_user(
        &self,
        user_id: &ObjectId,
        now: DateTime,
        expires_at: DateTime,
    ) -> Result<PasswordReset> {
        let mut by_user = self.by_user.write().await;
        let id = by_user
            .get(user_id)
            .and_then(|existing| existing.id)
            .unwrap_or_else(ObjectId::new);

        let reset = PasswordReset {
            id: Some(id),
            user_id: *user_id,
            created_at: now,
            expires_at,
        };
        by_user.insert(*user_id, reset.clone());
        Ok(reset)
    }

    async fn find_active(&self, id: &ObjectId, now: DateTime) -> Result<Option<PasswordReset>> {
        Ok(self
            .by_user
            .read()
            .await
            .values()
            .find(|reset| reset.id.as_ref() == Some(id) && !reset.is_expired(now))
            .cloned())
    }

    async fn consume(&self, id: &ObjectId) -> Result<bool> {
        let mut by_user = self.by_user.write().await;
        let user_id = by_user
            .iter()
            .find(|(_, reset)| reset.id.as_ref() == Some(id))
            .map(|(user_id, _)| *user_id);

        Ok(match user_id {
            Some(user_id) => by_user.remove(&user_id).is_some(),
            None => false,
        })
    }
}
