use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime, Document},
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
    Collection, Database, IndexModel,
};

use crate::database::{EntityRepository, OtpRepository, PasswordResetRepository};
use crate::errors::{AppError, Result};
use crate::models::otp::{OtpKind, OtpRecord};
use crate::models::password_reset::PasswordReset;
use crate::models::{Administrator, Authenticatable, User};

const OTP_COLLECTION: &str = "otps";
const PASSWORD_RESET_COLLECTION: &str = "password_resets";
const DUPLICATE_KEY_CODE: i32 = 11000;

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

fn map_write_error(err: mongodb::error::Error, field: &str) -> AppError {
    if is_duplicate_key(&err) {
        AppError::DuplicateKey(field.to_string())
    } else {
        AppError::MongoDB(err)
    }
}

/// Create the unique and TTL indexes the repositories rely on.
pub async fn ensure_indexes(db: &Database) -> Result<()> {
    let unique = || IndexOptions::builder().unique(true).build();
    let ttl = || {
        IndexOptions::builder()
            .expire_after(Duration::from_secs(0))
            .build()
    };

    for (collection, field) in [
        (User::COLLECTION, User::IDENTITY_FIELD),
        (Administrator::COLLECTION, Administrator::IDENTITY_FIELD),
    ] {
        let mut keys = Document::new();
        keys.insert(field, 1);
        db.collection::<Document>(collection)
            .create_index(
                IndexModel::builder()
                    .keys(keys)
                    .options(unique())
                    .build(),
            )
            .await?;
    }

    let otps = db.collection::<Document>(OTP_COLLECTION);
    otps.create_index(
        IndexModel::builder()
            .keys(doc! { "kind": 1, "destination": 1 })
            .options(unique())
            .build(),
    )
    .await?;
    otps.create_index(
        IndexModel::builder()
            .keys(doc! { "expires_at": 1 })
            .options(ttl())
            .build(),
    )
    .await?;

    let resets = db.collection::<Document>(PASSWORD_RESET_COLLECTION);
    resets
        .create_index(
            IndexModel::builder()
                .keys(doc! { "user_id": 1 })
                .options(unique())
                .build(),
        )
        .await?;
    resets
        .create_index(
            IndexModel::builder()
                .keys(doc! { "expires_at": 1 })
                .options(ttl())
                .build(),
        )
        .await?;

    tracing::info!("MongoDB indexes ensured");
    Ok(())
}

pub struct MongoEntityRepository<E: Authenticatable> {
    collection: Collection<E>,
}

impl<E: Authenticatable> MongoEntityRepository<E> {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(E::COLLECTION),
        }
    }
}

#[async_trait]
impl<E: Authenticatable> EntityRepository<E> for MongoEntityRepository<E> {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<E>> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find_by_identity(&self, identity: &str) -> Result<Option<E>> {
        let mut filter = Document::new();
        filter.insert(E::IDENTITY_FIELD, identity);
        Ok(self.collection.find_one(filter).await?)
    }

    async fn list(&self) -> Result<Vec<E>> {
        let cursor = self.collection.find(doc! {}).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert(&self, mut entity: E) -> Result<E> {
        let result = self
            .collection
            .insert_one(&entity)
            .await
            .map_err(|e| map_write_error(e, E::IDENTITY_FIELD))?;

        let id = result.inserted_id.as_object_id().ok_or_else(|| {
            AppError::Unacknowledged(format!("insert into {} returned no ObjectId", E::COLLECTION))
        })?;
        entity.set_id(id);
        Ok(entity)
    }

    async fn update_profile(&self, id: &ObjectId, patch: &E::Patch) -> Result<E> {
        let mut fields = E::patch_document(patch);
        fields.insert("updated_at", DateTime::now());

        self.collection
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": fields })
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(AppError::DocumentNotFound)
    }

    async fn update_password(&self, id: &ObjectId, password_hash: &str) -> Result<()> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "password_hash": password_hash, "updated_at": DateTime::now() } },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(AppError::DocumentNotFound);
        }
        Ok(())
    }

    async fn update_identity(&self, id: &ObjectId, identity: &str) -> Result<()> {
        let mut fields = doc! { "updated_at": DateTime::now() };
        fields.insert(E::IDENTITY_FIELD, identity);

        let result = self
            .collection
            .update_one(doc! { "_id": id }, doc! { "$set": fields })
            .await
            .map_err(|e| map_write_error(e, E::IDENTITY_FIELD))?;

        if result.matched_count == 0 {
            return Err(AppError::DocumentNotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: &ObjectId) -> Result<()> {
        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        if result.deleted_count == 0 {
            return Err(AppError::DocumentNotFound);
        }
        Ok(())
    }
}

pub struct MongoOtpRepository {
    collection: Collection<OtpRecord>,
}

impl MongoOtpRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(OTP_COLLECTION),
        }
    }
}

#[async_trait]
impl OtpRepository for MongoOtpRepository {
    async fn upsert(&self, record: OtpRecord) -> Result<OtpRecord> {
        let filter = doc! {
            "kind": record.kind.as_str(),
            "destination": &record.destination,
        };

        self.collection
            .find_one_and_replace(filter, &record)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| map_write_error(e, "otp"))?
            .ok_or_else(|| AppError::Unacknowledged("otp upsert returned no document".into()))
    }

    async fn find_active(
        &self,
        kind: OtpKind,
        destination: &str,
        now: DateTime,
    ) -> Result<Option<OtpRecord>> {
        Ok(self
            .collection
            .find_one(doc! {
                "kind": kind.as_str(),
                "destination": destination,
                "expires_at": { "$gt": now },
            })
            .await?)
    }

    async fn record_failed_attempt(&self, id: &ObjectId) -> Result<()> {
        self.collection
            .update_one(doc! { "_id": id }, doc! { "$inc": { "attempts": 1 } })
            .await?;
        Ok(())
    }

    async fn consume(&self, record: &OtpRecord) -> Result<bool> {
        let Some(id) = record.id else {
            return Ok(false);
        };
        let result = self
            .collection
            .delete_one(doc! { "_id": id, "code_hash": &record.code_hash })
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn delete_for(&self, kind: OtpKind, destination: &str) -> Result<()> {
        self.collection
            .delete_many(doc! { "kind": kind.as_str(), "destination": destination })
            .await?;
        Ok(())
    }
}

pub struct MongoPasswordResetRepository {
    collection: Collection<PasswordReset>,
}

impl MongoPasswordResetRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(PASSWORD_RESET_COLLECTION),
        }
    }
}

#[async_trait]
impl PasswordResetRepository for MongoPasswordResetRepository {
    async fn upsert_for_user(
        &self,
        user_id: &ObjectId,
        now: DateTime,
        expires_at: DateTime,
    ) -> Result<PasswordReset> {
        self.collection
            .find_one_and_update(
                doc! { "user_id": user_id },
                doc! { "$set": { "created_at": now, "expires_at": expires_at } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| map_write_error(e, "password reset"))?
            .ok_or_else(|| {
                AppError::Unacknowledged("password reset upsert returned no document".into())
            })
    }

    async fn find_active(&self, id: &ObjectId, now: DateTime) -> Result<Option<PasswordReset>> {
        Ok(self
            .collection
            .find_one(doc! { "_id": id, "expires_at": { "$gt": now } })
            .await?)
    }

    async fn consume(&self, id: &ObjectId) -> Result<bool> {
        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count == 1)
    }
}
