use std::sync::Arc;

use mongodb::bson::{oid::ObjectId, DateTime};
use validator::Validate;

use crate::database::Stores;
use crate::errors::{AppError, Result};
use crate::middleware::PasswordConfirmed;
use crate::models::administrator::{normalize_email, CreateAdministrator};
use crate::models::otp::OtpKind;
use crate::models::user::CreateUser;
use crate::models::{Administrator, Authenticatable, User};
use crate::permissions::{default_user_permissions, validate_grants};
use crate::services::mail_service::{otp_message, Mailer};
use crate::services::otp_service::OtpService;
use crate::services::password::{validate_new_password, PasswordHasher};

/// Account lifecycle: registration, profile management and the sensitive
/// changes that need a fresh password confirmation.
#[derive(Clone)]
pub struct AccountService {
    stores: Stores,
    otp: OtpService,
    mailer: Arc<dyn Mailer>,
    hasher: PasswordHasher,
}

impl AccountService {
    pub fn new(stores: Stores, otp: OtpService, mailer: Arc<dyn Mailer>, hasher: PasswordHasher) -> Self {
        Self {
            stores,
            otp,
            mailer,
            hasher,
        }
    }

    /// Mail a registration code to `email` unless an account already uses it.
    pub async fn request_registration(&self, email: &str) -> Result<()> {
        let email = User::normalize_identity(email)?;
        if self.stores.users.find_by_identity(&email).await?.is_some() {
            return Err(AppError::DuplicateKey(User::IDENTITY_FIELD.to_string()));
        }

        let code = self.otp.issue(OtpKind::Registration, &email).await?;
        self.mailer
            .send(otp_message(
                OtpKind::Registration,
                &email,
                &code,
                self.otp.config().expires_in,
            ))
            .await
    }

    pub async fn register_user(&self, input: CreateUser, code: &str) -> Result<User> {
        input.validate()?;
        let email = User::normalize_identity(&input.email)?;

        self.otp.validate(OtpKind::Registration, &email, code).await?;

        let now = DateTime::now();
        let user = self
            .stores
            .users
            .insert(User {
                id: None,
                email,
                name: input.name.trim().to_string(),
                password_hash: self.hasher.hash(&input.password).await?,
                permissions: default_user_permissions(),
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(entity_id = ?user.id, "user registered");
        Ok(user)
    }

    pub async fn create_administrator(&self, input: CreateAdministrator) -> Result<Administrator> {
        input.validate()?;
        let username = Administrator::normalize_identity(&input.username)?;
        let permissions = validate_grants(&input.permissions)?;

        let now = DateTime::now();
        let admin = self
            .stores
            .administrators
            .insert(Administrator {
                id: None,
                username,
                email: normalize_email(&input.email),
                password_hash: self.hasher.hash(&input.password).await?,
                permissions,
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(entity_id = ?admin.id, "administrator created");
        Ok(admin)
    }

    pub async fn get<E: Authenticatable>(&self, id: &str) -> Result<E> {
        let id = ObjectId::parse_str(id)?;
        self.stores
            .entities::<E>()
            .find_by_id(&id)
            .await?
            .ok_or(AppError::DocumentNotFound)
    }

    pub async fn list<E: Authenticatable>(&self) -> Result<Vec<E>> {
        self.stores.entities::<E>().list().await
    }

    pub async fn update_profile<E: Authenticatable>(&self, id: &str, patch: E::Patch) -> Result<E> {
        patch.validate()?;
        let id = ObjectId::parse_str(id)?;
        self.stores.entities::<E>().update_profile(&id, &patch).await
    }

    /// Delete another account by id, e.g. from an administration route that
    /// already passed `Authorized`.
    pub async fn remove<E: Authenticatable>(&self, id: &str) -> Result<()> {
        let id = ObjectId::parse_str(id)?;
        self.stores.entities::<E>().delete(&id).await?;
        tracing::info!(kind = %E::KIND, entity_id = %id, "account removed");
        Ok(())
    }

    pub async fn change_password<E: Authenticatable>(
        &self,
        confirmed: PasswordConfirmed<E>,
        new_password: &str,
    ) -> Result<()> {
        validate_new_password(new_password)?;
        let id = confirmed.entity().require_id()?;

        let hash = self.hasher.hash(new_password).await?;
        self.stores.entities::<E>().update_password(&id, &hash).await?;

        tracing::info!(kind = %E::KIND, entity_id = %id, "password changed");
        Ok(())
    }

    /// Change the login handle (email for users, username for
    /// administrators). Taken handles fail with a conflict.
    pub async fn change_identity<E: Authenticatable>(
        &self,
        confirmed: PasswordConfirmed<E>,
        new_identity: &str,
    ) -> Result<E> {
        let identity = E::normalize_identity(new_identity)?;
        let mut entity = confirmed.into_inner();
        let id = entity.require_id()?;

        self.stores
            .entities::<E>()
            .update_identity(&id, &identity)
            .await?;

        entity.set_identity(identity);
        entity.touch(DateTime::now());
        tracing::info!(kind = %E::KIND, entity_id = %id, "identity changed");
        Ok(entity)
    }

    /// Delete the confirmed account along with codes still pending for its
    /// email.
    pub async fn delete<E: Authenticatable>(&self, confirmed: PasswordConfirmed<E>) -> Result<()> {
        let entity = confirmed.into_inner();
        let id = entity.require_id()?;
        self.stores.entities::<E>().delete(&id).await?;

        for kind in OtpKind::ALL {
            self.otp.revoke(kind, entity.email()).await?;
        }
        tracing::info!(kind = %E::KIND, entity_id = %id, "account deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support;
    use crate::models::user::UpdateUser;
    use crate::permissions::USER_READ_OWN;
    use crate::services::mail_service::test_support::RecordingMailer;

    struct Fixture {
        accounts: AccountService,
        mailer: Arc<RecordingMailer>,
        hasher: PasswordHasher,
    }

    fn fixture() -> Fixture {
        let config = test_support::config();
        let stores = Stores::memory();
        let hasher = PasswordHasher::new(4);
        let mailer = Arc::new(RecordingMailer::default());
        let otp = OtpService::new(stores.otps.clone(), hasher, config.otp.clone());

        Fixture {
            accounts: AccountService::new(stores, otp, mailer.clone(), hasher),
            mailer,
            hasher,
        }
    }

    fn signup(email: &str) -> CreateUser {
        CreateUser {
            email: email.to_string(),
            name: "Ada".to_string(),
            password: "correct horse".to_string(),
        }
    }

    async fn registered(f: &Fixture, email: &str) -> User {
        f.accounts.request_registration(email).await.unwrap();
        let code = f.mailer.last_code().unwrap();
        f.accounts.register_user(signup(email), &code).await.unwrap()
    }

    #[tokio::test]
    async fn registration_needs_the_mailed_code() {
        let f = fixture();
        f.accounts.request_registration("Ada@Example.com").await.unwrap();
        assert_eq!(f.mailer.sent()[0].to, "ada@example.com");

        let err = f
            .accounts
            .register_user(signup("ada@example.com"), "000000x")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));

        let code = f.mailer.last_code().unwrap();
        let user = f
            .accounts
            .register_user(signup("ada@example.com"), &code)
            .await
            .unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert!(user.permissions.contains(&USER_READ_OWN.to_string()));
        assert!(f.hasher.verify("correct horse", &user.password_hash).await.unwrap());
    }

    #[tokio::test]
    async fn taken_email_cannot_register_again() {
        let f = fixture();
        registered(&f, "ada@example.com").await;

        let err = f
            .accounts
            .request_registration("ada@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn invalid_signup_is_rejected_before_the_code_is_used() {
        let f = fixture();
        f.accounts.request_registration("ada@example.com").await.unwrap();
        let code = f.mailer.last_code().unwrap();

        let mut input = signup("ada@example.com");
        input.password = "short".to_string();
        let err = f.accounts.register_user(input, &code).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        f.accounts
            .register_user(signup("ada@example.com"), &code)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn administrator_grants_must_be_known() {
        let f = fixture();
        let input = CreateAdministrator {
            username: "Root".to_string(),
            email: "root@example.com".to_string(),
            password: "long admin password".to_string(),
            permissions: vec!["user:read:any".to_string(), "user:fly:any".to_string()],
        };
        let err = f.accounts.create_administrator(input).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let input = CreateAdministrator {
            username: "Root".to_string(),
            email: "root@example.com".to_string(),
            password: "long admin password".to_string(),
            permissions: vec!["user:read:any".to_string()],
        };
        let admin = f.accounts.create_administrator(input).await.unwrap();
        assert_eq!(admin.username, "root");

        let listed = f.accounts.list::<Administrator>().await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn profile_lookup_and_update() {
        let f = fixture();
        let user = registered(&f, "ada@example.com").await;
        let id = user.id.unwrap().to_hex();

        let updated = f
            .accounts
            .update_profile::<User>(
                &id,
                UpdateUser {
                    name: Some("Ada L.".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Ada L.");

        let fetched = f.accounts.get::<User>(&id).await.unwrap();
        assert_eq!(fetched.name, "Ada L.");

        let err = f.accounts.get::<User>("zzz").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidObjectId(_)));
        let err = f
            .accounts
            .get::<User>(&ObjectId::new().to_hex())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DocumentNotFound));
    }

    #[tokio::test]
    async fn sensitive_changes_go_through_confirmation() {
        let f = fixture();
        let ada = registered(&f, "ada@example.com").await;
        registered(&f, "bob@example.com").await;

        f.accounts
            .change_password(PasswordConfirmed::new(ada.clone()), "a new password")
            .await
            .unwrap();
        let stored = f.accounts.get::<User>(&ada.id.unwrap().to_hex()).await.unwrap();
        assert!(f.hasher.verify("a new password", &stored.password_hash).await.unwrap());

        let err = f
            .accounts
            .change_identity(PasswordConfirmed::new(stored.clone()), "bob@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateKey(_)));

        let renamed = f
            .accounts
            .change_identity(PasswordConfirmed::new(stored.clone()), "ADA@new.example.com")
            .await
            .unwrap();
        assert_eq!(renamed.email, "ada@new.example.com");

        f.accounts
            .delete(PasswordConfirmed::new(renamed))
            .await
            .unwrap();
        let err = f
            .accounts
            .get::<User>(&ada.id.unwrap().to_hex())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DocumentNotFound));
    }

    #[tokio::test]
    async fn deleting_an_account_drops_its_pending_codes() {
        let f = fixture();
        let ada = registered(&f, "ada@example.com").await;
        let code = f
            .accounts
            .otp
            .issue(OtpKind::ForgotPassword, "ada@example.com")
            .await
            .unwrap();

        f.accounts.delete(PasswordConfirmed::new(ada)).await.unwrap();

        let err = f
            .accounts
            .otp
            .validate(OtpKind::ForgotPassword, "ada@example.com", &code)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));
    }
}
