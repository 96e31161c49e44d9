use std::sync::Arc;
use std::time::Duration;

use mongodb::bson::{oid::ObjectId, DateTime};

use crate::database::Stores;
use crate::errors::{AppError, Result};
use crate::models::otp::OtpKind;
use crate::models::password_reset::PasswordReset;
use crate::models::{expires_after, Authenticatable, User};
use crate::services::mail_service::{otp_message, Mailer};
use crate::services::otp_service::OtpService;
use crate::services::password::{validate_new_password, PasswordHasher};

/// Forgot-password flows. Codes go to the entity's email address.
///
/// Administrators reset in one step with the code. Users first trade the
/// code for a short-lived reset record, then set the new password with it.
#[derive(Clone)]
pub struct ForgotPasswordService {
    stores: Stores,
    otp: OtpService,
    mailer: Arc<dyn Mailer>,
    hasher: PasswordHasher,
    reset_expires_in: Duration,
}

impl ForgotPasswordService {
    pub fn new(
        stores: Stores,
        otp: OtpService,
        mailer: Arc<dyn Mailer>,
        hasher: PasswordHasher,
        reset_expires_in: Duration,
    ) -> Self {
        Self {
            stores,
            otp,
            mailer,
            hasher,
            reset_expires_in,
        }
    }

    async fn find<E: Authenticatable>(&self, identity: &str) -> Result<E> {
        let identity = E::normalize_identity(identity)?;
        self.stores
            .entities::<E>()
            .find_by_identity(&identity)
            .await?
            .ok_or(AppError::DocumentNotFound)
    }

    pub async fn send_otp<E: Authenticatable>(&self, identity: &str) -> Result<()> {
        let entity: E = self.find(identity).await?;
        let destination = entity.email();

        let code = self.otp.issue(OtpKind::ForgotPassword, destination).await?;
        self.mailer
            .send(otp_message(
                OtpKind::ForgotPassword,
                destination,
                &code,
                self.otp.config().expires_in,
            ))
            .await?;

        tracing::info!(kind = %E::KIND, entity_id = ?entity.id(), "password reset code sent");
        Ok(())
    }

    /// One-step reset: check the code and set the new password.
    pub async fn reset_with_otp<E: Authenticatable>(
        &self,
        identity: &str,
        code: &str,
        new_password: &str,
    ) -> Result<()> {
        validate_new_password(new_password)?;
        let entity: E = self.find(identity).await?;
        let id = entity.require_id()?;

        self.otp
            .validate(OtpKind::ForgotPassword, entity.email(), code)
            .await?;

        let hash = self.hasher.hash(new_password).await?;
        self.stores.entities::<E>().update_password(&id, &hash).await?;

        tracing::info!(kind = %E::KIND, entity_id = %id, "password reset");
        Ok(())
    }

    /// Trade a valid code for a reset record. A newer verification replaces
    /// any earlier record for the same user.
    pub async fn verify_otp(&self, email: &str, code: &str) -> Result<PasswordReset> {
        let user: User = self.find(email).await?;
        let user_id = user.require_id()?;

        self.otp
            .validate(OtpKind::ForgotPassword, &user.email, code)
            .await?;

        let now = DateTime::now();
        self.stores
            .password_resets
            .upsert_for_user(&user_id, now, expires_after(now, self.reset_expires_in))
            .await
    }

    pub async fn reset_password(&self, reset_id: &str, new_password: &str) -> Result<()> {
        validate_new_password(new_password)?;
        let reset_id = ObjectId::parse_str(reset_id)?;

        let reset = self
            .stores
            .password_resets
            .find_active(&reset_id, DateTime::now())
            .await?
            .ok_or(AppError::DocumentNotFound)?;

        // Single use: only the request that removes the record may proceed.
        if !self.stores.password_resets.consume(&reset_id).await? {
            return Err(AppError::DocumentNotFound);
        }

        let hash = self.hasher.hash(new_password).await?;
        self.stores.users.update_password(&reset.user_id, &hash).await?;

        tracing::info!(entity_id = %reset.user_id, "user password reset");
        Ok(())
    }
}
