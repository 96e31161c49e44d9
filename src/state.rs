use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use crate::config::AuthConfig;
use crate::database::Stores;
use crate::errors::Result;
use crate::services::account_service::AccountService;
use crate::services::auth_service::AuthService;
use crate::services::confirmation_service::PasswordConfirmationService;
use crate::services::cookie_service::CookieService;
use crate::services::forgot_password_service::ForgotPasswordService;
use crate::services::mail_service::Mailer;
use crate::services::otp_service::OtpService;
use crate::services::password::PasswordHasher;
use crate::services::token_service::TokenService;

/// Everything the guards and services share. Cheap to clone.
///
/// Embed it in an application state and implement `FromRef` for it to use
/// the guards there.
#[derive(Clone)]
pub struct AuthState {
    pub config: Arc<AuthConfig>,
    pub stores: Stores,
    pub tokens: TokenService,
    pub cookies: CookieService,
    pub hasher: PasswordHasher,
    pub mailer: Arc<dyn Mailer>,
}

impl AuthState {
    pub fn new(config: AuthConfig, stores: Stores, mailer: Arc<dyn Mailer>) -> Result<Self> {
        let config = Arc::new(config);
        Ok(AuthState {
            tokens: TokenService::new(config.clone()),
            cookies: CookieService::new(&config.cookie)?,
            hasher: PasswordHasher::new(config.bcrypt_cost),
            config,
            stores,
            mailer,
        })
    }

    pub fn otp(&self) -> OtpService {
        OtpService::new(self.stores.otps.clone(), self.hasher, self.config.otp.clone())
    }

    pub fn auth(&self) -> AuthService {
        AuthService::new(self.stores.clone(), self.tokens.clone(), self.hasher)
    }

    pub fn confirmation(&self) -> PasswordConfirmationService {
        PasswordConfirmationService::new(self.tokens.clone(), self.hasher)
    }

    pub fn forgot_password(&self) -> ForgotPasswordService {
        ForgotPasswordService::new(
            self.stores.clone(),
            self.otp(),
            self.mailer.clone(),
            self.hasher,
            self.config.password_reset_expires_in,
        )
    }

    pub fn accounts(&self) -> AccountService {
        AccountService::new(self.stores.clone(), self.otp(), self.mailer.clone(), self.hasher)
    }
}

impl FromRef<AuthState> for Key {
    fn from_ref(state: &AuthState) -> Self {
        state.cookies.key().clone()
    }
}
