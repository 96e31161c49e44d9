// config.rs
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::errors::{AppError, Result};
use crate::models::entity::EntityKind;

const MIN_JWT_SECRET_LEN: usize = 32;
const MIN_COOKIE_SECRET_LEN: usize = 64;

/// Secret and lifetime of one kind of signed token.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub secret: String,
    pub expires_in: Duration,
}

/// JWT settings for one authenticatable entity kind.
#[derive(Debug, Clone)]
pub struct EntityTokenConfig {
    pub access: TokenSettings,
    pub refresh: TokenSettings,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub secret: String,
    pub secure: bool,
}

#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub length: usize,
    pub expires_in: Duration,
    pub max_attempts: i32,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
    pub from_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub user: EntityTokenConfig,
    pub administrator: EntityTokenConfig,
    pub cookie: CookieConfig,
    pub confirmation: TokenSettings,
    pub otp: OtpConfig,
    pub password_reset_expires_in: Duration,
    pub bcrypt_cost: u32,
    pub mail: MailConfig,
}

impl AuthConfig {
    /// Load and validate configuration from the process environment
    /// (and a `.env` file, when present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from a fixed set of variables.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup: &lookup };

        let config = AuthConfig {
            user: vars.entity_tokens("USER", "user")?,
            administrator: vars.entity_tokens("ADMIN", "administration")?,
            cookie: CookieConfig {
                secret: vars.required("COOKIE_SECRET")?,
                secure: vars.bool_or("COOKIE_SECURE", true)?,
            },
            confirmation: TokenSettings {
                secret: vars.required("PASSWORD_CONFIRMATION_SECRET")?,
                expires_in: vars.duration_or("PASSWORD_CONFIRMATION_EXPIRES_IN", "5m")?,
            },
            otp: OtpConfig {
                length: vars.number_or("OTP_LENGTH", 6)?,
                expires_in: vars.duration_or("OTP_EXPIRES_IN", "10m")?,
                max_attempts: vars.number_or("OTP_MAX_ATTEMPTS", 3)?,
            },
            password_reset_expires_in: vars.duration_or("PASSWORD_RESET_EXPIRES_IN", "15m")?,
            bcrypt_cost: vars.number_or("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            mail: MailConfig {
                api_url: vars.required("MAIL_API_URL")?,
                api_key: vars.required("MAIL_API_KEY")?,
                from: vars.required("MAIL_FROM")?,
                from_name: vars.optional("MAIL_FROM_NAME"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn tokens_for(&self, kind: EntityKind) -> &EntityTokenConfig {
        match kind {
            EntityKind::User => &self.user,
            EntityKind::Administrator => &self.administrator,
        }
    }

    fn validate(&self) -> Result<()> {
        for (prefix, tokens) in [("USER", &self.user), ("ADMIN", &self.administrator)] {
            check_secret(&format!("{}_JWT_ACCESS_SECRET", prefix), &tokens.access.secret)?;
            check_secret(&format!("{}_JWT_REFRESH_SECRET", prefix), &tokens.refresh.secret)?;
            if tokens.access.secret == tokens.refresh.secret {
                return Err(AppError::configuration(format!(
                    "{}_JWT_ACCESS_SECRET and {}_JWT_REFRESH_SECRET must differ",
                    prefix, prefix
                )));
            }
        }

        check_secret("PASSWORD_CONFIRMATION_SECRET", &self.confirmation.secret)?;

        if self.cookie.secret.len() < MIN_COOKIE_SECRET_LEN {
            return Err(AppError::configuration(format!(
                "COOKIE_SECRET must be at least {} bytes",
                MIN_COOKIE_SECRET_LEN
            )));
        }

        if !(4..=10).contains(&self.otp.length) {
            return Err(AppError::configuration("OTP_LENGTH must be between 4 and 10"));
        }

        if self.otp.max_attempts < 1 {
            return Err(AppError::configuration("OTP_MAX_ATTEMPTS must be positive"));
        }

        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(AppError::configuration("BCRYPT_COST must be between 4 and 31"));
        }

        Ok(())
    }
}

fn check_secret(name: &str, secret: &str) -> Result<()> {
    if secret.len() < MIN_JWT_SECRET_LEN {
        return Err(AppError::configuration(format!(
            "{} must be at least {} bytes",
            name, MIN_JWT_SECRET_LEN
        )));
    }
    Ok(())
}

struct Vars<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key)
            .ok_or_else(|| AppError::configuration(format!("{} must be set", key)))
    }

    fn duration_or(&self, key: &str, default: &str) -> Result<Duration> {
        let raw = self.optional(key).unwrap_or_else(|| default.to_string());
        humantime::parse_duration(&raw)
            .map_err(|e| AppError::configuration(format!("{} is not a duration: {}", key, e)))
    }

    fn number_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(raw) => raw
                .parse()
                .map_err(|e| AppError::configuration(format!("{} must be a number: {}", key, e))),
            None => Ok(default),
        }
    }

    fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.optional(key).as_deref() {
            None => Ok(default),
            Some("true") | Some("1") => Ok(true),
            Some("false") | Some("0") => Ok(false),
            Some(other) => Err(AppError::configuration(format!(
                "{} must be true or false, got {}",
                key, other
            ))),
        }
    }

    fn entity_tokens(&self, prefix: &str, default_audience: &str) -> Result<EntityTokenConfig> {
        Ok(EntityTokenConfig {
            access: TokenSettings {
                secret: self.required(&format!("{}_JWT_ACCESS_SECRET", prefix))?,
                expires_in: self.duration_or(&format!("{}_JWT_ACCESS_EXPIRES_IN", prefix), "15m")?,
            },
            refresh: TokenSettings {
                secret: self.required(&format!("{}_JWT_REFRESH_SECRET", prefix))?,
                expires_in: self.duration_or(&format!("{}_JWT_REFRESH_EXPIRES_IN", prefix), "7d")?,
            },
            issuer: self
                .optional(&format!("{}_JWT_ISSUER", prefix))
                .unwrap_or_else(|| "tenant-auth".to_string()),
            audience: self
                .optional(&format!("{}_JWT_AUDIENCE", prefix))
                .unwrap_or_else(|| default_audience.to_string()),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::vars;
    use super::*;

    #[test]
    fn loads_defaults() {
        let config = AuthConfig::from_map(&vars()).unwrap();
        assert_eq!(config.user.access.expires_in, Duration::from_secs(15 * 60));
        assert_eq!(config.user.refresh.expires_in, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(config.administrator.audience, "administration");
        assert_eq!(config.otp.length, 6);
        assert_eq!(config.otp.max_attempts, 3);
        assert!(!config.cookie.secure);
        assert!(config.mail.from_name.is_none());
    }

    #[test]
    fn parses_humantime_durations() {
        let mut vars = vars();
        vars.insert("USER_JWT_ACCESS_EXPIRES_IN".into(), "90s".into());
        vars.insert("OTP_EXPIRES_IN".into(), "2h".into());
        let config = AuthConfig::from_map(&vars).unwrap();
        assert_eq!(config.user.access.expires_in, Duration::from_secs(90));
        assert_eq!(config.otp.expires_in, Duration::from_secs(7200));
    }

    #[test]
    fn rejects_missing_secret() {
        let mut vars = vars();
        vars.remove("ADMIN_JWT_REFRESH_SECRET");
        let err = AuthConfig::from_map(&vars).unwrap_err();
        assert!(err.to_string().contains("ADMIN_JWT_REFRESH_SECRET"));
    }

    #[test]
    fn rejects_shared_access_and_refresh_secret() {
        let mut vars = vars();
        let access = vars["USER_JWT_ACCESS_SECRET"].clone();
        vars.insert("USER_JWT_REFRESH_SECRET".into(), access);
        assert!(AuthConfig::from_map(&vars).is_err());
    }

    #[test]
    fn rejects_short_cookie_secret() {
        let mut vars = vars();
        vars.insert("COOKIE_SECRET".into(), "short".into());
        assert!(AuthConfig::from_map(&vars).is_err());
    }

    #[test]
    fn rejects_out_of_range_otp_length() {
        let mut vars = vars();
        vars.insert("OTP_LENGTH".into(), "12".into());
        assert!(AuthConfig::from_map(&vars).is_err());
    }

    #[test]
    fn rejects_bad_duration() {
        let mut vars = vars();
        vars.insert("OTP_EXPIRES_IN".into(), "soon".into());
        assert!(AuthConfig::from_map(&vars).is_err());
    }
}
