use std::sync::Arc;

use mongodb::bson::DateTime;
use rand::Rng;

use crate::config::OtpConfig;
use crate::database::OtpRepository;
use crate::errors::{AppError, Result};
use crate::models::expires_after;
use crate::models::otp::{OtpKind, OtpRecord};
use crate::services::password::PasswordHasher;

const INVALID_CODE: &str = "Invalid or expired code";

/// A numeric code of exactly `length` digits. Leading zeros are kept.
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Issues and checks single-use one-time codes. Only a bcrypt hash of the
/// code is stored.
#[derive(Clone)]
pub struct OtpService {
    otps: Arc<dyn OtpRepository>,
    hasher: PasswordHasher,
    config: OtpConfig,
}

impl OtpService {
    pub fn new(otps: Arc<dyn OtpRepository>, hasher: PasswordHasher, config: OtpConfig) -> Self {
        Self {
            otps,
            hasher,
            config,
        }
    }

    pub fn config(&self) -> &OtpConfig {
        &self.config
    }

    /// Store a fresh code for `destination`, replacing any earlier one, and
    /// return it in plain text for mailing.
    pub async fn issue(&self, kind: OtpKind, destination: &str) -> Result<String> {
        let code = generate_code(self.config.length);
        let now = DateTime::now();

        let record = OtpRecord {
            id: None,
            kind,
            destination: destination.to_string(),
            code_hash: self.hasher.hash(&code).await?,
            attempts: 0,
            expires_at: expires_after(now, self.config.expires_in),
            created_at: now,
        };

        self.otps.upsert(record).await?;
        tracing::info!(kind = kind.as_str(), %destination, "otp issued");
        Ok(code)
    }

    /// Check `code` and consume the record on success.
    pub async fn validate(&self, kind: OtpKind, destination: &str, code: &str) -> Result<()> {
        if code.len() != self.config.length || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AppError::unauthorized(INVALID_CODE));
        }

        let record = self
            .otps
            .find_active(kind, destination, DateTime::now())
            .await?
            .ok_or_else(|| AppError::unauthorized(INVALID_CODE))?;

        if record.attempts >= self.config.max_attempts {
            self.otps.consume(&record).await?;
            tracing::warn!(kind = kind.as_str(), %destination, "otp locked after too many attempts");
            return Err(AppError::unauthorized(INVALID_CODE));
        }

        if !self.hasher.verify(code, &record.code_hash).await? {
            if let Some(id) = record.id {
                self.otps.record_failed_attempt(&id).await?;
            }
            tracing::debug!(kind = kind.as_str(), %destination, "otp mismatch");
            return Err(AppError::unauthorized(INVALID_CODE));
        }

        // Another request may have used the same code in the meantime.
        if !self.otps.consume(&record).await? {
            return Err(AppError::unauthorized(INVALID_CODE));
        }

        Ok(())
    }

    /// Drop any pending code for `destination`, used or not.
    pub async fn revoke(&self, kind: OtpKind, destination: &str) -> Result<()> {
        self.otps.delete_for(kind, destination).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::database::memory::MemoryOtpRepository;

    fn service_with(expires_in: Duration) -> OtpService {
        OtpService::new(
            Arc::new(MemoryOtpRepository::default()),
            PasswordHasher::new(4),
            OtpConfig {
                length: 6,
                expires_in,
                max_attempts: 3,
            },
        )
    }

    fn service() -> OtpService {
        service_with(Duration::from_secs(600))
    }

    fn wrong(code: &str) -> String {
        let last = if code.ends_with('0') { '1' } else { '0' };
        format!("{}{}", &code[..code.len() - 1], last)
    }

    #[test]
    fn codes_have_exact_length_and_are_numeric() {
        for length in [4, 6, 10] {
            let code = generate_code(length);
            assert_eq!(code.len(), length);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn code_validates_only_once() {
        let otp = service();
        let code = otp.issue(OtpKind::ForgotPassword, "a@example.com").await.unwrap();

        otp.validate(OtpKind::ForgotPassword, "a@example.com", &code)
            .await
            .unwrap();
        let err = otp
            .validate(OtpKind::ForgotPassword, "a@example.com", &code)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));
    }

    #[tokio::test]
    async fn code_is_bound_to_kind_and_destination() {
        let otp = service();
        let code = otp.issue(OtpKind::Registration, "a@example.com").await.unwrap();

        assert!(otp
            .validate(OtpKind::ForgotPassword, "a@example.com", &code)
            .await
            .is_err());
        assert!(otp
            .validate(OtpKind::Registration, "b@example.com", &code)
            .await
            .is_err());
        otp.validate(OtpKind::Registration, "a@example.com", &code)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn too_many_wrong_attempts_burn_the_code() {
        let otp = service();
        let code = otp.issue(OtpKind::ForgotPassword, "a@example.com").await.unwrap();

        for _ in 0..3 {
            assert!(otp
                .validate(OtpKind::ForgotPassword, "a@example.com", &wrong(&code))
                .await
                .is_err());
        }

        // The right code no longer helps once the limit is reached.
        assert!(otp
            .validate(OtpKind::ForgotPassword, "a@example.com", &code)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn expired_code_is_rejected() {
        let otp = service_with(Duration::from_millis(0));
        let code = otp.issue(OtpKind::ForgotPassword, "a@example.com").await.unwrap();

        assert!(otp
            .validate(OtpKind::ForgotPassword, "a@example.com", &code)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn newer_code_replaces_older_one() {
        let otp = service();
        let first = otp.issue(OtpKind::ForgotPassword, "a@example.com").await.unwrap();
        let second = otp.issue(OtpKind::ForgotPassword, "a@example.com").await.unwrap();

        if first != second {
            assert!(otp
                .validate(OtpKind::ForgotPassword, "a@example.com", &first)
                .await
                .is_err());
        }
        otp.validate(OtpKind::ForgotPassword, "a@example.com", &second)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn malformed_code_is_rejected_without_counting() {
        let otp = service();
        let code = otp.issue(OtpKind::ForgotPassword, "a@example.com").await.unwrap();

        for bad in ["", "12ab56", "1234567"] {
            assert!(otp
                .validate(OtpKind::ForgotPassword, "a@example.com", bad)
                .await
                .is_err());
        }
        for _ in 0..5 {
            let _ = otp
                .validate(OtpKind::ForgotPassword, "a@example.com", "abc")
                .await;
        }
        otp.validate(OtpKind::ForgotPassword, "a@example.com", &code)
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_validations_have_one_winner() {
        let otp = service();

        for round in 0..8 {
            let destination = format!("race{round}@example.com");
            let code = otp.issue(OtpKind::ForgotPassword, &destination).await.unwrap();

            let attempts: Vec<_> = (0..2)
                .map(|_| {
                    let otp = otp.clone();
                    let destination = destination.clone();
                    let code = code.clone();
                    tokio::spawn(async move {
                        otp.validate(OtpKind::ForgotPassword, &destination, &code).await
                    })
                })
                .collect();

            let mut winners = 0;
            for attempt in attempts {
                if attempt.await.unwrap().is_ok() {
                    winners += 1;
                }
            }
            assert_eq!(winners, 1, "round {round}");
        }
    }

    #[tokio::test]
    async fn revoked_code_no_longer_validates() {
        let otp = service();
        let code = otp.issue(OtpKind::Registration, "a@example.com").await.unwrap();

        otp.revoke(OtpKind::Registration, "a@example.com").await.unwrap();
        assert!(otp
            .validate(OtpKind::Registration, "a@example.com", &code)
            .await
            .is_err());

        // Nothing pending is fine too.
        otp.revoke(OtpKind::Registration, "a@example.com").await.unwrap();
    }
}
