use serde::Deserialize;
use validator::Validate;

use crate::errors::{AppError, Result};

#[derive(Debug, Deserialize, Validate)]
pub struct NewPassword {
    #[validate(length(min = 8, max = 128, message = "Password must be 8 to 128 characters"))]
    pub password: String,
}

pub fn validate_new_password(password: &str) -> Result<()> {
    NewPassword {
        password: password.to_string(),
    }
    .validate()?;
    Ok(())
}

/// bcrypt hashing, run on the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub async fn hash(&self, plain: &str) -> Result<String> {
        let plain = plain.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(plain, cost))
            .await
            .map_err(|e| AppError::internal_server_error(format!("Hashing task failed: {}", e)))?
            .map_err(AppError::from)
    }

    pub async fn verify(&self, plain: &str, hash: &str) -> Result<bool> {
        let plain = plain.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || bcrypt::verify(plain, &hash))
            .await
            .map_err(|e| AppError::internal_server_error(format!("Hashing task failed: {}", e)))?
            .map_err(AppError::from)
    }
}
