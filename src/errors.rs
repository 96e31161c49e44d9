// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    #[error("Invalid ObjectId: {0}")]
    InvalidObjectId(String),

    #[error("Document not found")]
    DocumentNotFound,

    #[error("{0} is already taken")]
    DuplicateKey(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Missing permission: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Write was not acknowledged: {0}")]
    Unacknowledged(String),

    #[error("Mail error: {0}")]
    MailError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = self.label();

        // Server-side causes stay in the logs.
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            error_message.to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": error_message,
            "message": message,
            "success": false,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

impl From<mongodb::bson::oid::Error> for AppError {
    fn from(err: mongodb::bson::oid::Error) -> Self {
        AppError::InvalidObjectId(err.to_string())
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::InternalServerError(format!("Password hashing failed: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::MailError(format!("HTTP request failed: {}", err))
    }
}

// Helper conversion functions
impl AppError {
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        AppError::ValidationError(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::AuthError(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::ConfigurationError(msg.into())
    }

    pub fn internal_server_error(msg: impl Into<String>) -> Self {
        AppError::InternalServerError(msg.into())
    }

    pub fn mail(msg: impl Into<String>) -> Self {
        AppError::MailError(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidObjectId(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::DocumentNotFound => StatusCode::NOT_FOUND,
            AppError::DuplicateKey(_) => StatusCode::CONFLICT,
            AppError::MailError(_) => StatusCode::BAD_GATEWAY,
            AppError::MongoDB(_)
            | AppError::Unacknowledged(_)
            | AppError::ConfigurationError(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            AppError::MongoDB(_) | AppError::Unacknowledged(_) => "Database error",
            AppError::InvalidObjectId(_) => "Invalid ID format",
            AppError::DocumentNotFound => "Document not found",
            AppError::DuplicateKey(_) => "Duplicate entry",
            AppError::AuthError(_) => "Authentication failed",
            AppError::Forbidden(_) => "Forbidden",
            AppError::ValidationError(_) => "Validation failed",
            AppError::MailError(_) => "Mail delivery failed",
            AppError::ConfigurationError(_) => "Configuration error",
            AppError::InternalServerError(_) => "Internal server error",
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
