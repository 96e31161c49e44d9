pub mod account_service;
pub mod auth_service;
pub mod confirmation_service;
pub mod cookie_service;
pub mod forgot_password_service;
pub mod mail_service;
pub mod otp_service;
pub mod password;
pub mod token_service;
