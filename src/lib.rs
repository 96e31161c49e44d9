//! Authentication and authorization core for a multi-tenant web backend:
//! JWT sessions for users and administrators, signed cookies, password
//! confirmation, one-time codes and a static permission table.

pub mod config;
pub mod database;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod permissions;
pub mod services;
pub mod state;
pub mod telemetry;

pub use config::AuthConfig;
pub use errors::{AppError, Result};
pub use state::AuthState;
