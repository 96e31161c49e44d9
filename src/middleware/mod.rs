pub mod auth;
pub mod confirmation;
pub mod permissions;

pub use auth::{require_access, AccessGuard, RefreshGuard, REFRESH_TOKEN_HEADER};
pub use confirmation::PasswordConfirmed;
pub use permissions::Authorized;
