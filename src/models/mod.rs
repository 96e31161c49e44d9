use std::time::Duration;

use chrono::{TimeZone, Utc};
use mongodb::bson::DateTime;

pub mod administrator;
pub mod claims;
pub mod entity;
pub mod otp;
pub mod password_reset;
pub mod user;

pub use administrator::Administrator;
pub use entity::{Authenticatable, EntityKind};
pub use user::User;

/// `now + ttl`, in the store's millisecond resolution.
pub fn expires_after(now: DateTime, ttl: Duration) -> DateTime {
    let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    DateTime::from_millis(now.timestamp_millis().saturating_add(ttl_millis))
}

pub fn to_rfc3339(value: DateTime) -> String {
    Utc.timestamp_millis_opt(value.timestamp_millis())
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}
