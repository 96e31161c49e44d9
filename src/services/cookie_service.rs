use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};

use crate::config::CookieConfig;
use crate::errors::{AppError, Result};
use crate::models::entity::EntityKind;
use crate::services::auth_service::Session;
use crate::services::token_service::IssuedToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookiePurpose {
    AccessToken,
    RefreshToken,
    PasswordConfirmation,
}

impl CookiePurpose {
    fn suffix(&self) -> &'static str {
        match self {
            CookiePurpose::AccessToken => "access_token",
            CookiePurpose::RefreshToken => "refresh_token",
            CookiePurpose::PasswordConfirmation => "password_confirmation",
        }
    }
}

pub fn cookie_name(kind: EntityKind, purpose: CookiePurpose) -> String {
    format!("{}_{}", kind.as_str(), purpose.suffix())
}

/// Signed, httpOnly, `SameSite=Lax` cookies carrying auth tokens.
#[derive(Clone)]
pub struct CookieService {
    key: Key,
    secure: bool,
}

impl CookieService {
    pub fn new(config: &CookieConfig) -> Result<Self> {
        let key = Key::try_from(config.secret.as_bytes())
            .map_err(|e| AppError::configuration(format!("COOKIE_SECRET is unusable: {}", e)))?;
        Ok(Self {
            key,
            secure: config.secure,
        })
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn jar(&self, headers: &HeaderMap) -> SignedCookieJar {
        SignedCookieJar::from_headers(headers, self.key.clone())
    }

    /// Value of a cookie whose signature checks out.
    pub fn read(&self, jar: &SignedCookieJar, kind: EntityKind, purpose: CookiePurpose) -> Option<String> {
        jar.get(&cookie_name(kind, purpose))
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
    }

    pub fn with_token(
        &self,
        jar: SignedCookieJar,
        kind: EntityKind,
        purpose: CookiePurpose,
        token: &IssuedToken,
    ) -> SignedCookieJar {
        let max_age = i64::try_from(token.max_age.as_secs()).unwrap_or(i64::MAX);
        let cookie = Cookie::build((cookie_name(kind, purpose), token.token.clone()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(time::Duration::seconds(max_age));

        jar.add(cookie)
    }

    pub fn with_access(&self, jar: SignedCookieJar, kind: EntityKind, token: &IssuedToken) -> SignedCookieJar {
        self.with_token(jar, kind, CookiePurpose::AccessToken, token)
    }

    pub fn with_refresh(&self, jar: SignedCookieJar, kind: EntityKind, token: &IssuedToken) -> SignedCookieJar {
        self.with_token(jar, kind, CookiePurpose::RefreshToken, token)
    }

    pub fn with_confirmation(
        &self,
        jar: SignedCookieJar,
        kind: EntityKind,
        token: &IssuedToken,
    ) -> SignedCookieJar {
        self.with_token(jar, kind, CookiePurpose::PasswordConfirmation, token)
    }

    pub fn with_session(&self, jar: SignedCookieJar, kind: EntityKind, session: &Session) -> SignedCookieJar {
        let jar = self.with_access(jar, kind, &session.access);
        self.with_refresh(jar, kind, &session.refresh)
    }

    pub fn clear(&self, jar: SignedCookieJar, kind: EntityKind, purpose: CookiePurpose) -> SignedCookieJar {
        jar.remove(Cookie::build(cookie_name(kind, purpose)).path("/"))
    }

    /// Logout: drop the token cookies and any pending password confirmation.
    pub fn clear_session(&self, jar: SignedCookieJar, kind: EntityKind) -> SignedCookieJar {
        [
            CookiePurpose::AccessToken,
            CookiePurpose::RefreshToken,
            CookiePurpose::PasswordConfirmation,
        ]
        .into_iter()
        .fold(jar, |jar, purpose| self.clear(jar, kind, purpose))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{request_headers, set_cookie_lines};
    use super::*;
    use crate::config::test_support;
    use chrono::Utc;
    use std::time::Duration;

    fn service() -> CookieService {
        CookieService::new(&test_support::config().cookie).unwrap()
    }

    fn token(value: &str) -> IssuedToken {
        IssuedToken {
            token: value.to_string(),
            expires_at: Utc::now(),
            max_age: Duration::from_secs(300),
        }
    }

    #[test]
    fn names_are_scoped_by_kind() {
        assert_eq!(
            cookie_name(EntityKind::User, CookiePurpose::AccessToken),
            "user_access_token"
        );
        assert_eq!(
            cookie_name(EntityKind::Administrator, CookiePurpose::PasswordConfirmation),
            "administrator_password_confirmation"
        );
    }

    #[test]
    fn cookie_attributes() {
        let cookies = service();
        let jar = cookies.with_token(
            cookies.jar(&HeaderMap::new()),
            EntityKind::User,
            CookiePurpose::AccessToken,
            &token("abc"),
        );

        let lines = set_cookie_lines(jar);
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert!(line.starts_with("user_access_token="));
        assert!(line.contains("HttpOnly"));
        assert!(line.contains("SameSite=Lax"));
        assert!(line.contains("Path=/"));
        assert!(line.contains("Max-Age=300"));
        // The signed value is not the raw token.
        assert!(!line.starts_with("user_access_token=abc;"));
    }

    #[test]
    fn signed_value_round_trips() {
        let cookies = service();
        let jar = cookies.with_token(
            cookies.jar(&HeaderMap::new()),
            EntityKind::User,
            CookiePurpose::RefreshToken,
            &token("refresh-value"),
        );

        let incoming = cookies.jar(&request_headers(jar));
        assert_eq!(
            cookies.read(&incoming, EntityKind::User, CookiePurpose::RefreshToken),
            Some("refresh-value".to_string())
        );
        assert_eq!(
            cookies.read(&incoming, EntityKind::Administrator, CookiePurpose::RefreshToken),
            None
        );
    }

    #[test]
    fn unsigned_cookie_is_ignored() {
        let cookies = service();
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            "user_access_token=forged".parse().unwrap(),
        );

        let jar = cookies.jar(&headers);
        assert_eq!(
            cookies.read(&jar, EntityKind::User, CookiePurpose::AccessToken),
            None
        );
    }

    #[test]
    fn clear_session_removes_all_three_cookies() {
        let cookies = service();
        let jar = cookies.jar(&HeaderMap::new());
        let jar = cookies.with_access(jar, EntityKind::User, &token("a"));
        let jar = cookies.with_refresh(jar, EntityKind::User, &token("r"));
        let jar = cookies.with_confirmation(jar, EntityKind::User, &token("c"));

        // Removal only applies to cookies the request carried.
        let incoming = cookies.jar(&request_headers(jar));
        let lines = set_cookie_lines(cookies.clear_session(incoming, EntityKind::User));
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().any(|l| l.starts_with("user_password_confirmation=")));
        assert!(lines.iter().all(|l| l.contains("Max-Age=0")));
    }
}
