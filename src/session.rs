//! Anonymous browser sessions carried in a signed cookie.
//!
//! The cookie holds nothing but the session id. Sessions have no server side
//! record; the id is only a lookup key for the registry and the rate limiter.

use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use sha2::{Digest, Sha512};
use tracing::warn;
use uuid::Uuid;

pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Signing key derived from the configured secret.
/// An empty secret yields a random key, so cookies do not survive a restart.
pub fn cookie_key(secret: &str) -> Key {
    if secret.is_empty() {
        warn!("No cookie secret configured; sessions will not survive a restart");
        return Key::generate();
    }
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

/// Session id from a validly signed cookie
pub fn session_id(jar: &SignedCookieJar, cookie_name: &str) -> Option<String> {
    jar.get(cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// Attach the session cookie to the response
pub fn bind(jar: SignedCookieJar, cookie_name: &str, session_id: &str) -> SignedCookieJar {
    let cookie = Cookie::build((cookie_name.to_string(), session_id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    jar.add(cookie)
}
