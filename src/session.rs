use crate::store::generate_session_id;
use axum_extra::extract::cookie::{Cookie, Key, SameSite};
use axum_extra::extract::SignedCookieJar;
use sha2::{Digest, Sha512};
use tracing::debug;

pub const SESSION_COOKIE_NAME: &str = "resellio_sid";

const SESSION_MAX_AGE_DAYS: i64 = 30;

/// Signing key for session cookies. `Key::from` wants 64 bytes of material,
/// so the configured secret is stretched through SHA-512.
pub fn cookie_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

pub fn session_id(jar: &SignedCookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE_NAME)
        .map(|cookie| cookie.value().to_string())
        .filter(|id| !id.is_empty())
}

/// Returns the caller's session id, issuing a fresh signed cookie if needed.
pub fn ensure_session(jar: SignedCookieJar) -> (SignedCookieJar, String) {
    if let Some(id) = session_id(&jar) {
        return (jar, id);
    }

    let id = generate_session_id();
    debug!("Issuing new client session: {}", id);

    let cookie = Cookie::build((SESSION_COOKIE_NAME, id.clone()))
        .http_only(true)
        .secure(false) // Set to true in production with HTTPS
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::days(SESSION_MAX_AGE_DAYS))
        .build();

    (jar.add(cookie), id)
}
