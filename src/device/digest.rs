//! HTTP digest authentication state
//!
//! The device challenges every unauthenticated request with a `401` and a
//! `WWW-Authenticate: Digest ...` header. The most recent challenge is cached so
//! later requests can authenticate up front. The nonce count advances on every
//! response computed from it.

use super::DeviceError;
use digest_auth::{AuthContext, WwwAuthenticateHeader};
use reqwest::header::{HeaderMap, WWW_AUTHENTICATE};
use std::sync::Mutex;

/// Digest credentials plus the last challenge seen from the device
pub struct DigestAuth {
    username: String,
    password: String,
    challenge: Mutex<Option<WwwAuthenticateHeader>>,
}

impl DigestAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            challenge: Mutex::new(None),
        }
    }

    /// Whether a challenge has been cached yet
    pub fn has_challenge(&self) -> bool {
        self.lock().is_some()
    }

    /// Store the digest challenge from a `401` response's headers
    pub fn accept_challenge(&self, headers: &HeaderMap) -> Result<(), DeviceError> {
        let raw = digest_challenge(headers).ok_or(DeviceError::MissingChallenge)?;
        let parsed =
            digest_auth::parse(raw).map_err(|e| DeviceError::InvalidChallenge(e.to_string()))?;
        *self.lock() = Some(parsed);
        Ok(())
    }

    /// Forget the cached challenge, e.g. after it was rejected
    pub fn clear(&self) {
        *self.lock() = None;
    }

    /// `Authorization` header value for a request target, if a challenge is known
    pub fn authorization(&self, request_target: &str) -> Result<Option<String>, DeviceError> {
        let mut guard = self.lock();
        let Some(challenge) = guard.as_mut() else {
            return Ok(None);
        };

        let context = AuthContext::new(
            self.username.as_str(),
            self.password.as_str(),
            request_target,
        );
        let answer = challenge
            .respond(&context)
            .map_err(|e| DeviceError::InvalidChallenge(e.to_string()))?;
        Ok(Some(answer.to_header_string()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<WwwAuthenticateHeader>> {
        // The guarded value is always left consistent, so a poisoned lock is still usable
        self.challenge
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for DigestAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestAuth")
            .field("username", &self.username)
            .field("password", &"***")
            .field("has_challenge", &self.has_challenge())
            .finish()
    }
}

/// First `WWW-Authenticate` value using the digest scheme
fn digest_challenge(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| {
            value
                .get(..6)
                .is_some_and(|scheme| scheme.eq_ignore_ascii_case("digest"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    const CHALLENGE: &str =
        r#"Digest realm="Login to 7K0ABC", qop="auth", nonce="1234567890", opaque="5ccc""#;

    fn headers_with(values: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for value in values {
            headers.append(WWW_AUTHENTICATE, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn test_no_authorization_before_challenge() {
        let auth = DigestAuth::new("admin", "secret");
        assert!(!auth.has_challenge());
        assert_eq!(auth.authorization("/cgi-bin/x.cgi").unwrap(), None);
    }

    #[test]
    fn test_authorization_after_challenge() {
        let auth = DigestAuth::new("admin", "secret");
        auth.accept_challenge(&headers_with(&[CHALLENGE])).unwrap();
        assert!(auth.has_challenge());

        let header = auth
            .authorization("/cgi-bin/configManager.cgi?action=setConfig")
            .unwrap()
            .unwrap();
        assert!(header.starts_with("Digest "));
        assert!(header.contains(r#"username="admin""#));
        assert!(header.contains(r#"realm="Login to 7K0ABC""#));
        assert!(header.contains(r#"uri="/cgi-bin/configManager.cgi?action=setConfig""#));
        assert!(!header.contains("secret"));
    }

    #[test]
    fn test_nonce_count_advances() {
        let auth = DigestAuth::new("admin", "secret");
        auth.accept_challenge(&headers_with(&[CHALLENGE])).unwrap();

        let first = auth.authorization("/a").unwrap().unwrap();
        let second = auth.authorization("/a").unwrap().unwrap();
        assert!(first.contains("nc=00000001"));
        assert!(second.contains("nc=00000002"));
    }

    #[test]
    fn test_digest_preferred_over_basic() {
        let auth = DigestAuth::new("admin", "secret");
        auth.accept_challenge(&headers_with(&[r#"Basic realm="x""#, CHALLENGE]))
            .unwrap();
        assert!(auth.has_challenge());
    }

    #[test]
    fn test_basic_only_challenge_rejected() {
        let auth = DigestAuth::new("admin", "secret");
        let result = auth.accept_challenge(&headers_with(&[r#"Basic realm="x""#]));
        assert!(matches!(result, Err(DeviceError::MissingChallenge)));
    }

    #[test]
    fn test_clear_forgets_challenge() {
        let auth = DigestAuth::new("admin", "secret");
        auth.accept_challenge(&headers_with(&[CHALLENGE])).unwrap();
        auth.clear();
        assert!(!auth.has_challenge());
    }

    #[test]
    fn test_debug_hides_password() {
        let auth = DigestAuth::new("admin", "secret");
        let debug = format!("{auth:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("secret"));
    }
}
