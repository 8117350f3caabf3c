//! # Identity Resolution
//!
//! Sessions are issued elsewhere; this server only maps a bearer token to a user
//! id through a [`SessionStore`]. When no session is present and the dev
//! fallback is enabled, requests act as the fixed [`DEV_USER_ID`].
//!
//! ## Outcomes of [`authenticate_request`]
//!
//! | Session | `allow_dev_fallback` | `required` | Result |
//! |---------|----------------------|------------|--------|
//! | valid   | any                  | any        | the session's user |
//! | none    | true                 | any        | the dev identity |
//! | none    | false                | true       | 401 |
//! | none    | false                | false      | anonymous (`None`) |
//!
//! An unknown token counts as "no session".

use axum::http::{header::AUTHORIZATION, HeaderMap};
use std::collections::HashMap;

use crate::response::ApiError;

pub const DEV_USER_ID: &str = "dev-user";

const BEARER_PREFIX: &str = "Bearer ";
const MAX_TOKEN_LENGTH: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    /// Substituted dev identity rather than a real session.
    pub is_dev: bool,
}

impl Identity {
    pub fn dev() -> Self {
        Self {
            user_id: DEV_USER_ID.to_string(),
            is_dev: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AuthOptions {
    pub allow_dev_fallback: bool,
    pub required: bool,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            allow_dev_fallback: true,
            required: true,
        }
    }
}

/// Bearer tokens mapped to user ids.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: HashMap<String, String>,
}

impl SessionStore {
    pub fn new(sessions: HashMap<String, String>) -> Self {
        Self { sessions }
    }

    pub fn resolve(&self, token: &str) -> Option<&str> {
        self.sessions.get(token).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix(BEARER_PREFIX)?.trim();
    if token.is_empty() || token.len() > MAX_TOKEN_LENGTH {
        return None;
    }
    Some(token)
}

pub fn authenticate_request(
    headers: &HeaderMap,
    sessions: &SessionStore,
    options: AuthOptions,
) -> Result<Option<Identity>, ApiError> {
    if let Some(token) = bearer_token(headers) {
        match sessions.resolve(token) {
            Some(user_id) => {
                return Ok(Some(Identity {
                    user_id: user_id.to_string(),
                    is_dev: false,
                }))
            }
            None => tracing::debug!("bearer token does not match a session"),
        }
    }

    if options.allow_dev_fallback {
        return Ok(Some(Identity::dev()));
    }
    if options.required {
        return Err(ApiError::unauthorized("Authentication required"));
    }
    Ok(None)
}

/// The user id a request may act on. Callers act on their own records; the dev
/// identity may act on whichever `user_id` it names.
pub fn resolve_owner(identity: &Identity, requested: Option<&str>) -> Result<String, ApiError> {
    let requested = requested.map(str::trim).filter(|id| !id.is_empty());
    match requested {
        None => Ok(identity.user_id.clone()),
        Some(id) if id == identity.user_id => Ok(identity.user_id.clone()),
        Some(id) if identity.is_dev => Ok(id.to_string()),
        Some(_) => Err(ApiError::forbidden("Cannot access another user's data")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};

    fn sessions() -> SessionStore {
        SessionStore::new(HashMap::from([("tok-1".to_string(), "user-1".to_string())]))
    }

    fn with_bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    const STRICT: AuthOptions = AuthOptions {
        allow_dev_fallback: false,
        required: true,
    };

    #[test]
    fn test_valid_session_wins_over_fallback() {
        let identity = authenticate_request(&with_bearer("tok-1"), &sessions(), AuthOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(identity.user_id, "user-1");
        assert!(!identity.is_dev);
    }

    #[test]
    fn test_missing_session_falls_back_to_dev_identity() {
        let identity = authenticate_request(&HeaderMap::new(), &sessions(), AuthOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(identity, Identity::dev());

        let unknown = authenticate_request(&with_bearer("nope"), &sessions(), AuthOptions::default())
            .unwrap()
            .unwrap();
        assert!(unknown.is_dev);
    }

    #[test]
    fn test_required_without_fallback_is_401() {
        let err = authenticate_request(&HeaderMap::new(), &sessions(), STRICT).unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.code, Some("UNAUTHORIZED"));
    }

    #[test]
    fn test_optional_without_fallback_is_anonymous() {
        let options = AuthOptions {
            required: false,
            ..STRICT
        };
        assert_eq!(
            authenticate_request(&HeaderMap::new(), &sessions(), options).unwrap(),
            None
        );
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&with_bearer("abc")), Some("abc"));
        let mut basic = HeaderMap::new();
        basic.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&basic), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_resolve_owner() {
        let user = Identity {
            user_id: "user-1".into(),
            is_dev: false,
        };
        assert_eq!(resolve_owner(&user, None).unwrap(), "user-1");
        assert_eq!(resolve_owner(&user, Some("user-1")).unwrap(), "user-1");
        assert_eq!(
            resolve_owner(&user, Some("user-2")).unwrap_err().status,
            StatusCode::FORBIDDEN
        );

        let dev = Identity::dev();
        assert_eq!(resolve_owner(&dev, Some("user-2")).unwrap(), "user-2");
        assert_eq!(resolve_owner(&dev, Some("  ")).unwrap(), DEV_USER_ID);
    }
}
