//! Authorization for tourbook routes
//!
//! Token issuance and validation happen upstream. An [`AuthProvider`] only
//! turns request headers into an [`AuthContext`]; routes then check it
//! against an [`AuthPolicy`].

use crate::core::document::Document;
use crate::core::error::{AppError, AppResult, RequestError, ValidationError};
use crate::core::model::Model;
use async_trait::async_trait;
use axum::http::HeaderMap;
use std::sync::Arc;

/// Header carrying the id of the authenticated user
pub const USER_ID_HEADER: &str = "x-user-id";

const NOT_LOGGED_IN: &str = "You are not logged in! Please log in to get access.";
const NOT_PERMITTED: &str = "You do not have permission to perform this action";
const USER_GONE: &str = "The user belonging to this token does no longer exist.";
const INVALID_IDENTITY: &str = "Invalid token. Please log in again!";

/// Authorization context extracted from a request
#[derive(Debug, Clone, PartialEq)]
pub enum AuthContext {
    /// Authenticated user
    User { user_id: String, role: String },

    /// No authentication (public access)
    Anonymous,
}

impl AuthContext {
    /// Get user_id if available
    pub fn user_id(&self) -> Option<&str> {
        match self {
            AuthContext::User { user_id, .. } => Some(user_id),
            AuthContext::Anonymous => None,
        }
    }

    pub fn role(&self) -> Option<&str> {
        match self {
            AuthContext::User { role, .. } => Some(role),
            AuthContext::Anonymous => None,
        }
    }

    /// The user id, or 401 for anonymous callers
    pub fn require_user(&self) -> AppResult<&str> {
        self.user_id().ok_or_else(|| {
            RequestError::Unauthorized {
                message: NOT_LOGGED_IN.to_string(),
            }
            .into()
        })
    }
}

/// Authorization policy for an operation
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AuthPolicy {
    /// Public access (no auth required)
    #[default]
    Public,

    /// Any authenticated user
    Authenticated,

    /// User must have one of these roles
    HasRole(Vec<String>),
}

impl AuthPolicy {
    pub fn roles<S: AsRef<str>>(roles: &[S]) -> Self {
        AuthPolicy::HasRole(roles.iter().map(|r| r.as_ref().to_string()).collect())
    }

    /// Check if auth context satisfies this policy
    pub fn check(&self, context: &AuthContext) -> bool {
        match self {
            AuthPolicy::Public => true,
            AuthPolicy::Authenticated => !matches!(context, AuthContext::Anonymous),
            AuthPolicy::HasRole(required) => context
                .role()
                .is_some_and(|role| required.iter().any(|r| r == role)),
        }
    }

    /// Like [`check`](Self::check), but with 401 for anonymous callers and
    /// 403 for authenticated callers lacking a role
    pub fn authorize(&self, context: &AuthContext) -> AppResult<()> {
        if self.check(context) {
            return Ok(());
        }
        let err = match context {
            AuthContext::Anonymous => RequestError::Unauthorized {
                message: NOT_LOGGED_IN.to_string(),
            },
            AuthContext::User { .. } => RequestError::Forbidden {
                message: NOT_PERMITTED.to_string(),
            },
        };
        Err(err.into())
    }
}

/// Turns request headers into an [`AuthContext`]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn extract_context(&self, headers: &HeaderMap) -> AppResult<AuthContext>;
}

/// Provider that treats every caller as anonymous
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthProvider;

#[async_trait]
impl AuthProvider for NoAuthProvider {
    async fn extract_context(&self, _headers: &HeaderMap) -> AppResult<AuthContext> {
        Ok(AuthContext::Anonymous)
    }
}

/// Provider trusting the user id forwarded by an authenticating gateway.
///
/// The id is resolved against the user model, so deactivated or deleted
/// users are rejected and the role always comes from the stored record.
pub struct HeaderAuthProvider {
    users: Arc<Model>,
}

impl HeaderAuthProvider {
    pub fn new(users: Arc<Model>) -> Self {
        Self { users }
    }

    fn context_for(user: &Document, user_id: &str) -> AuthContext {
        let role = user
            .get("role")
            .and_then(|r| r.as_str())
            .unwrap_or("user")
            .to_string();
        AuthContext::User {
            user_id: user_id.to_string(),
            role,
        }
    }
}

#[async_trait]
impl AuthProvider for HeaderAuthProvider {
    async fn extract_context(&self, headers: &HeaderMap) -> AppResult<AuthContext> {
        let Some(raw) = headers.get(USER_ID_HEADER) else {
            return Ok(AuthContext::Anonymous);
        };
        let unauthorized = |message: &str| -> AppError {
            RequestError::Unauthorized {
                message: message.to_string(),
            }
            .into()
        };
        let user_id = raw
            .to_str()
            .map(str::trim)
            .map_err(|_| unauthorized(INVALID_IDENTITY))?;

        match self.users.find_by_id(user_id).await {
            Ok(Some(user)) => Ok(Self::context_for(&user, user_id)),
            Ok(None) => Err(unauthorized(USER_GONE)),
            Err(AppError::Validation(ValidationError::Cast { .. })) => {
                Err(unauthorized(INVALID_IDENTITY))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: &str) -> AuthContext {
        AuthContext::User {
            user_id: "u1".into(),
            role: role.into(),
        }
    }

    #[test]
    fn test_policy_check() {
        assert!(AuthPolicy::Public.check(&AuthContext::Anonymous));
        assert!(!AuthPolicy::Authenticated.check(&AuthContext::Anonymous));
        assert!(AuthPolicy::Authenticated.check(&user("user")));

        let staff = AuthPolicy::roles(&["admin", "lead-guide"]);
        assert!(staff.check(&user("lead-guide")));
        assert!(!staff.check(&user("guide")));
        assert!(!staff.check(&AuthContext::Anonymous));
    }

    #[test]
    fn test_authorize_distinguishes_401_and_403() {
        let staff = AuthPolicy::roles(&["admin"]);

        let err = staff.authorize(&AuthContext::Anonymous).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);

        let err = staff.authorize(&user("user")).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), NOT_PERMITTED);
    }

    #[test]
    fn test_require_user() {
        assert_eq!(user("guide").require_user().unwrap(), "u1");
        assert!(AuthContext::Anonymous.require_user().is_err());
    }

    #[tokio::test]
    async fn test_no_auth_provider_extract_context() {
        let ctx = NoAuthProvider.extract_context(&HeaderMap::new()).await.unwrap();
        assert_eq!(ctx, AuthContext::Anonymous);
    }
}
