//! Credentials for transports that talk to protected endpoints.

use lazy_static::lazy_static;

/// Name of the environment variable holding the bearer token.
pub const AUTH_TOKEN_ENV: &str = "EDFS_AUTH_TOKEN";

#[derive(Clone, Default)]
pub struct SecurityContext {
    bearer_token: Option<String>,
}

impl SecurityContext {
    pub fn new(bearer_token: Option<String>) -> Self {
        Self {
            bearer_token: bearer_token.filter(|t| !t.is_empty()),
        }
    }

    /// Reads the token from [AUTH_TOKEN_ENV], if set.
    pub fn from_env() -> Self {
        Self::new(std::env::var(AUTH_TOKEN_ENV).ok())
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext")
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

lazy_static! {
    static ref SECURITY_CONTEXT: SecurityContext = SecurityContext::from_env();
}

/// The process-wide security context, initialized from the environment on
/// first access.
pub fn security_context() -> &'static SecurityContext {
    &SECURITY_CONTEXT
}
