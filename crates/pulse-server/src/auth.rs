//! Token validation at WebSocket upgrade.
//!
//! The server consumes `validate(token)` through a trait so the credential
//! store stays a collaborator. Tokens are checked once at upgrade;
//! revocation is not re-checked mid-session.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// Who a validated token belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Stable user identifier, used for per-user topics.
    pub user_id: String,
}

/// Why a token was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No token was supplied with the upgrade request.
    #[error("missing token")]
    MissingToken,
    /// The token is unknown, expired, or revoked.
    #[error("invalid token")]
    InvalidToken,
}

/// Validates bearer tokens presented at upgrade.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Resolve a token to an identity, or reject it.
    async fn validate(&self, token: &str) -> Result<Identity, AuthError>;
}

/// In-memory validator over a fixed token → user map.
///
/// Used by the daemon for single-tenant deployments and by tests.
#[derive(Debug, Default)]
pub struct StaticTokenValidator {
    tokens: HashMap<String, String>,
}

impl StaticTokenValidator {
    /// Create an empty validator (rejects everything).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as belonging to `user_id`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        let _ = self.tokens.insert(token.into(), user_id.into());
        self
    }
}

#[async_trait]
impl TokenValidator for StaticTokenValidator {
    async fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        self.tokens
            .get(token)
            .map(|user_id| Identity {
                user_id: user_id.clone(),
            })
            .ok_or(AuthError::InvalidToken)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
