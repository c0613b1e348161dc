//! Auth Capability
//!
//! Bearer-token user resolution against the hosted auth backend.
//! Consumed only by the billing entry points; the webhook path
//! identifies users by phone number instead.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

/// Error types for auth lookups
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid or expired token")]
    Unauthorized,

    #[error("Auth backend error: {0}")]
    Backend(String),
}

/// Identity returned by the auth backend
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Token-to-user resolution capability
#[async_trait]
pub trait UserAuth: Send + Sync {
    async fn get_user(&self, bearer_token: &str) -> Result<AuthUser, AuthError>;
}

/// HTTP implementation against the hosted auth endpoint
pub struct HttpUserAuth {
    base_url: String,
    client: reqwest::Client,
}

impl HttpUserAuth {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl UserAuth for HttpUserAuth {
    async fn get_user(&self, bearer_token: &str) -> Result<AuthUser, AuthError> {
        let url = format!("{}/auth/v1/user", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(bearer_token)
            .send()
            .await
            .map_err(|e| AuthError::Backend(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AuthError::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(AuthError::Backend(format!(
                "auth returned {}",
                response.status()
            )));
        }

        response
            .json::<AuthUser>()
            .await
            .map_err(|e| AuthError::Backend(e.to_string()))
    }
}

/// Static token table for tests
pub struct StaticUserAuth {
    tokens: HashMap<String, AuthUser>,
}

impl StaticUserAuth {
    pub fn new() -> Self {
        Self {
            tokens: HashMap::new(),
        }
    }

    pub fn with_token(mut self, token: &str, user: AuthUser) -> Self {
        self.tokens.insert(token.to_string(), user);
        self
    }
}

impl Default for StaticUserAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserAuth for StaticUserAuth {
    async fn get_user(&self, bearer_token: &str) -> Result<AuthUser, AuthError> {
        self.tokens
            .get(bearer_token)
            .cloned()
            .ok_or(AuthError::Unauthorized)
    }
}
