use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub can_write: bool,
}

impl Identity {
    pub fn anonymous() -> Self { Self { name: "anonymous".into(), can_write: false } }
    pub fn writer(name: impl Into<String>) -> Self { Self { name: name.into(), can_write: true } }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    Anonymous,
}

impl Credentials {
    /// Read `Authorization: Bearer <token>` from request headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| Self::Bearer(t.trim().to_string()))
            .unwrap_or(Self::Anonymous)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;
    async fn authorize(&self, identity: &Identity, action: Action) -> ServerResult<bool>;
}

/// Grants every request write access. Used when no API key is configured.
pub struct AllowAllAuth;

#[async_trait]
impl AuthProvider for AllowAllAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Bearer(_) => Ok(Identity::writer("bearer")),
            Credentials::Anonymous => Ok(Identity::writer("anonymous")),
        }
    }

    async fn authorize(&self, _identity: &Identity, _action: Action) -> ServerResult<bool> {
        Ok(true)
    }
}

/// Requires a static bearer key for writes. Reads stay public.
pub struct ApiKeyAuth {
    key: String,
}

impl ApiKeyAuth {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Byte comparison whose duration does not depend on where inputs differ.
fn keys_match(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[async_trait]
impl AuthProvider for ApiKeyAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Bearer(token) if keys_match(token, &self.key) => {
                Ok(Identity::writer("api-key"))
            }
            Credentials::Bearer(_) => Err(ServerError::Unauthorized("invalid API key".into())),
            Credentials::Anonymous => Ok(Identity::anonymous()),
        }
    }

    async fn authorize(&self, identity: &Identity, action: Action) -> ServerResult<bool> {
        Ok(match action {
            Action::Read => true,
            Action::Write => identity.can_write,
        })
    }
}

/// Extractor that admits only callers allowed to write.
#[derive(Debug)]
pub struct WriteAccess(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for WriteAccess {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credentials = Credentials::from_headers(&parts.headers);
        let identity = state.auth.authenticate(&credentials).await?;
        if !state.auth.authorize(&identity, Action::Write).await? {
            return Err(ServerError::Unauthorized("write access requires an API key".into()));
        }
        Ok(Self(identity))
    }
}
