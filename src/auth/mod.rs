//! Authorization Gate: Basic credentials, the static token list and admin checks.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::ListCache;
use crate::config::AuthConfig;
use crate::database::{DatabaseError, UserRepository};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingHeader,

    #[error("Malformed Authorization header: {0}")]
    MalformedHeader(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Principal/secret pair decoded from a request; never persisted
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub principal: String,
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("principal", &self.principal)
            .field("secret", &"***")
            .finish()
    }
}

impl Credentials {
    /// Decode `Authorization: Basic base64(principal:secret)`
    pub fn from_header(headers: &HeaderMap) -> Result<Self, AuthError> {
        let value = headers.get(AUTHORIZATION).ok_or(AuthError::MissingHeader)?;
        let value = value
            .to_str()
            .map_err(|_| AuthError::MalformedHeader("header is not valid ASCII".to_string()))?;

        let (scheme, encoded) = value
            .trim()
            .split_once(' ')
            .ok_or_else(|| AuthError::MalformedHeader("expected 'Basic <credentials>'".to_string()))?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(AuthError::MalformedHeader(format!("unsupported scheme '{}'", scheme)));
        }

        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| AuthError::MalformedHeader("credentials are not valid base64".to_string()))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| AuthError::MalformedHeader("credentials are not valid UTF-8".to_string()))?;

        let (principal, secret) = decoded
            .split_once(':')
            .ok_or_else(|| AuthError::MalformedHeader("credentials must be 'user:password'".to_string()))?;
        if principal.is_empty() {
            return Err(AuthError::MalformedHeader("empty principal".to_string()));
        }

        Ok(Self {
            principal: principal.to_string(),
            secret: secret.to_string(),
        })
    }

    pub fn to_header_value(&self) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:{}", self.principal, self.secret)))
    }
}

/// Authenticated actor attached to each request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Token,
    User { username: String },
}

impl Principal {
    pub fn is_token(&self) -> bool {
        matches!(self, Principal::Token)
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Principal::Token => None,
            Principal::User { username } => Some(username),
        }
    }
}

#[derive(Clone)]
pub struct AuthGate {
    cache: Arc<ListCache>,
    users: UserRepository,
    token_principal: String,
}

impl AuthGate {
    pub fn new(cache: Arc<ListCache>, users: UserRepository, config: &AuthConfig) -> Self {
        Self {
            cache,
            users,
            token_principal: config.token_principal.clone(),
        }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let credentials = Credentials::from_header(headers)?;

        if credentials.principal == self.token_principal {
            return if self.cache.has_token(&credentials.secret).await {
                debug!("authenticated with static token");
                Ok(Principal::Token)
            } else {
                Err(AuthError::InvalidCredentials)
            };
        }

        let user = self
            .users
            .find(&credentials.principal)
            .await?
            .filter(|u| u.is_active())
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(&credentials.secret, &user.password).await? {
            return Err(AuthError::InvalidCredentials);
        }

        debug!(user = %user.username, "authenticated with password");
        Ok(Principal::User { username: user.username })
    }

    /// Tokens are never admin
    pub async fn is_admin(&self, principal: &Principal) -> bool {
        match principal.username() {
            Some(username) => self.cache.is_admin(username).await,
            None => false,
        }
    }

    pub async fn require_admin(&self, principal: &Principal) -> Result<(), AuthError> {
        if self.is_admin(principal).await {
            Ok(())
        } else {
            Err(AuthError::Forbidden("Admin privileges required".to_string()))
        }
    }

    pub async fn require_admin_or_token(&self, principal: &Principal) -> Result<(), AuthError> {
        if principal.is_token() || self.is_admin(principal).await {
            Ok(())
        } else {
            Err(AuthError::Forbidden("Admin or token credentials required".to_string()))
        }
    }
}

/// Salted argon2 PHC string, computed off the async runtime
pub async fn hash_password(password: &str) -> Result<String, DatabaseError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| DatabaseError::Hashing(e.to_string()))
    })
    .await
    .map_err(|e| DatabaseError::Hashing(e.to_string()))?
}

pub async fn verify_password(password: &str, stored_hash: &str) -> Result<bool, DatabaseError> {
    let password = password.to_string();
    let stored_hash = stored_hash.to_string();
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored_hash).map_err(|e| DatabaseError::Hashing(e.to_string()))?;
        Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
    })
    .await
    .map_err(|e| DatabaseError::Hashing(e.to_string()))?
}

/// One token per non-empty trimmed line
pub fn parse_tokens(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Token list per configuration; empty when tokens are disabled
pub async fn load_tokens(config: &AuthConfig) -> std::io::Result<Vec<String>> {
    if !config.tokens_enabled {
        return Ok(Vec::new());
    }
    match &config.tokens_path {
        Some(path) => read_tokens(path).await,
        None => {
            warn!("TOKENS_ENABLED is set but TOKENS_PATH is not; no tokens loaded");
            Ok(Vec::new())
        }
    }
}

async fn read_tokens(path: &Path) -> std::io::Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path).await?;
    Ok(parse_tokens(&contents))
}
