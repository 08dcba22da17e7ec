use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::auth::{hash_password, Principal};
use crate::config::AuthConfig;
use crate::database::{DatabaseError, User, UserRepository};
use crate::error::ApiError;
use crate::server::AppState;
use crate::types::UserAction;

/// Body of `POST /user/:action`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserRequest {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub pass: Option<String>,
    #[serde(default)]
    pub admin: Option<bool>,
}

impl UserRequest {
    fn username(&self) -> Result<&str, ApiError> {
        match self.user.as_deref().map(str::trim) {
            Some(user) if !user.is_empty() => Ok(user),
            _ => Err(ApiError::validation("Field 'user' is required")),
        }
    }

    fn password(&self) -> Result<Option<&str>, ApiError> {
        match self.pass.as_deref() {
            Some("") => Err(ApiError::validation("Field 'pass' must not be empty")),
            other => Ok(other),
        }
    }
}

pub struct UserService<'a> {
    state: &'a AppState,
    actor: &'a Principal,
}

impl<'a> UserService<'a> {
    pub fn new(state: &'a AppState, actor: &'a Principal) -> Self {
        Self { state, actor }
    }

    pub async fn execute(&self, action: UserAction, request: UserRequest) -> Result<Value, ApiError> {
        self.state.gate.require_admin_or_token(self.actor).await?;
        let username = request.username()?;

        let result = match action {
            UserAction::Create => self.create(username, &request).await?,
            UserAction::Read => return self.read(username).await,
            UserAction::Update => self.update(username, &request).await?,
            UserAction::Delete => self.delete(username).await?,
            UserAction::Restore => self.restore(username).await?,
            UserAction::Drop => self.drop(username).await?,
        };

        self.state.refresh_cache().await;
        Ok(result)
    }

    async fn create(&self, username: &str, request: &UserRequest) -> Result<Value, ApiError> {
        let password = request
            .password()?
            .ok_or_else(|| ApiError::validation("Field 'pass' is required"))?;

        // Only admins can mint admins; tokens and everyone else get a plain account
        let actor_is_admin = self.state.gate.is_admin(self.actor).await;
        let admin = request.admin.unwrap_or(false) && actor_is_admin;
        if request.admin == Some(true) && !admin {
            warn!(user = username, "admin flag ignored for non-admin actor");
        }

        let hash = hash_password(password).await?;
        let user = self.state.users.create(username, &hash, admin).await?;

        info!(user = %user.username, admin = user.admin, "user created");
        Ok(json!({
            "user": user.username,
            "admin": user.admin,
            "createdAt": user.created_at,
        }))
    }

    async fn read(&self, username: &str) -> Result<Value, ApiError> {
        let user = self
            .state
            .users
            .find(username)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("User '{}' not found", username)))?;
        Ok(serde_json::to_value(&user).map_err(|e| ApiError::internal(e.to_string()))?)
    }

    async fn update(&self, username: &str, request: &UserRequest) -> Result<Value, ApiError> {
        let password = request.password()?;
        if password.is_none() && request.admin.is_none() {
            return Err(ApiError::validation("Nothing to update: provide 'pass' and/or 'admin'"));
        }
        if request.admin.is_some() && !self.state.gate.is_admin(self.actor).await {
            return Err(ApiError::unauthorized("Only admins may change the admin flag"));
        }

        let hash = match password {
            Some(p) => Some(hash_password(p).await?),
            None => None,
        };
        let user = self.state.users.update(username, hash.as_deref(), request.admin).await?;

        info!(user = %user.username, "user updated");
        Ok(json!({
            "user": user.username,
            "admin": user.admin,
            "updatedAt": user.updated_at,
        }))
    }

    /// Refuse self-targeting, and admin targets when admins are protected
    async fn guard_target(&self, username: &str, verb: &str) -> Result<User, ApiError> {
        if self.actor.username() == Some(username) {
            return Err(ApiError::validation(format!("Cannot {} your own account", verb)));
        }
        let user = self
            .state
            .users
            .find(username)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("User '{}' not found", username)))?;
        if self.state.config.policy.protect_admins && user.admin {
            return Err(ApiError::validation(format!("Cannot {} admin account '{}'", verb, username)));
        }
        Ok(user)
    }

    async fn delete(&self, username: &str) -> Result<Value, ApiError> {
        self.guard_target(username, "delete").await?;
        let user = self.state.users.soft_delete(username).await?;

        info!(user = %user.username, "user soft-deleted");
        Ok(json!({ "user": user.username, "deletedAt": user.deleted_at }))
    }

    async fn restore(&self, username: &str) -> Result<Value, ApiError> {
        let user = self.state.users.restore(username).await?;

        info!(user = %user.username, "user restored");
        Ok(json!({ "user": user.username, "restoredAt": user.updated_at }))
    }

    async fn drop(&self, username: &str) -> Result<Value, ApiError> {
        self.guard_target(username, "drop").await?;
        let user = self.state.users.drop(username).await?;

        info!(user = %user.username, "user dropped");
        Ok(json!({ "user": user.username, "dropped": true }))
    }
}

/// Ensure the credential table exists and holds at least one active admin
pub async fn bootstrap_admin(users: &UserRepository, config: &AuthConfig) -> Result<(), DatabaseError> {
    users.ensure_table().await?;
    if users.has_active_admin().await? {
        return Ok(());
    }

    let username = config.admin_username.as_str();
    match users.find(username).await? {
        Some(existing) => {
            if !existing.is_active() {
                users.restore(username).await?;
            }
            let hash = match &config.admin_password {
                Some(password) => Some(hash_password(password).await?),
                None => None,
            };
            users.update(username, hash.as_deref(), Some(true)).await?;
            warn!(user = username, "no active admin found; reinstated existing account as admin");
        }
        None => {
            let password = match &config.admin_password {
                Some(password) => password.clone(),
                None => {
                    let generated = uuid::Uuid::new_v4().simple().to_string();
                    warn!(user = username, password = %generated, "generated initial admin password; change it");
                    generated
                }
            };
            let hash = hash_password(&password).await?;
            users.create(username, &hash, true).await?;
            info!(user = username, "created initial admin account");
        }
    }
    Ok(())
}
