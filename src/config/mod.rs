use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub tables: TableConfig,
    pub auth: AuthConfig,
    pub policy: PolicyConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub url: Option<String>,
    pub redirect_url: String,
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub dialect: DialectKind,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: String,
    /// SQLite file path; `:memory:` keeps everything in process
    pub storage: String,
    /// Protected credential table; generic table operations may never target it
    pub main_table: String,
    pub max_connections: u32,
    pub enable_query_logging: bool,
    /// Full connection URL, takes precedence over the individual fields
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub deleted_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub tokens_enabled: bool,
    pub tokens_path: Option<PathBuf>,
    pub token_principal: String,
    pub admin_username: String,
    pub admin_password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryAccess {
    AdminOrToken,
    TokenOnly,
}

impl QueryAccess {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin_or_token" | "admin" => Some(QueryAccess::AdminOrToken),
            "token_only" | "token" => Some(QueryAccess::TokenOnly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub query_access: QueryAccess,
    /// Refuse delete/drop against any admin account, not just the caller's own
    pub protect_admins: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub file_enabled: bool,
    pub file_path: PathBuf,
    pub debug: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: "tablekeeper".to_string(),
                host: "0.0.0.0".to_string(),
                port: 3000,
                url: None,
                redirect_url: "https://example.com".to_string(),
                shutdown_grace_ms: 2000,
            },
            database: DatabaseConfig {
                dialect: DialectKind::Sqlite,
                host: "localhost".to_string(),
                port: 5432,
                username: None,
                password: None,
                database: "tablekeeper".to_string(),
                storage: "tablekeeper.sqlite".to_string(),
                main_table: "users".to_string(),
                max_connections: 10,
                enable_query_logging: false,
                url: None,
            },
            tables: TableConfig {
                deleted_prefix: "deleted_".to_string(),
            },
            auth: AuthConfig {
                tokens_enabled: false,
                tokens_path: None,
                token_principal: "token".to_string(),
                admin_username: "admin".to_string(),
                admin_password: None,
            },
            policy: PolicyConfig {
                query_access: QueryAccess::AdminOrToken,
                protect_admins: false,
            },
            logging: LoggingConfig {
                file_enabled: false,
                file_path: PathBuf::from("tablekeeper.log"),
                debug: false,
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from any key/value source. Unparseable values keep the previous setting.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        // Server overrides
        if let Some(v) = lookup("SERVER_NAME") {
            self.server.name = v;
        }
        if let Some(v) = lookup("SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("SERVER_PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Some(v) = lookup("SERVER_URL") {
            self.server.url = Some(v);
        }
        if let Some(v) = lookup("REDIRECT_URL") {
            self.server.redirect_url = v;
        }
        if let Some(v) = lookup("SHUTDOWN_GRACE_MS") {
            self.server.shutdown_grace_ms = v.parse().unwrap_or(self.server.shutdown_grace_ms);
        }

        // Database overrides
        if let Some(v) = lookup("DB_DIALECT") {
            self.database.dialect = match v.trim().to_ascii_lowercase().as_str() {
                "postgres" | "postgresql" | "pg" => DialectKind::Postgres,
                "sqlite" => DialectKind::Sqlite,
                _ => self.database.dialect,
            };
        }
        if let Some(v) = lookup("DB_HOST") {
            self.database.host = v;
        }
        if let Some(v) = lookup("DB_PORT") {
            self.database.port = v.parse().unwrap_or(self.database.port);
        }
        if let Some(v) = lookup("DB_USERNAME") {
            self.database.username = Some(v);
        }
        if let Some(v) = lookup("DB_PASSWORD") {
            self.database.password = Some(v);
        }
        if let Some(v) = lookup("DB_DATABASE") {
            self.database.database = v;
        }
        if let Some(v) = lookup("DB_STORAGE") {
            self.database.storage = v;
        }
        if let Some(v) = lookup("DB_MAINTABLE") {
            self.database.main_table = v;
        }
        if let Some(v) = lookup("DB_POOL_MAX") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Some(v) = lookup("DB_LOGGING") {
            self.database.enable_query_logging = parse_flag(&v).unwrap_or(self.database.enable_query_logging);
        }
        if let Some(v) = lookup("DATABASE_URL") {
            self.database.url = Some(v);
        }

        // Table overrides
        if let Some(v) = lookup("DELETED_PREFIX") {
            self.tables.deleted_prefix = v;
        }

        // Auth overrides
        if let Some(v) = lookup("TOKENS_ENABLED") {
            self.auth.tokens_enabled = parse_flag(&v).unwrap_or(self.auth.tokens_enabled);
        }
        if let Some(v) = lookup("TOKENS_PATH") {
            self.auth.tokens_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("TOKEN_PRINCIPAL") {
            self.auth.token_principal = v;
        }
        if let Some(v) = lookup("ADMIN_USERNAME") {
            self.auth.admin_username = v;
        }
        if let Some(v) = lookup("ADMIN_PASSWORD") {
            self.auth.admin_password = Some(v);
        }

        // Policy overrides
        if let Some(v) = lookup("QUERY_ACCESS") {
            self.policy.query_access = QueryAccess::parse(&v).unwrap_or(self.policy.query_access);
        }
        if let Some(v) = lookup("PROTECT_ADMINS") {
            self.policy.protect_admins = parse_flag(&v).unwrap_or(self.policy.protect_admins);
        }

        // Logging overrides
        if let Some(v) = lookup("LOGGING_ENABLED") {
            self.logging.file_enabled = parse_flag(&v).unwrap_or(self.logging.file_enabled);
        }
        if let Some(v) = lookup("LOGFILE_PATH") {
            self.logging.file_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("DEBUG_ENABLED") {
            self.logging.debug = parse_flag(&v).unwrap_or(self.logging.debug);
        }

        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.database.dialect, DialectKind::Sqlite);
        assert_eq!(config.database.main_table, "users");
        assert_eq!(config.tables.deleted_prefix, "deleted_");
        assert_eq!(config.auth.token_principal, "token");
        assert_eq!(config.policy.query_access, QueryAccess::AdminOrToken);
        assert!(!config.auth.tokens_enabled);
    }

    #[test]
    fn test_overrides_apply() {
        let config = AppConfig::default().with_overrides(lookup_from(&[
            ("SERVER_PORT", "8081"),
            ("DB_DIALECT", "postgres"),
            ("DB_MAINTABLE", "accounts"),
            ("TOKENS_ENABLED", "true"),
            ("TOKENS_PATH", "/etc/tokens"),
            ("QUERY_ACCESS", "token_only"),
            ("PROTECT_ADMINS", "yes"),
        ]));
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.database.dialect, DialectKind::Postgres);
        assert_eq!(config.database.main_table, "accounts");
        assert!(config.auth.tokens_enabled);
        assert_eq!(config.auth.tokens_path, Some(PathBuf::from("/etc/tokens")));
        assert_eq!(config.policy.query_access, QueryAccess::TokenOnly);
        assert!(config.policy.protect_admins);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = AppConfig::default().with_overrides(lookup_from(&[
            ("SERVER_PORT", "not-a-port"),
            ("DB_DIALECT", "oracle"),
            ("LOGGING_ENABLED", "maybe"),
        ]));
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.dialect, DialectKind::Sqlite);
        assert!(!config.logging.file_enabled);
    }
}
