/// Configuration management for the Quartermaster inventory server
use crate::error::{QmError, QmResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Everything the server needs to run, resolved once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub bot: BotConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Listen address and advertised version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Filesystem layout: the data directory holds the SQLite database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub inventory_db: PathBuf,
}

/// Authentication configuration for the dashboard API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Dashboard session lifetime in hours
    pub session_ttl_hours: i64,
    /// Chat identities granted admin rights everywhere (comma-separated)
    pub owner_ids: Vec<String>,
    /// Initial dashboard admin, created on first start if the user table is empty
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// Credentials for the initial dashboard admin account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

/// Defaults applied when a guild is seen for the first time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub default_prefix: String,
    pub default_cooldown_seconds: i64,
}

/// Global request throttle for the HTTP surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub global_requests_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Resolve configuration from the environment, with `.env` support
    pub fn from_env() -> QmResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("QM_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("QM_PORT")
            .unwrap_or_else(|_| "8420".to_string())
            .parse()
            .map_err(|_| QmError::Validation("Invalid port number".to_string()))?;
        let version = env::var("QM_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

        let data_directory: PathBuf = env::var("QM_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let inventory_db = env::var("QM_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("quartermaster.sqlite"));

        let jwt_secret = env::var("QM_JWT_SECRET")
            .map_err(|_| QmError::Validation("JWT secret required".to_string()))?;
        let session_ttl_hours = env::var("QM_SESSION_TTL_HOURS")
            .unwrap_or_else(|_| "12".to_string())
            .parse()
            .unwrap_or(12);

        // Parse owner identities from comma-separated list
        let owner_ids = env::var("QM_OWNER_IDS")
            .unwrap_or_else(|_| String::new())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<String>>();

        let bootstrap_admin = if let Ok(username) = env::var("QM_ADMIN_USERNAME") {
            Some(BootstrapAdmin {
                username,
                password: env::var("QM_ADMIN_PASSWORD")
                    .map_err(|_| QmError::Validation("Admin password required".to_string()))?,
            })
        } else {
            None
        };

        let default_prefix = env::var("QM_DEFAULT_PREFIX").unwrap_or_else(|_| "!".to_string());
        let default_cooldown_seconds = env::var("QM_DEFAULT_COOLDOWN_SECONDS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .unwrap_or(3600);

        let rate_limit_enabled = env::var("QM_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let rate_limit_requests = env::var("QM_RATE_LIMIT_GLOBAL_REQUESTS_PER_MINUTE")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3000);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                inventory_db,
            },
            authentication: AuthConfig {
                jwt_secret,
                session_ttl_hours,
                owner_ids,
                bootstrap_admin,
            },
            bot: BotConfig {
                default_prefix,
                default_cooldown_seconds,
            },
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                global_requests_per_minute: rate_limit_requests,
            },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Reject configurations the server cannot run with
    pub fn validate(&self) -> QmResult<()> {
        if self.service.hostname.is_empty() {
            return Err(QmError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(QmError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.session_ttl_hours <= 0 {
            return Err(QmError::Validation(
                "Session TTL must be positive".to_string(),
            ));
        }

        validate_prefix(&self.bot.default_prefix)?;

        if self.bot.default_cooldown_seconds < 0 {
            return Err(QmError::Validation(
                "Cooldown cannot be negative".to_string(),
            ));
        }

        Ok(())
    }
}

/// Shared prefix validation, also applied to per-guild overrides
pub fn validate_prefix(prefix: &str) -> QmResult<()> {
    if prefix.is_empty() {
        return Err(QmError::Validation("Prefix cannot be empty".to_string()));
    }
    if prefix.len() > 10 {
        return Err(QmError::Validation(
            "Prefix cannot exceed 10 characters".to_string(),
        ));
    }
    if prefix.chars().any(|c| c.is_whitespace()) {
        return Err(QmError::Validation(
            "Prefix cannot contain whitespace".to_string(),
        ));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use tests_support::test_config;

    #[test]
    fn test_valid_config_passes() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let mut config = test_config();
        config.authentication.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_cooldown_rejected() {
        let mut config = test_config();
        config.bot.default_cooldown_seconds = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prefix_rules() {
        assert!(validate_prefix("!").is_ok());
        assert!(validate_prefix("qm!").is_ok());
        assert!(validate_prefix("").is_err());
        assert!(validate_prefix("! ").is_err());
        assert!(validate_prefix("aaaaaaaaaaaa").is_err());
    }
}
