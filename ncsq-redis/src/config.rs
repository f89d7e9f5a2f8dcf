//! Redis connection configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::{RedisError, Result};

/// Default host used when none is configured.
pub const DEFAULT_HOST: &str = "localhost";

/// Default Redis port.
pub const DEFAULT_PORT: u16 = 6379;

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (redis://host:port or rediss://host:port for TLS).
    pub url: String,
    /// Maximum number of pooled connections.
    pub pool_size: u32,
    /// Minimum idle connections.
    pub min_idle: Option<u32>,
    /// Timeout when checking a connection out of the pool.
    #[serde(with = "duration_secs", default = "default_connection_timeout")]
    pub connection_timeout: Duration,
    /// Database number (0-15).
    pub database: Option<u8>,
    /// Username for Redis 6+ ACL.
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Use TLS.
    #[serde(default)]
    pub tls: bool,
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self::from_host_port(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl RedisConfig {
    /// Create a configuration for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_size: 10,
            min_idle: Some(1),
            connection_timeout: default_connection_timeout(),
            database: None,
            username: None,
            password: None,
            tls: false,
        }
    }

    /// Create a configuration from a host and port pair.
    pub fn from_host_port(host: &str, port: u16) -> Self {
        Self::new(format!("redis://{}:{}", host, port))
    }

    /// Create a builder.
    pub fn builder() -> RedisConfigBuilder {
        RedisConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// `REDIS_URL` wins over `REDIS_HOST`/`REDIS_PORT`.
    pub fn from_env() -> RedisConfigBuilder {
        let mut builder = RedisConfigBuilder::new();

        if let Ok(url) = std::env::var("REDIS_URL") {
            builder = builder.url(url);
        } else if std::env::var("REDIS_HOST").is_ok() || std::env::var("REDIS_PORT").is_ok() {
            let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
            let port = std::env::var("REDIS_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT);
            builder = builder.host_port(&host, port);
        }

        if let Ok(pool_size) = std::env::var("REDIS_POOL_SIZE")
            && let Ok(size) = pool_size.parse()
        {
            builder = builder.pool_size(size);
        }

        if let Ok(db) = std::env::var("REDIS_DATABASE")
            && let Ok(db_num) = db.parse()
        {
            builder = builder.database(db_num);
        }

        if let Ok(username) = std::env::var("REDIS_USERNAME") {
            builder = builder.username(username);
        }

        if let Ok(password) = std::env::var("REDIS_PASSWORD") {
            builder = builder.password(password);
        }

        if std::env::var("REDIS_TLS").is_ok() {
            builder = builder.tls(true);
        }

        builder
    }

    /// Resolve the URL the client actually connects to, with credentials,
    /// database and TLS scheme folded in.
    pub fn connection_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| RedisError::Config(format!("invalid Redis URL '{}': {}", self.url, e)))?;

        match url.scheme() {
            "redis" | "rediss" | "redis+unix" | "unix" => {}
            other => {
                return Err(RedisError::Config(format!(
                    "unsupported URL scheme '{}'",
                    other
                )));
            }
        }

        if self.tls && url.scheme() == "redis" {
            url.set_scheme("rediss")
                .map_err(|_| RedisError::Config("cannot switch URL to TLS".to_string()))?;
        }

        if let Some(username) = &self.username {
            url.set_username(username)
                .map_err(|_| RedisError::Config("URL cannot carry a username".to_string()))?;
        }

        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| RedisError::Config("URL cannot carry a password".to_string()))?;
        }

        if let Some(db) = self.database
            && matches!(url.path(), "" | "/")
        {
            url.set_path(&format!("/{}", db));
        }

        Ok(url.to_string())
    }
}

/// Builder for Redis configuration.
#[derive(Default)]
pub struct RedisConfigBuilder {
    config: RedisConfig,
}

impl RedisConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: RedisConfig::default(),
        }
    }

    /// Set the Redis URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Point the URL at a host and port.
    pub fn host_port(mut self, host: &str, port: u16) -> Self {
        self.config.url = format!("redis://{}:{}", host, port);
        self
    }

    /// Set the pool size.
    pub fn pool_size(mut self, size: u32) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set the minimum idle connections.
    pub fn min_idle(mut self, min_idle: u32) -> Self {
        self.config.min_idle = Some(min_idle);
        self
    }

    /// Set the pool checkout timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Set the database number.
    pub fn database(mut self, db: u8) -> Self {
        self.config.database = Some(db);
        self
    }

    /// Set the username (Redis 6+ ACL).
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Enable TLS.
    pub fn tls(mut self, enabled: bool) -> Self {
        self.config.tls = enabled;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> RedisConfig {
        self.config
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
