use serde::Deserialize;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub api_key: ApiKeyConfig,
    pub admission: AdmissionSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// "memory" or "postgres"
    pub backend: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub statement_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret; falls back to the JWT_SECRET env var, then to a
    /// random value at startup
    pub jwt_secret: Option<String>,
    pub jwt_expiration_hours: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiKeyConfig {
    /// Prefix for generated keys
    pub prefix: String,
    /// Random payload length in bytes
    pub length: usize,
    /// Default expiry applied when a create request has none
    pub default_expiry_days: i64,
}

/// Settings for the three admission gates and the sweeper
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdmissionSettings {
    /// Gate A: sustained requests per second per source IP
    pub ip_requests_per_second: f64,
    /// Gate A: burst size per source IP
    pub ip_burst: u32,
    /// Gate B: sustained requests per second per identity
    pub identity_requests_per_second: f64,
    /// Gate B: burst size per identity
    pub identity_burst: u32,
    /// Sweeper period in seconds
    pub sweep_interval_secs: u64,
    /// Rate state idle TTL in seconds
    pub idle_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            max_connections: 10,
            min_connections: 5,
            acquire_timeout_secs: 5,
            statement_timeout_secs: 5,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_expiration_hours: 24,
        }
    }
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            prefix: "dh_".to_string(),
            length: 32,
            default_expiry_days: 365,
        }
    }
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            ip_requests_per_second: 100.0,
            ip_burst: 200,
            identity_requests_per_second: 10.0,
            identity_burst: 20,
            sweep_interval_secs: 60,
            idle_ttl_secs: 3600,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.api_key.prefix, "dh_");
        assert_eq!(config.api_key.length, 32);
        assert_eq!(config.api_key.default_expiry_days, 365);
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.storage.max_connections, 10);
        assert_eq!(config.storage.min_connections, 5);
        assert_eq!(config.admission.sweep_interval_secs, 60);
        assert_eq!(config.admission.idle_ttl_secs, 3600);
    }
}
