mod app_config;

pub use app_config::{
    AdmissionSettings, ApiKeyConfig, AppConfig, AuthConfig, LogFormat, LoggingConfig,
    ServerConfig, StorageConfig,
};
