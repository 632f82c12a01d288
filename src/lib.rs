//! DH Admission
//!
//! Authentication and admission control for the DH fitness API:
//! - API key issuance, validation, and scope-based authorization
//! - A three-tier admission chain: per-IP limiter, per-identity limiter,
//!   and per-identity monthly quota with plan tiers
//! - Append-only usage auditing
//!
//! Content services mount their routers behind the exported admission
//! layers and call into the services carried by [`api::AppState`].

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use api::state::{ApiKeyServiceTrait, AppState};
use domain::usage::UsageRepository;
use infrastructure::admission::{AdmissionConfig, AdmissionController, RateConfig, SweeperHandle};
use infrastructure::api_key::{
    connect_pool, ApiKeyGenerator, ApiKeyService, CreateApiKeyRequest, InMemoryApiKeyRepository,
    PostgresApiKeyRepository, PostgresConfig,
};
use infrastructure::auth::{JwtConfig, JwtService};
use infrastructure::identity::IdentityResolver;
use infrastructure::usage::{
    InMemoryUsageRepository, PostgresUsageRepository, UsageTrackingService,
};

/// The running application core: shared state plus the background sweeper.
/// Dropping the sweeper handle stops the sweep task, so keep this alive for
/// the life of the server.
pub struct App {
    pub state: AppState,
    pub sweeper: SweeperHandle,
}

/// Create the application state with all services initialized
pub async fn create_app(config: &AppConfig) -> anyhow::Result<App> {
    let admission_config = AdmissionConfig {
        ip_rate: RateConfig {
            requests_per_second: config.admission.ip_requests_per_second,
            burst: config.admission.ip_burst,
        },
        identity_rate: RateConfig {
            requests_per_second: config.admission.identity_requests_per_second,
            burst: config.admission.identity_burst,
        },
        sweep_interval: std::time::Duration::from_secs(config.admission.sweep_interval_secs),
        idle_ttl: std::time::Duration::from_secs(config.admission.idle_ttl_secs),
    };

    let admission = Arc::new(AdmissionController::new(admission_config));
    let sweeper = AdmissionController::start_sweeper(Arc::clone(&admission));

    let generator = ApiKeyGenerator::new(&config.api_key.prefix, config.api_key.length);

    let use_postgres = config.storage.backend.eq_ignore_ascii_case("postgres");
    info!(backend = %config.storage.backend, "storage backend selected");

    let (api_key_service, usage_repository): (
        Arc<dyn ApiKeyServiceTrait>,
        Arc<dyn UsageRepository>,
    ) = if use_postgres {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        info!("Connecting to PostgreSQL...");
        let pool = connect_pool(&PostgresConfig {
            url: database_url,
            max_connections: config.storage.max_connections,
            min_connections: config.storage.min_connections,
            acquire_timeout_secs: config.storage.acquire_timeout_secs,
            statement_timeout_secs: config.storage.statement_timeout_secs,
        })
        .await?;
        info!("PostgreSQL connection established");

        let statement_timeout =
            std::time::Duration::from_secs(config.storage.statement_timeout_secs);

        let key_repository = Arc::new(
            PostgresApiKeyRepository::new(pool.clone())
                .with_statement_timeout(statement_timeout),
        );
        let usage_repository = Arc::new(
            PostgresUsageRepository::new(pool).with_statement_timeout(statement_timeout),
        );

        // api_keys first: the usage table's foreign key depends on it
        key_repository.migrate().await?;
        usage_repository.migrate().await?;

        (
            Arc::new(
                ApiKeyService::new(key_repository)
                    .with_generator(generator)
                    .with_default_expiry_days(config.api_key.default_expiry_days),
            ),
            usage_repository,
        )
    } else {
        (
            Arc::new(
                ApiKeyService::new(Arc::new(InMemoryApiKeyRepository::new()))
                    .with_generator(generator)
                    .with_default_expiry_days(config.api_key.default_expiry_days),
            ),
            Arc::new(InMemoryUsageRepository::new()),
        )
    };

    bootstrap_admin_key(api_key_service.as_ref()).await?;

    let jwt_service = Arc::new(create_jwt_service(config));
    let identity_resolver = Arc::new(IdentityResolver::new(jwt_service));
    let usage_service = Arc::new(UsageTrackingService::new(usage_repository));

    let state = AppState::new(api_key_service, usage_service, admission, identity_resolver);

    Ok(App { state, sweeper })
}

/// Create an initial admin key when the store is empty. The secret is
/// logged once; it is never retrievable afterwards.
async fn bootstrap_admin_key(service: &dyn ApiKeyServiceTrait) -> anyhow::Result<()> {
    if service.has_any_keys().await? {
        return Ok(());
    }

    let created = service
        .create(CreateApiKeyRequest {
            name: "Initial admin key".to_string(),
            description: Some("Created automatically on first startup".to_string()),
            permissions: vec!["admin:all".to_string()],
            expiry_days: None,
            rate_limit: None,
            user_id: None,
        })
        .await?;

    info!("===========================================");
    info!("Initial admin API key created!");
    info!("Key: {}", created.key());
    info!("Store this key now; it will not be shown again.");
    info!("===========================================");

    Ok(())
}

fn create_jwt_service(config: &AppConfig) -> JwtService {
    let secret = config
        .auth
        .jwt_secret
        .clone()
        .or_else(|| std::env::var("JWT_SECRET").ok())
        .unwrap_or_else(|| {
            warn!(
                "No JWT_SECRET configured. Generating a random secret; \
                 bearer identities will NOT survive restarts."
            );
            generate_random_secret()
        });

    JwtService::new(JwtConfig::new(
        secret,
        u64::from(config.auth.jwt_expiration_hours),
    ))
}

fn generate_random_secret() -> String {
    use rand::distributions::Alphanumeric;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}
