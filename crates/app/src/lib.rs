#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::{extract::State, http::StatusCode, Router};
use hive_auth::StaticDirectory;
use hive_core::{ScopeId, UserId};
use hive_engine::{BackoffConfig, Engine, EngineConfig, LogNotifier};
use hive_storage::{
    migrate_with_pool, MemoryStorage, MemoryStorageConfig, PostgresStorage, Storage,
};

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5380";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub storage: StorageBackend,
    pub engine: EngineConfig,
    /// Hives registered in the in-process directory at startup, each with
    /// its owner.
    pub seed_hives: Vec<(ScopeId, UserId)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres { database_url: String },
}

/// Raw environment values, kept apart so parsing can be tested without
/// touching the process environment.
#[derive(Debug, Clone, Default)]
struct AppEnv {
    listen_addr: Option<String>,
    storage_backend: Option<String>,
    database_url: Option<String>,
    list_default_limit: Option<String>,
    store_page_size: Option<String>,
    cascade_concurrency: Option<String>,
    backoff_min_ms: Option<String>,
    backoff_max_ms: Option<String>,
    backoff_max_attempts: Option<String>,
    store_call_timeout_ms: Option<String>,
    seed_hives: Option<String>,
}

impl AppEnv {
    fn from_env() -> Self {
        Self {
            listen_addr: std::env::var("LISTEN_ADDR").ok(),
            storage_backend: std::env::var("STORAGE_BACKEND").ok(),
            database_url: std::env::var("DATABASE_URL").ok(),
            list_default_limit: std::env::var("LIST_DEFAULT_LIMIT").ok(),
            store_page_size: std::env::var("STORE_PAGE_SIZE").ok(),
            cascade_concurrency: std::env::var("CASCADE_CONCURRENCY").ok(),
            backoff_min_ms: std::env::var("BACKOFF_MIN_MS").ok(),
            backoff_max_ms: std::env::var("BACKOFF_MAX_MS").ok(),
            backoff_max_attempts: std::env::var("BACKOFF_MAX_ATTEMPTS").ok(),
            store_call_timeout_ms: std::env::var("STORE_CALL_TIMEOUT_MS").ok(),
            seed_hives: std::env::var("SEED_HIVES").ok(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_values(AppEnv::from_env())
    }

    fn from_values(env: AppEnv) -> anyhow::Result<Self> {
        let listen_addr =
            SocketAddr::from_str(env.listen_addr.as_deref().unwrap_or(DEFAULT_LISTEN_ADDR))?;
        let storage = parse_storage_backend(env.storage_backend, env.database_url)?;

        let defaults = EngineConfig::default();
        let backoff = BackoffConfig {
            min_delay: parse_millis(
                env.backoff_min_ms,
                "BACKOFF_MIN_MS",
                defaults.backoff.min_delay,
            )?,
            max_delay: parse_millis(
                env.backoff_max_ms,
                "BACKOFF_MAX_MS",
                defaults.backoff.max_delay,
            )?,
            max_attempts: parse_positive(
                env.backoff_max_attempts,
                "BACKOFF_MAX_ATTEMPTS",
                defaults.backoff.max_attempts,
            )?,
        };
        if backoff.min_delay > backoff.max_delay {
            return Err(anyhow::anyhow!(
                "BACKOFF_MIN_MS must not exceed BACKOFF_MAX_MS"
            ));
        }

        let engine = EngineConfig {
            default_limit: parse_positive(
                env.list_default_limit,
                "LIST_DEFAULT_LIMIT",
                defaults.default_limit,
            )?,
            store_page_size: parse_positive(
                env.store_page_size,
                "STORE_PAGE_SIZE",
                defaults.store_page_size,
            )?,
            cascade_concurrency: parse_positive(
                env.cascade_concurrency,
                "CASCADE_CONCURRENCY",
                defaults.cascade_concurrency,
            )?,
            backoff,
            store_call_timeout: parse_millis(
                env.store_call_timeout_ms,
                "STORE_CALL_TIMEOUT_MS",
                defaults.store_call_timeout,
            )?,
            ..defaults
        };

        let seed_hives = parse_seed_hives(env.seed_hives.as_deref())?;

        Ok(Self {
            listen_addr,
            storage,
            engine,
            seed_hives,
        })
    }
}

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let storage: Arc<dyn Storage> = match &config.storage {
        StorageBackend::Postgres { database_url } => {
            let storage = PostgresStorage::connect(database_url).await?;
            migrate_with_pool(storage.pool()).await?;
            Arc::new(storage)
        }
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage; content is lost on restart");
            Arc::new(MemoryStorage::new(MemoryStorageConfig::default()))
        }
    };
    let directory = seeded_directory(&config.seed_hives).await;
    let engine = Engine::new(storage, directory)
        .with_config(config.engine)
        .with_notifier(Arc::new(LogNotifier));

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");
    axum::serve(listener, router(engine)).await?;
    Ok(())
}

/// Membership directory holding the configured hives. Members beyond each
/// owner are added through [`StaticDirectory::add_member`].
pub async fn seeded_directory(seeds: &[(ScopeId, UserId)]) -> Arc<StaticDirectory> {
    let directory = Arc::new(StaticDirectory::new());
    for (hive_id, owner) in seeds {
        directory.create_hive(*hive_id, owner).await;
    }
    if seeds.is_empty() {
        tracing::warn!("no hives configured; every hive request will be rejected");
    } else {
        tracing::info!(hives = seeds.len(), "membership directory seeded");
    }
    directory
}

pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(engine)
}

async fn health(State(engine): State<Engine>) -> StatusCode {
    match engine.ping().await {
        Ok(()) => StatusCode::OK,
        Err(error) => {
            tracing::warn!(%error, "health check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

fn parse_storage_backend(
    backend: Option<String>,
    database_url: Option<String>,
) -> anyhow::Result<StorageBackend> {
    let database_url = database_url
        .map(|url| url.trim().to_owned())
        .filter(|url| !url.is_empty());
    let backend = backend.unwrap_or_else(|| {
        if database_url.is_some() {
            "postgres".to_owned()
        } else {
            "memory".to_owned()
        }
    });
    match backend.as_str() {
        "memory" => Ok(StorageBackend::Memory),
        "postgres" => {
            let database_url = database_url.ok_or_else(|| {
                anyhow::anyhow!("DATABASE_URL is required when STORAGE_BACKEND=postgres")
            })?;
            Ok(StorageBackend::Postgres { database_url })
        }
        _ => Err(anyhow::anyhow!(
            "invalid STORAGE_BACKEND {:?}: expected \"memory\" or \"postgres\"",
            backend
        )),
    }
}

/// Parses `SEED_HIVES`: whitespace-separated `<hive-uuid>:<owner-user-id>` pairs.
fn parse_seed_hives(value: Option<&str>) -> anyhow::Result<Vec<(ScopeId, UserId)>> {
    let Some(raw) = value else {
        return Ok(Vec::new());
    };
    raw.split_whitespace()
        .map(|entry| -> anyhow::Result<(ScopeId, UserId)> {
            let (hive, owner) = entry
                .split_once(':')
                .filter(|(_, owner)| !owner.is_empty())
                .ok_or_else(|| {
                    anyhow::anyhow!("invalid SEED_HIVES entry {entry:?}: expected <hive-id>:<owner>")
                })?;
            let hive_id = ScopeId::from_str(hive)
                .map_err(|error| anyhow::anyhow!("invalid SEED_HIVES hive id {hive:?}: {error}"))?;
            Ok((hive_id, UserId::new(owner)))
        })
        .collect()
}

fn parse_positive<T>(value: Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr + PartialOrd + Default,
{
    let Some(raw) = value else {
        return Ok(default);
    };
    let parsed = raw
        .trim()
        .parse::<T>()
        .map_err(|_| anyhow::anyhow!("invalid {name} {raw:?}: expected a positive integer"))?;
    if parsed <= T::default() {
        return Err(anyhow::anyhow!(
            "invalid {name} {raw:?}: expected a positive integer"
        ));
    }
    Ok(parsed)
}

fn parse_millis(value: Option<String>, name: &str, default: Duration) -> anyhow::Result<Duration> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_positive(value, name, default_ms).map(Duration::from_millis)
}
