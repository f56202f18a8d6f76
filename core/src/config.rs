use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use config::builder::DefaultState;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const WAL_SCHEME: &str = "wal://";

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContactsConfig {
    pub root: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub acquire_timeout_ms: u64,
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    database_url: Option<String>,
    server: ServerConfig,
    contacts: ContactsConfig,
    pool: PoolConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: StoreLocation,
    pub server: ServerConfig,
    pub contacts: ContactsConfig,
    pub pool: PoolConfig,
}

/// Where the schema store lives, resolved from the connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLocation {
    pub wal_path: PathBuf,
}

impl StoreLocation {
    /// Accepts `wal://<path>` or a bare filesystem path.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let url = url.trim();
        let path = match url.strip_prefix(WAL_SCHEME) {
            Some(rest) => rest,
            None if url.contains("://") => {
                return Err(ConfigError::Message(format!(
                    "unsupported database_url scheme: {}",
                    url.split("://").next().unwrap_or_default()
                )))
            }
            None => url,
        };
        if path.is_empty() {
            return Err(ConfigError::Message("database_url must not be empty".into()));
        }
        Ok(Self {
            wal_path: PathBuf::from(path),
        })
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("PPI")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::from_config(builder.build()?)
    }

    /// Build from an inline TOML document on top of the defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config = defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self, ConfigError> {
        let raw: RawConfig = config.try_deserialize()?;
        let url = raw
            .database_url
            .ok_or_else(|| ConfigError::NotFound("database_url".into()))?;

        if raw.pool.max_connections == 0 {
            return Err(ConfigError::Message(
                "pool.max_connections must be at least 1".into(),
            ));
        }

        Ok(Self {
            database: StoreLocation::parse(&url)?,
            server: raw.server,
            contacts: raw.contacts,
            pool: raw.pool,
        })
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("contacts.root", "public")?
        .set_default("pool.max_connections", 16)?
        .set_default("pool.acquire_timeout_ms", 5_000)
}
