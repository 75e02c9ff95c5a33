use anyhow::{anyhow, Context, Result};
use ::config::{Config, Environment, File as ConfigFile, Map};
use licreg_registry::{RegistrationPolicy, RegistryConfig, UnknownCodeTimeLookup};
use licreg_storage::RedisStoreConfig;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Dotenv file read from the working directory.
const DOTENV_FILE: &str = ".env";

/// Variables taken from the process environment and the dotenv file. They
/// carry no prefix because existing deployments already set these names.
const ENV_KEYS: &[&str] = &[
    "REDIS_HOST",
    "REDIS_PORT",
    "REDIS_PASSWORD",
    "REDIS_DB",
    "REDIS_LOOKUP_DB",
    "REDIS_TIME_DB",
    "API_HOST",
    "API_PORT",
    "STORE_BACKEND",
    "MEMORY_TIMESTAMPS",
    "REGISTRATION_POLICY",
    "REVERSE_UNKNOWN_TIME_LOOKUP",
    "LOG_LEVEL",
    "LOG_FORMAT",
    "PROMETHEUS_ENABLED",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow!(
                "unknown STORE_BACKEND '{other}' (expected redis or memory)"
            )),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreBackend::Redis => "redis",
            StoreBackend::Memory => "memory",
        })
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config_path: Option<PathBuf>,

    // API listener
    pub api_host: String,
    pub api_port: u16,

    // Store
    pub store_backend: StoreBackend,
    pub redis: Option<RedisStoreConfig>,
    pub memory_timestamps: bool,

    // Registration behaviour
    pub registry: RegistryConfig,

    // Observability
    pub prometheus_enabled: bool,

    // Logging
    pub log_level: String,
    pub log_format: String,
}

impl AppConfig {
    /// Layer the optional TOML file, then `.env`, then the process environment.
    pub fn load(config_path_override: Option<&str>) -> Result<Self> {
        let process_env = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
        Self::load_from(config_path_override, Path::new(DOTENV_FILE), process_env)
    }

    fn load_from<I>(
        config_path_override: Option<&str>,
        dotenv_path: &Path,
        process_env: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let resolved_path = match config_path_override {
            Some(path) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    anyhow::bail!(
                        "Configuration file {} not found (specified via --config)",
                        path.display()
                    );
                }
                Some(path)
            }
            None => None,
        };

        let mut builder = Config::builder();
        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder
            .add_source(Environment::default().source(Some(read_dotenv(dotenv_path)?)))
            .add_source(Environment::default().source(Some(known_vars(process_env))));

        let config = builder.build()?;
        Self::from_config(&config, resolved_path)
    }

    pub fn from_config(config: &Config, config_path: Option<PathBuf>) -> Result<Self> {
        let store_backend: StoreBackend =
            get_string_value(config, &["STORE_BACKEND", "store_backend", "store.backend"])
                .unwrap_or_else(|| "redis".to_string())
                .parse()?;

        let redis = match store_backend {
            StoreBackend::Redis => Some(load_redis(config)?),
            StoreBackend::Memory => None,
        };

        let registry = RegistryConfig {
            policy: get_string_value(
                config,
                &[
                    "REGISTRATION_POLICY",
                    "registration_policy",
                    "registry.policy",
                ],
            )
            .map(|value| value.parse::<RegistrationPolicy>())
            .transpose()?
            .unwrap_or_default(),
            unknown_code_time_lookup: get_string_value(
                config,
                &[
                    "REVERSE_UNKNOWN_TIME_LOOKUP",
                    "reverse_unknown_time_lookup",
                    "registry.reverse_unknown_time_lookup",
                ],
            )
            .map(|value| value.parse::<UnknownCodeTimeLookup>())
            .transpose()?
            .unwrap_or_default(),
        };

        Ok(Self {
            config_path,
            api_host: get_string_value(config, &["API_HOST", "api_host", "api.host"])
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            api_port: require_parsed(config, &["API_PORT", "api_port", "api.port"], "API_PORT")?,
            store_backend,
            redis,
            memory_timestamps: get_bool_value(
                config,
                &["MEMORY_TIMESTAMPS", "memory_timestamps", "store.memory_timestamps"],
                true,
            ),
            registry,
            prometheus_enabled: get_bool_value(
                config,
                &[
                    "PROMETHEUS_ENABLED",
                    "prometheus_enabled",
                    "metrics.enabled",
                ],
                true,
            ),
            log_level: get_string_value(config, &["LOG_LEVEL", "log_level", "log.level"])
                .unwrap_or_else(|| "info".to_string()),
            log_format: get_string_value(config, &["LOG_FORMAT", "log_format", "log.format"])
                .unwrap_or_else(|| "pretty".to_string()),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            anyhow::bail!("API_PORT must be greater than zero");
        }
        if !matches!(self.log_format.as_str(), "pretty" | "compact") {
            anyhow::bail!(
                "LOG_FORMAT must be 'pretty' or 'compact', got '{}'",
                self.log_format
            );
        }
        if let Some(redis) = &self.redis {
            if redis.host.trim().is_empty() {
                anyhow::bail!("REDIS_HOST must not be empty");
            }
            if redis.port == 0 {
                anyhow::bail!("REDIS_PORT must be greater than zero");
            }
            let mut dbs = vec![
                ("REDIS_DB", redis.primary_db),
                ("REDIS_LOOKUP_DB", redis.reverse_db),
            ];
            if let Some(time_db) = redis.timestamp_db {
                dbs.push(("REDIS_TIME_DB", time_db));
            }
            for (i, (name, db)) in dbs.iter().enumerate() {
                if *db < 0 {
                    anyhow::bail!("{name} must not be negative");
                }
                if let Some((other, _)) = dbs[..i].iter().find(|(_, d)| d == db) {
                    anyhow::bail!("{name} and {other} must select different databases");
                }
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    pub fn timestamps_enabled(&self) -> bool {
        match &self.redis {
            Some(redis) => redis.timestamp_db.is_some(),
            None => self.memory_timestamps,
        }
    }
}

fn known_vars<I>(vars: I) -> Map<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter(|(key, _)| ENV_KEYS.contains(&key.as_str()))
        .collect()
}

/// A missing dotenv file is not an error.
fn read_dotenv(path: &Path) -> Result<Map<String, String>> {
    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(err) if err.not_found() => return Ok(Map::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };

    let mut vars = Vec::new();
    for entry in entries {
        vars.push(entry.with_context(|| format!("invalid entry in {}", path.display()))?);
    }
    Ok(known_vars(vars))
}

fn load_redis(config: &Config) -> Result<RedisStoreConfig> {
    let host = get_string_value(config, &["REDIS_HOST", "redis_host", "redis.host"])
        .ok_or_else(|| missing("REDIS_HOST"))?;
    let port = require_parsed(config, &["REDIS_PORT", "redis_port", "redis.port"], "REDIS_PORT")?;
    // Present but possibly empty: an empty password disables AUTH.
    let password = get_raw_value(
        config,
        &["REDIS_PASSWORD", "redis_password", "redis.password"],
    )
    .ok_or_else(|| missing("REDIS_PASSWORD"))?;

    Ok(RedisStoreConfig {
        host,
        port,
        password: Some(password).filter(|p| !p.is_empty()),
        primary_db: require_parsed(config, &["REDIS_DB", "redis_db", "redis.db"], "REDIS_DB")?,
        reverse_db: require_parsed(
            config,
            &["REDIS_LOOKUP_DB", "redis_lookup_db", "redis.lookup_db"],
            "REDIS_LOOKUP_DB",
        )?,
        timestamp_db: get_string_value(
            config,
            &["REDIS_TIME_DB", "redis_time_db", "redis.time_db"],
        )
        .map(|raw| {
            raw.parse::<i64>()
                .with_context(|| format!("REDIS_TIME_DB must be an integer, got '{raw}'"))
        })
        .transpose()?,
    })
}

fn missing(name: &str) -> anyhow::Error {
    anyhow!("missing required setting {name}")
}

fn require_parsed<T>(config: &Config, keys: &[&str], name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = get_string_value(config, keys).ok_or_else(|| missing(name))?;
    raw.parse::<T>()
        .with_context(|| format!("invalid value '{raw}' for {name}"))
}

fn get_raw_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| config.get_string(key).ok())
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn get_bool_value(config: &Config, keys: &[&str], default: bool) -> bool {
    for key in keys {
        if let Ok(value) = config.get_bool(key) {
            return value;
        }
        if let Ok(raw) = config.get_string(key) {
            if let Ok(parsed) = raw.parse::<bool>() {
                return parsed;
            }
        }
    }
    default
}
