//! Runtime configuration for the benchmark harness.
//!
//! Every value has a documented default and can be overridden through an
//! `AUDIENCE_*` environment variable. Lookups go through a caller-supplied
//! function so tests never have to touch the process environment.

use log::LevelFilter;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_USER: &str = "postgres";
pub const DEFAULT_DB_NAME: &str = "audience_db";

pub const DEFAULT_MAX_OPEN: usize = 25;
pub const DEFAULT_MAX_IDLE: usize = 10;
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Cardinality the measured latency is projected to.
pub const DEFAULT_TARGET_USERS: u64 = 10_000_000;
/// Latency a single audience count must stay under.
pub const DEFAULT_LATENCY_BUDGET: Duration = Duration::from_secs(2);

pub const DEFAULT_USERS_TABLE: &str = "users";
pub const DEFAULT_ATTRIBUTES_TABLE: &str = "user_attributes";
pub const DEFAULT_PROFILES_TABLE: &str = "user_profiles";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?} as {expected}")]
    Malformed {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("{0}")]
    Invalid(String),
}

/// Connection parameters for the PostgreSQL instance holding both schemas.
#[derive(Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub dbname: String,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("dbname", &self.dbname)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            user: DEFAULT_DB_USER.to_string(),
            password: None,
            dbname: DEFAULT_DB_NAME.to_string(),
        }
    }
}

/// Connection pool limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Upper bound on connections open at once.
    pub max_open: usize,
    /// Idle connections kept around between queries; extras are reaped.
    pub max_idle: usize,
    /// Idle connections older than this are closed and reopened on demand.
    pub max_lifetime: Duration,
    /// How long to wait for a pooled connection before giving up.
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_open: DEFAULT_MAX_OPEN,
            max_idle: DEFAULT_MAX_IDLE,
            max_lifetime: DEFAULT_MAX_LIFETIME,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

/// Knobs of a single benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchSettings {
    pub target_users: u64,
    pub latency_budget: Duration,
    /// Per-query deadline. `None` lets a query run for as long as it takes.
    pub query_timeout: Option<Duration>,
    /// Executions per query; the median duration is reported.
    pub samples: usize,
}

impl Default for BenchSettings {
    fn default() -> Self {
        Self {
            target_users: DEFAULT_TARGET_USERS,
            latency_budget: DEFAULT_LATENCY_BUDGET,
            query_timeout: None,
            samples: 1,
        }
    }
}

/// Names of the relations the harness queries. Nothing else about the
/// schemas is assumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaNames {
    pub users: String,
    pub attributes: String,
    pub profiles: String,
}

impl Default for SchemaNames {
    fn default() -> Self {
        Self {
            users: DEFAULT_USERS_TABLE.to_string(),
            attributes: DEFAULT_ATTRIBUTES_TABLE.to_string(),
            profiles: DEFAULT_PROFILES_TABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LevelFilter,
    pub file: Option<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BenchConfig {
    pub db: DbConfig,
    pub pool: PoolSettings,
    pub bench: BenchSettings,
    pub schema: SchemaNames,
    pub log: LogSettings,
}

impl BenchConfig {
    /// Load from the process environment, after reading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(ConfigError::Invalid(format!("unreadable .env file: {err}")));
            }
        }
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using `lookup` to resolve variable names. Unset and blank
    /// variables fall back to the defaults above.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let db = DbConfig {
            host: get("AUDIENCE_DB_HOST").unwrap_or_else(|| DEFAULT_DB_HOST.to_string()),
            port: parse_var(&get, "AUDIENCE_DB_PORT", "a port number")?
                .unwrap_or(DEFAULT_DB_PORT),
            user: get("AUDIENCE_DB_USER").unwrap_or_else(|| DEFAULT_DB_USER.to_string()),
            password: get("AUDIENCE_DB_PASSWORD"),
            dbname: get("AUDIENCE_DB_NAME").unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
        };

        let pool = PoolSettings {
            max_open: parse_var(&get, "AUDIENCE_POOL_MAX_OPEN", "an integer")?
                .unwrap_or(DEFAULT_MAX_OPEN),
            max_idle: parse_var(&get, "AUDIENCE_POOL_MAX_IDLE", "an integer")?
                .unwrap_or(DEFAULT_MAX_IDLE),
            max_lifetime: parse_var(&get, "AUDIENCE_POOL_MAX_LIFETIME_SECS", "seconds")?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_MAX_LIFETIME),
            acquire_timeout: parse_var(&get, "AUDIENCE_POOL_ACQUIRE_TIMEOUT_SECS", "seconds")?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT),
        };

        let bench = BenchSettings {
            target_users: parse_var(&get, "AUDIENCE_TARGET_USERS", "an integer")?
                .unwrap_or(DEFAULT_TARGET_USERS),
            latency_budget: parse_var(&get, "AUDIENCE_BUDGET_MS", "milliseconds")?
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_LATENCY_BUDGET),
            query_timeout: parse_var(&get, "AUDIENCE_QUERY_TIMEOUT_MS", "milliseconds")?
                .map(Duration::from_millis),
            samples: parse_var(&get, "AUDIENCE_SAMPLES", "an integer")?.unwrap_or(1),
        };

        let schema = SchemaNames {
            users: get("AUDIENCE_USERS_TABLE").unwrap_or_else(|| DEFAULT_USERS_TABLE.to_string()),
            attributes: get("AUDIENCE_ATTRIBUTES_TABLE")
                .unwrap_or_else(|| DEFAULT_ATTRIBUTES_TABLE.to_string()),
            profiles: get("AUDIENCE_PROFILES_TABLE")
                .unwrap_or_else(|| DEFAULT_PROFILES_TABLE.to_string()),
        };

        let level = match get("AUDIENCE_LOG_LEVEL") {
            Some(value) => parse_log_level(&value).ok_or(ConfigError::Malformed {
                var: "AUDIENCE_LOG_LEVEL",
                value,
                expected: "a log level",
            })?,
            None => LevelFilter::Info,
        };
        let file = get("AUDIENCE_LOG_FILE").filter(|value| !value.eq_ignore_ascii_case("none"));

        let config = Self {
            db,
            pool,
            bench,
            schema,
            log: LogSettings { level, file },
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the cross-field constraints. Called by the loaders, and again
    /// by the binary after CLI overrides are applied.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_open == 0 {
            return Err(ConfigError::Invalid(
                "pool must allow at least one open connection".to_string(),
            ));
        }
        if self.pool.max_idle > self.pool.max_open {
            return Err(ConfigError::Invalid(format!(
                "max idle connections ({}) exceeds max open connections ({})",
                self.pool.max_idle, self.pool.max_open
            )));
        }
        if self.bench.samples == 0 {
            return Err(ConfigError::Invalid(
                "samples must be at least 1".to_string(),
            ));
        }
        if self.bench.target_users == 0 {
            return Err(ConfigError::Invalid(
                "target user count must be at least 1".to_string(),
            ));
        }
        if self.bench.latency_budget.is_zero() {
            return Err(ConfigError::Invalid(
                "latency budget must be positive".to_string(),
            ));
        }
        if matches!(self.bench.query_timeout, Some(timeout) if timeout.is_zero()) {
            return Err(ConfigError::Invalid(
                "query timeout must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T, G>(get: &G, var: &'static str, expected: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Malformed {
                var,
                value,
                expected,
            }),
        None => Ok(None),
    }
}

pub fn parse_log_level(value: &str) -> Option<LevelFilter> {
    match value.to_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}
