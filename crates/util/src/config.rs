use std::{env, fmt, net::SocketAddr, time::Duration};

use super::{optional_var, server_bind_address};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://onboard.db?mode=rwc";
pub const DEFAULT_PUBLIC_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60 * 24;
const DEFAULT_DELIVERY_INTERVAL_SECS: u64 = 30;
const DEVELOPMENT_SESSION_SECRET: &[u8] = b"onboard-development-session-secret";
const MIN_SESSION_SECRET_LEN: usize = 32;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns `true` when the current environment should behave as development.
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Connection details for the transactional-email relay.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub base_url: String,
    pub api_key: String,
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub session_secret: Vec<u8>,
    pub session_ttl: Duration,
    pub public_url: String,
    pub mailer: Option<MailerConfig>,
    pub delivery_interval: Duration,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let database_url =
            optional_var("APP_DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let session_secret = session_secret(environment)?;
        let session_ttl = Duration::from_secs(parse_secs(
            "APP_SESSION_TTL_SECS",
            DEFAULT_SESSION_TTL_SECS,
        )?);
        let delivery_interval = Duration::from_secs(parse_secs(
            "APP_DELIVERY_INTERVAL_SECS",
            DEFAULT_DELIVERY_INTERVAL_SECS,
        )?);
        let public_url = optional_var("APP_PUBLIC_URL")
            .unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let mailer = match (optional_var("APP_MAILER_URL"), optional_var("APP_MAILER_API_KEY")) {
            (Some(base_url), Some(api_key)) => Some(MailerConfig { base_url, api_key }),
            (Some(_), None) => return Err(ConfigError::Missing("APP_MAILER_API_KEY")),
            (None, _) => None,
        };

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            session_secret,
            session_ttl,
            public_url,
            mailer,
            delivery_interval,
        })
    }
}

fn session_secret(environment: Environment) -> Result<Vec<u8>, ConfigError> {
    let Some(raw) = optional_var("APP_SESSION_SECRET") else {
        return match environment {
            Environment::Production => Err(ConfigError::Missing("APP_SESSION_SECRET")),
            _ => Ok(DEVELOPMENT_SESSION_SECRET.to_vec()),
        };
    };

    let secret = hex::decode(&raw).map_err(ConfigError::SessionSecret)?;
    if secret.len() < MIN_SESSION_SECRET_LEN {
        return Err(ConfigError::SessionSecretTooShort(secret.len()));
    }
    Ok(secret)
}

fn parse_secs(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match optional_var(name) {
        Some(value) => match value.parse::<u64>() {
            Ok(0) | Err(_) => Err(ConfigError::InvalidNumber { name, value }),
            Ok(secs) => Ok(secs),
        },
        None => Ok(default),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    Missing(&'static str),
    SessionSecret(hex::FromHexError),
    SessionSecretTooShort(usize),
    InvalidNumber { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::Missing(name) => write!(f, "{name} must be set"),
            Self::SessionSecret(err) => write!(f, "APP_SESSION_SECRET must be hex encoded: {err}"),
            Self::SessionSecretTooShort(len) => write!(
                f,
                "APP_SESSION_SECRET must decode to at least {MIN_SESSION_SECRET_LEN} bytes (got {len})"
            ),
            Self::InvalidNumber { name, value } => {
                write!(f, "{name} must be a positive integer (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
