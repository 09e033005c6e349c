use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

use url::Url;

use super::{
    database_url, non_empty_var, DEFAULT_GENERATION_MODEL, DEFAULT_LINKSYNERGY_BASE_URL,
    DEFAULT_OLLAMA_BASE_URL,
};

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

/// Settings for the generation pipeline and its external text service.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub base_url: Url,
    pub model: String,
    pub timeout: Duration,
    /// Refill interval of the request token bucket.
    pub interval: Duration,
    pub burst: u32,
    pub workers: usize,
    pub page_size: u32,
    pub tone: String,
    pub locales_file: Option<PathBuf>,
}

/// Settings for the merchant sync job.
///
/// Credentials stay optional here; the sync command validates them before it
/// touches the network so generator runs do not need them.
#[derive(Debug, Clone)]
pub struct MerchantConfig {
    pub base_url: Url,
    pub bearer_token: Option<String>,
    pub scope: Option<String>,
    pub interval: Duration,
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub database_url: String,
    pub generation: GenerationConfig,
    pub merchant: MerchantConfig,
    pub metrics_file: Option<PathBuf>,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let database_url = database_url().ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let generation = GenerationConfig {
            base_url: parse_url("OLLAMA_BASE_URL", DEFAULT_OLLAMA_BASE_URL)?,
            model: non_empty_var("GENERATION_MODEL")
                .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string()),
            timeout: Duration::from_secs(parse_number("GENERATION_TIMEOUT_SECS", 120)?),
            interval: Duration::from_millis(parse_number("GENERATION_INTERVAL_MS", 4000)?),
            burst: positive("GENERATION_BURST", parse_number("GENERATION_BURST", 1)?)?,
            workers: positive("GENERATION_WORKERS", parse_number("GENERATION_WORKERS", 1)?)?,
            page_size: positive("PAGE_SIZE", parse_number("PAGE_SIZE", 10)?)?,
            tone: non_empty_var("CONTENT_TONE").unwrap_or_else(|| "informative".to_string()),
            locales_file: non_empty_var("LOCALES_FILE").map(PathBuf::from),
        };

        let merchant = MerchantConfig {
            base_url: parse_url("LINKSYNERGY_BASE_URL", DEFAULT_LINKSYNERGY_BASE_URL)?,
            bearer_token: non_empty_var("RAKUTEN_BEARER_TOKEN"),
            scope: non_empty_var("RAKUTEN_SCOPE"),
            interval: Duration::from_millis(parse_number("MERCHANT_INTERVAL_MS", 60_000)?),
        };

        Ok(Self {
            environment,
            database_url,
            generation,
            merchant,
            metrics_file: non_empty_var("CONTENTGEN_METRICS_FILE").map(PathBuf::from),
        })
    }
}

fn parse_number<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match non_empty_var(name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
        None => Ok(default),
    }
}

fn positive<T>(name: &'static str, value: T) -> Result<T, ConfigError>
where
    T: PartialOrd + Default + ToString,
{
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::InvalidNumber {
            name,
            value: value.to_string(),
        })
    }
}

fn parse_url(name: &'static str, default: &str) -> Result<Url, ConfigError> {
    let value = non_empty_var(name).unwrap_or_else(|| default.to_string());
    // Relative joins drop the last path segment unless the base ends with '/'.
    let value = if value.ends_with('/') {
        value
    } else {
        format!("{value}/")
    };
    Url::parse(&value).map_err(|err| ConfigError::InvalidUrl { name, source: err })
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    Missing(&'static str),
    InvalidNumber {
        name: &'static str,
        value: String,
    },
    InvalidUrl {
        name: &'static str,
        source: url::ParseError,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::Missing(name) => write!(f, "required environment variable {name} is not set"),
            Self::InvalidNumber { name, value } => {
                write!(f, "{name} must be a positive number (got {value})")
            }
            Self::InvalidUrl { name, source } => write!(f, "invalid {name} value: {source}"),
        }
    }
}

impl std::error::Error for ConfigError {}
