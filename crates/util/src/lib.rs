pub mod config;

use std::env;

pub use config::{AppConfig, ConfigError, Environment, GenerationConfig, MerchantConfig};

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://127.0.0.1:11434/";
pub const DEFAULT_LINKSYNERGY_BASE_URL: &str = "https://api.linksynergy.com/";
pub const DEFAULT_GENERATION_MODEL: &str = "llama3.2";

/// Loads environment variables from `.env` when available.
///
/// Missing files are ignored so the function is safe in production builds
/// where dotenv files are not deployed.
pub fn load_env_file() {
    let _ = dotenvy::dotenv();
}

/// Returns the database connection string from `DATABASE_URL`.
///
/// Blank values are treated the same as a missing variable.
pub fn database_url() -> Option<String> {
    non_empty_var("DATABASE_URL")
}

/// Reads an environment variable, discarding unset or whitespace-only values.
pub fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
pub(crate) static ENV_GUARD: std::sync::LazyLock<std::sync::Mutex<()>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(()));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_url_is_none_when_env_missing() {
        let _lock = ENV_GUARD.lock().expect("env guard poisoned");
        env::remove_var("DATABASE_URL");
        assert!(database_url().is_none());
    }

    #[test]
    fn blank_database_url_counts_as_missing() {
        let _lock = ENV_GUARD.lock().expect("env guard poisoned");
        env::set_var("DATABASE_URL", "   ");
        assert!(database_url().is_none());
        env::remove_var("DATABASE_URL");
    }

    #[test]
    fn database_url_is_trimmed() {
        let _lock = ENV_GUARD.lock().expect("env guard poisoned");
        env::set_var("DATABASE_URL", " sqlite://content.db ");
        assert_eq!(database_url().as_deref(), Some("sqlite://content.db"));
        env::remove_var("DATABASE_URL");
    }
}
