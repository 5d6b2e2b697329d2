use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use tutor_core::instructions::DEFAULT_LEARNER_NAME;

/// Default pause between tearing a session down and opening the next one.
pub const DEFAULT_REBIND_DELAY_MS: u64 = 800;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_endpoint: String,
    pub gemini_voice: Option<String>,
    pub outline_path: Option<PathBuf>,
    pub prompts_path: PathBuf,
    pub default_learner_name: String,
    pub rebind_delay: Duration,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;
        let gemini_model = std::env::var("GEMINI_MODEL")
            .unwrap_or_else(|_| gemini_realtime::DEFAULT_MODEL.to_string());
        let gemini_endpoint = std::env::var("GEMINI_ENDPOINT")
            .unwrap_or_else(|_| gemini_realtime::DEFAULT_ENDPOINT.to_string());
        let gemini_voice = std::env::var("GEMINI_VOICE").ok();

        let outline_path = std::env::var("OUTLINE_PATH").ok().map(PathBuf::from);
        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));

        let default_learner_name = std::env::var("DEFAULT_LEARNER_NAME")
            .unwrap_or_else(|_| DEFAULT_LEARNER_NAME.to_string());

        let rebind_delay = match std::env::var("REBIND_DELAY_MS") {
            Ok(raw) => raw.parse::<u64>().map(Duration::from_millis).map_err(|_| {
                ConfigError::InvalidValue(
                    "REBIND_DELAY_MS".to_string(),
                    format!("'{}' is not a number of milliseconds", raw),
                )
            })?,
            Err(_) => Duration::from_millis(DEFAULT_REBIND_DELAY_MS),
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            gemini_api_key,
            gemini_model,
            gemini_endpoint,
            gemini_voice,
            outline_path,
            prompts_path,
            default_learner_name,
            rebind_delay,
            log_level,
        })
    }
}
