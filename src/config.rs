//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::intake::answers::BranchFieldPolicy;
use crate::intake::completion::CompletionConfig;
use crate::intake::controller::ControllerConfig;
use crate::reading::GeminiConfig;

/// Everything the server needs, read from `READING_INTAKE_*` variables.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// HTTP listen port.
    pub port: u16,
    /// libsql database file.
    pub db_path: PathBuf,
    /// Directory holding one local storage file per session.
    pub storage_dir: PathBuf,
    pub completion: CompletionConfig,
    pub controller: ControllerConfig,
    pub gemini: GeminiConfig,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("./data/reading-intake.db"),
            storage_dir: PathBuf::from("./data/sessions"),
            completion: CompletionConfig::default(),
            controller: ControllerConfig {
                transition_delay: Duration::from_millis(300),
                ..Default::default()
            },
            gemini: GeminiConfig::default(),
        }
    }
}

impl IntakeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("READING_INTAKE_PORT") {
            config.port = parse("READING_INTAKE_PORT", &v)?;
        }
        if let Some(v) = get("READING_INTAKE_DB_PATH") {
            config.db_path = PathBuf::from(v);
        }
        if let Some(v) = get("READING_INTAKE_STORAGE_DIR") {
            config.storage_dir = PathBuf::from(v);
        }

        if let Some(v) = get("READING_INTAKE_PAYMENT_URL") {
            config.completion.payment_url = v;
        }
        // An explicitly empty marker disables the bypass, so read it raw.
        if let Some(v) = lookup("READING_INTAKE_BYPASS_MARKER") {
            config.completion.bypass_marker = v.trim().to_string();
        }
        if let Some(v) = get("READING_INTAKE_REDIRECT_DELAY_MS") {
            config.completion.redirect_delay = millis("READING_INTAKE_REDIRECT_DELAY_MS", &v)?;
        }
        if let Some(v) = get("READING_INTAKE_GENERATION_TIMEOUT_SECS") {
            let secs: u64 = parse("READING_INTAKE_GENERATION_TIMEOUT_SECS", &v)?;
            config.completion.generation_timeout = Duration::from_secs(secs);
        }

        if let Some(v) = get("READING_INTAKE_TRANSITION_DELAY_MS") {
            config.controller.transition_delay = millis("READING_INTAKE_TRANSITION_DELAY_MS", &v)?;
        }
        if let Some(v) = get("READING_INTAKE_BRANCH_POLICY") {
            config.controller.branch_policy = match v.trim() {
                "retain" => BranchFieldPolicy::Retain,
                "clear" | "clear_on_category_change" => BranchFieldPolicy::ClearOnCategoryChange,
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "READING_INTAKE_BRANCH_POLICY".to_string(),
                        message: format!("expected 'retain' or 'clear', got '{other}'"),
                    });
                }
            };
        }

        if let Some(v) = get("READING_INTAKE_MODEL") {
            config.gemini.model = v;
        }
        if let Some(v) = get("READING_INTAKE_GEMINI_BASE_URL") {
            config.gemini.base_url = v;
        }
        config.gemini.api_key = get("GEMINI_API_KEY")
            .or_else(|| get("API_KEY"))
            .map(SecretString::from);

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
}

fn millis(key: &str, value: &str) -> Result<Duration, ConfigError> {
    parse::<u64>(key, value).map(Duration::from_millis)
}
