use directories::ProjectDirs;
use std::env;
use std::path::PathBuf;

use crate::crypto::{MessageMode, DEFAULT_KDF_ITERATIONS, MIN_KDF_ITERATIONS};
use crate::error::{E2eeError, E2eeResult};

pub const ENV_DB: &str = "CHATSEAL_DB";
pub const ENV_KDF_ITERATIONS: &str = "CHATSEAL_KDF_ITERATIONS";
pub const ENV_MESSAGE_MODE: &str = "CHATSEAL_MESSAGE_MODE";
pub const ENV_SELF_COPY: &str = "CHATSEAL_SELF_COPY";

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    /// PBKDF2 rounds for sealing. Changing this makes existing sealed keys
    /// unreadable: the envelope does not record it.
    pub kdf_iterations: u32,
    pub message_mode: MessageMode,
    /// Also encrypt each outgoing message under the sender's own key
    pub self_copy: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            message_mode: MessageMode::Direct,
            self_copy: false,
        }
    }
}

impl AppConfig {
    /// Load `.env` from the working directory, then from the platform
    /// config directory, then read `CHATSEAL_*` variables over the defaults.
    pub fn load() -> E2eeResult<Self> {
        dotenv::dotenv().ok();
        if let Some(proj_dirs) = project_dirs() {
            let env_path = proj_dirs.config_dir().join(".env");
            if env_path.exists() {
                let _ = dotenv::from_path(env_path);
            }
        }
        Self::from_env()
    }

    pub fn from_env() -> E2eeResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> E2eeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DB) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_KDF_ITERATIONS) {
            config.kdf_iterations = raw.trim().parse().map_err(|_| {
                E2eeError::Config(format!("{} must be a positive integer, got {:?}", ENV_KDF_ITERATIONS, raw))
            })?;
        }
        if let Some(raw) = lookup(ENV_MESSAGE_MODE) {
            config.message_mode = raw.parse()?;
        }
        if let Some(raw) = lookup(ENV_SELF_COPY) {
            config.self_copy = parse_bool(&raw)
                .ok_or_else(|| E2eeError::Config(format!("{} must be true or false, got {:?}", ENV_SELF_COPY, raw)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> E2eeResult<()> {
        if self.kdf_iterations < MIN_KDF_ITERATIONS {
            return Err(E2eeError::Config(format!(
                "KDF iterations must be at least {}, got {}",
                MIN_KDF_ITERATIONS, self.kdf_iterations
            )));
        }
        if self.db_path.as_os_str().is_empty() {
            return Err(E2eeError::Config("Database path cannot be empty".to_string()));
        }
        Ok(())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "chatseal", "chatseal")
}

fn default_db_path() -> PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.data_dir().join("chatseal.db"),
        None => PathBuf::from("chatseal.db"),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
