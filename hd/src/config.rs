//! Haunter configuration types and loading

use chrono::NaiveTime;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::PersonaKind;

/// Main Haunter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration (intent classification)
    pub llm: LlmConfig,

    /// Per-persona timing and behaviour
    pub personas: PersonasConfig,

    /// Daily bootstrap check
    pub bootstrap: BootstrapConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks persona timings and the bootstrap time of day. The API key is
    /// only checked when a classifier is actually built.
    pub fn validate(&self) -> Result<()> {
        for kind in PersonaKind::ALL {
            let persona = self.personas.get(kind);
            if persona.base_minutes == 0 {
                return Err(eyre::eyre!("personas.{}: base-minutes must be at least 1", kind));
            }
            if persona.cap_minutes < persona.base_minutes {
                return Err(eyre::eyre!(
                    "personas.{}: cap-minutes ({}) is below base-minutes ({})",
                    kind,
                    persona.cap_minutes,
                    persona.base_minutes
                ));
            }
            if persona.max_postpone_minutes == 0 {
                return Err(eyre::eyre!("personas.{}: max-postpone-minutes must be at least 1", kind));
            }
        }
        self.bootstrap.daily_time()?;
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .haunter.yml
        let local_config = PathBuf::from(".haunter.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/haunter/haunter.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("haunter").join("haunter.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Silent on every failure since there is nowhere to report it yet.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".haunter.yml")];
                if let Some(config_dir) = dirs::config_dir() {
                    paths.push(config_dir.join("haunter").join("haunter.yml"));
                }
                paths
            }
        };

        candidates
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_yaml::from_str::<Self>(&content).ok())
            .and_then(|config| config.log_level)
    }

    pub(crate) fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate().context("Invalid config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "anthropic" supported)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).map_err(|_| {
            eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.api_key_env
            )
        })
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-3-5-haiku-latest".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 256,
            timeout_ms: 30_000,
        }
    }
}

/// Timing and behaviour for all three personas
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonasConfig {
    pub bootstrap: PersonaConfig,
    pub commitment: PersonaConfig,
    pub incomplete: PersonaConfig,
}

impl PersonasConfig {
    pub fn get(&self, kind: PersonaKind) -> &PersonaConfig {
        match kind {
            PersonaKind::Bootstrap => &self.bootstrap,
            PersonaKind::Commitment => &self.commitment,
            PersonaKind::Incomplete => &self.incomplete,
        }
    }
}

impl Default for PersonasConfig {
    fn default() -> Self {
        Self {
            bootstrap: PersonaConfig::defaults_for(PersonaKind::Bootstrap),
            commitment: PersonaConfig::defaults_for(PersonaKind::Commitment),
            incomplete: PersonaConfig::defaults_for(PersonaKind::Incomplete),
        }
    }
}

/// One persona's settings
///
/// Missing keys fall back to the generic reminder timings; use
/// [`PersonaConfig::defaults_for`] for the per-persona defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Backoff delay for attempt 0
    #[serde(rename = "base-minutes")]
    pub base_minutes: u32,

    /// Upper bound on the backoff delay
    #[serde(rename = "cap-minutes")]
    pub cap_minutes: u32,

    /// Postpone length when the reply names no duration
    #[serde(rename = "default-postpone-minutes")]
    pub default_postpone_minutes: u32,

    /// Longest accepted postpone
    #[serde(rename = "max-postpone-minutes")]
    pub max_postpone_minutes: u32,

    /// Send a "didn't catch that" message on unrecognised replies
    #[serde(rename = "reprompt-on-unknown")]
    pub reprompt_on_unknown: bool,
}

impl PersonaConfig {
    pub fn defaults_for(kind: PersonaKind) -> Self {
        let (base_minutes, cap_minutes) = match kind {
            PersonaKind::Commitment => (5, 120),
            PersonaKind::Bootstrap | PersonaKind::Incomplete => (20, 240),
        };
        Self {
            base_minutes,
            cap_minutes,
            ..Self::default()
        }
    }
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            base_minutes: 5,
            cap_minutes: 120,
            default_postpone_minutes: 15,
            max_postpone_minutes: 1440,
            reprompt_on_unknown: true,
        }
    }
}

/// Daily bootstrap check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Time of day (UTC, "HH:MM") the check runs
    #[serde(rename = "daily-at")]
    pub daily_at: String,

    /// How far ahead a commitment must exist to skip the bootstrap nag
    #[serde(rename = "lookahead-hours")]
    pub lookahead_hours: u32,

    /// Notification target for bootstrap sessions
    pub target: String,
}

impl BootstrapConfig {
    /// Parse `daily-at` into a time of day
    pub fn daily_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.daily_at, "%H:%M")
            .context(format!("bootstrap.daily-at '{}' is not HH:MM", self.daily_at))
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            daily_at: "08:00".to_string(),
            lookahead_hours: 24,
            target: "default".to_string(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(rename = "db-path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/haunter on Linux)
        let db_path = dirs::data_dir()
            .map(|d| d.join("haunter"))
            .unwrap_or_else(|| PathBuf::from(".haunter"))
            .join("sessions.db");

        Self { db_path }
    }
}
