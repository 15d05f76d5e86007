use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::passkey::PasskeySettings;
use crate::webauthn::UserVerificationRequirement;

/// Environment variable naming a directory whose Settings.toml overrides the local one
pub const SECRETS_DIR_ENV: &str = "PASSKEY_SECRETS_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub passkeys: PasskeySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A settings file exists but cannot be read
    /// - TOML parsing fails
    /// - The resulting passkey settings fail validation
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Load settings with `config_dir` standing in for the working directory
    ///
    /// # Errors
    ///
    /// See [`Settings::load`]
    pub fn load_from(config_dir: &Path) -> anyhow::Result<Self> {
        // Load base settings from TOML or defaults
        let mut settings = Self::load_base_settings(config_dir)?;

        // Apply environment variable overrides
        Self::apply_env_overrides(&mut settings);

        settings
            .passkeys
            .validate()
            .context("Invalid passkey settings")?;

        Ok(settings)
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `PASSKEY_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in the config directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or parsed
    fn load_base_settings(config_dir: &Path) -> anyhow::Result<Self> {
        // 1. Start with default settings
        let mut settings = Self::default();

        // 2. Settings.toml in the config directory (lower priority)
        let default_config_path = config_dir.join("Settings.toml");
        if default_config_path.exists() {
            settings = Self::read_settings_file(&default_config_path)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        // 3. Secrets directory replaces the base file entirely (higher priority)
        if let Ok(secrets_dir) = std::env::var(SECRETS_DIR_ENV) {
            let secrets_path = Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::read_settings_file(&secrets_path)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ {SECRETS_DIR_ENV} set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    fn read_settings_file(path: &Path) -> anyhow::Result<Self> {
        let toml_content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        basic_toml::from_str(&toml_content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Apply environment variable overrides to settings
    fn apply_env_overrides(settings: &mut Self) {
        Self::apply_passkey_env_overrides(&mut settings.passkeys);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    /// Apply environment overrides for passkey settings
    pub fn apply_passkey_env_overrides(passkey_settings: &mut PasskeySettings) {
        if let Ok(rp_id) = std::env::var("RP_ID") {
            passkey_settings.rp_id = rp_id;
        }
        if let Ok(rp_name) = std::env::var("RP_NAME") {
            passkey_settings.rp_name = rp_name;
        }
        if let Ok(rp_origin) = std::env::var("RP_ORIGIN") {
            passkey_settings.rp_origin = rp_origin;
        }

        Self::apply_numeric_env_override(
            "CEREMONY_TIMEOUT_SECONDS",
            &mut passkey_settings.timeout_seconds,
        );
        Self::apply_numeric_env_override(
            "CHALLENGE_TTL_SECONDS",
            &mut passkey_settings.challenge_ttl_seconds,
        );

        if let Ok(value) = std::env::var("USER_VERIFICATION") {
            if let Ok(requirement) = value.parse::<UserVerificationRequirement>() {
                passkey_settings.user_verification = requirement;
            }
        }
    }

    /// Helper function to apply numeric environment variable overrides
    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            }
        }
    }

    /// Apply environment overrides for logging settings
    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("LOG_LEVEL") {
            logging_settings.level = log_level;
        }
    }
}

/// Initialize `env_logger` from the logging settings.
///
/// `RUST_LOG`, when set, still takes precedence. Calling this more than once is
/// harmless; only the first logger installed wins.
pub fn init_logging(logging: &LoggingSettings) {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&logging.level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    let _ = builder.try_init();
}
