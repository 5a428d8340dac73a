//! Configuration file parser for ~/.config/cabana/config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields`
//! off), though we log a warning when the file contains potential typos.
//!
//! Config values are startup defaults only. The screensaver's live settings
//! (timeout, rotation, enabled) are owned by the durable store once written;
//! the values here seed that record when it is absent.
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level kiosk configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
///
/// Custom Debug impl masks `device_token` to keep the backend credential out
/// of logs, error messages, and debug output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the guide backend (campaign list + counters).
    /// None disables the sponsored-campaign surface.
    pub backend_url: Option<String>,

    /// Device token presented to the backend as a bearer credential.
    /// The CABANA_DEVICE_TOKEN env var takes precedence over this value.
    pub device_token: Option<String>,

    /// Preferred guest-facing language tag (seeds the preference record).
    pub language: String,

    /// Idle timeout in seconds before the screensaver engages.
    pub idle_timeout_secs: u64,

    /// Seconds between sponsored-campaign rotations.
    pub campaign_rotation_secs: u64,

    /// Location prefixes where the screensaver never engages
    /// (e.g. the partner management surface).
    pub excluded_paths: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: None,
            device_token: None,
            language: "en".to_string(),
            idle_timeout_secs: 120,
            campaign_rotation_secs: 8,
            excluded_paths: vec!["/partner".to_string()],
        }
    }
}

/// Mask device_token in Debug output to prevent credential leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("backend_url", &self.backend_url)
            .field(
                "device_token",
                &self.device_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("language", &self.language)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("campaign_rotation_secs", &self.campaign_rotation_secs)
            .field("excluded_paths", &self.excluded_paths)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to prevent memory exhaustion from a
        // corrupted or maliciously large config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {} // Size is within limits, proceed
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "backend_url",
                "device_token",
                "language",
                "idle_timeout_secs",
                "campaign_rotation_secs",
                "excluded_paths",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            backend = config.backend_url.as_deref().unwrap_or("(none)"),
            "Loaded configuration"
        );
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend_url, None);
        assert_eq!(config.device_token, None);
        assert_eq!(config.language, "en");
        assert_eq!(config.idle_timeout_secs, 120);
        assert_eq!(config.campaign_rotation_secs, 8);
        assert_eq!(config.excluded_paths, vec!["/partner".to_string()]);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/cabana_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.language, "en");
    }

    #[test]
    fn test_empty_file_returns_default() {
        let dir = std::env::temp_dir().join("cabana_config_test_empty");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.idle_timeout_secs, 120);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let dir = std::env::temp_dir().join("cabana_config_test_partial");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "idle_timeout_secs = 45\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.idle_timeout_secs, 45);
        assert_eq!(config.campaign_rotation_secs, 8); // default
        assert_eq!(config.language, "en"); // default

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = std::env::temp_dir().join("cabana_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let content = r#"
backend_url = "https://guide.example-resort.com"
device_token = "tok-123"
language = "es"
idle_timeout_secs = 90
campaign_rotation_secs = 12
excluded_paths = ["/partner", "/admin"]
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.backend_url.as_deref(),
            Some("https://guide.example-resort.com")
        );
        assert_eq!(config.device_token.as_deref(), Some("tok-123"));
        assert_eq!(config.language, "es");
        assert_eq!(config.idle_timeout_secs, 90);
        assert_eq!(config.campaign_rotation_secs, 12);
        assert_eq!(
            config.excluded_paths,
            vec!["/partner".to_string(), "/admin".to_string()]
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = std::env::temp_dir().join("cabana_config_test_invalid");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "this is not [valid toml").unwrap();

        let result = Config::load(&path);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let dir = std::env::temp_dir().join("cabana_config_test_unknown");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let content = r#"
language = "fr"
totally_fake_key = "should not fail"
another_unknown = 42
"#;
        std::fs::write(&path, content).unwrap();

        // Should succeed (unknown keys ignored)
        let config = Config::load(&path).unwrap();
        assert_eq!(config.language, "fr");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let dir = std::env::temp_dir().join("cabana_config_test_wrongtype");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        // idle_timeout_secs should be an integer, not a string
        std::fs::write(&path, "idle_timeout_secs = \"soon\"\n").unwrap();

        let result = Config::load(&path);
        assert!(result.is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("cabana_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        // Write a file just over 1MB
        let content = "a".repeat(1_048_577);
        std::fs::write(&path, content).unwrap();

        let result = Config::load(&path);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_debug_masks_device_token() {
        let mut config = Config::default();
        config.device_token = Some("super-secret-token-12345".to_string());

        let debug_output = format!("{:?}", config);
        assert!(
            !debug_output.contains("super-secret-token-12345"),
            "Debug output should not contain the device token"
        );
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should show [REDACTED] for device token"
        );
    }

    #[test]
    fn test_debug_shows_none_when_no_token() {
        let config = Config::default();
        let debug_output = format!("{:?}", config);
        assert!(debug_output.contains("None"));
        assert!(!debug_output.contains("[REDACTED]"));
    }
}
