// Configuration loading and parsing (client.toml).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::names::Participant;

/// Historical polling cadence.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

const CONFIG_FILE: &str = "client.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// client.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub poll: PollConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Base URL every endpoint path is appended to.
    pub base_url: String,
    /// Sent as `x-csrf-token` on every request.
    #[serde(default)]
    pub csrf_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Local participant id as known to the roster.
    pub participant_id: String,
    /// Static roster for hosts without a live participant feed.
    #[serde(default)]
    pub roster: Vec<Participant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_directory")]
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
        }
    }
}

fn default_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_log_directory() -> String {
    "logs".to_string()
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate the configuration at `path`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    parse_config(&text, path)
}

/// Parse and validate configuration text. `path` is only used in errors.
pub fn parse_config(text: &str, path: &Path) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    validate(&config)?;
    Ok(config)
}

/// Locate `client.toml`: `config/client.toml` under the working directory
/// first, then the per-user config directory.
pub fn locate_config() -> Result<PathBuf, ConfigError> {
    let local = std::env::current_dir()
        .map(|cwd| cwd.join("config").join(CONFIG_FILE))
        .map_err(|_| ConfigError::FileNotFound {
            path: PathBuf::from("."),
        })?;
    if local.exists() {
        return Ok(local);
    }

    if let Some(dirs) = directories::ProjectDirs::from("", "", "avalon") {
        let user = dirs.config_dir().join(CONFIG_FILE);
        if user.exists() {
            return Ok(user);
        }
    }

    Err(ConfigError::FileNotFound { path: local })
}

/// Convenience wrapper: locate and load the configuration.
pub fn load_config() -> Result<Config, ConfigError> {
    let path = locate_config()?;
    load_config_from(&path)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let base_url = config.server.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::ValidationError {
            field: "server.base_url".into(),
            message: format!("must be an http(s) URL, got `{base_url}`"),
        });
    }

    if config.poll.interval_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "poll.interval_secs".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.session.participant_id.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "session.participant_id".into(),
            message: "must not be empty".into(),
        });
    }

    let mut seen = std::collections::HashSet::new();
    for member in &config.session.roster {
        if !seen.insert(member.id.as_str()) {
            return Err(ConfigError::ValidationError {
                field: "session.roster".into(),
                message: format!("duplicate participant id `{}`", member.id),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const VALID: &str = r#"
        [server]
        base_url = "https://avalon.example.com/"
        csrf_token = "abc123"

        [session]
        participant_id = "hangout-p1"

        [[session.roster]]
        id = "hangout-p1"
        person_id = "1001"
        display_name = "Alice"

        [[session.roster]]
        id = "hangout-p2"
        person_id = "1002"
        display_name = "Bob"
    "#;

    fn parse(text: &str) -> Result<Config, ConfigError> {
        parse_config(text, Path::new("client.toml"))
    }

    #[test]
    fn valid_config_takes_defaults_for_optional_sections() {
        let config = parse(VALID).expect("should parse");
        assert_eq!(config.server.csrf_token, "abc123");
        assert_eq!(config.poll.interval_secs, DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(config.logging.directory, "logs");
        assert_eq!(config.session.roster.len(), 2);
        assert_eq!(config.session.roster[1].display_name, "Bob");
    }

    #[test]
    fn rejects_zero_interval() {
        let text = format!("{VALID}\n[poll]\ninterval_secs = 0\n");
        match parse(&text) {
            Err(ConfigError::ValidationError { field, .. }) => {
                assert_eq!(field, "poll.interval_secs")
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_non_http_base_url() {
        let text = VALID.replace("https://avalon.example.com/", "ftp://nope");
        match parse(&text) {
            Err(ConfigError::ValidationError { field, .. }) => assert_eq!(field, "server.base_url"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicate_roster_ids() {
        let text = VALID.replace("hangout-p2", "hangout-p1");
        match parse(&text) {
            Err(ConfigError::ValidationError { field, message }) => {
                assert_eq!(field, "session.roster");
                assert!(message.contains("hangout-p1"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        assert!(matches!(
            parse("[server\nbase_url = 1"),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn file_not_found_for_missing_path() {
        let path = std::env::temp_dir().join("avalon_config_test_missing/client.toml");
        assert!(matches!(
            load_config_from(&path),
            Err(ConfigError::FileNotFound { .. })
        ));
    }

    #[test]
    fn loads_from_disk() {
        let dir = std::env::temp_dir().join("avalon_config_test_load");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, VALID).unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.session.participant_id, "hangout-p1");

        let _ = fs::remove_dir_all(&dir);
    }
}
