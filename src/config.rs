use crate::email::DEFAULT_FOLDER;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AccountConfig {
    pub well_known_url: String,
    pub username: String,
    pub password_command: String,
}

#[derive(Debug)]
pub struct MailConfig {
    /// Mailbox fetched on refresh, resolved by name, role or path.
    pub fetch_mailbox: String,
    pub default_count: usize,
}

#[derive(Debug)]
pub struct Config {
    pub account: AccountConfig,
    pub mail: MailConfig,
    /// Explicit redb path; `None` means the default under the cache dir.
    pub store_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    account: Option<RawAccount>,
    #[serde(default)]
    mail: RawMailConfig,
    #[serde(default)]
    store: RawStoreConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAccount {
    well_known_url: Option<String>,
    username: Option<String>,
    password_command: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMailConfig {
    #[serde(default = "default_fetch_mailbox")]
    fetch_mailbox: String,
    #[serde(default = "default_count")]
    default_count: i64,
}

impl Default for RawMailConfig {
    fn default() -> Self {
        Self {
            fetch_mailbox: default_fetch_mailbox(),
            default_count: default_count(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStoreConfig {
    #[serde(default)]
    path: Option<PathBuf>,
}

fn default_fetch_mailbox() -> String {
    DEFAULT_FOLDER.to_string()
}

fn default_count() -> i64 {
    10
}

/// `$XDG_CONFIG_HOME/mailrules/config.toml`, falling back to `~/.config`.
pub fn default_config_path() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("mailrules").join("config.toml")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home)
            .join(".config")
            .join("mailrules")
            .join("config.toml")
    } else {
        PathBuf::from("config.toml")
    }
}

/// `rules.json` beside the config file.
pub fn default_rules_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(|dir| dir.join("rules.json"))
        .unwrap_or_else(|| PathBuf::from("rules.json"))
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    fn parse(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let account = raw
            .account
            .ok_or_else(|| ConfigError::Parse("missing [account] section".to_string()))?;
        let account = AccountConfig {
            well_known_url: require_field(account.well_known_url, "well_known_url")?,
            username: require_field(account.username, "username")?,
            password_command: require_field(account.password_command, "password_command")?,
        };

        if raw.mail.fetch_mailbox.trim().is_empty() {
            return Err(ConfigError::Parse(
                "fetch_mailbox in [mail] must not be empty".to_string(),
            ));
        }
        let default_count = usize::try_from(raw.mail.default_count)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConfigError::Parse(format!(
                    "default_count in [mail] must be a positive integer, got {}",
                    raw.mail.default_count
                ))
            })?;

        Ok(Config {
            account,
            mail: MailConfig {
                fetch_mailbox: raw.mail.fetch_mailbox,
                default_count,
            },
            store_path: raw.store.path,
        })
    }
}

fn require_field(value: Option<String>, name: &str) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::Parse(format!("missing {} in [account]", name)))
}
