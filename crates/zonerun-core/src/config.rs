//! Configuration parsing for the task agent.
//!
//! `key=value` lines, `#` comments, optional single or double quotes around values.
//! Precedence: CLI flags > `--config` file > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Prefix for static placeholder tokens (`token.%HOME%=/home/alumne`).
const TOKEN_KEY_PREFIX: &str = "token.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid config line: {0}")]
    InvalidLine(String),
    #[error("invalid boolean value for {key}: {value}")]
    InvalidBool { key: String, value: String },
    #[error("invalid integer value for {key}: {value}")]
    InvalidInt { key: String, value: String },
    #[error("{key} must be greater than zero")]
    ZeroTimeout { key: String },
}

/// Agent configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Wall-clock limit for each command, uniform across the run.
    pub command_timeout_sec: u32,
    /// Limit for the report POST.
    pub request_timeout_sec: u32,
    /// Skip TLS certificate validation. Unsafe outside of test setups.
    pub insecure: bool,
    /// Add a `counts` object to the report body.
    pub include_counts: bool,
    /// Interpreter used as `<shell> -c <command>`.
    pub shell: PathBuf,
    /// Append per-task rows to this TSV file.
    pub results_log: Option<PathBuf>,
    /// Static placeholder tokens, in declaration order.
    pub tokens: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command_timeout_sec: 2,
            request_timeout_sec: 20,
            insecure: false,
            include_counts: false,
            shell: PathBuf::from("/bin/sh"),
            results_log: None,
            tokens: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from a file, merging with defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.load_file(path)?;
        Ok(config)
    }

    /// Load and merge values from a config file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_content(&content)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.command_timeout_sec))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.request_timeout_sec))
    }

    /// Bind a static token, replacing an earlier value for the same token.
    pub fn set_token(&mut self, token: impl Into<String>, value: impl Into<String>) {
        let token = token.into();
        let value = value.into();
        if let Some(entry) = self.tokens.iter_mut().find(|(t, _)| *t == token) {
            entry.1 = value;
        } else {
            self.tokens.push((token, value));
        }
    }

    /// Parse config content (key=value format).
    fn parse_content(&mut self, content: &str) -> Result<(), ConfigError> {
        for line in content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidLine(line.to_string()));
            };

            let key = key.trim();
            let value = Self::unquote(value.trim());

            self.apply_value(key, &value)?;
        }
        Ok(())
    }

    /// Remove surrounding quotes from a value.
    fn unquote(value: &str) -> String {
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            return value[1..value.len() - 1].to_string();
        }
        value.to_string()
    }

    /// Apply a single config value.
    fn apply_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        if let Some(token) = key.strip_prefix(TOKEN_KEY_PREFIX) {
            if token.is_empty() {
                return Err(ConfigError::InvalidLine(format!("{key}={value}")));
            }
            self.set_token(token, value);
            return Ok(());
        }

        match key {
            "command_timeout_sec" => self.command_timeout_sec = Self::parse_timeout(key, value)?,
            "request_timeout_sec" => self.request_timeout_sec = Self::parse_timeout(key, value)?,
            "insecure" => self.insecure = Self::parse_bool(key, value)?,
            "include_counts" => self.include_counts = Self::parse_bool(key, value)?,
            "shell" => self.shell = PathBuf::from(value),
            "results_log" => {
                self.results_log = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
            _ => {
                // Warn but don't fail for unknown keys
                eprintln!("Warning: unknown config key: {key}");
            }
        }
        Ok(())
    }

    /// Parse a boolean value.
    fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "on" => Ok(true),
            "false" | "0" | "no" | "n" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Parse a timeout in seconds. Zero is rejected: every wait must be bounded.
    fn parse_timeout(key: &str, value: &str) -> Result<u32, ConfigError> {
        let secs: u32 = value.parse().map_err(|_| ConfigError::InvalidInt {
            key: key.to_string(),
            value: value.to_string(),
        })?;
        if secs == 0 {
            return Err(ConfigError::ZeroTimeout {
                key: key.to_string(),
            });
        }
        Ok(secs)
    }
}
