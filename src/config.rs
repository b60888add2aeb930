use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::text::RewriteRule;

/// Placeholder substituted with the outgoing text in `forward.arguments`.
pub const TEXT_PLACEHOLDER: &str = "%Text";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("rewrite rule #{index} has an invalid pattern {pattern:?}: {source}")]
    InvalidRewrite {
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("translate.enable is set but translate.target_lang is empty")]
    MissingTargetLang,

    #[error("forward.enable is set but forward.command is empty")]
    MissingForwardCommand,
}

/// On-disk configuration, deserialized from TOML. Every field has a default so
/// a partial file (or no file at all) is valid.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub ignore_enemy: bool,
    #[serde(default)]
    pub ignore_senders: Vec<String>,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub translate: TranslateConfig,
    #[serde(default)]
    pub forward: ForwardConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub rewrite: Vec<RewritePair>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Executable names of the game client, matched case-insensitively.
    /// An empty list skips the process check and relies on the TCP probe.
    #[serde(default = "default_process_names")]
    pub process_names: Vec<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// 0 leaves the HTTP client without a request timeout.
    #[serde(default)]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranslateConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub target_lang: String,
    #[serde(default = "default_translate_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ForwardConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub command: String,
    #[serde(default = "default_forward_arguments")]
    pub arguments: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    /// Upper bound on messages of one batch processed concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RewritePair {
    pub from: String,
    #[serde(default)]
    pub to: String,
}

fn default_interval_ms() -> u64 {
    500
}

fn default_host() -> String {
    // "localhost" resolves slowly on some Windows setups
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8111
}

fn default_process_names() -> Vec<String> {
    vec!["aces".to_string(), "aces.exe".to_string()]
}

fn default_connect_timeout_ms() -> u64 {
    500
}

fn default_translate_endpoint() -> String {
    "https://translate.googleapis.com/translate_a/single".to_string()
}

fn default_forward_arguments() -> String {
    TEXT_PLACEHOLDER.to_string()
}

fn default_workers() -> usize {
    4
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            process_names: default_process_names(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: 0,
        }
    }
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            enable: false,
            target_lang: String::new(),
            endpoint: default_translate_endpoint(),
        }
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            enable: false,
            command: String::new(),
            arguments: default_forward_arguments(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            ignore_enemy: false,
            ignore_senders: Vec::new(),
            source: SourceConfig::default(),
            translate: TranslateConfig::default(),
            forward: ForwardConfig::default(),
            relay: RelayConfig::default(),
            rewrite: Vec::new(),
        }
    }
}

impl SourceConfig {
    /// Base URL of the telemetry HTTP server, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

impl Config {
    /// Parse a config from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Load the config at `path`. A missing file is not an error: the
    /// built-in defaults are used instead.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Config file {} not found, using default config",
                    path.display()
                );
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))
            }
        };

        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        info!("{} loaded", path.display());
        Ok(config)
    }

    /// Validate and compile into the immutable per-run configuration.
    pub fn into_runtime(self) -> Result<RuntimeConfig, ConfigError> {
        if self.translate.enable && self.translate.target_lang.trim().is_empty() {
            return Err(ConfigError::MissingTargetLang);
        }
        if self.forward.enable && self.forward.command.trim().is_empty() {
            return Err(ConfigError::MissingForwardCommand);
        }

        let rules = self
            .rewrite
            .iter()
            .enumerate()
            .map(|(index, pair)| {
                RewriteRule::new(&pair.from, &pair.to).map_err(|source| {
                    ConfigError::InvalidRewrite {
                        index,
                        pattern: pair.from.clone(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RuntimeConfig {
            interval: Duration::from_millis(self.interval_ms.max(1)),
            ignore_enemy: self.ignore_enemy,
            ignore_senders: self.ignore_senders,
            source: self.source,
            translate: self.translate,
            forward: self.forward,
            workers: self.relay.workers.max(1),
            rules,
        })
    }
}

/// Validated configuration, fixed for the duration of one run.
///
/// `forward.enable` is only the starting value; the orchestrator owns the
/// live flag and may switch it off after a launch failure.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub interval: Duration,
    pub ignore_enemy: bool,
    pub ignore_senders: Vec<String>,
    pub source: SourceConfig,
    pub translate: TranslateConfig,
    pub forward: ForwardConfig,
    pub workers: usize,
    pub rules: Vec<RewriteRule>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(default_interval_ms()),
            ignore_enemy: false,
            ignore_senders: Vec::new(),
            source: SourceConfig::default(),
            translate: TranslateConfig::default(),
            forward: ForwardConfig::default(),
            workers: default_workers(),
            rules: Vec::new(),
        }
    }
}

/// Commented default config, written by `--init-config`.
pub fn default_config_toml() -> String {
    format!(
        r#"# chat-relay configuration

# Poll interval in milliseconds, used both while waiting for the game and while polling.
interval_ms = {interval}

# Drop messages from the opposing team.
ignore_enemy = false

# Drop messages from these senders (exact, case-sensitive).
ignore_senders = []

[source]
host = "{host}"
port = {port}
process_names = ["aces", "aces.exe"]
connect_timeout_ms = {connect}
# 0 = no request timeout
request_timeout_ms = 0

[translate]
enable = false
# e.g. "en", "ja"
target_lang = ""

[forward]
enable = false
# Program launched for every message, e.g. a text-to-speech tool.
command = ""
# {placeholder} is replaced with the message text.
arguments = "{placeholder}"

[relay]
# Messages of one batch processed concurrently (1 = strictly in order).
workers = {workers}

# Rewrite rules, applied in order to the text before forwarding.
# [[rewrite]]
# from = "gg"
# to = "good game"
"#,
        interval = default_interval_ms(),
        host = default_host(),
        port = default_port(),
        connect = default_connect_timeout_ms(),
        placeholder = TEXT_PLACEHOLDER,
        workers = default_workers(),
    )
}

/// Write the default config template to `path`, refusing to overwrite.
pub fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Refusing to overwrite existing file: {}", path.display());
    }
    std::fs::write(path, default_config_toml())
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    info!("Wrote default config to {}", path.display());
    Ok(())
}
