//! Configuration for the inspector
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/gemini-inspector/config.toml)
//! 3. Built-in defaults (lowest priority)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

mod observability;
mod serialization;


pub use observability::{FileLogging, LogRotation, LoggingConfig};

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const ENV_PORT: &str = "GEMINI_INSPECTOR_PORT";
pub const ENV_BIND: &str = "GEMINI_INSPECTOR_BIND";
pub const ENV_UPSTREAM: &str = "GEMINI_INSPECTOR_UPSTREAM";
pub const ENV_TARGET_HOST: &str = "GEMINI_INSPECTOR_TARGET_HOST";
pub const ENV_NO_BROWSER: &str = "GEMINI_INSPECTOR_NO_BROWSER";

const DEFAULT_INSPECTOR_PORT: u16 = 3001;
const DEFAULT_PORT_ATTEMPTS: u16 = 20;
const DEFAULT_PROXY_PORT: u16 = 8090;
const DEFAULT_UPSTREAM: &str = "https://cloudcode-pa.googleapis.com";
const DEFAULT_TARGET_HOST: &str = "googleapis.com";

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// First port tried for the inspector UI server
    pub inspector_port: u16,

    /// How many consecutive ports to try before giving up
    pub port_attempts: u16,

    /// Address the forwarding proxy listens on
    pub bind_addr: SocketAddr,

    /// Where the proxy forwards agent traffic
    pub upstream_url: String,

    /// Host (or host suffix) whose traffic is inspected
    pub target_host: String,

    /// Non-JSON bodies shorter than this are shown as raw text
    pub raw_text_limit: usize,

    /// Open the UI in a browser when this instance serves it
    pub open_browser: bool,

    /// Events a slow UI connection may fall behind before skipping
    pub event_buffer: usize,

    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inspector_port: DEFAULT_INSPECTOR_PORT,
            port_attempts: DEFAULT_PORT_ATTEMPTS,
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PROXY_PORT)),
            upstream_url: DEFAULT_UPSTREAM.to_string(),
            target_host: DEFAULT_TARGET_HOST.to_string(),
            raw_text_limit: crate::reassembly::DEFAULT_RAW_TEXT_LIMIT,
            open_browser: true,
            event_buffer: crate::emitter::DEFAULT_CHANNEL_CAPACITY,
            logging: LoggingConfig::default(),
        }
    }
}

/// Config file structure
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub inspector_port: Option<u16>,
    pub port_attempts: Option<u16>,
    pub bind_addr: Option<String>,
    pub upstream_url: Option<String>,
    pub target_host: Option<String>,
    pub raw_text_limit: Option<usize>,
    pub open_browser: Option<bool>,
    pub event_buffer: Option<usize>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,
}

impl Config {
    /// Get the config file path: ~/.config/gemini-inspector/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("gemini-inspector").join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };

        if path.exists() {
            return;
        }

        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // config is optional
            }
        }

        let _ = std::fs::write(&path, Self::default().to_toml());
    }

    /// Load the config file if it exists
    ///
    /// A file that exists but cannot be read or parsed is an error: a broken
    /// config should fail loudly, not fall back to defaults.
    fn load_file_config() -> Result<FileConfig> {
        let Some(path) = Self::config_path() else {
            return Ok(FileConfig::default());
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read config file {}", path.display())),
        }
    }

    /// Load configuration: env vars > file > defaults
    pub fn from_env() -> Result<Self> {
        let file = Self::load_file_config()?;
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merge a parsed file and an environment lookup over the defaults
    pub(crate) fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        // Inspector port: env > file > default
        let inspector_port = match env(ENV_PORT) {
            Some(value) => value
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: '{}'", ENV_PORT, value))?,
            None => file.inspector_port.unwrap_or(defaults.inspector_port),
        };

        // Proxy bind address: env > file > default
        let bind_addr = match env(ENV_BIND).or(file.bind_addr) {
            Some(value) => value
                .trim()
                .parse()
                .with_context(|| format!("Invalid bind address: '{}'", value))?,
            None => defaults.bind_addr,
        };

        let upstream_url = env(ENV_UPSTREAM)
            .or(file.upstream_url)
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.upstream_url);

        let target_host = env(ENV_TARGET_HOST)
            .or(file.target_host)
            .unwrap_or(defaults.target_host);

        // Browser: env flag disables, otherwise file > default
        let no_browser = env(ENV_NO_BROWSER)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let open_browser = !no_browser && file.open_browser.unwrap_or(defaults.open_browser);

        Ok(Self {
            inspector_port,
            port_attempts: file.port_attempts.unwrap_or(defaults.port_attempts),
            bind_addr,
            upstream_url,
            target_host,
            raw_text_limit: file.raw_text_limit.unwrap_or(defaults.raw_text_limit),
            open_browser,
            event_buffer: file.event_buffer.unwrap_or(defaults.event_buffer),
            logging: LoggingConfig::from_file(file.logging),
        })
    }
}
