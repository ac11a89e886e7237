//! Config serialization to TOML
//!
//! Single source of truth for the config file format.

use super::Config;

impl Config {
    /// Serialize to a commented TOML document that parses back to `self`
    pub fn to_toml(&self) -> String {
        format!(
            r#"# gemini-inspector configuration
#
# Environment variables override these values:
#   GEMINI_INSPECTOR_PORT, GEMINI_INSPECTOR_BIND, GEMINI_INSPECTOR_UPSTREAM,
#   GEMINI_INSPECTOR_TARGET_HOST, GEMINI_INSPECTOR_NO_BROWSER

# First port tried for the inspector UI; later ones are tried if taken
inspector_port = {inspector_port}
port_attempts = {port_attempts}

# Forwarding proxy: point the agent's base URL here
bind_addr = "{bind_addr}"

# Where proxied traffic is sent
upstream_url = "{upstream_url}"

# Only traffic to this host (or its subdomains) is inspected
target_host = "{target_host}"

# Non-JSON bodies shorter than this many bytes are shown as raw text
raw_text_limit = {raw_text_limit}

# Open the UI in a browser on startup
open_browser = {open_browser}

# Events a slow UI connection may fall behind before it skips ahead
event_buffer = {event_buffer}

# Logging configuration (RUST_LOG env var overrides)
[logging]
level = "{log_level}"
# JSON log files in addition to terminal output
file_enabled = {log_file_enabled}
file_dir = "{log_file_dir}"
file_rotation = "{log_file_rotation}"  # hourly, daily, never
file_prefix = "{log_file_prefix}"
"#,
            inspector_port = self.inspector_port,
            port_attempts = self.port_attempts,
            bind_addr = self.bind_addr,
            upstream_url = escape(&self.upstream_url),
            target_host = escape(&self.target_host),
            raw_text_limit = self.raw_text_limit,
            open_browser = self.open_browser,
            event_buffer = self.event_buffer,
            log_level = escape(&self.logging.level),
            log_file_enabled = self.logging.file_enabled,
            log_file_dir = escape(&self.logging.file_dir.to_string_lossy()),
            log_file_rotation = self.logging.file_rotation.as_str(),
            log_file_prefix = escape(&self.logging.file_prefix),
        )
    }
}

/// Escape a value for a TOML basic string
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
