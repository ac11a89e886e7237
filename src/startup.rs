// Startup module - displays banner and inspector status
//
// Printed once before the proxy starts accepting connections:
// - Version info and branding
// - Config file in use
// - Where the UI lives (or which instance receives our events)
// - The env var the agent needs to route through the proxy

use gemini_inspector::config::{Config, VERSION};
use gemini_inspector::server::discovery::INSPECTOR_HOST;
use gemini_inspector::server::Role;

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const MAGENTA: &str = "\x1b[35m";
}

/// Env vars Gemini agents read for their API base URL
pub const BASE_URL_VARS: [&str; 2] = ["GOOGLE_GEMINI_BASE_URL", "CODE_ASSIST_ENDPOINT"];

/// One status line under the banner
struct StatusLine {
    label: &'static str,
    value: String,
    ok: bool,
}

/// Print the startup banner and status lines
pub fn print_startup(config: &Config, role: &Role) {
    use colors::*;

    println!();
    println!("  {BOLD}{CYAN}Gemini Inspector{RESET} {DIM}v{VERSION}{RESET}");
    println!("  {DIM}Live view of Gemini API traffic{RESET}");
    println!();

    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("  {DIM}Config:{RESET} {GREEN}✓{RESET} {}", path.display());
        } else {
            println!("  {DIM}Config:{RESET} {DIM}(using defaults){RESET}");
        }
    }
    println!();

    for line in status_lines(config, role) {
        let icon = if line.ok {
            format!("{GREEN}✓{RESET}")
        } else {
            format!("{YELLOW}!{RESET}")
        };
        println!("    {icon} {:<10} {DIM}{}{RESET}", line.label, line.value);
    }
    println!();

    println!(
        "  {MAGENTA}▸{RESET} Proxy listening on {BOLD}{}{RESET}",
        config.bind_addr
    );
    println!("  {DIM}Route your agent through it:{RESET}");
    for var in BASE_URL_VARS {
        println!("    {BOLD}export {}{RESET}", export_line(var, config));
    }
    println!();
}

fn status_lines(config: &Config, role: &Role) -> Vec<StatusLine> {
    let ui = match role {
        Role::Primary { port } => StatusLine {
            label: "ui",
            value: format!("http://{}:{}", INSPECTOR_HOST, port),
            ok: true,
        },
        Role::Secondary { peer } => StatusLine {
            label: "ui",
            value: format!("joined {}", peer),
            ok: true,
        },
        Role::Detached => StatusLine {
            label: "ui",
            value: "unavailable (events are dropped)".to_string(),
            ok: false,
        },
    };

    vec![
        ui,
        StatusLine {
            label: "upstream",
            value: config.upstream_url.clone(),
            ok: true,
        },
        StatusLine {
            label: "target",
            value: config.target_host.clone(),
            ok: true,
        },
    ]
}

fn export_line(var: &str, config: &Config) -> String {
    format!("{}=http://{}", var, config.bind_addr)
}

/// Startup summary for the log (terminal banner is not captured in files)
pub fn log_startup(config: &Config, role: &Role) {
    tracing::info!(version = VERSION, "Gemini Inspector starting");
    match role {
        Role::Primary { port } => tracing::info!(port, "Serving inspector UI"),
        Role::Secondary { peer } => tracing::info!(%peer, "Forwarding events to running inspector"),
        Role::Detached => tracing::warn!("No inspector UI, events will not be shown"),
    }
    tracing::info!(
        bind = %config.bind_addr,
        upstream = %config.upstream_url,
        target = %config.target_host,
        "Proxy configured"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_line_uses_bind_addr() {
        let config = Config::default();
        assert_eq!(
            export_line("GOOGLE_GEMINI_BASE_URL", &config),
            "GOOGLE_GEMINI_BASE_URL=http://127.0.0.1:8090"
        );
    }

    #[test]
    fn test_detached_role_is_flagged() {
        let lines = status_lines(&Config::default(), &Role::Detached);
        assert!(!lines[0].ok);
        assert!(lines[1..].iter().all(|l| l.ok));
    }

    #[test]
    fn test_primary_role_shows_ui_url() {
        let lines = status_lines(&Config::default(), &Role::Primary { port: 3001 });
        assert_eq!(lines[0].value, "http://127.0.0.1:3001");
    }
}
