// CLI module - command-line argument parsing and handlers
//
// Running without a subcommand starts the inspector and proxy. The config
// subcommand manages the config file:
// - config --show: Display effective configuration
// - config --reset: Regenerate config file with defaults
// - config --edit: Open config file in $EDITOR
// - config --path: Print config file location

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gemini_inspector::config::{Config, VERSION};
use std::io::Write;
use std::net::SocketAddr;
use std::process::Command;

/// Gemini Inspector - live view of Gemini API traffic
#[derive(Parser)]
#[command(name = "gemini-inspector")]
#[command(version = VERSION)]
#[command(about = "Live inspector for Gemini API traffic", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Overrides applied on top of env and file configuration
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// First port tried for the inspector UI
    #[arg(long)]
    pub port: Option<u16>,

    /// Address the forwarding proxy listens on
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Upstream base URL the proxy forwards to
    #[arg(long)]
    pub upstream: Option<String>,

    /// Don't open the UI in a browser
    #[arg(long)]
    pub no_browser: bool,
}

impl RunArgs {
    /// Apply flags over a loaded config (flags win over everything)
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.inspector_port = port;
        }
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(upstream) = &self.upstream {
            config.upstream_url = upstream.trim_end_matches('/').to_string();
        }
        if self.no_browser {
            config.open_browser = false;
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Open config file in $EDITOR
        #[arg(long)]
        edit: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

/// Handle a subcommand if one was given. Returns true if the caller should exit.
pub fn handle_command(cli: &Cli) -> Result<bool> {
    match cli.command {
        Some(Commands::Config {
            show,
            reset,
            edit,
            path,
        }) => {
            if path {
                handle_config_path()?;
            } else if show {
                handle_config_show(&cli.run)?;
            } else if reset {
                handle_config_reset()?;
            } else if edit {
                handle_config_edit()?;
            } else {
                // No flag provided, show help
                println!("Usage: gemini-inspector config [--show|--reset|--edit|--path]");
                println!();
                println!("Options:");
                println!("  --show    Display effective configuration");
                println!("  --reset   Reset config file to defaults");
                println!("  --edit    Open config file in $EDITOR");
                println!("  --path    Show config file path");
            }
            Ok(true)
        }
        None => Ok(false), // No subcommand, run the inspector
    }
}

fn require_config_path() -> Result<std::path::PathBuf> {
    Config::config_path().context("Could not determine config path")
}

fn handle_config_path() -> Result<()> {
    println!("{}", require_config_path()?.display());
    Ok(())
}

fn handle_config_show(run: &RunArgs) -> Result<()> {
    let mut config = Config::from_env()?;
    run.apply(&mut config);

    println!("# Effective configuration (flags > env > file > defaults)");
    println!();
    print!("{}", config.to_toml());

    println!();
    let path = require_config_path()?;
    if path.exists() {
        println!("# Source: {}", path.display());
    } else {
        println!("# Source: defaults (no config file)");
    }
    Ok(())
}

fn handle_config_reset() -> Result<()> {
    let path = require_config_path()?;

    // Confirm if file exists
    if path.exists() {
        eprint!(
            "Config file exists at {}. Overwrite? [y/N] ",
            path.display()
        );
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    std::fs::write(&path, Config::default().to_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Config reset to defaults: {}", path.display());
    Ok(())
}

fn handle_config_edit() -> Result<()> {
    let path = require_config_path()?;

    if !path.exists() {
        Config::ensure_config_exists();
        println!("Created new config file: {}", path.display());
    }

    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| {
            if cfg!(windows) {
                "notepad".to_string()
            } else {
                "nano".to_string()
            }
        });

    println!("Opening {} with {}", path.display(), editor);

    let status = Command::new(&editor)
        .arg(&path)
        .status()
        .with_context(|| {
            format!(
                "Failed to launch editor '{}' (set $EDITOR to your preferred editor)",
                editor
            )
        })?;

    if !status.success() {
        anyhow::bail!("Editor exited with status: {}", status);
    }
    Ok(())
}
