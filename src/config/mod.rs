//! Configuration for the viewport engine and the demo front-end
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/viewport/config.toml)
//! 3. Built-in defaults (lowest priority)

use serde::Deserialize;
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod demo;
mod observability;
mod serialization;
mod viewport;


pub use demo::{DemoConfig, FileDemo};
pub use observability::{FileLogging, LogRotation, LoggingConfig};
pub use viewport::{FileViewport, ViewportConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Engine tuning (buffer sizes, split pane, slow-server interval)
    pub viewport: ViewportConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Mock mail server used by the demo binary
    pub demo: DemoConfig,
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure
#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    /// Optional [viewport] section
    pub viewport: Option<FileViewport>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,

    /// Optional [demo] section
    pub demo: Option<FileDemo>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/viewport/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("viewport").join("config.toml"))
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
                return; // Config is optional
            }
        }

        // Config::default().to_toml() is the single source of truth
        let template = Self::default().to_toml();
        let _ = std::fs::write(&path, template);
    }

    /// Load file config if it exists
    ///
    /// A config file that exists but does not parse is fatal: the process
    /// exits with an actionable message instead of running on defaults.
    fn load_file_config() -> FileConfig {
        let Some(path) = Self::config_path() else {
            return FileConfig::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
                    eprintln!("║  CONFIG ERROR - Failed to parse configuration file          ║");
                    eprintln!("╚══════════════════════════════════════════════════════════════╝\n");
                    eprintln!("  File: {}\n", path.display());
                    eprintln!("  Error: {}\n", e);
                    eprintln!("  Tip: Check for:\n");
                    eprintln!("    - Missing quotes around string values");
                    eprintln!("    - Numbers written as strings (buffer_pages = 10, not \"10\")");
                    eprintln!("    - Typos in section names\n");
                    eprintln!("  To reset, run: viewport-demo config --reset\n");
                    std::process::exit(1);
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
            Err(e) => {
                eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
                eprintln!("║  CONFIG ERROR - Cannot read configuration file              ║");
                eprintln!("╚══════════════════════════════════════════════════════════════╝\n");
                eprintln!("  File: {}\n", path.display());
                eprintln!("  Error: {}\n", e);
                std::process::exit(1);
            }
        }
    }

    /// Load configuration: env vars -> file -> defaults
    pub fn from_env() -> Self {
        Self::from_sources(Self::load_file_config(), |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with an environment lookup
    pub fn from_sources(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let mut viewport = ViewportConfig::from_file(file.viewport);
        let mut logging = LoggingConfig::from_file(file.logging);
        let mut demo = DemoConfig::from_file(file.demo);

        let num = |key: &str| env(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(v) = num("VIEWPORT_BUFFER_PAGES") {
            viewport.buffer_pages = v as usize;
        }
        if let Some(v) = num("VIEWPORT_LIMIT_FACTOR") {
            viewport.limit_factor = v as usize;
        }
        if let Some(v) = num("VIEWPORT_LOOKBEHIND") {
            viewport.lookbehind = v as usize;
        }
        if let Some(mode) = env("VIEWPORT_PANE_MODE") {
            viewport.pane_mode = crate::types::PaneMode::from_str(&mode);
        }
        // 0 disables the slow-server notification
        if let Some(v) = num("VIEWPORT_WAIT") {
            viewport.wait_secs = (v > 0).then_some(v);
        }
        if let Some(level) = env("VIEWPORT_LOG_LEVEL") {
            logging.level = level;
        }
        if let Some(v) = num("VIEWPORT_DEMO_ROWS") {
            demo.rows = v as usize;
        }
        if let Some(v) = num("VIEWPORT_DEMO_LATENCY_MS") {
            demo.latency_ms = v;
        }

        Self {
            viewport,
            logging,
            demo,
        }
    }
}
