//! The [logging] section: filter level and the optional JSON log file

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use tracing_appender::rolling::Rotation;

/// How often the JSON log file starts over
///
/// Parsed leniently: anything other than `hourly` or `never` means daily.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

impl From<String> for LogRotation {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Self::Hourly,
            "never" => Self::Never,
            _ => Self::Daily,
        }
    }
}

impl LogRotation {
    pub fn rotation(self) -> Rotation {
        match self {
            Self::Hourly => Rotation::HOURLY,
            Self::Daily => Rotation::DAILY,
            Self::Never => Rotation::NEVER,
        }
    }
}

impl fmt::Display for LogRotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Never => "never",
        })
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level for the engine and the demo binary: trace, debug, info, warn, error
    pub level: String,
    /// Also write JSON lines to `file_dir`
    pub file_enabled: bool,
    pub file_dir: PathBuf,
    pub file_rotation: LogRotation,
    /// "viewport" gives files like "viewport.2024-01-15"
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_enabled: false,
            file_dir: dirs::data_local_dir()
                .map(|d| d.join("viewport").join("logs"))
                .unwrap_or_else(|| PathBuf::from("./logs")),
            file_rotation: LogRotation::Daily,
            file_prefix: "viewport".to_string(),
        }
    }
}

/// [logging] as written in the config file
#[derive(Debug, Deserialize, Default)]
pub struct FileLogging {
    pub level: Option<String>,
    pub file_enabled: Option<bool>,
    pub file_dir: Option<PathBuf>,
    pub file_rotation: Option<LogRotation>,
    pub file_prefix: Option<String>,
}

impl LoggingConfig {
    pub fn from_file(file: Option<FileLogging>) -> Self {
        let mut config = Self::default();
        let Some(file) = file else {
            return config;
        };
        if let Some(level) = file.level.filter(|l| !l.trim().is_empty()) {
            config.level = level;
        }
        if let Some(enabled) = file.file_enabled {
            config.file_enabled = enabled;
        }
        if let Some(dir) = file.file_dir {
            config.file_dir = dir;
        }
        if let Some(rotation) = file.file_rotation {
            config.file_rotation = rotation;
        }
        if let Some(prefix) = file.file_prefix.filter(|p| !p.is_empty()) {
            config.file_prefix = prefix;
        }
        config
    }

    /// Filter applied when `RUST_LOG` is unset: both crates at `level`
    pub fn filter_directive(&self) -> String {
        format!("viewport={0},viewport_demo={0}", self.level)
    }
}
