//! Mock mail server settings for the demo binary

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    /// Mailboxes to generate; the first one opens at startup
    pub mailboxes: Vec<String>,
    /// Messages generated per mailbox
    pub rows: usize,
    /// Simulated server latency per request
    pub latency_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            mailboxes: vec!["INBOX".to_string(), "Archive".to_string(), "Sent".to_string()],
            rows: 500,
            latency_ms: 150,
        }
    }
}

/// Demo settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileDemo {
    pub mailboxes: Option<Vec<String>>,
    pub rows: Option<usize>,
    pub latency_ms: Option<u64>,
}

impl DemoConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileDemo>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            mailboxes: file
                .mailboxes
                .filter(|m| !m.is_empty())
                .unwrap_or(defaults.mailboxes),
            rows: file.rows.unwrap_or(defaults.rows),
            latency_ms: file.latency_ms.unwrap_or(defaults.latency_ms),
        }
    }
}
