//! Engine tuning: cache sizing, split pane, slow-server notification

use serde::Deserialize;

use crate::error::{Result, ViewportError};
use crate::types::PaneMode;

/// Recognized engine options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewportConfig {
    /// Rows cached per view, in pages
    pub buffer_pages: usize,
    /// Prefetch once the window is this close (percent of the buffer) to the
    /// cache edge
    pub limit_factor: usize,
    /// Share of a fetch placed before the requested row, percent
    pub lookbehind: usize,
    /// Page size for the horizontal split; derived from the geometry when
    /// unset
    pub page_size: Option<usize>,
    pub pane_mode: PaneMode,
    /// List width for the vertical split
    pub pane_width: Option<usize>,
    /// Interval of the "server is slow" notification; disabled when unset
    pub wait_secs: Option<u64>,
    /// Placeholder shown for a view without rows
    pub empty_msg: String,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            buffer_pages: 10,
            limit_factor: 35,
            lookbehind: 40,
            page_size: None,
            pane_mode: PaneMode::None,
            pane_width: None,
            wait_secs: None,
            empty_msg: "No messages".to_string(),
        }
    }
}

impl ViewportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_pages == 0 {
            return Err(ViewportError::Config("buffer_pages must be at least 1".into()));
        }
        if self.limit_factor > 100 {
            return Err(ViewportError::Config(format!(
                "limit_factor is a percentage, got {}",
                self.limit_factor
            )));
        }
        if self.lookbehind > 100 {
            return Err(ViewportError::Config(format!(
                "lookbehind is a percentage, got {}",
                self.lookbehind
            )));
        }
        if self.page_size == Some(0) {
            return Err(ViewportError::Config("page_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Viewport settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileViewport {
    pub buffer_pages: Option<usize>,
    pub limit_factor: Option<usize>,
    pub lookbehind: Option<usize>,
    pub page_size: Option<usize>,
    pub pane_mode: Option<String>,
    pub pane_width: Option<usize>,
    pub wait_secs: Option<u64>,
    pub empty_msg: Option<String>,
}

impl ViewportConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileViewport>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            buffer_pages: file.buffer_pages.unwrap_or(defaults.buffer_pages),
            limit_factor: file.limit_factor.unwrap_or(defaults.limit_factor),
            lookbehind: file.lookbehind.unwrap_or(defaults.lookbehind),
            page_size: file.page_size.or(defaults.page_size),
            pane_mode: file
                .pane_mode
                .map(|s| PaneMode::from_str(&s))
                .unwrap_or(defaults.pane_mode),
            pane_width: file.pane_width.or(defaults.pane_width),
            wait_secs: file.wait_secs.filter(|s| *s > 0).or(defaults.wait_secs),
            empty_msg: file.empty_msg.unwrap_or(defaults.empty_msg),
        }
    }
}
