//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::Config;

impl Config {
    /// Render the whole configuration as a commented TOML file
    pub fn to_toml(&self) -> String {
        let vp = &self.viewport;
        let optional = |key: &str, value: Option<String>, example: &str| match value {
            Some(v) => format!("{} = {}", key, v),
            None => format!("# {} = {}", key, example),
        };

        format!(
            r#"# viewport configuration

# Engine tuning
[viewport]
# Rows cached per view, in pages
buffer_pages = {buffer_pages}
# Prefetch when the window is within this percent of the cache edge
limit_factor = {limit_factor}
# Percent of each fetch placed before the requested row
lookbehind = {lookbehind}
# Split pane: none, horiz, vert
pane_mode = "{pane_mode}"
{page_size}
{pane_width}
# Seconds before the "server is slow" notice (unset = never)
{wait_secs}
empty_msg = {empty_msg:?}

# Logging configuration (RUST_LOG env var overrides)
[logging]
level = "{log_level}"
# File logging (in addition to the TUI log strip or stdout)
file_enabled = {log_file_enabled}
file_dir = "{log_file_dir}"
file_rotation = "{log_file_rotation}"  # hourly, daily, never
file_prefix = "{log_file_prefix}"

# Mock mail server used by viewport-demo
[demo]
mailboxes = {mailboxes:?}
rows = {rows}
latency_ms = {latency_ms}
"#,
            buffer_pages = vp.buffer_pages,
            limit_factor = vp.limit_factor,
            lookbehind = vp.lookbehind,
            pane_mode = vp.pane_mode.as_str(),
            page_size = optional("page_size", vp.page_size.map(|v| v.to_string()), "12"),
            pane_width = optional("pane_width", vp.pane_width.map(|v| v.to_string()), "60"),
            wait_secs = optional("wait_secs", vp.wait_secs.map(|v| v.to_string()), "5"),
            empty_msg = vp.empty_msg,
            log_level = self.logging.level,
            log_file_enabled = self.logging.file_enabled,
            log_file_dir = self.logging.file_dir.display().to_string().replace('\\', "/"),
            log_file_rotation = self.logging.file_rotation,
            log_file_prefix = self.logging.file_prefix,
            mailboxes = self.demo.mailboxes,
            rows = self.demo.rows,
            latency_ms = self.demo.latency_ms,
        )
    }
}
