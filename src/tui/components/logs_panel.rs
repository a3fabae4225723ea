//! Logs panel component
//!
//! Shows the tail of the captured log buffer, color-coded by level. Always
//! follows the newest entry.

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem},
    Frame,
};
use viewport::logging::{LogEntry, LogLevel, LogBuffer};

pub fn render(f: &mut Frame, area: Rect, logs: &LogBuffer) {
    let height = area.height.saturating_sub(2) as usize;
    let entries = logs.recent(height);

    let items: Vec<ListItem> = entries
        .iter()
        .map(|entry| ListItem::new(format_log_entry(entry)).style(log_level_style(&entry.level)))
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(" Logs "));
    f.render_widget(list, area);
}

fn format_log_entry(entry: &LogEntry) -> String {
    format!(
        "[{}] {:5} {}",
        entry.timestamp.format("%H:%M:%S"),
        entry.level.as_str(),
        entry.message
    )
}

fn log_level_style(level: &LogLevel) -> Style {
    match level {
        LogLevel::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        LogLevel::Warn => Style::default().fg(Color::Yellow),
        LogLevel::Info => Style::default().fg(Color::Green),
        LogLevel::Debug | LogLevel::Trace => Style::default().fg(Color::DarkGray),
    }
}
